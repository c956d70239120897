pub mod cache;
pub mod config;
pub mod events;
pub mod leader;
pub mod lock;
pub mod outbox;
pub mod routes;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod time;
pub mod timer;

use std::net::TcpListener;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use sqlx::PgPool;

pub use config::Config;

use crate::cache::FastCache;
use crate::leader::LeaderElector;
use crate::lock::DistributedLock;
use crate::outbox::{LoggingNotifier, Notifier};
use crate::scheduler::Scheduler;
use crate::service::AuctionService;
use crate::sync::CacheSyncWorker;
use crate::time::TimeSource;
use crate::timer::TimerDriver;

/// Builds the server, wiring the durable store, fast cache, distributed
/// lock, timer driver, cache sync worker, and round expiry scheduler behind
/// a single [`AuctionService`], and spawns each singleton's leader-election
/// loop. Does not await the returned server.
///
/// Returns the port the server bound to by updating `config.port`.
pub async fn build(config: &mut Config, time_source: TimeSource) -> std::io::Result<Server> {
    let db_pool = PgPool::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("invalid REDIS_URL");
    let instance_id = uuid::Uuid::new_v4().to_string();

    let cache = Arc::new(FastCache::new(redis_client.clone()));
    let lock = Arc::new(DistributedLock::new(redis_client.clone()));
    let timer_elector = LeaderElector::new(
        redis_client.clone(),
        "leader:timer",
        instance_id.clone(),
        config.bidding.leader_ttl_sec,
    );
    let timer = Arc::new(TimerDriver::new(
        timer_elector,
        time_source.clone(),
        std::time::Duration::from_millis(config.bidding.timer_tick_ms),
    ));
    let sync_elector = LeaderElector::new(
        redis_client.clone(),
        "leader:sync",
        instance_id.clone(),
        config.bidding.leader_ttl_sec,
    );
    let sync_worker = Arc::new(CacheSyncWorker::new(
        db_pool.clone(),
        cache.clone(),
        time_source.clone(),
        sync_elector,
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);

    let service = Arc::new(AuctionService {
        pool: db_pool.clone(),
        cache: cache.clone(),
        lock: lock.clone(),
        timer: timer.clone(),
        sync_worker: sync_worker.clone(),
        notifier,
        events: crate::events::EventBus::new(),
        time_source,
        bidding: config.bidding.clone(),
    });

    let scheduler_elector = LeaderElector::new(
        redis_client,
        "leader:scheduler",
        instance_id,
        config.bidding.leader_ttl_sec,
    );
    let scheduler = Scheduler::new(
        db_pool,
        service.clone(),
        scheduler_elector,
        std::time::Duration::from_millis(config.bidding.scheduler_period_ms),
    );

    tokio::spawn(timer.clone().run_election_loop());
    tokio::spawn(sync_worker.clone().run(std::time::Duration::from_millis(
        config.bidding.sync_period_ms,
    )));
    tokio::spawn(async move { scheduler.run().await });

    let allowed_origins = config.allowed_origins.clone();
    let service_data = web::Data::new(service);

    let listener = TcpListener::bind(format!("{}:{}", config.ip, config.port))?;
    config.port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        let cors = if allowed_origins.contains(&"*".to_string()) {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
        } else {
            let mut cors = Cors::default().allow_any_method().allow_any_header().supports_credentials();
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(cors)
            .service(routes::api_services())
            .app_data(service_data.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}
