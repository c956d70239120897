use engine::telemetry::{get_subscriber, init_subscriber};
use engine::time::TimeSource;
use engine::{Config, build};

/// Sealed-rank auction bidding engine.
///
/// Environment variables can be set directly or loaded from a `.env` file in
/// the project root. See `engine::config::Config` for the full list.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();

    let subscriber = get_subscriber("info".into());
    init_subscriber(subscriber);

    let mut config = Config::from_env();

    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();
    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new(jiff::Timestamp::now());

    let server = build(&mut config, time_source).await?;
    server.await
}
