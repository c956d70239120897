/// Configuration loaded from environment variables at startup.
///
/// Environment variables can be set directly or loaded from a `.env` file in
/// the project root.
///
/// Required:
/// - `DATABASE_URL`: PostgreSQL connection string
/// - `REDIS_URL`: Redis connection string, backing the fast cache, the
///   distributed lock/cooldown keys, and the timer-driver leader election
/// - `IP_ADDRESS`: Server bind address (127.0.0.1 for local, 0.0.0.0 for public)
/// - `PORT`: Server port
///
/// Optional (defaults documented on each field below).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    /// set to "0.0.0.0" for public access, "127.0.0.1" for local dev
    pub ip: String,
    /// set to 0 to get an os-assigned port
    pub port: u16,
    /// List of allowed CORS origins. Use "*" to allow any origin (development only)
    pub allowed_origins: Vec<String>,
    pub bidding: BiddingConfig,
}

/// Tunables for the bidding engine's retry/timing behavior.
#[derive(Debug, Clone)]
pub struct BiddingConfig {
    /// durable transaction retry cap on transient conflict
    pub max_bid_retries: u32,
    /// backoff base, in milliseconds: wait = base_ms * attempt + U[0, base_ms]
    pub retry_base_ms: u64,
    /// distributed bid lock lease, in milliseconds
    pub lock_lease_ms: u64,
    /// per-user post-bid cooldown, in milliseconds
    pub cooldown_ms: u64,
    /// pre-round-end window during which bids are rejected, in milliseconds
    pub boundary_buffer_ms: i64,
    /// round expiry scheduler poll period, in milliseconds
    pub scheduler_period_ms: u64,
    /// cache sync worker cadence, in milliseconds
    pub sync_period_ms: u64,
    /// timer driver countdown emit period, in milliseconds
    pub timer_tick_ms: u64,
    /// timer/scheduler/sync leader key TTL, in seconds
    pub leader_ttl_sec: u64,
    /// client IPs that bypass the distributed lock and cooldown (tests only)
    pub loopback_allowlist: Vec<std::net::IpAddr>,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        BiddingConfig {
            max_bid_retries: 20,
            retry_base_ms: 50,
            lock_lease_ms: 10_000,
            cooldown_ms: 1_000,
            boundary_buffer_ms: 100,
            scheduler_period_ms: 5_000,
            sync_period_ms: 5_000,
            timer_tick_ms: 1_000,
            leader_ttl_sec: 5,
            loopback_allowlist: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        use std::env::var;

        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string()) // Default to allow any origin for development
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut bidding = BiddingConfig::default();
        if let Ok(v) = var("AUCTION_MAX_BID_RETRIES") {
            bidding.max_bid_retries = v.parse().expect("AUCTION_MAX_BID_RETRIES must be u32");
        }
        if let Ok(v) = var("AUCTION_RETRY_BASE_MS") {
            bidding.retry_base_ms = v.parse().expect("AUCTION_RETRY_BASE_MS must be u64");
        }
        if let Ok(v) = var("AUCTION_LOCK_LEASE_MS") {
            bidding.lock_lease_ms = v.parse().expect("AUCTION_LOCK_LEASE_MS must be u64");
        }
        if let Ok(v) = var("AUCTION_COOLDOWN_MS") {
            bidding.cooldown_ms = v.parse().expect("AUCTION_COOLDOWN_MS must be u64");
        }
        if let Ok(v) = var("AUCTION_BOUNDARY_BUFFER_MS") {
            bidding.boundary_buffer_ms =
                v.parse().expect("AUCTION_BOUNDARY_BUFFER_MS must be i64");
        }
        if let Ok(v) = var("AUCTION_SCHEDULER_PERIOD_MS") {
            bidding.scheduler_period_ms =
                v.parse().expect("AUCTION_SCHEDULER_PERIOD_MS must be u64");
        }
        if let Ok(v) = var("AUCTION_SYNC_PERIOD_MS") {
            bidding.sync_period_ms = v.parse().expect("AUCTION_SYNC_PERIOD_MS must be u64");
        }
        if let Ok(v) = var("AUCTION_TIMER_TICK_MS") {
            bidding.timer_tick_ms = v.parse().expect("AUCTION_TIMER_TICK_MS must be u64");
        }
        if let Ok(v) = var("AUCTION_LEADER_TTL_SEC") {
            bidding.leader_ttl_sec = v.parse().expect("AUCTION_LEADER_TTL_SEC must be u64");
        }
        if let Ok(v) = var("AUCTION_LOOPBACK_ALLOWLIST") {
            bidding.loopback_allowlist = v
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().expect("AUCTION_LOOPBACK_ALLOWLIST entries must be IPs"))
                .collect();
        }

        Config {
            database_url: var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: var("REDIS_URL").expect("REDIS_URL must be set"),
            ip: var("IP_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var("PORT")
                .ok()
                .map(|p| p.parse().expect("PORT must be a u16"))
                .unwrap_or(0),
            allowed_origins,
            bidding,
        }
    }
}
