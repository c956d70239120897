//! Timer Driver: one broadcaster per armed auction, running only on the
//! elected leader. Non-leaders silently drop `start`/`update`/`stop` calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use payloads::AuctionId;
use tokio::sync::{Mutex, broadcast};

use crate::leader::LeaderElector;
use crate::time::TimeSource;

#[derive(Debug, Clone, serde::Serialize)]
pub struct TimerTick {
    pub auction_id: AuctionId,
    pub round_number: i32,
    pub time_left_seconds: i64,
    pub round_end_time_ms: i64,
    pub is_urgent: bool,
    pub server_time_ms: i64,
}

struct ArmedRound {
    round_number: i32,
    end_time_ms: Arc<Mutex<i64>>,
    stop: broadcast::Sender<()>,
}

pub struct TimerDriver {
    elector: Arc<LeaderElector>,
    time_source: TimeSource,
    tick_period: Duration,
    armed: Mutex<HashMap<AuctionId, ArmedRound>>,
    events: broadcast::Sender<TimerTick>,
}

impl TimerDriver {
    pub fn new(elector: LeaderElector, time_source: TimeSource, tick_period: Duration) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            elector: Arc::new(elector),
            time_source,
            tick_period,
            armed: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerTick> {
        self.events.subscribe()
    }

    /// Runs the leader-extension loop forever; call from a spawned task.
    /// Every `leader_ttl_sec / extend-safety-margin` the lease is refreshed;
    /// on losing leadership all per-auction broadcasters are cancelled.
    pub async fn run_election_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(4));
        loop {
            interval.tick().await;
            match self.elector.try_become_leader().await {
                Ok(true) => {}
                Ok(false) => self.step_down().await,
                Err(e) => tracing::error!(error = %e, "leader election tick failed"),
            }
        }
    }

    async fn step_down(&self) {
        let mut armed = self.armed.lock().await;
        for (_, round) in armed.drain() {
            let _ = round.stop.send(());
        }
    }

    /// Arms a 1 s-period broadcaster for `auction_id`'s current round. A
    /// no-op if this instance isn't the leader.
    pub async fn start(self: &Arc<Self>, auction_id: AuctionId, round_number: i32, end_time_ms: i64) {
        if !matches!(self.elector.is_leader().await, Ok(true)) {
            return;
        }
        let (stop_tx, _) = broadcast::channel(1);
        let end_time = Arc::new(Mutex::new(end_time_ms));
        {
            let mut armed = self.armed.lock().await;
            armed.insert(
                auction_id,
                ArmedRound {
                    round_number,
                    end_time_ms: end_time.clone(),
                    stop: stop_tx.clone(),
                },
            );
        }

        let this = self.clone();
        let mut stop_rx = stop_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.tick_period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop_rx.recv() => break,
                }
                let now_ms = this.time_source.now().as_millisecond();
                let end_ms = *end_time.lock().await;
                let time_left_seconds = ((end_ms - now_ms) / 1000).max(0);
                if end_ms - now_ms < -5_000 {
                    this.armed.lock().await.remove(&auction_id);
                    break;
                }
                let _ = this.events.send(TimerTick {
                    auction_id,
                    round_number,
                    time_left_seconds,
                    round_end_time_ms: end_ms,
                    is_urgent: time_left_seconds > 0 && time_left_seconds <= 60,
                    server_time_ms: now_ms,
                });
            }
        });
    }

    /// Mutates the in-memory end time for an already-armed auction; the next
    /// tick reflects it.
    pub async fn update(&self, auction_id: &AuctionId, new_end_time_ms: i64) {
        if !matches!(self.elector.is_leader().await, Ok(true)) {
            return;
        }
        if let Some(round) = self.armed.lock().await.get(auction_id) {
            *round.end_time_ms.lock().await = new_end_time_ms;
        }
    }

    pub async fn stop(&self, auction_id: &AuctionId) {
        if let Some(round) = self.armed.lock().await.remove(auction_id) {
            let _ = round.stop.send(());
        }
    }
}
