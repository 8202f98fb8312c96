// src/core/heartbeat.rs
use std::time::Duration;
use tokio::time::Instant;

/// Observed venue idle timeout is just under a minute; stay well inside it.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Pull-based keep-alive. The receive loop calls [`tick`](Self::tick) once per
/// iteration; nothing here runs on its own timer.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    last_activity: Instant,
    last_inbound: Instant,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_activity: now,
            last_inbound: now,
        }
    }

    pub fn on_frame_received(&mut self, now: Instant) {
        self.last_activity = now;
        self.last_inbound = now;
    }

    /// True when a ping is due; the window restarts at `now`.
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_activity) >= self.interval {
            self.last_activity = now;
            true
        } else {
            false
        }
    }

    /// The peer has been silent for two full windows, pings included.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.idle_for(now) >= self.stale_after()
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_inbound)
    }

    /// Earliest instant at which `tick` or `is_stale` can change its answer.
    pub fn next_deadline(&self) -> Instant {
        let ping_due = self.last_activity + self.interval;
        let stale_at = self.last_inbound + self.stale_after();
        ping_due.min(stale_at)
    }

    fn stale_after(&self) -> Duration {
        self.interval.saturating_mul(2)
    }
}
