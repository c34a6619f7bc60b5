//! Per-connection liveness supervision.
//!
//! A single re-armable timer per connection. The timer fires one heartbeat
//! timeout after the last inbound frame; the check then compares the time
//! since the last heartbeat against the (shorter) advertised interval.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// Liveness of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Hello sent, nothing heard from the client yet
    AwaitingHandshakeAck,
    /// A frame arrived within the window
    Alive,
    /// Silent for longer than the interval (terminal)
    TimedOut,
    /// Socket closed (terminal)
    Closed,
}

impl Liveness {
    pub fn is_terminal(self) -> bool {
        matches!(self, Liveness::TimedOut | Liveness::Closed)
    }
}

/// Heartbeat state machine owning the connection's only liveness timer.
#[derive(Debug)]
pub struct HeartbeatSupervisor {
    interval: Duration,
    timeout: Duration,
    state: Liveness,
    timer: Pin<Box<Sleep>>,
}

impl HeartbeatSupervisor {
    /// Arm the first check one timeout from now
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            state: Liveness::AwaitingHandshakeAck,
            timer: Box::pin(sleep(timeout)),
        }
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    /// An inbound frame arrived: cancel the pending check and schedule the
    /// next one. Returns true for the first frame of the connection.
    pub fn record_frame(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let first = self.state == Liveness::AwaitingHandshakeAck;
        self.state = Liveness::Alive;
        self.rearm();
        first
    }

    /// Resolves when the pending check is due. Never resolves once the
    /// supervisor is in a terminal state.
    pub async fn tick(&mut self) {
        if self.state.is_terminal() {
            return pending().await;
        }
        self.timer.as_mut().await
    }

    /// Run a due check against the session's last heartbeat.
    pub fn check(&mut self, last_heartbeat: Instant, now: Instant) -> Liveness {
        if self.state.is_terminal() {
            return self.state;
        }
        if now.saturating_duration_since(last_heartbeat) > self.interval {
            self.state = Liveness::TimedOut;
        } else {
            self.rearm();
        }
        self.state
    }

    /// Enter `Closed`. Returns false if already closed, so teardown runs once.
    pub fn close(&mut self) -> bool {
        if self.state == Liveness::Closed {
            return false;
        }
        self.state = Liveness::Closed;
        true
    }

    fn rearm(&mut self) {
        let deadline = Instant::now() + self.timeout;
        self.timer.as_mut().reset(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    const INTERVAL: Duration = Duration::from_secs(25);
    const TIMEOUT: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_first_check_fires_after_timeout() {
        let mut supervisor = HeartbeatSupervisor::new(INTERVAL, TIMEOUT);
        let start = Instant::now();

        supervisor.tick().await;
        assert!(start.elapsed() >= TIMEOUT);
        assert_eq!(supervisor.state(), Liveness::AwaitingHandshakeAck);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_uses_strict_comparison() {
        let mut supervisor = HeartbeatSupervisor::new(INTERVAL, TIMEOUT);
        let last = Instant::now();

        assert_eq!(
            supervisor.check(last, last + INTERVAL),
            Liveness::AwaitingHandshakeAck
        );
        assert_eq!(
            supervisor.check(last, last + INTERVAL + Duration::from_millis(1)),
            Liveness::TimedOut
        );
        assert!(supervisor.state().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_rearms_timer() {
        let mut supervisor = HeartbeatSupervisor::new(INTERVAL, TIMEOUT);

        advance(INTERVAL / 2).await;
        assert!(supervisor.record_frame());
        assert!(!supervisor.record_frame());
        assert_eq!(supervisor.state(), Liveness::Alive);

        let rearmed_at = Instant::now();
        supervisor.tick().await;
        assert!(rearmed_at.elapsed() >= TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_frame_within_timeout_is_not_checked() {
        let mut supervisor = HeartbeatSupervisor::new(INTERVAL, TIMEOUT);

        // Beats that land a little after the interval keep pushing the check out
        for _ in 0..3 {
            let pending = timeout(INTERVAL + Duration::from_millis(5), supervisor.tick()).await;
            assert!(pending.is_err());
            supervisor.record_frame();
        }
        assert_eq!(supervisor.state(), Liveness::Alive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_runs_once_and_silences_timer() {
        let mut supervisor = HeartbeatSupervisor::new(INTERVAL, TIMEOUT);

        assert!(supervisor.close());
        assert!(!supervisor.close());
        assert!(!supervisor.record_frame());
        assert_eq!(supervisor.check(Instant::now(), Instant::now()), Liveness::Closed);

        let fired = timeout(TIMEOUT * 3, supervisor.tick()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_can_still_close() {
        let mut supervisor = HeartbeatSupervisor::new(INTERVAL, TIMEOUT);
        let last = Instant::now();
        supervisor.check(last, last + INTERVAL * 2);
        assert_eq!(supervisor.state(), Liveness::TimedOut);
        assert!(supervisor.close());
        assert_eq!(supervisor.state(), Liveness::Closed);
    }
}
