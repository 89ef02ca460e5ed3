//! SLA countdown classification and the periodic refresh that runs while a
//! countdown is on screen.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Remaining time under which an active countdown is flagged critical.
pub const CRITICAL_WINDOW_MINUTES: i64 = 60;

pub const DEFAULT_REFRESH: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlaState {
    Normal,
    CriticalSoon,
    Overdue,
}

/// Remaining (or, when overdue, elapsed) time until an SLA deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaCountdown {
    pub state: SlaState,
    pub hours: i64,
    pub minutes: i64,
}

impl SlaCountdown {
    pub fn compute(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let delta = deadline - now;
        let state = if delta < Duration::zero() {
            SlaState::Overdue
        } else if delta < Duration::minutes(CRITICAL_WINDOW_MINUTES) {
            SlaState::CriticalSoon
        } else {
            SlaState::Normal
        };
        let magnitude = if delta < Duration::zero() { -delta } else { delta };
        Self {
            state,
            hours: magnitude.num_hours(),
            minutes: magnitude.num_minutes() % 60,
        }
    }

    pub fn is_overdue(&self) -> bool {
        self.state == SlaState::Overdue
    }

    pub fn describe(&self) -> String {
        match self.state {
            SlaState::Overdue => format!("Overdue by {}h {}m", self.hours, self.minutes),
            SlaState::CriticalSoon | SlaState::Normal => {
                format!("{}h {}m remaining", self.hours, self.minutes)
            }
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self.state {
            SlaState::Overdue => "sla-overdue",
            SlaState::CriticalSoon => "sla-critical",
            SlaState::Normal => "sla-normal",
        }
    }
}

/// Recomputes a countdown on a fixed period and publishes it on a watch channel.
///
/// The background task is aborted when the ticker is dropped, so no update is
/// published after teardown.
#[derive(Debug)]
pub struct SlaTicker {
    handle: JoinHandle<()>,
    updates: watch::Receiver<SlaCountdown>,
}

impl SlaTicker {
    /// Must be called from within a tokio runtime.
    pub fn start(deadline: DateTime<Utc>, period: StdDuration) -> Self {
        let period = period.max(StdDuration::from_millis(1));
        let (tx, rx) = watch::channel(SlaCountdown::compute(deadline, Utc::now()));
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(SlaCountdown::compute(deadline, Utc::now())).is_err() {
                    break;
                }
            }
        });
        debug!(%deadline, ?period, "sla ticker started");
        Self {
            handle,
            updates: rx,
        }
    }

    pub fn current(&self) -> SlaCountdown {
        *self.updates.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SlaCountdown> {
        self.updates.clone()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SlaTicker {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("sla ticker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn thirty_minutes_left_is_critical() {
        let c = SlaCountdown::compute(now() + Duration::minutes(30), now());
        assert_eq!(c.state, SlaState::CriticalSoon);
        assert_eq!((c.hours, c.minutes), (0, 30));
        assert_eq!(c.describe(), "0h 30m remaining");
    }

    #[test]
    fn five_minutes_past_is_overdue_with_elapsed_magnitude() {
        let c = SlaCountdown::compute(now() - Duration::minutes(5), now());
        assert!(c.is_overdue());
        assert_eq!((c.hours, c.minutes), (0, 5));
        assert_eq!(c.describe(), "Overdue by 0h 5m");
        assert_eq!(c.css_class(), "sla-overdue");
    }

    #[test]
    fn three_hours_left_is_normal() {
        let c = SlaCountdown::compute(now() + Duration::hours(3), now());
        assert_eq!(c.state, SlaState::Normal);
        assert_eq!(c.describe(), "3h 0m remaining");
    }

    #[test]
    fn window_boundaries() {
        assert_eq!(
            SlaCountdown::compute(now(), now()).state,
            SlaState::CriticalSoon
        );
        assert_eq!(
            SlaCountdown::compute(now() + Duration::hours(1), now()).state,
            SlaState::Normal
        );
        let c = SlaCountdown::compute(now() - Duration::minutes(125), now());
        assert_eq!((c.hours, c.minutes), (2, 5));
    }

    #[tokio::test]
    async fn ticker_publishes_until_dropped() {
        let deadline = Utc::now() + Duration::hours(2);
        let ticker = SlaTicker::start(deadline, StdDuration::from_millis(10));
        assert_eq!(ticker.current().state, SlaState::Normal);

        let mut rx = ticker.subscribe();
        for _ in 0..2 {
            tokio::time::timeout(StdDuration::from_secs(2), rx.changed())
                .await
                .expect("tick within timeout")
                .expect("ticker still running");
        }

        ticker.stop();
        loop {
            match tokio::time::timeout(StdDuration::from_secs(2), rx.changed()).await {
                Ok(Err(_)) => break,
                Ok(Ok(())) => continue,
                Err(_) => panic!("ticker kept its sender alive after stop"),
            }
        }
    }
}
