//! Run timer
//!
//! Measures how long the carriage travels between a movement-start command
//! (forward/back) and a full stop. The rounded measurement is offered as the
//! default duration of auto-cycle commands; the timer itself never sends
//! anything.

use std::time::{Duration, Instant};

use crate::protocol::LogicalCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
}

/// One completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub elapsed: Duration,
}

impl Measurement {
    /// Seconds with two decimals, for display
    pub fn display(&self) -> String {
        let centis = (self.elapsed.as_millis() + 5) / 10;
        format!("{}.{:02}", centis / 100, centis % 100)
    }

    /// Whole seconds, rounded half up, for reuse as a default
    pub fn rounded_secs(&self) -> u64 {
        ((self.elapsed.as_millis() + 500) / 1000) as u64
    }
}

/// Transition reported back to the caller for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started,
    /// Direction changed while running; the measurement restarts
    Restarted,
    Stopped(Measurement),
}

#[derive(Debug, Default)]
pub struct RunTimer {
    started_at: Option<Instant>,
    last: Option<Measurement>,
}

impl RunTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TimerPhase {
        if self.started_at.is_some() {
            TimerPhase::Running
        } else {
            TimerPhase::Idle
        }
    }

    pub fn observe(&mut self, command: &LogicalCommand) -> Option<TimerEvent> {
        self.observe_at(command, Instant::now())
    }

    pub fn observe_at(&mut self, command: &LogicalCommand, now: Instant) -> Option<TimerEvent> {
        if command.is_movement_start() {
            let was_running = self.started_at.replace(now).is_some();
            return Some(if was_running {
                TimerEvent::Restarted
            } else {
                TimerEvent::Started
            });
        }

        if command.is_full_stop() {
            let start = self.started_at.take()?;
            let measurement = Measurement {
                elapsed: now.saturating_duration_since(start),
            };
            self.last = Some(measurement);
            return Some(TimerEvent::Stopped(measurement));
        }

        None
    }

    pub fn last_measurement(&self) -> Option<Measurement> {
        self.last
    }

    /// Pre-fill value for the auto-cycle seconds field
    pub fn default_cycle_seconds(&self) -> Option<u64> {
        self.last.map(|m| m.rounded_secs())
    }

    /// Elapsed time of the current run, if any
    pub fn running_for(&self, now: Instant) -> Option<Duration> {
        self.started_at.map(|start| now.saturating_duration_since(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_stop_measures() {
        let mut timer = RunTimer::new();
        let t0 = Instant::now();

        assert_eq!(timer.observe_at(&LogicalCommand::Forward, t0), Some(TimerEvent::Started));
        assert_eq!(timer.phase(), TimerPhase::Running);

        let event = timer.observe_at(&LogicalCommand::FullStop, t0 + Duration::from_millis(2500));
        let Some(TimerEvent::Stopped(m)) = event else {
            panic!("expected a measurement, got {:?}", event);
        };
        assert_eq!(m.display(), "2.50");
        assert_eq!(m.rounded_secs(), 3);
        assert_eq!(timer.default_cycle_seconds(), Some(3));
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_direction_change_restarts() {
        let mut timer = RunTimer::new();
        let t0 = Instant::now();

        timer.observe_at(&LogicalCommand::Forward, t0);
        assert_eq!(
            timer.observe_at(&LogicalCommand::Back, t0 + Duration::from_secs(4)),
            Some(TimerEvent::Restarted)
        );
        assert_eq!(timer.last_measurement(), None);

        let event = timer.observe_at(&LogicalCommand::FullStop, t0 + Duration::from_millis(5240));
        assert_eq!(
            event,
            Some(TimerEvent::Stopped(Measurement { elapsed: Duration::from_millis(1240) }))
        );
        assert_eq!(timer.default_cycle_seconds(), Some(1));
    }

    #[test]
    fn test_stop_while_idle_and_other_commands_are_ignored() {
        let mut timer = RunTimer::new();
        let t0 = Instant::now();

        assert_eq!(timer.observe_at(&LogicalCommand::FullStop, t0), None);
        assert_eq!(timer.observe_at(&LogicalCommand::Ascend, t0), None);
        timer.observe_at(&LogicalCommand::Forward, t0);
        // Emergency and axis stops do not end the measurement
        assert_eq!(timer.observe_at(&LogicalCommand::EmergencyStop, t0), None);
        assert_eq!(timer.observe_at(&LogicalCommand::AxisStop, t0), None);
        assert_eq!(timer.phase(), TimerPhase::Running);
        assert_eq!(
            timer.running_for(t0 + Duration::from_secs(1)),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_rounding_is_half_up() {
        let m = |ms| Measurement { elapsed: Duration::from_millis(ms) };
        assert_eq!(m(1499).rounded_secs(), 1);
        assert_eq!(m(1500).rounded_secs(), 2);
        assert_eq!(m(1234).display(), "1.23");
        assert_eq!(m(1235).display(), "1.24");
        assert_eq!(m(0).display(), "0.00");
    }
}
