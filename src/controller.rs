//! Controller: the one object that owns the panel's mutable state
//!
//! Every front end (REPL, keyboard bindings, gamepad) funnels logical commands
//! through [`CommandIssuer::issue`]. A command is encoded, written once, logged
//! and, only if the write succeeded, shown to the run timer.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::input::{BindingTable, GamepadPoller, GamepadSnapshot, GamepadTransition, InputArbitrator, InputId};
use crate::logger::EventLogger;
use crate::protocol::{CommandEncoder, LogicalCommand};
use crate::session::{SessionError, TransportSession};
use crate::timer::{RunTimer, TimerEvent};
use crate::transport::LinkEvent;

/// Result of issuing one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    Sent,
    NotConnected,
    Failed,
}

/// Single entry point for UI bindings
#[async_trait]
pub trait CommandIssuer {
    async fn issue(&mut self, command: LogicalCommand) -> IssueOutcome;
}

pub struct Controller {
    session: TransportSession,
    encoder: CommandEncoder,
    arbitrator: InputArbitrator,
    timer: RunTimer,
    poller: GamepadPoller,
    logger: Arc<dyn EventLogger>,
}

impl Controller {
    pub fn new(session: TransportSession, config: &AppConfig, logger: Arc<dyn EventLogger>) -> Self {
        Self {
            session,
            encoder: config.encoder(),
            arbitrator: InputArbitrator::new(BindingTable::from_config(
                &config.keyboard,
                &config.gamepad,
            )),
            timer: RunTimer::new(),
            poller: GamepadPoller::new(config.gamepad.axis_threshold),
            logger,
        }
    }

    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TransportSession {
        &mut self.session
    }

    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    pub fn arbitrator(&self) -> &InputArbitrator {
        &self.arbitrator
    }

    pub fn timer(&self) -> &RunTimer {
        &self.timer
    }

    pub fn logger(&self) -> &Arc<dyn EventLogger> {
        &self.logger
    }

    /// Rounded last run, offered as the auto-cycle seconds default
    pub fn default_cycle_seconds(&self) -> Option<u64> {
        self.timer.default_cycle_seconds()
    }

    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.session.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.session.disconnect().await
    }

    /// Connect control: connects when disconnected, disconnects when connected
    pub async fn toggle_connection(&mut self) -> Result<(), SessionError> {
        if self.session.is_connected() {
            self.disconnect().await
        } else {
            self.connect().await
        }
    }

    pub async fn handle_transport_event(&mut self, event: LinkEvent) {
        self.session.on_event(event).await;
    }

    /// Input went down; issues the bound command on a fresh press only
    pub async fn press(&mut self, input: &InputId) -> Option<IssueOutcome> {
        let command = self.arbitrator.activate(input)?;
        debug!("{} pressed -> {}", input, command);
        Some(self.issue(command).await)
    }

    /// Input went up; issues the stop of a held continuous binding
    pub async fn release(&mut self, input: &InputId) -> Option<IssueOutcome> {
        let command = self.arbitrator.deactivate(input)?;
        debug!("{} released -> {}", input, command);
        Some(self.issue(command).await)
    }

    /// Press immediately followed by release (pointer click, REPL `tap`)
    pub async fn tap(&mut self, input: &InputId) -> Vec<IssueOutcome> {
        let mut outcomes = Vec::new();
        outcomes.extend(self.press(input).await);
        outcomes.extend(self.release(input).await);
        outcomes
    }

    pub fn gamepad_present(&self) -> bool {
        self.poller.is_present()
    }

    /// Feed one gamepad poll result (`None` when no pad is connected)
    pub async fn on_gamepad_snapshot(&mut self, snapshot: Option<&GamepadSnapshot>) -> Vec<IssueOutcome> {
        let was_present = self.poller.is_present();
        let transitions = self.poller.update(snapshot);
        if was_present && !self.poller.is_present() {
            self.logger.log("gamepad disconnected", false);
        } else if !was_present && self.poller.is_present() {
            self.logger.log("gamepad connected", false);
        }

        let mut outcomes = Vec::new();
        for transition in transitions {
            let outcome = match &transition {
                GamepadTransition::Pressed(id) => self.press(id).await,
                GamepadTransition::Released(id) => self.release(id).await,
            };
            outcomes.extend(outcome);
        }

        // Anything still held from a pad that vanished must not stay latched
        if !self.poller.is_present() {
            for command in self.arbitrator.release_all(InputId::is_gamepad) {
                outcomes.push(self.issue(command).await);
            }
        }
        outcomes
    }

    /// Apply a reloaded configuration; the link settings take effect on the next connect
    pub fn apply_config(&mut self, config: &AppConfig) {
        self.encoder = config.encoder();
        self.arbitrator
            .set_bindings(BindingTable::from_config(&config.keyboard, &config.gamepad));
        self.poller.set_threshold(config.gamepad.axis_threshold);
        self.session
            .set_link_settings(config.gatt_profile(), config.scan_filter());
        info!(
            "Configuration applied ({} bindings)",
            self.arbitrator.bindings().len()
        );
    }

    fn observe_timer(&mut self, command: &LogicalCommand) {
        let Some(event) = self.timer.observe(command) else {
            return;
        };
        let message = match event {
            TimerEvent::Started => "timer started".to_string(),
            TimerEvent::Restarted => "direction changed, timer reset".to_string(),
            TimerEvent::Stopped(measurement) => format!(
                "run time {}s (auto-cycle default {}s)",
                measurement.display(),
                measurement.rounded_secs()
            ),
        };
        self.logger.log(&message, false);
    }
}

#[async_trait]
impl CommandIssuer for Controller {
    async fn issue(&mut self, command: LogicalCommand) -> IssueOutcome {
        let payload = self.encoder.encode(&command);
        match self.session.send(&payload).await {
            Ok(()) => {
                self.logger
                    .log(&format!("-> sent: {}", self.encoder.display(&command)), false);
                self.observe_timer(&command);
                IssueOutcome::Sent
            }
            Err(SessionError::SendFailedNotConnected) => IssueOutcome::NotConnected,
            Err(_) => IssueOutcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLogger;
    use crate::protocol::Seconds;
    use crate::timer::TimerPhase;
    use crate::transport::{GattProfile, ScanFilter, SimFailure, SimulatedRig};

    fn make_controller(rig: &SimulatedRig, config: &AppConfig) -> (Controller, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        let session = TransportSession::new(
            Arc::new(rig.clone()),
            GattProfile::default(),
            ScanFilter::default(),
            logger.clone(),
        );
        (Controller::new(session, config, logger.clone()), logger)
    }

    #[tokio::test]
    async fn test_hold_ascend_sends_start_and_stop() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        let up = InputId::key("8");
        assert_eq!(controller.press(&up).await, Some(IssueOutcome::Sent));
        // Auto-repeat while held
        assert_eq!(controller.press(&up).await, None);
        assert_eq!(controller.press(&up).await, None);
        assert_eq!(controller.release(&up).await, Some(IssueOutcome::Sent));

        assert_eq!(rig.written(), vec![b"11\0".to_vec(), b"10\0".to_vec()]);
        assert!(logger.contains("-> sent: 11"));
        assert!(logger.contains("-> sent: 10"));
    }

    #[tokio::test]
    async fn test_not_connected_sends_nothing() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, logger) = make_controller(&rig, &AppConfig::default());

        let outcome = controller.issue(LogicalCommand::Forward).await;

        assert_eq!(outcome, IssueOutcome::NotConnected);
        assert!(rig.written().is_empty());
        assert_eq!(logger.errors().len(), 1);
        assert_eq!(controller.timer().phase(), TimerPhase::Idle);
    }

    #[tokio::test]
    async fn test_timer_follows_sent_commands() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        controller.issue(LogicalCommand::Forward).await;
        assert!(logger.contains("timer started"));
        controller.issue(LogicalCommand::Back).await;
        assert!(logger.contains("direction changed, timer reset"));
        controller.issue(LogicalCommand::FullStop).await;

        assert_eq!(controller.timer().phase(), TimerPhase::Idle);
        assert!(controller.default_cycle_seconds().is_some());
        assert!(logger.contains("run time "));
    }

    #[tokio::test]
    async fn test_failed_write_does_not_start_timer() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        rig.fail_at(SimFailure::Write);
        assert_eq!(controller.issue(LogicalCommand::Forward).await, IssueOutcome::Failed);
        assert_eq!(controller.timer().phase(), TimerPhase::Idle);
    }

    #[tokio::test]
    async fn test_upper_casing_applies_to_parameterized_commands() {
        let rig = SimulatedRig::new("RigSim");
        let mut config = AppConfig::default();
        config.protocol.casing = crate::protocol::Casing::Upper;
        let (mut controller, _logger) = make_controller(&rig, &config);
        controller.connect().await.unwrap();

        controller
            .issue(LogicalCommand::TimedDescent { seconds: Seconds::from_millis(500) })
            .await;
        assert_eq!(rig.written(), vec![b"DOWS0.5S\0".to_vec()]);
    }

    #[tokio::test]
    async fn test_gamepad_hold_and_disappear() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        let held = GamepadSnapshot::default().with_button("dpad.down", true);
        for _ in 0..3 {
            controller.on_gamepad_snapshot(Some(&held)).await;
        }
        assert!(controller.gamepad_present());
        assert_eq!(rig.written(), vec![b"12\0".to_vec()]);

        let outcomes = controller.on_gamepad_snapshot(None).await;
        assert_eq!(outcomes, vec![IssueOutcome::Sent]);
        assert_eq!(rig.written(), vec![b"12\0".to_vec(), b"10\0".to_vec()]);
        assert_eq!(controller.arbitrator().held_count(), 0);
        assert!(logger.contains("gamepad disconnected"));
    }

    #[tokio::test]
    async fn test_stick_drives_vertical_axis() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        let up = GamepadSnapshot::default().with_axis("ly", 0.9);
        let centered = GamepadSnapshot::default().with_axis("ly", 0.0);
        controller.on_gamepad_snapshot(Some(&up)).await;
        controller.on_gamepad_snapshot(Some(&up)).await;
        controller.on_gamepad_snapshot(Some(&centered)).await;

        assert_eq!(rig.written(), vec![b"11\0".to_vec(), b"10\0".to_vec()]);
    }

    #[tokio::test]
    async fn test_tap_momentary_key() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        let outcomes = controller.tap(&InputId::key("0")).await;
        assert_eq!(outcomes, vec![IssueOutcome::Sent]);
        assert_eq!(rig.written(), vec![b"99\0".to_vec()]);
    }

    #[tokio::test]
    async fn test_reload_keeps_held_release() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig, &AppConfig::default());
        controller.connect().await.unwrap();

        let key = InputId::key("2");
        controller.press(&key).await;

        let mut config = AppConfig::default();
        config.keyboard.bindings.clear();
        controller.apply_config(&config);

        assert_eq!(controller.release(&key).await, Some(IssueOutcome::Sent));
        assert_eq!(controller.press(&key).await, None);
        assert_eq!(rig.written(), vec![b"12\0".to_vec(), b"10\0".to_vec()]);
    }

    #[tokio::test]
    async fn test_toggle_connection() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig, &AppConfig::default());

        controller.toggle_connection().await.unwrap();
        assert!(controller.session().is_connected());
        controller.toggle_connection().await.unwrap();
        assert!(!controller.session().is_connected());
    }
}
