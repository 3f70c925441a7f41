//! Reconciliation of viewer control state against server snapshots.
//!
//! Every user action is applied to the visible [`ControlState`] immediately,
//! registered as an [`Intent`](crate::Intent) and transmitted. Incoming snapshot
//! control fields only reach the visible state when no intent is outstanding
//! for that dimension, or when they match the outstanding target (which
//! confirms it). Anything else is a snapshot produced before the server saw the
//! command and is dropped.

use std::fmt;

use sim_proto::{decode_snapshot_json, ClientMessage, Snapshot};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::ViewerConfig;
use crate::debounce::Debouncer;
use crate::intent::{ControlDimension, IntentSlot, IntentTracker};
use crate::retry::RetryScheduler;
use crate::snapshot_buffer::SnapshotBuffer;
use crate::viewport::ViewportNegotiator;

/// Control values as the UI should display them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub paused: bool,
    pub molecule_limit: u32,
    /// A pause or resume command is awaiting confirmation.
    pub paused_in_flight: bool,
    /// A cap change is being debounced or awaiting confirmation.
    pub molecule_limit_in_flight: bool,
}

/// What happened to one control field of an incoming snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// No intent outstanding; the server value was taken as is.
    Applied,
    /// The value matched the outstanding intent, which is now cleared.
    Confirmed,
    /// Stale value discarded while a different target is in flight.
    Suppressed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub paused: Option<Reconciliation>,
    pub molecule_limit: Option<Reconciliation>,
}

/// Inputs the viewer UI feeds into the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    TogglePause,
    Pause,
    Resume,
    Reset {
        molecule_limit: Option<u32>,
        seed: Option<u64>,
    },
    /// Absolute cap value from a continuous gesture.
    SetMoleculeLimit(u32),
    /// Move the cap by a number of configured steps.
    NudgeMoleculeLimit(i32),
    Resize {
        width: u32,
        height: u32,
    },
    Shutdown,
}

pub struct ReconciliationController {
    paused: bool,
    molecule_limit: u32,
    intents: IntentTracker,
    retry: RetryScheduler,
    limit_debounce: Debouncer<u32>,
    viewport: ViewportNegotiator,
    buffer: SnapshotBuffer,
    outbox: Vec<ClientMessage>,
    limit_step: u32,
    max_limit: u32,
}

impl ReconciliationController {
    pub fn new(config: &ViewerConfig, buffer: SnapshotBuffer) -> Self {
        Self {
            paused: false,
            molecule_limit: config.clamp_molecule_limit(config.initial_molecule_limit),
            intents: IntentTracker::default(),
            retry: RetryScheduler::new(config.retry_policy()),
            limit_debounce: Debouncer::new(config.debounce()),
            viewport: ViewportNegotiator::new(config.draw_radius_px),
            buffer,
            outbox: Vec::new(),
            limit_step: config.molecule_limit_step.max(1),
            max_limit: config.max_molecule_limit.max(1),
        }
    }

    pub fn state(&self) -> ControlState {
        ControlState {
            paused: self.paused,
            molecule_limit: self.molecule_limit,
            paused_in_flight: self.intents.is_pending(ControlDimension::Paused),
            molecule_limit_in_flight: self.intents.is_pending(ControlDimension::MoleculeLimit)
                || self.limit_debounce.is_pending(),
        }
    }

    pub fn intents(&self) -> &IntentTracker {
        &self.intents
    }

    pub fn retry(&self) -> &RetryScheduler {
        &self.retry
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    /// Drain the messages queued for the channel, oldest first.
    pub fn take_outbound(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Decode and apply one inbound frame. Malformed frames change nothing.
    pub fn handle_frame(&mut self, text: &str) -> Option<SnapshotOutcome> {
        match decode_snapshot_json(text) {
            Ok(snapshot) => Some(self.apply_snapshot(snapshot)),
            Err(err) => {
                debug!(target: "petri::viewer", error = %err, "frame.malformed");
                None
            }
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> SnapshotOutcome {
        let outcome = SnapshotOutcome {
            paused: snapshot.paused.map(|value| self.apply_paused(value)),
            molecule_limit: snapshot
                .molecule_limit
                .map(|value| self.apply_molecule_limit(value)),
        };
        trace!(
            target: "petri::viewer",
            timestep = snapshot.timestep,
            population = snapshot.population(),
            "snapshot.received"
        );
        self.buffer.replace(snapshot);
        outcome
    }

    pub fn apply_paused(&mut self, server_value: bool) -> Reconciliation {
        reconcile(
            ControlDimension::Paused,
            &mut self.paused,
            &mut self.intents.paused,
            &mut self.retry,
            server_value,
        )
    }

    /// While a gesture is being debounced the visible cap belongs to the
    /// gesture, but a value matching the already-sent intent still confirms it.
    pub fn apply_molecule_limit(&mut self, server_value: u32) -> Reconciliation {
        if self.limit_debounce.is_pending() {
            let matches_intent = self
                .intents
                .molecule_limit
                .get()
                .is_some_and(|intent| intent.target == server_value);
            if matches_intent {
                self.intents.molecule_limit.clear();
                self.retry.cancel(ControlDimension::MoleculeLimit);
                debug!(
                    target: "petri::control",
                    value = server_value,
                    "intent.confirmed=debouncing"
                );
                return Reconciliation::Confirmed;
            }
            trace!(
                target: "petri::control",
                server_value,
                "molecule_limit.suppressed=debouncing"
            );
            return Reconciliation::Suppressed;
        }
        reconcile(
            ControlDimension::MoleculeLimit,
            &mut self.molecule_limit,
            &mut self.intents.molecule_limit,
            &mut self.retry,
            server_value,
        )
    }

    pub fn issue_paused(&mut self, target: bool, now: Instant) {
        issue(
            ControlDimension::Paused,
            &mut self.paused,
            &mut self.intents.paused,
            target,
        );
        self.transmit_intent(ControlDimension::Paused);
        self.retry.arm(ControlDimension::Paused, now);
    }

    pub fn issue_molecule_limit(&mut self, target: u32, now: Instant) {
        let target = target.clamp(1, self.max_limit);
        issue(
            ControlDimension::MoleculeLimit,
            &mut self.molecule_limit,
            &mut self.intents.molecule_limit,
            target,
        );
        self.transmit_intent(ControlDimension::MoleculeLimit);
        self.retry.arm(ControlDimension::MoleculeLimit, now);
    }

    pub fn toggle_pause(&mut self, now: Instant) {
        self.issue_paused(!self.paused, now);
    }

    pub fn pause(&mut self, now: Instant) {
        self.issue_paused(true, now);
    }

    pub fn resume(&mut self, now: Instant) {
        self.issue_paused(false, now);
    }

    /// One step of a continuous cap gesture: shown at once, sent after the
    /// gesture has been quiet for the debounce period.
    pub fn adjust_molecule_limit(&mut self, value: u32, now: Instant) {
        let value = value.clamp(1, self.max_limit);
        self.molecule_limit = value;
        self.limit_debounce.push(value, now);
    }

    pub fn nudge_molecule_limit(&mut self, steps: i32, now: Instant) {
        let delta = i64::from(steps) * i64::from(self.limit_step);
        let next = (i64::from(self.molecule_limit) + delta).clamp(1, i64::from(self.max_limit));
        self.adjust_molecule_limit(next as u32, now);
    }

    /// Reset is fire-and-forget; nothing is tracked for it.
    pub fn reset(&mut self, molecule_limit: Option<u32>, seed: Option<u64>) {
        info!(target: "petri::control", ?molecule_limit, ?seed, "reset.requested");
        self.outbox.push(ClientMessage::Reset {
            molecule_limit: molecule_limit.map(|value| value.clamp(1, self.max_limit)),
            spawn_rate: None,
            variation: None,
            seed,
        });
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(report) = self.viewport.resize(width, height) {
            debug!(target: "petri::viewer", width, height, "viewport.changed");
            self.outbox.push(report);
        }
    }

    pub fn on_connect(&mut self) {
        if let Some(report) = self.viewport.on_connect() {
            self.outbox.push(report);
        }
    }

    /// Channel teardown: nothing in flight survives a reconnect.
    pub fn on_disconnect(&mut self) {
        self.retry.cancel_all();
        self.intents.clear_all();
        if let Some(value) = self.limit_debounce.cancel() {
            debug!(target: "petri::control", value, "molecule_limit.debounce_dropped");
        }
        let dropped = self.outbox.len();
        self.outbox.clear();
        debug!(target: "petri::control", dropped, "intents.cleared=disconnect");
    }

    pub fn apply_action(&mut self, action: UserAction, now: Instant) {
        match action {
            UserAction::TogglePause => self.toggle_pause(now),
            UserAction::Pause => self.pause(now),
            UserAction::Resume => self.resume(now),
            UserAction::Reset {
                molecule_limit,
                seed,
            } => self.reset(molecule_limit, seed),
            UserAction::SetMoleculeLimit(value) => self.adjust_molecule_limit(value, now),
            UserAction::NudgeMoleculeLimit(steps) => self.nudge_molecule_limit(steps, now),
            UserAction::Resize { width, height } => self.resize(width, height),
            UserAction::Shutdown => {}
        }
    }

    /// Earliest retry or debounce deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.retry.next_deadline(), self.limit_debounce.deadline()) {
            (Some(retry), Some(debounce)) => Some(retry.min(debounce)),
            (retry, debounce) => retry.or(debounce),
        }
    }

    /// Fire every timer due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        for dimension in self.retry.take_due(now) {
            self.retry_due(dimension, now);
        }
        if let Some(value) = self.limit_debounce.take_due(now) {
            self.issue_molecule_limit(value, now);
        }
    }

    fn retry_due(&mut self, dimension: ControlDimension, now: Instant) {
        let Some(attempts) = self.intents.attempts(dimension) else {
            return;
        };
        if !self.retry.may_retry(attempts) {
            debug!(
                target: "petri::control",
                %dimension,
                attempts,
                "intent.exhausted"
            );
            return;
        }
        let attempt = match dimension {
            ControlDimension::Paused => self.intents.paused.record_attempt(),
            ControlDimension::MoleculeLimit => self.intents.molecule_limit.record_attempt(),
        };
        trace!(target: "petri::control", %dimension, ?attempt, "intent.retry");
        self.transmit_intent(dimension);
        self.retry.arm(dimension, now);
    }

    fn transmit_intent(&mut self, dimension: ControlDimension) {
        let command = match dimension {
            ControlDimension::Paused => self.intents.paused.get().map(|intent| {
                if intent.target {
                    ClientMessage::Pause
                } else {
                    ClientMessage::Resume
                }
            }),
            ControlDimension::MoleculeLimit => self
                .intents
                .molecule_limit
                .get()
                .map(|intent| ClientMessage::SetMoleculeLimit {
                    value: intent.target,
                }),
        };
        if let Some(command) = command {
            self.outbox.push(command);
        }
    }
}

fn reconcile<T>(
    dimension: ControlDimension,
    visible: &mut T,
    slot: &mut IntentSlot<T>,
    retry: &mut RetryScheduler,
    server_value: T,
) -> Reconciliation
where
    T: Copy + PartialEq + fmt::Debug,
{
    match slot.get().copied() {
        None => {
            *visible = server_value;
            Reconciliation::Applied
        }
        Some(intent) if intent.target == server_value => {
            *visible = server_value;
            slot.clear();
            retry.cancel(dimension);
            debug!(
                target: "petri::control",
                %dimension,
                value = ?server_value,
                attempts = intent.attempts,
                "intent.confirmed"
            );
            Reconciliation::Confirmed
        }
        Some(intent) => {
            trace!(
                target: "petri::control",
                %dimension,
                stale = ?server_value,
                pending = ?intent.target,
                "snapshot.suppressed"
            );
            Reconciliation::Suppressed
        }
    }
}

fn issue<T>(dimension: ControlDimension, visible: &mut T, slot: &mut IntentSlot<T>, target: T)
where
    T: Copy + PartialEq + fmt::Debug,
{
    *visible = target;
    if let Some(abandoned) = slot.set(target) {
        debug!(
            target: "petri::control",
            %dimension,
            abandoned = ?abandoned.target,
            "intent.superseded"
        );
    }
    info!(target: "petri::control", %dimension, value = ?target, "intent.issued");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn controller() -> ReconciliationController {
        ReconciliationController::new(&ViewerConfig::default(), SnapshotBuffer::new())
    }

    fn frame(timestep: u64, paused: Option<bool>, molecule_limit: Option<u32>) -> String {
        let snapshot = Snapshot {
            timestep,
            molecules: Vec::new(),
            paused,
            molecule_limit,
        };
        sim_proto::encode_snapshot_json(&snapshot).unwrap()
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn server_value_applies_without_pending_intent() {
        for prior in [false, true] {
            for reported in [false, true] {
                let mut controller = controller();
                controller.handle_frame(&frame(1, Some(prior), None));
                let outcome = controller
                    .handle_frame(&frame(2, Some(reported), None))
                    .expect("valid frame");
                assert_eq!(outcome.paused, Some(Reconciliation::Applied));
                assert_eq!(controller.state().paused, reported);
            }
        }
    }

    #[test]
    fn stale_snapshot_does_not_flicker() {
        let start = Instant::now();
        let mut controller = controller();
        controller.pause(start);
        let outcome = controller
            .handle_frame(&frame(1, Some(false), None))
            .expect("valid frame");
        assert_eq!(outcome.paused, Some(Reconciliation::Suppressed));
        assert!(controller.state().paused);
        assert!(controller.state().paused_in_flight);
    }

    #[test]
    fn confirmation_stops_retransmission() {
        let start = Instant::now();
        let mut controller = controller();
        controller.pause(start);
        assert_eq!(controller.take_outbound(), vec![ClientMessage::Pause]);

        let outcome = controller.apply_paused(true);
        assert_eq!(outcome, Reconciliation::Confirmed);
        assert!(!controller.retry().is_armed(ControlDimension::Paused));
        assert_eq!(controller.next_deadline(), None);

        controller.poll_timers(start + Duration::from_secs(10));
        assert!(controller.take_outbound().is_empty());
    }

    #[test]
    fn retries_stop_after_five_retransmissions() {
        let start = Instant::now();
        let mut controller = controller();
        controller.issue_molecule_limit(400, start);
        let mut sent_at = vec![start; controller.take_outbound().len()];

        while let Some(deadline) = controller.next_deadline() {
            controller.poll_timers(deadline);
            for message in controller.take_outbound() {
                assert_eq!(message, ClientMessage::SetMoleculeLimit { value: 400 });
                sent_at.push(deadline);
            }
        }

        assert_eq!(sent_at.len(), 6);
        for (index, at) in sent_at.iter().enumerate() {
            assert_eq!(*at, start + ms(250 * index as u64));
        }
        assert_eq!(
            controller.intents().attempts(ControlDimension::MoleculeLimit),
            Some(5)
        );
        assert_eq!(controller.state().molecule_limit, 400);
    }

    #[test]
    fn exhausted_intent_keeps_optimistic_value() {
        let start = Instant::now();
        let mut controller = controller();
        controller.pause(start);
        while let Some(deadline) = controller.next_deadline() {
            controller.poll_timers(deadline);
        }
        assert_eq!(
            controller.apply_paused(false),
            Reconciliation::Suppressed
        );
        assert!(controller.state().paused);
        assert_eq!(controller.apply_paused(true), Reconciliation::Confirmed);
        assert_eq!(controller.apply_paused(false), Reconciliation::Applied);
        assert!(!controller.state().paused);
    }

    #[test]
    fn gesture_collapses_into_one_command() {
        let start = Instant::now();
        let mut controller = controller();
        let values = [1010u32, 1020, 1030, 1040, 1050, 1060, 1070];
        for (step, value) in values.iter().enumerate() {
            let now = start + ms(40 * step as u64);
            controller.poll_timers(now);
            controller.adjust_molecule_limit(*value, now);
            assert_eq!(controller.state().molecule_limit, *value);
            assert!(controller.take_outbound().is_empty());
            assert!(!controller.intents().is_pending(ControlDimension::MoleculeLimit));
        }
        let last = start + ms(40 * (values.len() as u64 - 1));
        controller.poll_timers(last + ms(300));
        assert_eq!(
            controller.take_outbound(),
            vec![ClientMessage::SetMoleculeLimit { value: 1070 }]
        );
        assert!(controller.intents().molecule_limit().matches(1070));
    }

    #[test]
    fn pause_toggle_scenario() {
        let start = Instant::now();
        let mut controller = controller();
        assert!(!controller.state().paused);

        controller.toggle_pause(start);
        assert!(controller.state().paused);
        assert_eq!(controller.take_outbound(), vec![ClientMessage::Pause]);

        controller.handle_frame(&frame(10, Some(false), None));
        assert!(controller.state().paused);

        let outcome = controller.handle_frame(&frame(11, Some(true), None)).unwrap();
        assert_eq!(outcome.paused, Some(Reconciliation::Confirmed));
        controller.poll_timers(start + Duration::from_secs(5));
        assert!(controller.take_outbound().is_empty());

        let outcome = controller.handle_frame(&frame(12, Some(false), None)).unwrap();
        assert_eq!(outcome.paused, Some(Reconciliation::Applied));
        assert!(!controller.state().paused);
    }

    #[test]
    fn slider_scenario_sends_final_value_once() {
        let start = Instant::now();
        let mut controller = controller();
        assert_eq!(controller.state().molecule_limit, 1000);

        for step in 1..=5u64 {
            let now = start + ms(25 * (step - 1));
            controller.poll_timers(now);
            controller.adjust_molecule_limit(1000 + 100 * step as u32, now);
        }
        let last_step = start + ms(100);
        assert_eq!(controller.next_deadline(), Some(last_step + ms(300)));

        controller.poll_timers(last_step + ms(299));
        assert!(controller.take_outbound().is_empty());
        controller.poll_timers(last_step + ms(300));
        assert_eq!(
            controller.take_outbound(),
            vec![ClientMessage::SetMoleculeLimit { value: 1500 }]
        );
    }

    #[test]
    fn limit_snapshots_suppressed_while_debouncing() {
        let start = Instant::now();
        let mut controller = controller();
        controller.adjust_molecule_limit(1500, start);
        assert_eq!(
            controller.apply_molecule_limit(1000),
            Reconciliation::Suppressed
        );
        assert_eq!(controller.state().molecule_limit, 1500);
        assert!(controller.state().molecule_limit_in_flight);
    }

    #[test]
    fn confirmation_during_debounce_stops_retransmission() {
        let start = Instant::now();
        let mut controller = controller();
        controller.issue_molecule_limit(400, start);
        controller.take_outbound();
        controller.adjust_molecule_limit(500, start + ms(100));

        assert_eq!(
            controller.apply_molecule_limit(400),
            Reconciliation::Confirmed
        );
        assert!(!controller.intents().is_pending(ControlDimension::MoleculeLimit));
        assert!(!controller.retry().is_armed(ControlDimension::MoleculeLimit));
        assert_eq!(controller.state().molecule_limit, 500);
        assert!(controller.state().molecule_limit_in_flight);

        controller.poll_timers(start + ms(250));
        assert!(controller.take_outbound().is_empty());

        controller.poll_timers(start + ms(400));
        assert_eq!(
            controller.take_outbound(),
            vec![ClientMessage::SetMoleculeLimit { value: 500 }]
        );
    }

    #[test]
    fn newer_intent_abandons_older_target() {
        let start = Instant::now();
        let mut controller = controller();
        controller.toggle_pause(start);
        controller.toggle_pause(start + ms(10));
        assert_eq!(
            controller.take_outbound(),
            vec![ClientMessage::Pause, ClientMessage::Resume]
        );
        assert!(!controller.state().paused);
        assert_eq!(controller.apply_paused(true), Reconciliation::Suppressed);
        assert!(!controller.state().paused);
        assert_eq!(controller.apply_paused(false), Reconciliation::Confirmed);
        assert_eq!(controller.retry().next_deadline(), None);
    }

    #[test]
    fn malformed_frames_change_nothing() {
        let start = Instant::now();
        let mut controller = controller();
        controller.handle_frame(&frame(4, Some(false), Some(700)));
        controller.pause(start);
        let before = controller.state();

        assert!(controller.handle_frame("{not json").is_none());
        assert!(controller.handle_frame(r#"{"timestep":5}"#).is_none());
        assert!(controller
            .handle_frame(r#"{"timestep":5,"molecules":[],"molecule_limit":0}"#)
            .is_none());

        assert_eq!(controller.state(), before);
        assert_eq!(controller.buffer().timestep(), Some(4));
    }

    #[test]
    fn disconnect_clears_everything_in_flight() {
        let start = Instant::now();
        let mut controller = controller();
        controller.pause(start);
        controller.issue_molecule_limit(300, start);
        controller.adjust_molecule_limit(350, start + ms(5));
        controller.on_disconnect();

        assert!(!controller.intents().any_pending());
        assert_eq!(controller.next_deadline(), None);
        assert!(controller.take_outbound().is_empty());

        controller.handle_frame(&frame(0, Some(false), Some(1000)));
        let state = controller.state();
        assert!(!state.paused);
        assert_eq!(state.molecule_limit, 1000);
        assert!(!state.paused_in_flight);
        assert!(!state.molecule_limit_in_flight);
    }

    #[test]
    fn viewport_is_reported_on_resize_and_connect() {
        let mut controller = controller();
        controller.on_connect();
        assert!(controller.take_outbound().is_empty());

        controller.resize(320, 200);
        controller.resize(320, 200);
        let expected = ClientMessage::Viewport {
            width: 320,
            height: 200,
            radius_px: 3,
        };
        assert_eq!(controller.take_outbound(), vec![expected.clone()]);

        controller.on_connect();
        assert_eq!(controller.take_outbound(), vec![expected]);
    }

    #[test]
    fn reset_is_not_tracked() {
        let mut controller = controller();
        controller.reset(None, Some(11));
        assert_eq!(
            controller.take_outbound(),
            vec![ClientMessage::Reset {
                molecule_limit: None,
                spawn_rate: None,
                variation: None,
                seed: Some(11),
            }]
        );
        assert!(!controller.intents().any_pending());
        assert_eq!(controller.next_deadline(), None);
    }

    #[test]
    fn nudges_are_clamped_and_debounced() {
        let start = Instant::now();
        let mut controller = controller();
        controller.apply_action(UserAction::NudgeMoleculeLimit(-20), start);
        assert_eq!(controller.state().molecule_limit, 1);
        controller.apply_action(UserAction::NudgeMoleculeLimit(3), start + ms(10));
        assert_eq!(controller.state().molecule_limit, 301);
        controller.poll_timers(start + ms(310));
        assert_eq!(
            controller.take_outbound(),
            vec![ClientMessage::SetMoleculeLimit { value: 301 }]
        );
    }
}
