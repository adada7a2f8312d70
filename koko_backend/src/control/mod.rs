//! The perceive -> act -> re-perceive -> learn -> persist turn loop.

pub mod wait;

use chrono::{DateTime, Utc};
use flume::Sender;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::ActionCatalog;
use crate::collaborators::{Actuator, EmotionClassifier, EmotionReading, Renderer};
use crate::config::ControllerConfig;
use crate::error::Fault;
use crate::feedback::FeedbackLearner;
use crate::profile::{ensure_profile, ProfileMap, ProfileStore};
use crate::recommender::Recommender;

pub use wait::{cooperative_wait, WaitOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Idle,
    PerceivingBefore,
    Dispatching,
    WaitingAfterAction,
    PerceivingAfter,
    Learning,
    Persisting,
    WaitingNextTurn,
    Stopped,
}

/// Everything that happened in one completed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRecord {
    pub turn_id: String,
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub before: EmotionReading,
    pub action: String,
    pub assets: Vec<String>,
    pub after: EmotionReading,
    pub feedback: f64,
}

#[derive(Debug, Clone)]
pub enum ControlEvent {
    StateChanged(ControlState),
    TurnCompleted(TurnRecord),
    Fault(Fault),
    Stopped { turns: u64 },
}

/// Timing and subject settings the loop runs with.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub subject_id: String,
    pub after_action_wait: Duration,
    pub inter_turn_wait: Duration,
    pub fps: u32,
    pub max_turns: Option<u64>,
}

impl LoopSettings {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            subject_id: config.subject_id.clone(),
            after_action_wait: config.after_action_wait(),
            inter_turn_wait: config.inter_turn_wait(),
            fps: config.fps.max(1),
            max_turns: config.iterations,
        }
    }
}

pub struct Collaborators {
    pub classifier: Box<dyn EmotionClassifier>,
    pub renderer: Box<dyn Renderer>,
    pub actuator: Box<dyn Actuator>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub completed_turns: u64,
    pub profiles: ProfileMap,
}

enum TurnOutcome {
    Completed,
    Cancelled,
}

/// Half of a turn that has been dispatched but not yet measured.
struct PendingTurn {
    turn_id: String,
    started_at: DateTime<Utc>,
    before: EmotionReading,
    action: String,
    assets: Vec<String>,
}

pub struct ControlLoop {
    settings: LoopSettings,
    catalog: Arc<ActionCatalog>,
    store: ProfileStore,
    profiles: ProfileMap,
    classifier: Box<dyn EmotionClassifier>,
    renderer: Box<dyn Renderer>,
    actuator: Box<dyn Actuator>,
    event_tx: Option<Sender<ControlEvent>>,
    state: ControlState,
    completed_turns: u64,
}

impl ControlLoop {
    /// Loads profiles from `store` and makes sure the tracked subject has one.
    pub fn new(
        settings: LoopSettings,
        catalog: Arc<ActionCatalog>,
        store: ProfileStore,
        collaborators: Collaborators,
    ) -> Self {
        let mut profiles = store.load();
        ensure_profile(&mut profiles, &settings.subject_id);

        Self {
            settings,
            catalog,
            store,
            profiles,
            classifier: collaborators.classifier,
            renderer: collaborators.renderer,
            actuator: collaborators.actuator,
            event_tx: None,
            state: ControlState::Idle,
            completed_turns: 0,
        }
    }

    pub fn with_events(mut self, event_tx: Sender<ControlEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn profiles(&self) -> &ProfileMap {
        &self.profiles
    }

    /// Run turns until the stop signal or the turn cap, then shut down.
    pub async fn run(mut self) -> RunSummary {
        tracing::info!(
            "Control loop starting for '{}' (classifier: {}, after-action {:?}, next-turn {:?}, {} fps)",
            self.settings.subject_id,
            self.classifier.name(),
            self.settings.after_action_wait,
            self.settings.inter_turn_wait,
            self.settings.fps
        );
        self.set_state(ControlState::Idle);

        loop {
            if self.cap_reached() {
                tracing::info!("Reached turn cap of {}", self.completed_turns);
                break;
            }
            if self.renderer.poll_stop_signal().await {
                tracing::info!("Stop requested before turn {}", self.completed_turns + 1);
                break;
            }

            if let TurnOutcome::Cancelled = self.run_turn().await {
                break;
            }
            if self.cap_reached() {
                continue;
            }

            self.set_state(ControlState::WaitingNextTurn);
            if self.wait(self.settings.inter_turn_wait).await.is_stopped() {
                tracing::info!("Stop requested between turns");
                break;
            }
        }

        self.shutdown().await
    }

    fn cap_reached(&self) -> bool {
        self.settings
            .max_turns
            .is_some_and(|cap| self.completed_turns >= cap)
    }

    async fn run_turn(&mut self) -> TurnOutcome {
        let number = self.completed_turns + 1;

        self.set_state(ControlState::PerceivingBefore);
        let before = self.perceive().await;
        tracing::info!(
            "Turn {}: emotion {} (conf {:.2})",
            number,
            before.label,
            before.confidence
        );

        self.set_state(ControlState::Dispatching);
        let pending = self.dispatch(before).await;

        self.set_state(ControlState::WaitingAfterAction);
        if self.wait(self.settings.after_action_wait).await.is_stopped() {
            tracing::info!(
                "Stop requested after dispatching '{}'; turn {} not scored",
                pending.action,
                number
            );
            return TurnOutcome::Cancelled;
        }

        self.set_state(ControlState::PerceivingAfter);
        let after = self.perceive().await;

        self.set_state(ControlState::Learning);
        let profile = ensure_profile(&mut self.profiles, &self.settings.subject_id);
        let feedback = FeedbackLearner::new(&self.catalog).apply_feedback(
            profile,
            &pending.action,
            &pending.before.label,
            &after.label,
        );

        self.set_state(ControlState::Persisting);
        self.persist();

        self.completed_turns = number;
        let record = TurnRecord {
            turn_id: pending.turn_id,
            number,
            started_at: pending.started_at,
            before: pending.before,
            action: pending.action,
            assets: pending.assets,
            after,
            feedback,
        };
        tracing::info!(
            "Turn {}: {} -> {} after '{}' (feedback {:+.1})",
            number,
            record.before.label,
            record.after.label,
            record.action,
            record.feedback
        );
        self.emit(ControlEvent::TurnCompleted(record));
        TurnOutcome::Completed
    }

    /// One classifier call; anything short of a reading becomes the default label.
    async fn perceive(&mut self) -> EmotionReading {
        match self.classifier.detect().await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                tracing::debug!("No subject detected; assuming {}", self.catalog.default_label());
                EmotionReading::fallback(self.catalog.default_label())
            }
            Err(e) => {
                self.report(Fault::perception(format!("{:#}", e)));
                EmotionReading::fallback(self.catalog.default_label())
            }
        }
    }

    async fn dispatch(&mut self, before: EmotionReading) -> PendingTurn {
        let profile = ensure_profile(&mut self.profiles, &self.settings.subject_id);
        let recommender = Recommender::new(&self.catalog);

        if !self.catalog.is_known_label(&before.label) {
            tracing::debug!(
                "Unknown emotion '{}'; ranking {} candidates",
                before.label,
                self.catalog.default_label()
            );
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            let ranking: Vec<String> = recommender
                .score_candidates(profile, &before.label)
                .iter()
                .map(|scored| format!("{}={:.2}", scored.action, scored.score))
                .collect();
            tracing::debug!("Ranking for {}: [{}]", before.label, ranking.join(", "));
        }

        let action = recommender
            .recommend(profile, &before.label, 1)
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                tracing::warn!(
                    "No candidates for '{}'; using idle action",
                    before.label
                );
                self.catalog.idle_action().to_string()
            });
        let assets = self.catalog.assets_for(&action);

        self.renderer.show(&before.label).await;
        if let Err(e) = self.actuator.dispatch(&action, &assets).await {
            self.report(Fault::actuation(format!("{:#}", e)));
        }
        tracing::info!("Action: {} {:?}", action, assets);

        PendingTurn {
            turn_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            before,
            action,
            assets,
        }
    }

    async fn wait(&mut self, duration: Duration) -> WaitOutcome {
        cooperative_wait(self.renderer.as_mut(), duration, self.settings.fps).await
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.profiles) {
            self.report(Fault::persistence(format!("{:#}", e)));
        }
    }

    async fn shutdown(mut self) -> RunSummary {
        self.set_state(ControlState::Stopped);
        tracing::info!(
            "Stopping after {} completed turn(s); saving profiles",
            self.completed_turns
        );
        self.persist();
        self.actuator.shutdown().await;
        self.renderer.shutdown().await;
        self.emit(ControlEvent::Stopped {
            turns: self.completed_turns,
        });

        RunSummary {
            completed_turns: self.completed_turns,
            profiles: self.profiles,
        }
    }

    fn set_state(&mut self, state: ControlState) {
        self.state = state;
        tracing::trace!("State -> {:?}", state);
        self.emit(ControlEvent::StateChanged(state));
    }

    fn report(&self, fault: Fault) {
        fault.log();
        self.emit(ControlEvent::Fault(fault));
    }

    fn emit(&self, event: ControlEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}
