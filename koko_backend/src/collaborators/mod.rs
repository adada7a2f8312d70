//! Capability interfaces for the controller's external collaborators.
//!
//! The control loop only ever talks to these traits. Concrete backends live
//! in the submodules; tests substitute their own.

pub mod actuator;
pub mod classifier;
pub mod renderer;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use actuator::{command_for, connect_actuator, LineActuator, SimulatedActuator};
pub use classifier::{HttpClassifier, ScriptedClassifier};
pub use renderer::{EyeStyle, HeadlessRenderer, StopFlag};

/// One classifier output: an emotion label and its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub label: String,
    pub confidence: f32,
}

impl EmotionReading {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Reading substituted when nothing usable was perceived.
    pub fn fallback(default_label: &str) -> Self {
        Self::new(default_label, 0.0)
    }
}

#[async_trait]
pub trait EmotionClassifier: Send {
    fn name(&self) -> &str;

    /// Capture and classify one sample. `Ok(None)` means no subject was found.
    async fn detect(&mut self) -> Result<Option<EmotionReading>>;
}

#[async_trait]
pub trait Renderer: Send {
    /// Advisory: the renderer may ignore labels it has no style for.
    async fn show(&mut self, label: &str);

    /// Advance and redraw one frame at the given frame rate.
    async fn tick(&mut self, fps: u32);

    async fn poll_stop_signal(&mut self) -> bool;

    async fn shutdown(&mut self);
}

#[async_trait]
pub trait Actuator: Send {
    /// Fire-and-forget send of an action and its assets. Must return within
    /// a short bounded time; completion of the behavior is not awaited.
    async fn dispatch(&mut self, action: &str, assets: &[String]) -> Result<()>;

    async fn shutdown(&mut self);
}
