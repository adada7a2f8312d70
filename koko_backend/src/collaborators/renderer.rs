use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::Renderer;

/// Shared cancellation flag. Cloned into whatever raises the stop (Ctrl-C
/// handler, UI, tests) and polled by the renderer.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Eye animation parameters for one emotion label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeStyle {
    /// Eye height as a fraction of the display height.
    pub height: f32,
    /// Degrees; mirrored for the right eye.
    pub tilt: f32,
    pub color: (u8, u8, u8),
    /// Blinks per second scale, 0.0 for steady eyes.
    pub blink: f32,
    pub brightness: f32,
}

impl EyeStyle {
    pub fn for_label(label: &str) -> Self {
        match label {
            "happy" => Self::new(0.45, 0.0, (0, 255, 180), 0.0, 1.0),
            "sad" => Self::new(0.25, 10.0, (100, 150, 255), 0.0, 0.6),
            "angry" => Self::new(0.55, -10.0, (255, 60, 60), 0.5, 1.0),
            "surprise" => Self::new(0.6, 0.0, (255, 255, 100), 0.0, 1.0),
            "fear" => Self::new(0.3, 0.0, (200, 100, 255), 0.0, 0.7),
            _ => Self::new(0.4, 0.0, (180, 180, 255), 0.0, 0.8),
        }
    }

    const fn new(height: f32, tilt: f32, color: (u8, u8, u8), blink: f32, brightness: f32) -> Self {
        Self {
            height,
            tilt,
            color,
            blink,
            brightness,
        }
    }

    /// Color after brightness scaling.
    pub fn lit_color(&self) -> (u8, u8, u8) {
        let scale = |c: u8| (c as f32 * self.brightness).round().clamp(0.0, 255.0) as u8;
        (scale(self.color.0), scale(self.color.1), scale(self.color.2))
    }

    /// How open the eyes are at `t` seconds, in `[0.2, 1.0]` while blinking.
    pub fn openness(&self, t: f32) -> f32 {
        if self.blink > 0.0 {
            (t * self.blink * 5.0).sin().abs().max(0.2)
        } else {
            1.0
        }
    }
}

/// Renderer for runs without a display: tracks the current eye style,
/// counts frames and reports the stop flag.
pub struct HeadlessRenderer {
    stop: StopFlag,
    label: String,
    style: EyeStyle,
    frames: u64,
    started: Instant,
}

impl HeadlessRenderer {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            stop,
            label: "neutral".to_string(),
            style: EyeStyle::for_label("neutral"),
            frames: 0,
            started: Instant::now(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn style(&self) -> EyeStyle {
        self.style
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl Renderer for HeadlessRenderer {
    async fn show(&mut self, label: &str) {
        if label == self.label {
            return;
        }
        self.label = label.to_string();
        self.style = EyeStyle::for_label(label);
        tracing::info!(
            "Eyes -> {} (height {:.2}, tilt {:+.0}, color {:?})",
            label,
            self.style.height,
            self.style.tilt,
            self.style.lit_color()
        );
    }

    async fn tick(&mut self, fps: u32) {
        self.frames += 1;
        if fps > 0 && self.frames % u64::from(fps) == 0 {
            let t = self.started.elapsed().as_secs_f32();
            tracing::trace!(
                "Frame {} ({}), openness {:.2}",
                self.frames,
                self.label,
                self.style.openness(t)
            );
        }
    }

    async fn poll_stop_signal(&mut self) -> bool {
        self.stop.is_set()
    }

    async fn shutdown(&mut self) {
        tracing::info!("Renderer shut down after {} frame(s)", self.frames);
    }
}
