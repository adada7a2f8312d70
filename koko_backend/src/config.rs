use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "koko_config.toml";

/// Longest accepted wait; larger values are treated as misconfiguration.
pub const MAX_WAIT_SECS: f64 = 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    // Subject being tracked
    #[serde(default = "default_subject_id")]
    pub subject_id: String,

    // Turn timing
    #[serde(default = "default_after_action_secs", alias = "after_delay")]
    pub after_action_secs: f64,
    #[serde(default = "default_loop_delay_secs", alias = "loop_delay")]
    pub loop_delay_secs: f64,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Stop after this many completed turns; `None` runs until stopped.
    #[serde(default)]
    pub iterations: Option<u64>,

    // Robot link; `None` = simulation only
    #[serde(default, alias = "robot_serial")]
    pub actuator_addr: Option<String>,
    #[serde(default = "default_actuator_timeout_ms")]
    pub actuator_timeout_ms: u64,

    // Emotion classifier
    #[serde(default)]
    pub classifier_url: Option<String>,
    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,
    /// Comma separated labels replayed when no classifier URL is set.
    #[serde(default = "default_classifier_script")]
    pub classifier_script: String,

    // Profile store
    #[serde(default = "default_profile_path")]
    pub profile_path: String,
}

fn default_subject_id() -> String {
    crate::profile::DEFAULT_SUBJECT_ID.to_string()
}

fn default_after_action_secs() -> f64 {
    3.0
}

fn default_loop_delay_secs() -> f64 {
    1.0
}

fn default_fps() -> u32 {
    30
}

fn default_actuator_timeout_ms() -> u64 {
    250
}

fn default_classifier_timeout_secs() -> u64 {
    5
}

fn default_classifier_script() -> String {
    "sad,happy,angry,neutral,fear,surprise,-".to_string()
}

fn default_profile_path() -> String {
    "profiles.json".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            subject_id: default_subject_id(),
            after_action_secs: default_after_action_secs(),
            loop_delay_secs: default_loop_delay_secs(),
            fps: default_fps(),
            iterations: None,
            actuator_addr: None,
            actuator_timeout_ms: default_actuator_timeout_ms(),
            classifier_url: None,
            classifier_timeout_secs: default_classifier_timeout_secs(),
            classifier_script: default_classifier_script(),
            profile_path: default_profile_path(),
        }
    }
}

impl ControllerConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Config file next to the executable.
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Per-user config file (`~/.config/koko/koko_config.toml` on Linux).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("koko").join(CONFIG_FILE_NAME))
    }

    /// Load config from the executable's directory, then the user config
    /// directory, falling back to defaults + environment variables.
    pub fn load() -> Self {
        let candidates = std::iter::once(Self::config_path()).chain(Self::user_config_path());

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("{:#}", e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: ControllerConfig =
            toml::from_str(contents).context("Invalid controller config")?;
        Ok(config.validated())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Save config next to the executable.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Defaults overridden by `KOKO_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(subject) = env::var("KOKO_SUBJECT_ID") {
            if !subject.trim().is_empty() {
                config.subject_id = subject.trim().to_string();
            }
        }

        if let Ok(secs) = env::var("KOKO_AFTER_DELAY_SECS") {
            if let Ok(secs) = secs.parse() {
                config.after_action_secs = secs;
            }
        }

        if let Ok(secs) = env::var("KOKO_LOOP_DELAY_SECS") {
            if let Ok(secs) = secs.parse() {
                config.loop_delay_secs = secs;
            }
        }

        if let Ok(fps) = env::var("KOKO_FPS") {
            if let Ok(fps) = fps.parse() {
                config.fps = fps;
            }
        }

        if let Ok(iterations) = env::var("KOKO_ITERATIONS") {
            if let Ok(iterations) = iterations.parse() {
                config.iterations = Some(iterations);
            }
        }

        if let Ok(addr) = env::var("KOKO_ACTUATOR_ADDR") {
            if !addr.trim().is_empty() {
                config.actuator_addr = Some(addr);
            }
        }

        if let Ok(url) = env::var("KOKO_CLASSIFIER_URL") {
            if !url.trim().is_empty() {
                config.classifier_url = Some(url);
            }
        }

        if let Ok(script) = env::var("KOKO_CLASSIFIER_SCRIPT") {
            config.classifier_script = script;
        }

        if let Ok(path) = env::var("KOKO_PROFILE_PATH") {
            if !path.trim().is_empty() {
                config.profile_path = path;
            }
        }

        config.validated()
    }

    /// Replace values the loop cannot run with.
    pub fn validated(mut self) -> Self {
        if self.fps == 0 {
            tracing::warn!("fps must be at least 1; using 1");
            self.fps = 1;
        }
        if !is_usable_wait(self.after_action_secs) {
            tracing::warn!(
                "Invalid after_action_secs {}; using default",
                self.after_action_secs
            );
            self.after_action_secs = default_after_action_secs();
        }
        if !is_usable_wait(self.loop_delay_secs) {
            tracing::warn!(
                "Invalid loop_delay_secs {}; using default",
                self.loop_delay_secs
            );
            self.loop_delay_secs = default_loop_delay_secs();
        }
        if self.subject_id.trim().is_empty() {
            self.subject_id = default_subject_id();
        }
        self
    }

    pub fn after_action_wait(&self) -> Duration {
        wait_or(self.after_action_secs, default_after_action_secs())
    }

    pub fn inter_turn_wait(&self) -> Duration {
        wait_or(self.loop_delay_secs, default_loop_delay_secs())
    }

    pub fn actuator_timeout(&self) -> Duration {
        Duration::from_millis(self.actuator_timeout_ms)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }
}

fn is_usable_wait(secs: f64) -> bool {
    secs <= MAX_WAIT_SECS && Duration::try_from_secs_f64(secs).is_ok()
}

fn wait_or(secs: f64, fallback: f64) -> Duration {
    let secs = if is_usable_wait(secs) { secs } else { fallback };
    Duration::from_secs_f64(secs)
}
