use std::sync::Arc;

use anyhow::{Context, Result};
use flume::Sender;
use tokio::runtime::{Handle, Runtime};

use crate::catalog::ActionCatalog;
use crate::collaborators::{
    connect_actuator, Actuator, EmotionClassifier, HeadlessRenderer, HttpClassifier, Renderer,
    ScriptedClassifier, StopFlag,
};
use crate::config::ControllerConfig;
use crate::control::{Collaborators, ControlEvent, ControlLoop, LoopSettings, RunSummary};
use crate::error::Fault;
use crate::profile::ProfileStore;

pub struct ControllerRuntime {
    pub config: ControllerConfig,
    pub catalog: Arc<ActionCatalog>,
    stop: StopFlag,
    rt: Runtime,
    control: ControlLoop,
}

pub struct ControllerRuntimeBuilder {
    config: ControllerConfig,
    event_tx: Sender<ControlEvent>,
    catalog: Option<ActionCatalog>,
    stop: StopFlag,
    classifier: Option<Box<dyn EmotionClassifier>>,
    renderer: Option<Box<dyn Renderer>>,
    actuator: Option<Box<dyn Actuator>>,
}

impl ControllerRuntimeBuilder {
    pub fn new(config: ControllerConfig, event_tx: Sender<ControlEvent>) -> Self {
        Self {
            config,
            event_tx,
            catalog: None,
            stop: StopFlag::new(),
            classifier: None,
            renderer: None,
            actuator: None,
        }
    }

    pub fn with_catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Share an existing stop flag with the default headless renderer.
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn EmotionClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// A custom renderer owns its own stop signal; [`ControllerRuntime::stop_flag`]
    /// then has no effect on the loop.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_actuator(mut self, actuator: Box<dyn Actuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn build(self) -> Result<ControllerRuntime> {
        let config = self.config;
        let rt = Runtime::new().context("Failed to start controller runtime")?;

        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => build_classifier(&config)?,
        };
        tracing::info!("Emotion classifier: {}", classifier.name());

        let actuator = match self.actuator {
            Some(actuator) => actuator,
            None => rt.block_on(connect_actuator(
                config.actuator_addr.as_deref(),
                config.actuator_timeout(),
            )),
        };

        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => Box::new(HeadlessRenderer::new(self.stop.clone())),
        };

        let catalog = Arc::new(self.catalog.unwrap_or_default());
        let store = ProfileStore::new(&config.profile_path);

        let control = ControlLoop::new(
            LoopSettings::from_config(&config),
            catalog.clone(),
            store,
            Collaborators {
                classifier,
                renderer,
                actuator,
            },
        )
        .with_events(self.event_tx);

        Ok(ControllerRuntime {
            config,
            catalog,
            stop: self.stop,
            rt,
            control,
        })
    }
}

impl ControllerRuntime {
    pub fn bootstrap(config: ControllerConfig, event_tx: Sender<ControlEvent>) -> Result<Self> {
        ControllerRuntimeBuilder::new(config, event_tx).build()
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Handle for spawning side tasks (signal listeners) next to the loop.
    pub fn handle(&self) -> Handle {
        self.rt.handle().clone()
    }

    /// Run the control loop to completion on this thread.
    pub fn run(self) -> RunSummary {
        let Self { rt, control, .. } = self;
        rt.block_on(control.run())
    }
}

/// HTTP classifier when a URL is configured, otherwise the replay script.
/// Having neither is the one fault that prevents startup.
fn build_classifier(config: &ControllerConfig) -> Result<Box<dyn EmotionClassifier>> {
    if let Some(url) = config
        .classifier_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        let classifier = HttpClassifier::new(url, config.classifier_timeout())
            .map_err(|e| Fault::startup(format!("{:#}", e)))?;
        return Ok(Box::new(classifier));
    }

    let scripted = ScriptedClassifier::from_script(&config.classifier_script);
    if scripted.is_empty() {
        return Err(Fault::startup(
            "no classifier URL configured and the classifier script is empty",
        )
        .into());
    }
    tracing::info!(
        "No classifier URL configured; replaying a {}-step script",
        scripted.len()
    );
    Ok(Box::new(scripted))
}
