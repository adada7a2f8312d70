use anyhow::{Context, Result};
use flume::unbounded;
use koko_backend::{ControlEvent, ControllerConfig, ControllerRuntime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,koko=debug,koko_backend=debug")),
        )
        .init();

    tracing::info!("KOKO controller starting...");

    let config = ControllerConfig::load();
    let (event_tx, event_rx) = unbounded();
    let runtime = ControllerRuntime::bootstrap(config, event_tx)
        .context("failed to bootstrap controller runtime")?;
    let subject_id = runtime.config.subject_id.clone();

    let stop = runtime.stop_flag();
    runtime.handle().spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, stopping");
                stop.trigger();
            }
            Err(e) => tracing::warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    let events = std::thread::spawn(move || {
        for event in event_rx.iter() {
            match event {
                ControlEvent::TurnCompleted(record) => tracing::debug!(
                    "[{}] turn {} at {}: {} -> {} via {} ({:+.1})",
                    record.turn_id,
                    record.number,
                    record.started_at.format("%H:%M:%S"),
                    record.before.label,
                    record.after.label,
                    record.action,
                    record.feedback
                ),
                ControlEvent::Stopped { turns } => {
                    tracing::debug!("Loop reported stop after {} turn(s)", turns);
                    break;
                }
                ControlEvent::StateChanged(_) | ControlEvent::Fault(_) => {}
            }
        }
    });

    let summary = runtime.run();
    if events.join().is_err() {
        tracing::warn!("Event logger thread panicked");
    }

    tracing::info!("Controller stopped after {} turn(s)", summary.completed_turns);
    if let Some(profile) = summary.profiles.get(&subject_id) {
        for (action, score) in &profile.rec_scores {
            tracing::info!("  {}: {:+.2}", action, score);
        }
    }
    Ok(())
}
