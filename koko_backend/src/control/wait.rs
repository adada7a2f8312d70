use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use crate::collaborators::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed { ticks: u64 },
    Stopped { ticks: u64 },
}

impl WaitOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, WaitOutcome::Stopped { .. })
    }

    pub fn ticks(&self) -> u64 {
        match self {
            WaitOutcome::Elapsed { ticks } | WaitOutcome::Stopped { ticks } => *ticks,
        }
    }
}

/// Holds for `duration` while driving the renderer at `fps`.
///
/// Frames are scheduled against absolute deadlines, so the wait never
/// ticks more than `ceil(duration * fps)` times. The stop signal is polled
/// before every frame; a stop ends the wait at most one tick late.
pub async fn cooperative_wait(
    renderer: &mut dyn Renderer,
    duration: Duration,
    fps: u32,
) -> WaitOutcome {
    let fps = fps.max(1);
    let frame = Duration::from_secs_f64(1.0 / f64::from(fps));
    let start = Instant::now();
    // `None`: the deadline is beyond what the clock can represent, so only
    // a stop ends the wait.
    let deadline = start.checked_add(duration);
    let mut ticks: u64 = 0;

    loop {
        if renderer.poll_stop_signal().await {
            return WaitOutcome::Stopped { ticks };
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return WaitOutcome::Elapsed { ticks };
        }

        renderer.tick(fps).await;
        ticks += 1;

        let next_frame = start + frame.mul_f64(ticks as f64);
        let wake = match deadline {
            Some(deadline) => next_frame.min(deadline),
            None => next_frame,
        };
        sleep_until(wake).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StopFlag;
    use async_trait::async_trait;
    use std::time::Instant as StdInstant;

    struct CountingRenderer {
        ticks: u64,
        stop_after: Option<u64>,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn show(&mut self, _label: &str) {}

        async fn tick(&mut self, _fps: u32) {
            self.ticks += 1;
        }

        async fn poll_stop_signal(&mut self) -> bool {
            self.stop_after.is_some_and(|limit| self.ticks >= limit)
        }

        async fn shutdown(&mut self) {}
    }

    #[tokio::test]
    async fn wait_runs_for_the_full_duration() {
        let mut renderer = CountingRenderer {
            ticks: 0,
            stop_after: None,
        };
        let started = StdInstant::now();
        let outcome = cooperative_wait(&mut renderer, Duration::from_millis(200), 50).await;

        assert!(!outcome.is_stopped());
        assert!(started.elapsed() >= Duration::from_millis(200));
        // 200ms at 50fps is 10 frames.
        assert!(outcome.ticks() <= 10, "ticks = {}", outcome.ticks());
        assert!(outcome.ticks() >= 1);
        assert_eq!(outcome.ticks(), renderer.ticks);
    }

    #[tokio::test]
    async fn stop_signal_cuts_the_wait_short() {
        let mut renderer = CountingRenderer {
            ticks: 0,
            stop_after: Some(3),
        };
        let started = StdInstant::now();
        let outcome = cooperative_wait(&mut renderer, Duration::from_secs(10), 20).await;

        assert_eq!(outcome, WaitOutcome::Stopped { ticks: 3 });
        // Three 50ms frames, nowhere near the 10s duration.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    struct FlagRenderer {
        stop: StopFlag,
    }

    #[async_trait]
    impl Renderer for FlagRenderer {
        async fn show(&mut self, _label: &str) {}

        async fn tick(&mut self, _fps: u32) {}

        async fn poll_stop_signal(&mut self) -> bool {
            self.stop.is_set()
        }

        async fn shutdown(&mut self) {}
    }

    #[tokio::test]
    async fn stop_is_observed_within_one_frame() {
        let fps = 20;
        let frame = Duration::from_millis(50);
        let stop = StopFlag::new();
        let mut renderer = FlagRenderer { stop: stop.clone() };

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            stop.trigger();
            StdInstant::now()
        });

        let outcome = cooperative_wait(&mut renderer, Duration::from_secs(30), fps).await;
        let returned = StdInstant::now();
        let triggered = trigger.await.expect("trigger task");

        assert!(outcome.is_stopped());
        let overshoot = returned.saturating_duration_since(triggered);
        // One frame plus a little scheduler jitter.
        assert!(
            overshoot <= frame + Duration::from_millis(20),
            "overshoot {:?}",
            overshoot
        );
    }

    #[tokio::test]
    async fn unrepresentable_deadline_waits_for_stop() {
        let mut renderer = CountingRenderer {
            ticks: 0,
            stop_after: Some(2),
        };
        let outcome = cooperative_wait(&mut renderer, Duration::MAX, 100).await;
        assert_eq!(outcome, WaitOutcome::Stopped { ticks: 2 });
    }

    #[tokio::test]
    async fn zero_duration_returns_without_ticking() {
        let mut renderer = CountingRenderer {
            ticks: 0,
            stop_after: None,
        };
        let outcome = cooperative_wait(&mut renderer, Duration::ZERO, 30).await;
        assert_eq!(outcome, WaitOutcome::Elapsed { ticks: 0 });
    }

    #[tokio::test]
    async fn pending_stop_wins_over_elapsed() {
        let mut renderer = CountingRenderer {
            ticks: 0,
            stop_after: Some(0),
        };
        let outcome = cooperative_wait(&mut renderer, Duration::ZERO, 30).await;
        assert!(outcome.is_stopped());
    }
}
