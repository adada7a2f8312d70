use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::Actuator;

/// Firmware command line for an action key. Keys without a dedicated
/// command are sent as `ACTION <key>`.
pub fn command_for(action: &str) -> String {
    let command = match action {
        "gentle_forward" => "MOVE FORWARD SLOW",
        "gentle_spin" => "SPIN LEFT SLOW",
        "dance_move" | "dance_pattern" => "DANCE SIMPLE",
        "quick_spin" => "SPIN RIGHT FAST",
        "slow_back" | "retreat_slow" => "MOVE BACK SLOW",
        "idle_patrol" => "PATROL",
        "celebrate" | "celebrate_pattern" => "DANCE CELEBRATE",
        "show_surprised_eyes" => "POSE SURPRISE",
        "play_cheer_music" => "PLAY_MUSIC cheer1.mp3",
        "comfort_video" => "PLAY_VIDEO comfort_clip.mp4",
        "soothing_audio" => "PLAY_AUDIO sooth.mp3",
        "parent_notify" => "NOTIFY PARENT",
        _ => return format!("ACTION {}", action),
    };
    command.to_string()
}

/// No hardware attached: commands are only logged.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    sent: u64,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    async fn dispatch(&mut self, action: &str, assets: &[String]) -> Result<()> {
        self.sent += 1;
        tracing::info!(
            "(SIMULATION) CMD -> {} [assets: {}]",
            command_for(action),
            assets.join(", ")
        );
        Ok(())
    }

    async fn shutdown(&mut self) {
        tracing::info!("Simulated actuator closed after {} command(s)", self.sent);
    }
}

/// Newline-terminated command link to the robot's microcontroller, usually
/// a serial port exposed over TCP. Every send is bounded by `io_timeout`;
/// a failed write drops the connection and the next dispatch reconnects.
pub struct LineActuator {
    addr: String,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

impl LineActuator {
    pub async fn connect(addr: &str, io_timeout: Duration) -> Result<Self> {
        let mut actuator = Self {
            addr: addr.to_string(),
            io_timeout,
            stream: None,
        };
        actuator.ensure_connected().await?;
        tracing::info!("Robot link connected at {}", addr);
        Ok(actuator)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn ensure_connected(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let stream = timeout(self.io_timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| anyhow!("Timed out connecting to {}", self.addr))?
                .with_context(|| format!("Failed to connect to {}", self.addr))?;
            stream.set_nodelay(true).ok();
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| anyhow!("Robot link to {} unavailable", self.addr))
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let io_timeout = self.io_timeout;
        let stream = self.ensure_connected().await?;
        let payload = format!("{}\n", line);
        let written = timeout(io_timeout, stream.write_all(payload.as_bytes())).await;
        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stream = None;
                Err(e).context("Robot link write failed")
            }
            Err(_) => {
                self.stream = None;
                Err(anyhow!("Robot link write timed out after {:?}", io_timeout))
            }
        }
    }
}

#[async_trait]
impl Actuator for LineActuator {
    async fn dispatch(&mut self, action: &str, _assets: &[String]) -> Result<()> {
        let command = command_for(action);
        self.send_line(&command)
            .await
            .with_context(|| format!("Could not send '{}' to {}", command, self.addr))?;
        tracing::debug!("CMD -> {}", command);
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Robot link close error: {}", e);
            }
        }
        tracing::info!("Robot link to {} closed", self.addr);
    }
}

/// Actuator for the configured address. No address, or a link that cannot
/// be opened, means simulation: a missing robot never stops the controller.
pub async fn connect_actuator(addr: Option<&str>, io_timeout: Duration) -> Box<dyn Actuator> {
    let Some(addr) = addr.map(str::trim).filter(|a| !a.is_empty()) else {
        tracing::info!("No actuator address configured; running in simulation mode");
        return Box::new(SimulatedActuator::new());
    };

    match LineActuator::connect(addr, io_timeout).await {
        Ok(actuator) => Box::new(actuator),
        Err(e) => {
            tracing::warn!("{:#}; falling back to simulation mode", e);
            Box::new(SimulatedActuator::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn command_mapping() {
        assert_eq!(command_for("gentle_forward"), "MOVE FORWARD SLOW");
        assert_eq!(command_for("play_cheer_music"), "PLAY_MUSIC cheer1.mp3");
        assert_eq!(command_for("retreat_slow"), "MOVE BACK SLOW");
        assert_eq!(command_for("reward_learning"), "ACTION reward_learning");
    }

    #[tokio::test]
    async fn line_actuator_writes_command_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        let reader = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.expect("read line") {
                received.push(line);
            }
            received
        });

        let mut actuator = LineActuator::connect(&addr, Duration::from_secs(2))
            .await
            .expect("connect");
        assert!(actuator.is_connected());
        actuator
            .dispatch("gentle_forward", &["gentle_forward".to_string()])
            .await
            .expect("dispatch");
        actuator
            .dispatch("wave_hello", &["wave_hello".to_string()])
            .await
            .expect("dispatch");
        actuator.shutdown().await;

        let received = reader.await.expect("reader task");
        assert_eq!(received, vec!["MOVE FORWARD SLOW", "ACTION wave_hello"]);
    }

    #[tokio::test]
    async fn unreachable_link_falls_back_to_simulation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let mut actuator = connect_actuator(Some(&addr), Duration::from_millis(500)).await;
        // Simulation accepts every command.
        actuator
            .dispatch("quick_spin", &["quick_spin".to_string()])
            .await
            .expect("simulated dispatch");
    }

    #[tokio::test]
    async fn simulation_counts_commands() {
        let mut actuator = SimulatedActuator::new();
        actuator.dispatch("dance_move", &[]).await.expect("dispatch");
        actuator.dispatch("parent_notify", &[]).await.expect("dispatch");
        assert_eq!(actuator.sent(), 2);
    }

    #[tokio::test]
    async fn blank_address_means_simulation() {
        let mut actuator = connect_actuator(Some("  "), Duration::from_millis(100)).await;
        assert!(actuator.dispatch("celebrate", &[]).await.is_ok());
        actuator.shutdown().await;
    }
}
