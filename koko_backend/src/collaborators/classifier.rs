use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{EmotionClassifier, EmotionReading};
use crate::http_client::build_http_client_with_timeout;

/// Marker used in scripts for "no subject in view".
pub const NO_SUBJECT_MARKER: &str = "-";

/// Replays a fixed sequence of readings, wrapping around at the end.
/// Used for simulation runs where no camera is attached.
pub struct ScriptedClassifier {
    readings: Vec<Option<EmotionReading>>,
    cursor: usize,
}

impl ScriptedClassifier {
    pub fn new(readings: Vec<Option<EmotionReading>>) -> Self {
        Self {
            readings,
            cursor: 0,
        }
    }

    /// Parse a comma separated script such as `"sad,happy:0.8,-"`.
    /// A bare label gets confidence 1.0; `-` is an empty frame.
    pub fn from_script(script: &str) -> Self {
        let readings = script
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                if entry == NO_SUBJECT_MARKER {
                    return None;
                }
                match entry.split_once(':') {
                    Some((label, confidence)) => {
                        let confidence = confidence.trim().parse::<f32>().unwrap_or(1.0);
                        Some(EmotionReading::new(label.trim().to_ascii_lowercase(), confidence))
                    }
                    None => Some(EmotionReading::new(entry.to_ascii_lowercase(), 1.0)),
                }
            })
            .collect();
        Self::new(readings)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[async_trait]
impl EmotionClassifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&mut self) -> Result<Option<EmotionReading>> {
        if self.readings.is_empty() {
            return Ok(None);
        }
        let reading = self.readings[self.cursor % self.readings.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Ok(reading)
    }
}

#[derive(Debug, Default, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<FaceDetection>,
}

#[derive(Debug, Default, Deserialize)]
struct FaceDetection {
    /// `[x, y, width, height]`
    #[serde(rename = "box", default)]
    bounds: Vec<f32>,
    #[serde(default)]
    emotions: HashMap<String, f32>,
}

impl FaceDetection {
    fn area(&self) -> f32 {
        match self.bounds.as_slice() {
            [_, _, w, h, ..] => w * h,
            _ => 0.0,
        }
    }
}

/// Picks the largest face, then that face's strongest emotion.
fn dominant_reading(faces: &[FaceDetection]) -> Option<EmotionReading> {
    let face = faces.iter().max_by(|a, b| a.area().total_cmp(&b.area()))?;
    let (label, score) = face
        .emotions
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
    Some(EmotionReading::new(label.to_ascii_lowercase(), *score))
}

/// Talks to a face-emotion detection service that owns the camera.
///
/// `GET {base_url}/detect` returns
/// `{"faces": [{"box": [x, y, w, h], "emotions": {"happy": 0.91, ...}}]}`.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = reqwest::Url::parse(base_url.trim())
            .with_context(|| format!("Invalid classifier URL '{}'", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("detect")
            .with_context(|| format!("Invalid classifier URL '{}'", base_url))?;
        let client = build_http_client_with_timeout(Some(timeout))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmotionClassifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(&mut self) -> Result<Option<EmotionReading>> {
        let response: DetectResponse = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .with_context(|| format!("Classifier request to {} failed", self.endpoint))?
            .error_for_status()
            .context("Classifier returned an error status")?
            .json()
            .await
            .context("Classifier returned malformed JSON")?;

        Ok(dominant_reading(&response.faces))
    }
}
