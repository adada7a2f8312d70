use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::catalog::PreferenceCategory;
use crate::error::Fault;

pub const SCORE_MIN: f64 = -3.0;
pub const SCORE_MAX: f64 = 5.0;
pub const DEFAULT_SUBJECT_ID: &str = "child_001";

/// Subject id -> profile, ordered so the persisted file diffs cleanly.
pub type ProfileMap = BTreeMap<String, Profile>;

pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(SCORE_MIN, SCORE_MAX)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, deserialize_with = "lenient")]
    pub music: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub videos: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub movement: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Preferences {
    pub fn all() -> Self {
        Self {
            music: true,
            videos: true,
            movement: true,
            extra: Map::new(),
        }
    }

    pub fn enabled(&self, category: PreferenceCategory) -> bool {
        match category {
            PreferenceCategory::Music => self.music,
            PreferenceCategory::Videos => self.videos,
            PreferenceCategory::Movement => self.movement,
        }
    }
}

/// Per-subject state. Fields this version doesn't know about land in
/// `extra` and are written back untouched; known fields holding a value of
/// the wrong type fall back to their default instead of failing the record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_age")]
    pub age: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub prefs: Preferences,
    #[serde(default, deserialize_with = "lenient")]
    pub fav_music: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fav_videos: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub movement_pref: String,
    /// Learned score per action key, always within `[SCORE_MIN, SCORE_MAX]`.
    #[serde(default, deserialize_with = "lenient_scores")]
    pub rec_scores: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// Fresh profile for a subject seen for the first time.
    pub fn seeded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefs: Preferences::all(),
            movement_pref: "gentle_spin".to_string(),
            ..Default::default()
        }
    }

    pub fn learned_score(&self, action: &str) -> f64 {
        self.rec_scores.get(action).copied().unwrap_or(0.0)
    }

    /// Pull any hand-edited out-of-range scores back into bounds.
    /// Returns how many entries changed.
    fn sanitize_scores(&mut self) -> usize {
        let mut fixed = 0;
        for score in self.rec_scores.values_mut() {
            let clamped = clamp_score(*score);
            if clamped != *score {
                *score = clamped;
                fixed += 1;
            }
        }
        fixed
    }
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value.clone()).unwrap_or_else(|_| {
        tracing::warn!("Ignoring malformed profile value {}", value);
        T::default()
    }))
}

/// Whole years; fractional ages are truncated, anything else reads as 0.
fn lenient_age<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let age = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|years| years.is_finite() && *years >= 0.0)
            .map(|years| years as u64)
    });
    match age {
        Some(age) => Ok(u32::try_from(age).unwrap_or(u32::MAX)),
        None => {
            if !value.is_null() {
                tracing::warn!("Ignoring malformed profile age {}", value);
            }
            Ok(0)
        }
    }
}

/// Keeps every numeric entry; non-numeric scores are dropped one by one.
fn lenient_scores<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(action, score)| match score.as_f64() {
            Some(score) => Some((action, score)),
            None => {
                tracing::warn!("Dropping non-numeric score {} for '{}'", score, action);
                None
            }
        })
        .collect())
}

pub fn default_profiles() -> ProfileMap {
    let mut profiles = ProfileMap::new();
    profiles.insert(
        DEFAULT_SUBJECT_ID.to_string(),
        Profile {
            name: "Arya".to_string(),
            age: 9,
            prefs: Preferences::all(),
            fav_music: vec!["soft_piano.mp3".to_string()],
            fav_videos: vec!["cartoon_clip_1.mp4".to_string()],
            movement_pref: "gentle_spin".to_string(),
            rec_scores: BTreeMap::new(),
            extra: Map::new(),
        },
    );
    profiles
}

/// Returns the subject's profile, inserting a seeded one if it is missing.
pub fn ensure_profile<'a>(profiles: &'a mut ProfileMap, subject_id: &str) -> &'a mut Profile {
    profiles.entry(subject_id.to_string()).or_insert_with(|| {
        tracing::info!("Creating profile for new subject '{}'", subject_id);
        Profile::seeded(subject_id)
    })
}

/// JSON-file profile store. Writes go to a sibling `.tmp` file and are
/// renamed into place, so a crash leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all profiles. Never fails: a missing or unparsable store is
    /// replaced by the default set, which is persisted straight away.
    pub fn load(&self) -> ProfileMap {
        match self.try_load() {
            Ok(Some(profiles)) => {
                tracing::info!("Loaded {} profile(s) from {:?}", profiles.len(), self.path);
                return profiles;
            }
            Ok(None) => {
                tracing::info!("No profile store at {:?}; creating defaults", self.path);
            }
            Err(e) => {
                Fault::persistence(format!("{:#}; falling back to default profiles", e)).log();
                self.preserve_unreadable();
            }
        }

        let defaults = default_profiles();
        if let Err(e) = self.save(&defaults) {
            Fault::persistence(format!("{:#}", e)).log();
        }
        defaults
    }

    fn try_load(&self) -> Result<Option<ProfileMap>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {:?}", self.path));
            }
        };

        let records: Map<String, Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;

        let mut profiles = ProfileMap::new();
        for (id, record) in records {
            let mut profile: Profile = match serde_json::from_value(record) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!("Skipping unreadable profile '{}': {}", id, e);
                    continue;
                }
            };
            let fixed = profile.sanitize_scores();
            if fixed > 0 {
                tracing::warn!(
                    "Clamped {} out-of-range learned score(s) for '{}'",
                    fixed,
                    id
                );
            }
            profiles.insert(id, profile);
        }
        Ok(Some(profiles))
    }

    /// Keep a copy of a store we could not parse before defaults overwrite it.
    fn preserve_unreadable(&self) {
        let backup = self.sibling(".corrupt");
        match fs::copy(&self.path, &backup) {
            Ok(_) => tracing::warn!("Kept unreadable profile store as {:?}", backup),
            Err(e) => tracing::debug!("No copy of unreadable store made: {}", e),
        }
    }

    pub fn save(&self, profiles: &ProfileMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }

        let json =
            serde_json::to_string_pretty(profiles).context("Failed to serialize profiles")?;
        let tmp_path = self.sibling(".tmp");
        let mut tmp = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {:?}", tmp_path))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.sync_all())
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        tracing::debug!("Saved {} profile(s) to {:?}", profiles.len(), self.path);
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }
}
