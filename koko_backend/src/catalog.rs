use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_EMOTION_LABEL: &str = "neutral";
pub const DEFAULT_IDLE_ACTION: &str = "idle_patrol";

/// Preference categories a profile can opt into and an action can satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceCategory {
    Music,
    Videos,
    Movement,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionSpec {
    pub tags: Vec<PreferenceCategory>,
    pub assets: Vec<String>,
}

/// Static emotion -> action table, read-only once built.
///
/// Candidate order is significant: the recommender keeps it for tied scores.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    default_label: String,
    idle_action: String,
    candidates: HashMap<String, Vec<String>>,
    actions: HashMap<String, ActionSpec>,
    valence: HashMap<String, i32>,
}

impl ActionCatalog {
    /// Empty catalog; callers fill it with the `with_*` builders.
    pub fn new(default_label: impl Into<String>, idle_action: impl Into<String>) -> Self {
        Self {
            default_label: default_label.into(),
            idle_action: idle_action.into(),
            candidates: HashMap::new(),
            actions: HashMap::new(),
            valence: HashMap::new(),
        }
    }

    pub fn with_candidates(mut self, label: &str, actions: &[&str]) -> Self {
        self.candidates.insert(
            label.to_string(),
            actions.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn with_action(mut self, key: &str, tags: &[PreferenceCategory], assets: &[&str]) -> Self {
        self.actions.insert(
            key.to_string(),
            ActionSpec {
                tags: tags.to_vec(),
                assets: assets.iter().map(|a| a.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_valence(mut self, label: &str, valence: i32) -> Self {
        self.valence.insert(label.to_string(), valence);
        self
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    pub fn idle_action(&self) -> &str {
        &self.idle_action
    }

    /// Candidate actions for `label`, falling back to the default label's list.
    pub fn candidates_for(&self, label: &str) -> &[String] {
        self.candidates
            .get(label)
            .or_else(|| self.candidates.get(&self.default_label))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_known_label(&self, label: &str) -> bool {
        self.candidates.contains_key(label)
    }

    pub fn tags_for(&self, action: &str) -> &[PreferenceCategory] {
        self.actions
            .get(action)
            .map(|spec| spec.tags.as_slice())
            .unwrap_or(&[])
    }

    /// Downstream asset identifiers; never empty (unlisted actions resolve to themselves).
    pub fn assets_for(&self, action: &str) -> Vec<String> {
        match self.actions.get(action) {
            Some(spec) if !spec.assets.is_empty() => spec.assets.clone(),
            _ => vec![action.to_string()],
        }
    }

    pub fn valence(&self, label: &str) -> i32 {
        self.valence.get(label).copied().unwrap_or(0)
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        use PreferenceCategory::{Movement, Music, Videos};

        ActionCatalog::new(DEFAULT_EMOTION_LABEL, DEFAULT_IDLE_ACTION)
            .with_candidates("happy", &["dance_move", "reward_learning", "celebrate"])
            .with_candidates("sad", &["play_cheer_music", "gentle_forward", "comfort_video"])
            .with_candidates("angry", &["calm_breathing", "slow_back", "blink_alert"])
            .with_candidates("neutral", &["idle_patrol", "interactive_prompt", "music_snippet"])
            .with_candidates("surprise", &["quick_spin", "show_surprised_eyes"])
            .with_candidates("fear", &["retreat_slow", "soothing_audio", "parent_notify"])
            .with_action("play_cheer_music", &[Music], &["cheer1.mp3"])
            .with_action("gentle_forward", &[Movement], &["gentle_forward"])
            .with_action("comfort_video", &[Videos], &["comfort_clip.mp4"])
            .with_action("calm_breathing", &[], &["breath_audio.mp3"])
            .with_action("slow_back", &[], &["slow_back"])
            .with_action("blink_alert", &[], &["blink_alert"])
            .with_action("idle_patrol", &[], &["patrol_pattern"])
            .with_action("interactive_prompt", &[], &["ask_question_audio.mp3"])
            .with_action("music_snippet", &[Music], &["jingle1.mp3"])
            .with_action("dance_move", &[Movement], &["dance_pattern"])
            .with_action("reward_learning", &[], &["reward_game"])
            .with_action("celebrate", &[], &["celebrate_pattern"])
            .with_action("quick_spin", &[Movement], &["quick_spin"])
            .with_action("show_surprised_eyes", &[], &["surprise_eyes"])
            .with_action("retreat_slow", &[Movement], &["retreat_motion"])
            .with_action("soothing_audio", &[Music], &["sooth.mp3"])
            .with_action("parent_notify", &[], &["notify_parent"])
            .with_valence("happy", 2)
            .with_valence("surprise", 1)
            .with_valence("neutral", 0)
            .with_valence("sad", -1)
            .with_valence("fear", -2)
            .with_valence("angry", -2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_label_uses_default_candidates() {
        let catalog = ActionCatalog::default();
        assert_eq!(catalog.candidates_for("bewildered"), catalog.candidates_for("neutral"));
        assert!(!catalog.is_known_label("bewildered"));
    }

    #[test]
    fn sad_candidates_keep_declared_order() {
        let catalog = ActionCatalog::default();
        assert_eq!(
            catalog.candidates_for("sad"),
            ["play_cheer_music", "gentle_forward", "comfort_video"]
        );
    }

    #[test]
    fn unlisted_action_resolves_to_itself() {
        let catalog = ActionCatalog::default();
        assert_eq!(catalog.assets_for("play_cheer_music"), vec!["cheer1.mp3"]);
        assert_eq!(catalog.assets_for("wave_hello"), vec!["wave_hello"]);
        assert!(catalog.tags_for("wave_hello").is_empty());
    }

    #[test]
    fn every_candidate_has_assets() {
        let catalog = ActionCatalog::default();
        for label in ["happy", "sad", "angry", "neutral", "surprise", "fear"] {
            for action in catalog.candidates_for(label) {
                assert!(!catalog.assets_for(action).is_empty(), "{action}");
            }
        }
    }

    #[test]
    fn valence_table() {
        let catalog = ActionCatalog::default();
        assert_eq!(catalog.valence("happy"), 2);
        assert_eq!(catalog.valence("sad"), -1);
        assert_eq!(catalog.valence("angry"), -2);
        assert_eq!(catalog.valence("bewildered"), 0);
    }

    #[test]
    fn empty_catalog_has_no_candidates() {
        let catalog = ActionCatalog::new("neutral", "idle");
        assert!(catalog.candidates_for("sad").is_empty());
    }
}
