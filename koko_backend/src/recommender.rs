//! Action scoring.
//!
//! `score = BASE_SCORE + PREFERENCE_BONUS * matching tags + learned score`,
//! ranked high to low. Equal scores keep the catalog's candidate order.

use crate::catalog::ActionCatalog;
use crate::profile::Profile;

pub const BASE_SCORE: f64 = 1.0;
pub const PREFERENCE_BONUS: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAction {
    pub action: String,
    pub score: f64,
}

pub struct Recommender<'a> {
    catalog: &'a ActionCatalog,
}

impl<'a> Recommender<'a> {
    pub fn new(catalog: &'a ActionCatalog) -> Self {
        Self { catalog }
    }

    /// Every candidate for `emotion` with its score, best first.
    pub fn score_candidates(&self, profile: &Profile, emotion: &str) -> Vec<ScoredAction> {
        let mut scored: Vec<ScoredAction> = self
            .catalog
            .candidates_for(emotion)
            .iter()
            .map(|action| ScoredAction {
                action: action.clone(),
                score: self.score(profile, action),
            })
            .collect();

        // sort_by is stable, which is what keeps catalog order for ties.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }

    /// Up to `top_k` action keys. Empty only if the catalog has no
    /// candidates for the label or the default label.
    pub fn recommend(&self, profile: &Profile, emotion: &str, top_k: usize) -> Vec<String> {
        self.score_candidates(profile, emotion)
            .into_iter()
            .take(top_k)
            .map(|scored| scored.action)
            .collect()
    }

    fn score(&self, profile: &Profile, action: &str) -> f64 {
        let preference_bonus: f64 = self
            .catalog
            .tags_for(action)
            .iter()
            .filter(|category| profile.prefs.enabled(**category))
            .map(|_| PREFERENCE_BONUS)
            .sum();

        BASE_SCORE + preference_bonus + profile.learned_score(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PreferenceCategory;
    use crate::profile::{Preferences, Profile};

    fn all_prefs_profile() -> Profile {
        Profile::seeded("test")
    }

    #[test]
    fn ties_keep_catalog_order() {
        let catalog = ActionCatalog::default();
        let picks = Recommender::new(&catalog).recommend(&all_prefs_profile(), "sad", 1);
        assert_eq!(picks, vec!["play_cheer_music"]);

        let scored = Recommender::new(&catalog).score_candidates(&all_prefs_profile(), "sad");
        let order: Vec<&str> = scored.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(order, ["play_cheer_music", "gentle_forward", "comfort_video"]);
        assert!(scored.iter().all(|s| (s.score - 1.7).abs() < 1e-9));
    }

    #[test]
    fn learned_score_moves_action_to_the_top() {
        let catalog = ActionCatalog::default();
        let mut profile = all_prefs_profile();
        profile.rec_scores.insert("gentle_forward".to_string(), 1.0);

        let recommender = Recommender::new(&catalog);
        assert_eq!(recommender.recommend(&profile, "sad", 1), vec!["gentle_forward"]);
        let top = &recommender.score_candidates(&profile, "sad")[0];
        assert!((top.score - 2.7).abs() < 1e-9);
    }

    #[test]
    fn unknown_label_matches_neutral() {
        let catalog = ActionCatalog::default();
        let recommender = Recommender::new(&catalog);
        let profile = all_prefs_profile();
        assert_eq!(
            recommender.recommend(&profile, "bewildered", 1),
            recommender.recommend(&profile, "neutral", 1)
        );
        assert_eq!(
            recommender.recommend(&profile, "bewildered", 3),
            recommender.recommend(&profile, "neutral", 3)
        );
    }

    #[test]
    fn preference_bonus_sums_across_matching_tags() {
        use PreferenceCategory::{Movement, Music};

        let catalog = ActionCatalog::new("neutral", "idle")
            .with_candidates("happy", &["plain", "spin_to_music"])
            .with_action("plain", &[], &["plain"])
            .with_action("spin_to_music", &[Music, Movement], &["spin.mp3"]);
        let recommender = Recommender::new(&catalog);

        let scored = recommender.score_candidates(&all_prefs_profile(), "happy");
        assert_eq!(scored[0].action, "spin_to_music");
        assert!((scored[0].score - 2.4).abs() < 1e-9);
        assert!((scored[1].score - 1.0).abs() < 1e-9);

        let mut music_only = all_prefs_profile();
        music_only.prefs = Preferences {
            music: true,
            ..Default::default()
        };
        let scored = recommender.score_candidates(&music_only, "happy");
        assert!((scored[0].score - 1.7).abs() < 1e-9);
    }

    #[test]
    fn disabled_preferences_leave_base_order() {
        let catalog = ActionCatalog::default();
        let mut profile = all_prefs_profile();
        profile.prefs = Preferences::default();
        // slow_back drops below its tied neighbours.
        profile.rec_scores.insert("slow_back".to_string(), -0.5);

        let picks = Recommender::new(&catalog).recommend(&profile, "angry", 3);
        assert_eq!(picks, vec!["calm_breathing", "blink_alert", "slow_back"]);
    }

    #[test]
    fn top_k_truncates_and_empty_catalog_returns_nothing() {
        let catalog = ActionCatalog::default();
        let picks = Recommender::new(&catalog).recommend(&all_prefs_profile(), "fear", 10);
        assert_eq!(picks.len(), 3);

        let empty = ActionCatalog::new("neutral", "idle");
        assert!(Recommender::new(&empty)
            .recommend(&all_prefs_profile(), "sad", 1)
            .is_empty());
    }
}
