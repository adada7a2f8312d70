use crate::catalog::ActionCatalog;
use crate::profile::{clamp_score, Profile};

pub const IMPROVED_REWARD: f64 = 1.0;
pub const UNCHANGED_REWARD: f64 = 0.1;
pub const WORSENED_PENALTY: f64 = -0.5;

/// Coarse three-way reward for a change in valence.
pub fn reward_for(valence_delta: i32) -> f64 {
    match valence_delta {
        d if d > 0 => IMPROVED_REWARD,
        0 => UNCHANGED_REWARD,
        _ => WORSENED_PENALTY,
    }
}

/// Single-step credit assignment: the whole before/after change is
/// attributed to the one action dispatched in between.
pub struct FeedbackLearner<'a> {
    catalog: &'a ActionCatalog,
}

impl<'a> FeedbackLearner<'a> {
    pub fn new(catalog: &'a ActionCatalog) -> Self {
        Self { catalog }
    }

    pub fn valence_delta(&self, before: &str, after: &str) -> i32 {
        self.catalog.valence(after) - self.catalog.valence(before)
    }

    /// Updates the learned score for `action` and returns the change applied
    /// before clamping. The caller persists the profile.
    pub fn apply_feedback(
        &self,
        profile: &mut Profile,
        action: &str,
        before: &str,
        after: &str,
    ) -> f64 {
        let change = reward_for(self.valence_delta(before, after));
        let entry = profile.rec_scores.entry(action.to_string()).or_insert(0.0);
        *entry = clamp_score(*entry + change);

        tracing::debug!(
            "Feedback for '{}': {} -> {} (change {:+.1}, score now {:.2})",
            action,
            before,
            after,
            change,
            *entry
        );
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{SCORE_MAX, SCORE_MIN};
    use crate::recommender::Recommender;

    #[test]
    fn feedback_sign_mapping() {
        let catalog = ActionCatalog::default();
        let learner = FeedbackLearner::new(&catalog);
        let mut profile = Profile::seeded("test");

        assert_eq!(learner.apply_feedback(&mut profile, "x", "sad", "happy"), 1.0);
        assert_eq!(learner.apply_feedback(&mut profile, "x", "happy", "happy"), 0.1);
        assert_eq!(learner.apply_feedback(&mut profile, "x", "happy", "sad"), -0.5);
        assert!((profile.learned_score("x") - 0.6).abs() < 1e-9);
    }

    #[test]
    fn unknown_labels_count_as_zero_valence() {
        let catalog = ActionCatalog::default();
        let learner = FeedbackLearner::new(&catalog);
        assert_eq!(learner.valence_delta("bewildered", "neutral"), 0);
        assert_eq!(learner.valence_delta("bewildered", "happy"), 2);

        let mut profile = Profile::seeded("test");
        assert_eq!(
            learner.apply_feedback(&mut profile, "idle_patrol", "bewildered", "puzzled"),
            UNCHANGED_REWARD
        );
    }

    #[test]
    fn scores_stay_clamped_through_long_runs() {
        let catalog = ActionCatalog::default();
        let learner = FeedbackLearner::new(&catalog);
        let mut profile = Profile::seeded("test");

        for _ in 0..20 {
            learner.apply_feedback(&mut profile, "dance_move", "sad", "happy");
            let score = profile.learned_score("dance_move");
            assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
        }
        assert_eq!(profile.learned_score("dance_move"), SCORE_MAX);

        for _ in 0..40 {
            learner.apply_feedback(&mut profile, "dance_move", "happy", "angry");
            let score = profile.learned_score("dance_move");
            assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
        }
        assert_eq!(profile.learned_score("dance_move"), SCORE_MIN);

        // Mixed sequence never escapes the bounds either.
        let labels = ["happy", "sad", "fear", "neutral", "surprise", "angry"];
        for i in 0..120 {
            let before = labels[i % labels.len()];
            let after = labels[(i * 7 + 3) % labels.len()];
            learner.apply_feedback(&mut profile, "dance_move", before, after);
            let score = profile.learned_score("dance_move");
            assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
        }
    }

    #[test]
    fn written_entries_are_never_removed() {
        let catalog = ActionCatalog::default();
        let learner = FeedbackLearner::new(&catalog);
        let mut profile = Profile::seeded("test");

        learner.apply_feedback(&mut profile, "celebrate", "happy", "neutral");
        learner.apply_feedback(&mut profile, "celebrate", "neutral", "happy");
        learner.apply_feedback(&mut profile, "celebrate", "happy", "neutral");
        // 0.0 - 0.5 + 1.0 - 0.5 == 0.0, but the key stays.
        assert!(profile.rec_scores.contains_key("celebrate"));
        assert_eq!(profile.learned_score("celebrate"), 0.0);
    }

    #[test]
    fn positive_feedback_changes_the_next_pick() {
        let catalog = ActionCatalog::default();
        let mut profile = Profile::seeded("test");

        let change =
            FeedbackLearner::new(&catalog).apply_feedback(&mut profile, "gentle_forward", "sad", "happy");
        assert_eq!(change, 1.0);
        assert_eq!(
            Recommender::new(&catalog).recommend(&profile, "sad", 1),
            vec!["gentle_forward"]
        );
    }
}
