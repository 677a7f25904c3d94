use serde::{Deserialize, Serialize};

use super::rule::ScoringRule;
use crate::domain::{Match, PredictionWithVotes};

/// Points for a perfect prediction (winner and exact score) when no rule is configured.
const LEGACY_PERFECT_POINTS: i64 = 30;
/// Points for a correct winner with the wrong score when no rule is configured.
const LEGACY_TEAM_ONLY_POINTS: i64 = 10;

/// Per-component score for one prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_score: i64,
    pub difficulty_bonus: i64,
    pub vote_reward: i64,
    pub time_reward: i64,
    pub modify_penalty: i64,
    /// Never negative.
    pub total_score: i64,
}

impl ScoreBreakdown {
    fn from_components(
        base_score: i64,
        difficulty_bonus: i64,
        vote_reward: i64,
        time_reward: i64,
        modify_penalty: i64,
    ) -> Self {
        let total = base_score
            .saturating_add(difficulty_bonus)
            .saturating_add(vote_reward)
            .saturating_add(time_reward)
            .saturating_sub(modify_penalty);
        Self {
            base_score,
            difficulty_bonus,
            vote_reward,
            time_reward,
            modify_penalty,
            total_score: total.max(0),
        }
    }

    /// Human readable summary, e.g. `base 10 + vote 5 - penalty 2 = 13`.
    pub fn description(&self) -> String {
        let mut out = format!("base {}", self.base_score);
        if self.difficulty_bonus != 0 {
            out.push_str(&format!(" + difficulty {}", self.difficulty_bonus));
        }
        if self.vote_reward != 0 {
            out.push_str(&format!(" + vote {}", self.vote_reward));
        }
        if self.time_reward != 0 {
            out.push_str(&format!(" + early {}", self.time_reward));
        }
        if self.modify_penalty != 0 {
            out.push_str(&format!(" - penalty {}", self.modify_penalty));
        }
        out.push_str(&format!(" = {}", self.total_score));
        out
    }
}

/// Score one prediction against a match result.
///
/// Unfinished matches and incorrect predictions short-circuit to an all-zero
/// breakdown. Without a rule the legacy fixed table applies (30 for a perfect
/// prediction, 10 for the right winner).
pub fn calculate(
    prediction: &PredictionWithVotes,
    m: &Match,
    rule: Option<&ScoringRule>,
) -> ScoreBreakdown {
    let p = &prediction.prediction;
    if !m.is_finished() || !p.is_correct_for(m) {
        return ScoreBreakdown::default();
    }

    let Some(rule) = rule else {
        let base = if p.is_exact_score(m) {
            LEGACY_PERFECT_POINTS
        } else {
            LEGACY_TEAM_ONLY_POINTS
        };
        return ScoreBreakdown::from_components(base, 0, 0, 0, 0);
    };

    let base = rule.base_points;

    let difficulty = if rule.enable_difficulty {
        (base as f64 * (rule.difficulty_multiplier - 1.0)) as i64
    } else {
        0
    };

    let vote = if rule.enable_vote_reward && prediction.vote_count > 0 {
        capped(
            i64::from(prediction.vote_count).saturating_mul(rule.vote_reward_points),
            rule.max_vote_reward,
        )
    } else {
        0
    };

    let early = if rule.enable_time_reward {
        let lead = (m.start_time - p.created_at).whole_hours();
        if lead >= rule.time_reward_hours {
            rule.time_reward_points
        } else {
            0
        }
    } else {
        0
    };

    let penalty = if rule.enable_modify_penalty && p.modification_count > 0 {
        capped(
            i64::from(p.modification_count).saturating_mul(rule.modify_penalty_points),
            rule.max_modify_penalty,
        )
    } else {
        0
    };

    ScoreBreakdown::from_components(base, difficulty, vote, early, penalty)
}

/// `min(value, cap)` where a non-positive cap means uncapped; never negative.
fn capped(value: i64, cap: i64) -> i64 {
    let value = value.max(0);
    if cap > 0 { value.min(cap) } else { value }
}
