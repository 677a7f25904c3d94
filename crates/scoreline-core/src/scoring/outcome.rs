use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{Match, MatchId, Prediction, PredictionId, RuleId, UserId};

// ============================================================================
// Accuracy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionAccuracy {
    /// Winner and exact score
    Perfect,
    /// Winner only
    TeamOnly,
    /// Exact score with the wrong winner
    ScoreOnly,
    Wrong,
}

impl PredictionAccuracy {
    pub fn classify(prediction: &Prediction, m: &Match) -> Self {
        if !m.is_finished() {
            return PredictionAccuracy::Wrong;
        }
        match (prediction.is_correct_for(m), prediction.is_exact_score(m)) {
            (true, true) => PredictionAccuracy::Perfect,
            (true, false) => PredictionAccuracy::TeamOnly,
            (false, true) => PredictionAccuracy::ScoreOnly,
            (false, false) => PredictionAccuracy::Wrong,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PredictionAccuracy::Perfect => "perfect prediction",
            PredictionAccuracy::TeamOnly => "correct winner",
            PredictionAccuracy::ScoreOnly => "correct score",
            PredictionAccuracy::Wrong => "wrong prediction",
        }
    }
}

impl fmt::Display for PredictionAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// ============================================================================
// Popularity bonus
// ============================================================================

/// Extra points for predictions other users voted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityBonus {
    pub vote_count: u32,
    pub bonus: i64,
}

impl PopularityBonus {
    /// Tiered: 20+ votes → 10, 10+ → 5, 5+ → 2, otherwise nothing.
    pub fn for_votes(vote_count: u32) -> Self {
        let bonus = match vote_count {
            20.. => 10,
            10..=19 => 5,
            5..=9 => 2,
            _ => 0,
        };
        Self { vote_count, bonus }
    }

    /// No bonus regardless of votes, for predictions that missed.
    pub fn none(vote_count: u32) -> Self {
        Self { vote_count, bonus: 0 }
    }
}

/// Explanation stored next to each awarded score.
pub fn points_reason(accuracy: PredictionAccuracy, base_points: i64, bonus: PopularityBonus) -> String {
    let mut reason = accuracy.description().to_string();
    if base_points > 0 {
        reason.push_str(&format!(", {base_points} rule points"));
    }
    if bonus.bonus > 0 {
        reason.push_str(&format!(
            ", popularity bonus {} ({} votes)",
            bonus.bonus, bonus.vote_count
        ));
    }
    reason
}

// ============================================================================
// Results
// ============================================================================

/// Points awarded to one prediction in a scoring pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsCalculationResult {
    pub prediction_id: PredictionId,
    pub user_id: UserId,
    pub match_id: MatchId,
    pub points: i64,
    pub is_correct: bool,
    pub reason: String,
}

/// Aggregate of one scoring pass over every prediction of a match.
///
/// Stored once per match; a recomputation replaces the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPointsCalculation {
    pub match_id: MatchId,
    pub rule_id: Option<RuleId>,
    pub results: Vec<PointsCalculationResult>,
    pub total_points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
}

impl MatchPointsCalculation {
    pub fn new(match_id: MatchId, rule_id: Option<RuleId>, processed_at: OffsetDateTime) -> Self {
        Self {
            match_id,
            rule_id,
            results: Vec::new(),
            total_points: 0,
            processed_at,
        }
    }

    pub fn push(&mut self, result: PointsCalculationResult) {
        self.total_points = self.total_points.saturating_add(result.points);
        self.results.push(result);
    }
}
