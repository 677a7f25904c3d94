use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Match, MatchId, PredictionId, Team, UserId};

/// Vote count at which a prediction becomes "featured".
pub const FEATURED_VOTE_THRESHOLD: u32 = 5;

/// A user's prediction for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub user_id: UserId,
    pub match_id: MatchId,
    pub predicted_winner: Team,
    pub predicted_score_a: u32,
    pub predicted_score_b: u32,
    /// How many times the user edited the prediction after submitting it.
    pub modification_count: u32,
    pub is_featured: bool,
    /// Points awarded by the last scoring pass.
    pub points: i64,
    pub is_correct: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Prediction {
    pub fn new(
        id: PredictionId,
        user_id: UserId,
        match_id: MatchId,
        predicted_winner: Team,
        predicted_score_a: u32,
        predicted_score_b: u32,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            user_id,
            match_id,
            predicted_winner,
            predicted_score_a,
            predicted_score_b,
            modification_count: 0,
            is_featured: false,
            points: 0,
            is_correct: false,
            created_at,
        }
    }

    /// Winner prediction matches the final result.
    ///
    /// This is the single definition of correctness used to gate scoring.
    pub fn is_correct_for(&self, m: &Match) -> bool {
        m.is_finished() && m.winner == Some(self.predicted_winner)
    }

    /// Predicted scoreline matches the final score exactly.
    pub fn is_exact_score(&self, m: &Match) -> bool {
        m.is_finished() && self.predicted_score_a == m.score_a && self.predicted_score_b == m.score_b
    }
}

/// Prediction joined with its community vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionWithVotes {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub vote_count: u32,
    #[serde(default)]
    pub has_user_voted: bool,
}

impl PredictionWithVotes {
    pub fn new(prediction: Prediction, vote_count: u32) -> Self {
        Self {
            prediction,
            vote_count,
            has_user_voted: false,
        }
    }

    pub fn is_featured_by_votes(&self) -> bool {
        self.vote_count >= FEATURED_VOTE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tournament;
    use time::macros::datetime;

    fn finished_match() -> Match {
        let mut m = Match::scheduled(7, "A", "B", Tournament::Winter, datetime!(2024-01-10 20:00 UTC));
        m.finish(Team::A, 2, 1);
        m
    }

    #[test]
    fn test_correctness_is_winner_only() {
        let m = finished_match();
        let right_winner = Prediction::new(1, 1, 7, Team::A, 0, 0, datetime!(2024-01-09 20:00 UTC));
        assert!(right_winner.is_correct_for(&m));
        assert!(!right_winner.is_exact_score(&m));

        // exact score with the wrong winner still does not count as correct
        let wrong_winner = Prediction::new(2, 2, 7, Team::B, 2, 1, datetime!(2024-01-09 20:00 UTC));
        assert!(!wrong_winner.is_correct_for(&m));
        assert!(wrong_winner.is_exact_score(&m));
    }

    #[test]
    fn test_unfinished_match_is_never_correct() {
        let m = Match::scheduled(7, "A", "B", Tournament::Winter, datetime!(2024-01-10 20:00 UTC));
        let p = Prediction::new(1, 1, 7, Team::A, 0, 0, datetime!(2024-01-09 20:00 UTC));
        assert!(!p.is_correct_for(&m));
    }

    #[test]
    fn test_featured_threshold() {
        let p = Prediction::new(1, 1, 7, Team::A, 1, 0, datetime!(2024-01-09 20:00 UTC));
        assert!(!PredictionWithVotes::new(p.clone(), 4).is_featured_by_votes());
        assert!(PredictionWithVotes::new(p, 5).is_featured_by_votes());
    }
}
