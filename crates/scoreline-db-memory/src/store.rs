use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use scoreline_core::{
    Match, MatchId, MatchPointsCalculation, Prediction, PredictionId, PredictionWithVotes, RuleId,
    ScoringRule, User, UserId,
};
use scoreline_storage::{Repositories, StorageError};

/// Concurrent in-memory store for every pipeline entity.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub(crate) matches: DashMap<MatchId, Match>,
    pub(crate) predictions: DashMap<PredictionId, PredictionWithVotes>,
    pub(crate) users: DashMap<UserId, User>,
    pub(crate) rules: DashMap<RuleId, ScoringRule>,
    pub(crate) calculations: DashMap<MatchId, MatchPointsCalculation>,
    pub(crate) settlements: DashMap<(MatchId, UserId), i64>,
    /// Users whose `update` calls fail, for exercising partial settlement.
    pub(crate) failing_users: RwLock<HashSet<UserId>>,
    /// When set, every prediction read fails with a connection error.
    pub(crate) predictions_offline: RwLock<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Hand the same store out as every repository.
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            predictions: self.clone(),
            matches: self.clone(),
            users: self.clone(),
            rules: self.clone(),
            calculations: self.clone(),
        }
    }

    // ==================== Seeding ====================

    pub fn insert_match(&self, m: Match) {
        self.matches.insert(m.id, m);
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_prediction(&self, prediction: Prediction, vote_count: u32) {
        self.predictions.insert(
            prediction.id,
            PredictionWithVotes::new(prediction, vote_count),
        );
    }

    /// Store a rule. Activating it deactivates every other rule.
    pub fn insert_rule(&self, rule: ScoringRule) -> Result<(), StorageError> {
        rule.validate()
            .map_err(|e| StorageError::invalid(e.to_string()))?;
        if rule.is_active {
            for mut other in self.rules.iter_mut() {
                other.is_active = false;
            }
        }
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    // ==================== Mutations ====================

    /// Replace a stored match, e.g. after recording its result.
    pub fn update_match(&self, m: Match) -> Result<(), StorageError> {
        match self.matches.get_mut(&m.id) {
            Some(mut slot) => {
                *slot = m;
                Ok(())
            }
            None => Err(StorageError::not_found("match", m.id)),
        }
    }

    /// Adjust a prediction's vote count and return the new value.
    pub fn vote(&self, id: PredictionId, delta: i32) -> Result<u32, StorageError> {
        let mut entry = self
            .predictions
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("prediction", id))?;
        let votes = (i64::from(entry.vote_count) + i64::from(delta)).max(0) as u32;
        entry.vote_count = votes;
        entry.prediction.is_featured = entry.is_featured_by_votes();
        Ok(votes)
    }

    // ==================== Inspection ====================

    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn prediction(&self, id: PredictionId) -> Option<PredictionWithVotes> {
        self.predictions.get(&id).map(|p| p.clone())
    }

    pub fn calculation(&self, match_id: MatchId) -> Option<MatchPointsCalculation> {
        self.calculations.get(&match_id).map(|c| c.clone())
    }

    pub fn settled(&self, match_id: MatchId, user_id: UserId) -> Option<i64> {
        self.settlements.get(&(match_id, user_id)).map(|p| *p)
    }

    // ==================== Fault injection ====================

    pub fn fail_updates_for_user(&self, id: UserId) {
        self.failing_users.write().insert(id);
    }

    pub fn restore_updates_for_user(&self, id: UserId) {
        self.failing_users.write().remove(&id);
    }

    pub fn set_predictions_offline(&self, offline: bool) {
        *self.predictions_offline.write() = offline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreline_core::{Team, Tournament};
    use time::macros::datetime;

    #[test]
    fn test_vote_updates_featured_flag() {
        let store = InMemoryStore::new();
        store.insert_prediction(
            Prediction::new(1, 1, 1, Team::A, 1, 0, datetime!(2024-01-01 00:00 UTC)),
            4,
        );

        assert_eq!(store.vote(1, 1).unwrap(), 5);
        assert!(store.prediction(1).unwrap().prediction.is_featured);

        assert_eq!(store.vote(1, -10).unwrap(), 0);
        assert!(!store.prediction(1).unwrap().prediction.is_featured);

        assert!(store.vote(2, 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_activating_rule_deactivates_others() {
        let store = InMemoryStore::new();
        store
            .insert_rule(ScoringRule {
                id: 1,
                name: "old".into(),
                is_active: true,
                ..Default::default()
            })
            .unwrap();
        store
            .insert_rule(ScoringRule {
                id: 2,
                name: "new".into(),
                is_active: true,
                ..Default::default()
            })
            .unwrap();

        assert!(!store.rules.get(&1).unwrap().is_active);
        assert!(store.rules.get(&2).unwrap().is_active);
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .insert_rule(ScoringRule {
                base_points: 0,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Invalid { .. }));
    }

    #[test]
    fn test_update_unknown_match() {
        let store = InMemoryStore::new();
        let m = Match::scheduled(9, "A", "B", Tournament::Spring, datetime!(2024-01-01 00:00 UTC));
        assert!(store.update_match(m).unwrap_err().is_not_found());
    }
}
