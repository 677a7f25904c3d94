//! Repository trait implementations for [`InMemoryStore`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use scoreline_core::{
    LeaderboardEntry, Match, MatchId, MatchPointsCalculation, PredictionId, PredictionWithVotes,
    RuleId, ScoringRule, Tournament, User, UserId,
};
use scoreline_storage::{
    CalculationRepository, MatchListFilter, MatchRepository, PredictionRepository,
    ScoringRuleRepository, StorageError, UserRepository,
};

use crate::store::InMemoryStore;

#[async_trait]
impl PredictionRepository for InMemoryStore {
    async fn predictions_by_match(
        &self,
        match_id: MatchId,
    ) -> Result<Vec<PredictionWithVotes>, StorageError> {
        if *self.predictions_offline.read() {
            return Err(StorageError::connection("prediction store offline"));
        }
        let mut out: Vec<PredictionWithVotes> = self
            .predictions
            .iter()
            .filter(|p| p.prediction.match_id == match_id)
            .map(|p| p.clone())
            .collect();
        out.sort_by_key(|p| p.prediction.id);
        Ok(out)
    }

    async fn update_prediction_points(
        &self,
        id: PredictionId,
        points: i64,
        is_correct: bool,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .predictions
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("prediction", id))?;
        entry.prediction.points = points;
        entry.prediction.is_correct = is_correct;
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for InMemoryStore {
    async fn get_by_id(&self, id: MatchId) -> Result<Match, StorageError> {
        self.matches
            .get(&id)
            .map(|m| m.clone())
            .ok_or_else(|| StorageError::not_found("match", id))
    }

    async fn list(&self, filter: &MatchListFilter) -> Result<Vec<Match>, StorageError> {
        let mut out: Vec<Match> = self
            .matches
            .iter()
            .filter(|m| filter.tournament.is_none_or(|t| m.tournament == t))
            .filter(|m| filter.status.is_none_or(|s| m.status == s))
            .map(|m| m.clone())
            .collect();
        out.sort_by_key(|m| (m.start_time, m.id));

        let out = out.into_iter().skip(filter.offset);
        Ok(if filter.limit > 0 {
            out.take(filter.limit).collect()
        } else {
            out.collect()
        })
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_by_id(&self, id: UserId) -> Result<User, StorageError> {
        self.users
            .get(&id)
            .map(|u| u.clone())
            .ok_or_else(|| StorageError::not_found("user", id))
    }

    async fn update(&self, user: &User) -> Result<(), StorageError> {
        if self.failing_users.read().contains(&user.id) {
            return Err(StorageError::internal(format!(
                "injected failure updating user {}",
                user.id
            )));
        }
        match self.users.get_mut(&user.id) {
            Some(mut slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("user", user.id)),
        }
    }

    async fn leaderboard(
        &self,
        tournament: Tournament,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, StorageError> {
        // GLOBAL ranks lifetime totals; a season ranks points earned on its matches
        let totals: Vec<(UserId, i64)> = if tournament.is_global() {
            self.users.iter().map(|u| (u.id, u.points)).collect()
        } else {
            let mut per_user: HashMap<UserId, i64> = HashMap::new();
            for p in self.predictions.iter() {
                let in_season = self
                    .matches
                    .get(&p.prediction.match_id)
                    .is_some_and(|m| m.tournament == tournament);
                if in_season {
                    *per_user.entry(p.prediction.user_id).or_default() += p.prediction.points;
                }
            }
            per_user.into_iter().collect()
        };

        let mut ranked: Vec<(UserId, i64)> = totals;
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(ranked
            .into_iter()
            .take(if limit == 0 { usize::MAX } else { limit })
            .enumerate()
            .map(|(idx, (user_id, points))| LeaderboardEntry {
                rank: idx as u32 + 1,
                user_id,
                username: self
                    .users
                    .get(&user_id)
                    .map(|u| u.username.clone())
                    .unwrap_or_default(),
                points,
            })
            .collect())
    }
}

#[async_trait]
impl ScoringRuleRepository for InMemoryStore {
    async fn active_rule(&self) -> Result<Option<ScoringRule>, StorageError> {
        Ok(self
            .rules
            .iter()
            .find(|r| r.is_active)
            .map(|r| r.clone()))
    }

    async fn rule_by_id(&self, id: RuleId) -> Result<ScoringRule, StorageError> {
        self.rules
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| StorageError::not_found("scoring rule", id))
    }
}

#[async_trait]
impl CalculationRepository for InMemoryStore {
    async fn upsert(&self, calculation: &MatchPointsCalculation) -> Result<(), StorageError> {
        self.calculations
            .insert(calculation.match_id, calculation.clone());
        Ok(())
    }

    async fn get_by_match(
        &self,
        match_id: MatchId,
    ) -> Result<Option<MatchPointsCalculation>, StorageError> {
        Ok(self.calculations.get(&match_id).map(|c| c.clone()))
    }

    async fn settled_points(
        &self,
        match_id: MatchId,
    ) -> Result<BTreeMap<UserId, i64>, StorageError> {
        Ok(self
            .settlements
            .iter()
            .filter(|e| e.key().0 == match_id)
            .map(|e| (e.key().1, *e.value()))
            .collect())
    }

    async fn record_settlement(
        &self,
        match_id: MatchId,
        user_id: UserId,
        points: i64,
    ) -> Result<(), StorageError> {
        self.settlements.insert((match_id, user_id), points);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreline_core::{MatchStatus, Prediction, Team};
    use std::sync::Arc;
    use time::macros::datetime;

    fn seeded() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new_shared();
        let mut spring = Match::scheduled(1, "A", "B", Tournament::Spring, datetime!(2024-04-01 18:00 UTC));
        spring.finish(Team::A, 1, 0);
        store.insert_match(spring);
        store.insert_match(Match::scheduled(2, "C", "D", Tournament::Summer, datetime!(2024-07-01 18:00 UTC)));

        for (id, name, points) in [(1, "ann", 40), (2, "bob", 70), (3, "cy", 40)] {
            let mut u = User::new(id, name);
            u.points = points;
            store.insert_user(u);
        }

        let mut p = Prediction::new(10, 1, 1, Team::A, 1, 0, datetime!(2024-03-30 18:00 UTC));
        p.points = 30;
        store.insert_prediction(p, 0);
        let mut p = Prediction::new(11, 2, 1, Team::A, 2, 0, datetime!(2024-03-30 18:00 UTC));
        p.points = 10;
        store.insert_prediction(p, 3);
        store
    }

    #[tokio::test]
    async fn test_global_leaderboard_ranks_lifetime_points() {
        let store = seeded();
        let board = store.leaderboard(Tournament::Global, 2).await.unwrap();
        let ids: Vec<_> = board.iter().map(|e| (e.rank, e.user_id)).collect();
        // ties broken by user id
        assert_eq!(ids, vec![(1, 2), (2, 1)]);
        assert_eq!(board[0].username, "bob");
    }

    #[tokio::test]
    async fn test_season_leaderboard_sums_prediction_points() {
        let store = seeded();
        let board = store.leaderboard(Tournament::Spring, 50).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!((board[0].user_id, board[0].points), (1, 30));
        assert_eq!((board[1].user_id, board[1].points), (2, 10));

        assert!(store.leaderboard(Tournament::Summer, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_match_list_filter() {
        let store = seeded();
        let finished = store
            .list(&MatchListFilter::with_status(MatchStatus::Finished, 10))
            .await
            .unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, 1);

        let all = store.list(&MatchListFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);

        let paged = store
            .list(&MatchListFilter {
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged[0].id, 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = seeded();
        store.fail_updates_for_user(1);
        let user = store.user(1).unwrap();
        assert!(UserRepository::update(store.as_ref(), &user).await.is_err());

        store.set_predictions_offline(true);
        let err = store.predictions_by_match(1).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_calculation_upsert_replaces() {
        let store = seeded();
        let mut calc = MatchPointsCalculation::new(1, None, datetime!(2024-04-01 20:00 UTC));
        store.upsert(&calc).await.unwrap();
        calc.total_points = 99;
        store.upsert(&calc).await.unwrap();
        assert_eq!(store.get_by_match(1).await.unwrap().unwrap().total_points, 99);
    }

    #[tokio::test]
    async fn test_settlements_are_per_match() {
        let store = seeded();
        store.record_settlement(1, 10, 25).await.unwrap();
        store.record_settlement(1, 11, 0).await.unwrap();
        store.record_settlement(2, 10, 7).await.unwrap();
        store.record_settlement(1, 10, 30).await.unwrap();

        let settled = store.settled_points(1).await.unwrap();
        assert_eq!(settled, BTreeMap::from([(10, 30), (11, 0)]));
        assert!(store.settled_points(3).await.unwrap().is_empty());
    }
}
