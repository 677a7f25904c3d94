//! Cache key layout shared by the services.

use scoreline_core::{MatchId, Tournament, UserId};
use scoreline_storage::MatchListFilter;

pub const LEADERBOARD_PREFIX: &str = "leaderboard:";
pub const USER_PREFIX: &str = "user:";

pub const MATCH_DETAIL_PREFIX: &str = "match:detail:";
pub const MATCH_LIST_PREFIX: &str = "match:list:";
pub const MATCH_HOT_PREFIX: &str = "match:hot:";
pub const MATCH_UPCOMING_PREFIX: &str = "match:upcoming";
pub const MATCH_LIVE_KEY: &str = "match:live";
pub const MATCH_FINISHED_PREFIX: &str = "match:finished:";

pub fn leaderboard(tournament: Tournament) -> String {
    format!("{LEADERBOARD_PREFIX}{tournament}")
}

pub fn user(id: UserId) -> String {
    format!("{USER_PREFIX}{id}")
}

pub fn match_detail(id: MatchId) -> String {
    format!("{MATCH_DETAIL_PREFIX}{id}")
}

pub fn match_hot(id: MatchId) -> String {
    format!("{MATCH_HOT_PREFIX}{id}")
}

/// `match:list:[tournament:T:][status:S:]limit:L:offset:O`
pub fn match_list(filter: &MatchListFilter) -> String {
    let mut key = String::from(MATCH_LIST_PREFIX);
    if let Some(tournament) = filter.tournament {
        key.push_str(&format!("tournament:{tournament}:"));
    }
    if let Some(status) = filter.status {
        key.push_str(&format!("status:{status}:"));
    }
    key.push_str(&format!("limit:{}:offset:{}", filter.limit, filter.offset));
    key
}

pub fn match_upcoming(limit: usize) -> String {
    format!("{MATCH_UPCOMING_PREFIX}:{limit}")
}

pub fn match_finished(limit: usize) -> String {
    format!("{MATCH_FINISHED_PREFIX}{limit}")
}
