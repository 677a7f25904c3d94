use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::RuleId;

/// Configurable weights used to turn a correct prediction into points.
///
/// Every optional component is guarded by its own `enable_*` flag; disabled
/// components contribute nothing regardless of their configured values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub sport_type_id: Option<u64>,
    #[serde(default)]
    pub is_active: bool,

    #[serde(default = "default_base_points")]
    pub base_points: i64,

    #[serde(default)]
    pub enable_difficulty: bool,
    #[serde(default = "default_difficulty_multiplier")]
    pub difficulty_multiplier: f64,

    #[serde(default)]
    pub enable_vote_reward: bool,
    #[serde(default = "default_vote_reward_points")]
    pub vote_reward_points: i64,
    #[serde(default = "default_max_vote_reward")]
    pub max_vote_reward: i64,

    #[serde(default)]
    pub enable_time_reward: bool,
    #[serde(default = "default_time_reward_points")]
    pub time_reward_points: i64,
    #[serde(default = "default_time_reward_hours")]
    pub time_reward_hours: i64,

    #[serde(default)]
    pub enable_modify_penalty: bool,
    #[serde(default = "default_modify_penalty_points")]
    pub modify_penalty_points: i64,
    #[serde(default = "default_max_modify_penalty")]
    pub max_modify_penalty: i64,
}

fn default_base_points() -> i64 {
    10
}

fn default_difficulty_multiplier() -> f64 {
    1.0
}

fn default_vote_reward_points() -> i64 {
    1
}

fn default_max_vote_reward() -> i64 {
    10
}

fn default_time_reward_points() -> i64 {
    5
}

fn default_time_reward_hours() -> i64 {
    24
}

fn default_modify_penalty_points() -> i64 {
    2
}

fn default_max_modify_penalty() -> i64 {
    6
}

impl Default for ScoringRule {
    fn default() -> Self {
        Self {
            id: 0,
            name: "default".to_string(),
            sport_type_id: None,
            is_active: false,
            base_points: default_base_points(),
            enable_difficulty: false,
            difficulty_multiplier: default_difficulty_multiplier(),
            enable_vote_reward: false,
            vote_reward_points: default_vote_reward_points(),
            max_vote_reward: default_max_vote_reward(),
            enable_time_reward: false,
            time_reward_points: default_time_reward_points(),
            time_reward_hours: default_time_reward_hours(),
            enable_modify_penalty: false,
            modify_penalty_points: default_modify_penalty_points(),
            max_modify_penalty: default_max_modify_penalty(),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// A single reason a rule cannot be activated.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleViolation {
    MissingName,
    NonPositiveBasePoints(i64),
    DifficultyBelowOne(f64),
    NegativeValue { field: &'static str, value: i64 },
    ExceedsCap {
        field: &'static str,
        value: i64,
        cap_field: &'static str,
        cap: i64,
    },
    NonPositiveTimeWindow(i64),
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleViolation::MissingName => write!(f, "name is required"),
            RuleViolation::NonPositiveBasePoints(v) => {
                write!(f, "base_points must be > 0 (got {v})")
            }
            RuleViolation::DifficultyBelowOne(v) => {
                write!(f, "difficulty_multiplier must be >= 1.0 (got {v})")
            }
            RuleViolation::NegativeValue { field, value } => {
                write!(f, "{field} must be >= 0 (got {value})")
            }
            RuleViolation::ExceedsCap {
                field,
                value,
                cap_field,
                cap,
            } => write!(f, "{field} ({value}) must not exceed {cap_field} ({cap})"),
            RuleViolation::NonPositiveTimeWindow(v) => {
                write!(f, "time_reward_hours must be > 0 (got {v})")
            }
        }
    }
}

/// All violations found in a rule, in field order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid scoring rule: {}", join_violations(.violations))]
pub struct RuleValidationError {
    pub violations: Vec<RuleViolation>,
}

fn join_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ScoringRule {
    /// Check the rule before it is persisted or activated.
    ///
    /// Values are never adjusted: every violation is reported.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push(RuleViolation::MissingName);
        }
        if self.base_points <= 0 {
            violations.push(RuleViolation::NonPositiveBasePoints(self.base_points));
        }
        // written negated so NaN is rejected too
        if self.enable_difficulty && !(self.difficulty_multiplier >= 1.0) {
            violations.push(RuleViolation::DifficultyBelowOne(self.difficulty_multiplier));
        }
        if self.enable_vote_reward {
            check_capped(
                &mut violations,
                ("vote_reward_points", self.vote_reward_points),
                ("max_vote_reward", self.max_vote_reward),
            );
        }
        if self.enable_time_reward {
            if self.time_reward_points < 0 {
                violations.push(RuleViolation::NegativeValue {
                    field: "time_reward_points",
                    value: self.time_reward_points,
                });
            }
            if self.time_reward_hours <= 0 {
                violations.push(RuleViolation::NonPositiveTimeWindow(self.time_reward_hours));
            }
        }
        if self.enable_modify_penalty {
            check_capped(
                &mut violations,
                ("modify_penalty_points", self.modify_penalty_points),
                ("max_modify_penalty", self.max_modify_penalty),
            );
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RuleValidationError { violations })
        }
    }
}

fn check_capped(
    violations: &mut Vec<RuleViolation>,
    (field, value): (&'static str, i64),
    (cap_field, cap): (&'static str, i64),
) {
    if value < 0 {
        violations.push(RuleViolation::NegativeValue { field, value });
    }
    if cap < 0 {
        violations.push(RuleViolation::NegativeValue {
            field: cap_field,
            value: cap,
        });
    }
    if cap > 0 && value > cap {
        violations.push(RuleViolation::ExceedsCap {
            field,
            value,
            cap_field,
            cap,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_is_valid() {
        assert!(ScoringRule::default().validate().is_ok());
    }

    #[test]
    fn test_base_points_must_be_positive() {
        let rule = ScoringRule {
            base_points: 0,
            ..Default::default()
        };
        let err = rule.validate().unwrap_err();
        assert_eq!(err.violations, vec![RuleViolation::NonPositiveBasePoints(0)]);
    }

    #[test]
    fn test_difficulty_below_one_rejected_only_when_enabled() {
        let mut rule = ScoringRule {
            difficulty_multiplier: 0.5,
            ..Default::default()
        };
        assert!(rule.validate().is_ok());

        rule.enable_difficulty = true;
        let err = rule.validate().unwrap_err();
        assert_eq!(err.violations, vec![RuleViolation::DifficultyBelowOne(0.5)]);
    }

    #[test]
    fn test_per_unit_value_must_not_exceed_positive_cap() {
        let rule = ScoringRule {
            enable_vote_reward: true,
            vote_reward_points: 15,
            max_vote_reward: 10,
            ..Default::default()
        };
        let err = rule.validate().unwrap_err();
        assert!(matches!(
            err.violations.as_slice(),
            [RuleViolation::ExceedsCap { field: "vote_reward_points", .. }]
        ));

        // a zero cap means uncapped
        let uncapped = ScoringRule {
            enable_vote_reward: true,
            vote_reward_points: 15,
            max_vote_reward: 0,
            ..Default::default()
        };
        assert!(uncapped.validate().is_ok());
    }

    #[test]
    fn test_all_violations_reported() {
        let rule = ScoringRule {
            name: " ".to_string(),
            base_points: -1,
            enable_modify_penalty: true,
            modify_penalty_points: -2,
            max_modify_penalty: -6,
            enable_time_reward: true,
            time_reward_hours: 0,
            ..Default::default()
        };
        let err = rule.validate().unwrap_err();
        assert_eq!(err.violations.len(), 5);
        assert!(err.to_string().starts_with("invalid scoring rule: name is required"));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let rule: ScoringRule =
            serde_json::from_str(r#"{"id": 3, "name": "cup", "enable_vote_reward": true}"#).unwrap();
        assert_eq!(rule.base_points, 10);
        assert_eq!(rule.max_vote_reward, 10);
        assert_eq!(rule.time_reward_hours, 24);
        assert!(rule.enable_vote_reward);
        assert!(!rule.enable_time_reward);
    }
}
