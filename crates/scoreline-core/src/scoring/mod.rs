//! Scoring rule engine.
//!
//! A pure function from (prediction, finished match, optional rule) to a
//! [`ScoreBreakdown`]. Nothing in this module performs I/O or returns an error:
//! rules are validated before activation, and totals are clamped at zero.
//!
//! - [`rule`]: `ScoringRule` weights, defaults and validation
//! - [`calculator`]: breakdown computation
//! - [`outcome`]: accuracy classification, popularity bonus, per-match results

pub mod calculator;
pub mod outcome;
pub mod rule;

pub use calculator::{ScoreBreakdown, calculate};
pub use outcome::{
    MatchPointsCalculation, PointsCalculationResult, PopularityBonus, PredictionAccuracy,
    points_reason,
};
pub use rule::{RuleValidationError, RuleViolation, ScoringRule};
