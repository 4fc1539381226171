//! Synthesized columns: `duration` and liveness-aware `status`
//!
//! Both are computed inside the pipeline, ahead of the match stage, so a
//! filter or sort on them sees the derived value.

use chrono::{DateTime, Utc};

use super::fields;
use super::projection::SyntheticRequirements;
use crate::pipeline::{Expr, Stage};
use crate::run::RunStatus;

/// `heartbeat - start_time`, in milliseconds; null if either is absent.
#[must_use]
pub fn duration_expr() -> Expr {
    Expr::subtract(Expr::field(fields::HEARTBEAT), Expr::field(fields::START_TIME))
}

/// Stored status, or `PROBABLY_DEAD` for a running run whose last sign of
/// life (heartbeat, else start time) is older than `threshold_ms` at `now`.
#[must_use]
pub fn status_expr(now: DateTime<Utc>, threshold_ms: i64) -> Expr {
    let last_seen = Expr::if_null(Expr::field(fields::HEARTBEAT), Expr::field(fields::START_TIME));
    let stale = Expr::And(vec![
        Expr::eq(Expr::field(fields::STATUS), Expr::lit(RunStatus::Running.as_str())),
        Expr::gt(Expr::subtract(Expr::Timestamp(now), last_seen), Expr::lit(threshold_ms)),
    ]);
    Expr::cond(
        stale,
        Expr::lit(RunStatus::ProbablyDead.as_str()),
        Expr::field(fields::STATUS),
    )
}

/// Stage computing the required synthetic columns, if any.
#[must_use]
pub fn synthetic_stage(
    requirements: SyntheticRequirements,
    now: DateTime<Utc>,
    threshold_ms: i64,
) -> Option<Stage> {
    let mut computed = Vec::new();
    if requirements.duration {
        computed.push((fields::DURATION.to_string(), duration_expr()));
    }
    if requirements.status {
        computed.push((fields::STATUS.to_string(), status_expr(now, threshold_ms)));
    }
    (!computed.is_empty()).then_some(Stage::AddFields(computed))
}
