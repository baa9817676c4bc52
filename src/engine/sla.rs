use crate::model::*;

/// Outcome of an SLA check. `allowed_hours`/`actual_hours` are absent when
/// no rule covers the demand's (category, complexity) pair — the absence of
/// a rule is not a violation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaVerdict {
    pub breached: bool,
    pub allowed_hours: Option<f64>,
    pub actual_hours: Option<f64>,
}

impl SlaVerdict {
    pub const NO_RULE: SlaVerdict = SlaVerdict {
        breached: false,
        allowed_hours: None,
        actual_hours: None,
    };
}

/// Wall-clock hours this demand has been running: from execution start
/// (creation when never started) until completion, or `now` while open.
pub fn elapsed_hours(demand: &Demand, now: Ms) -> f64 {
    let start = demand.effective_start();
    let end = demand.finished_at.unwrap_or(now);
    (end - start) as f64 / HOUR_MS as f64
}

/// Check a demand against the configured time budgets. Side-effect-free and
/// advisory; the mutation layer consults it at completion time, report
/// consumers may call it on open demands as well.
pub fn evaluate(
    demand: &Demand,
    configs: &[SlaConfig],
    categories: &[Category],
    now: Ms,
) -> SlaVerdict {
    let Some(category) = categories.iter().find(|c| c.name == demand.category) else {
        return SlaVerdict::NO_RULE;
    };
    let Some(rule) = configs
        .iter()
        .find(|r| r.category_id == category.id && r.complexity == demand.complexity)
    else {
        return SlaVerdict::NO_RULE;
    };

    let actual = elapsed_hours(demand, now);
    SlaVerdict {
        breached: actual > rule.sla_hours as f64,
        allowed_hours: Some(rule.sla_hours as f64),
        actual_hours: Some(actual),
    }
}

/// Heuristic flag for in-execution items whose elapsed time already exceeds
/// their effort estimate times `buffer`. This is not the SLA check: it
/// needs no configured rule and never produces a verdict, only a hint.
pub fn at_risk(demand: &Demand, buffer: f64, now: Ms) -> bool {
    if demand.status != DemandStatus::InExecution {
        return false;
    }
    let Some(started_at) = demand.started_at else {
        return false;
    };
    let elapsed = (now - started_at) as f64 / HOUR_MS as f64;
    elapsed > demand.effort_hours as f64 * buffer
}
