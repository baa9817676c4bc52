use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use ulid::Ulid;

use crate::model::*;

use super::{capacity, projection, sla, Engine, EngineError};

impl Engine {
    /// Open demands assigned to one person, snapshot order.
    pub fn demands_for_person(&self, person_id: Ulid) -> Vec<Demand> {
        self.snapshot()
            .into_iter()
            .filter(|d| d.person_id == person_id && d.status.is_open())
            .collect()
    }

    /// Demands currently in an active state.
    pub fn wip_count(&self) -> usize {
        self.snapshot().iter().filter(|d| d.status.is_active()).count()
    }

    /// Mean days from creation to completion over finished demands.
    pub fn avg_lead_time_days(&self) -> f64 {
        mean_days(&self.snapshot(), |d| d.created_at)
    }

    /// Mean days from execution start to completion over finished demands.
    pub fn avg_cycle_time_days(&self) -> f64 {
        mean_days(&self.snapshot(), Demand::effective_start)
    }

    /// Share of completed demands delivered without a recorded delay.
    pub fn on_time_percentage(&self) -> f64 {
        let snapshot = self.snapshot();
        let completed: Vec<&Demand> = snapshot
            .iter()
            .filter(|d| d.status == DemandStatus::Completed)
            .collect();
        if completed.is_empty() {
            return 0.0;
        }
        let on_time = completed
            .iter()
            .filter(|d| d.delay_justification.is_none())
            .count();
        on_time as f64 / completed.len() as f64 * 100.0
    }

    /// The delay report: demands delivered past SLA (they carry a delay
    /// justification), plus in-execution items flagged by the at-risk
    /// buffer heuristic. At-risk items come first.
    pub fn late_deliveries(&self, now: Ms) -> Vec<LateDelivery> {
        let snapshot = self.snapshot();
        let mut out: Vec<LateDelivery> = snapshot
            .iter()
            .filter(|d| sla::at_risk(d, self.config.at_risk_buffer, now))
            .map(|d| LateDelivery {
                demand: d.clone(),
                projected: true,
            })
            .collect();
        out.extend(
            snapshot
                .iter()
                .filter(|d| {
                    d.status == DemandStatus::Completed
                        && d.delay_justification
                            .as_deref()
                            .is_some_and(|j| !j.is_empty())
                })
                .map(|d| LateDelivery {
                    demand: d.clone(),
                    projected: false,
                }),
        );
        out
    }

    /// SLA verdict for one demand against the configured rules.
    pub async fn sla_verdict(&self, id: Ulid, now: Ms) -> Result<sla::SlaVerdict, EngineError> {
        let demand = self.current(id)?;
        let categories = self.categories.read().await;
        let configs = self.sla_configs.read().await;
        Ok(sla::evaluate(&demand, &configs, &categories, now))
    }

    /// FIFO timeline rows for all assignees, clipped to `window`.
    pub async fn schedule(&self, window: &Span, now: Ms) -> Vec<PersonSchedule> {
        let people = self.people.read().await;
        projection::project_window(&self.snapshot(), &people, window, now)
    }

    /// Dynamic-range allocation per person over `window`.
    pub async fn allocation(&self, window: &Span) -> Vec<PersonAllocation> {
        let people = self.people.read().await;
        let coordinations = self.coordinations.read().await;
        capacity::allocation(&self.snapshot(), &people, &coordinations, window)
    }

    /// Dynamic-range allocation rolled up per coordination.
    pub async fn team_allocation(&self, window: &Span) -> Vec<TeamAllocation> {
        let people = self.people.read().await;
        let coordinations = self.coordinations.read().await;
        let rows = capacity::allocation(&self.snapshot(), &people, &coordinations, window);
        capacity::team_allocation(&rows, &people, &coordinations)
    }

    /// Weekly load heatmap over `span`. Cell banding against the fixed
    /// weekly capacity is the consumer's call via [`capacity::load_band`]
    /// and `config.weekly_hours`.
    pub async fn weekly_heatmap(&self, span: &Span) -> Heatmap {
        let people = self.people.read().await;
        let coordinations = self.coordinations.read().await;
        capacity::weekly_heatmap(&self.snapshot(), &people, &coordinations, span)
    }

    /// Deadline suggestion for new work: everything already queued for the
    /// assignee plus the new effort, in 8h days, stretched by the deadline
    /// buffer.
    pub fn suggest_deadline(&self, person_id: Ulid, effort_hours: u32, now: Ms) -> Ms {
        let queue_hours: u32 = self
            .demands_for_person(person_id)
            .iter()
            .map(|d| d.effort_hours)
            .sum();
        let days_to_finish = (queue_hours as f64 + effort_hours as f64) / 8.0;
        let buffered_days = (days_to_finish * self.config.deadline_buffer).ceil() as Ms;
        now + buffered_days * DAY_MS
    }

    /// Month-by-month closure summary: completions bucketed by finish
    /// date, archivals by archive date, with lead/cycle averages and the
    /// late share per bucket.
    pub fn monthly_summary(&self) -> Vec<MonthlySummary> {
        #[derive(Default)]
        struct Acc {
            finished: u32,
            archived: u32,
            late: u32,
            lead_days_sum: f64,
            cycle_days_sum: f64,
        }

        let mut buckets: BTreeMap<(i32, u32), Acc> = BTreeMap::new();
        for demand in self.snapshot() {
            if demand.status == DemandStatus::Completed
                && let Some(finished_at) = demand.finished_at
                && let Some(key) = month_key(finished_at)
            {
                let acc = buckets.entry(key).or_default();
                acc.finished += 1;
                if demand.delay_justification.is_some() {
                    acc.late += 1;
                }
                acc.lead_days_sum += (finished_at - demand.created_at) as f64 / DAY_MS as f64;
                acc.cycle_days_sum +=
                    (finished_at - demand.effective_start()) as f64 / DAY_MS as f64;
            }
            if demand.status == DemandStatus::Archived
                && let Some(archived_at) = demand.status_timestamps.get(&DemandStatus::Archived)
                && let Some(key) = month_key(*archived_at)
            {
                buckets.entry(key).or_default().archived += 1;
            }
        }

        buckets
            .into_iter()
            .map(|((year, month), acc)| {
                let finished = acc.finished as f64;
                MonthlySummary {
                    year,
                    month,
                    finished: acc.finished,
                    archived: acc.archived,
                    late: acc.late,
                    late_pct: if acc.finished > 0 {
                        acc.late as f64 / finished * 100.0
                    } else {
                        0.0
                    },
                    avg_lead_time_days: if acc.finished > 0 {
                        acc.lead_days_sum / finished
                    } else {
                        0.0
                    },
                    avg_cycle_time_days: if acc.finished > 0 {
                        acc.cycle_days_sum / finished
                    } else {
                        0.0
                    },
                }
            })
            .collect()
    }
}

fn month_key(at: Ms) -> Option<(i32, u32)> {
    let dt = DateTime::<Utc>::from_timestamp_millis(at)?;
    Some((dt.year(), dt.month()))
}

fn mean_days(demands: &[Demand], start_of: impl Fn(&Demand) -> Ms) -> f64 {
    let finished: Vec<f64> = demands
        .iter()
        .filter(|d| d.status == DemandStatus::Completed)
        .filter_map(|d| {
            d.finished_at
                .map(|end| (end - start_of(d)) as f64 / DAY_MS as f64)
        })
        .collect();
    if finished.is_empty() {
        return 0.0;
    }
    finished.iter().sum::<f64>() / finished.len() as f64
}
