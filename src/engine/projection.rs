use ulid::Ulid;

use crate::model::*;

// ── FIFO Projection ──────────────────────────────────────────────
//
// Single-resource, single-queue simulation: one unit of assignee capacity
// services exactly one demand at a time. Completed work keeps its actual
// interval, active work runs from its start stamp, and everything pending
// is laid end-to-end behind a cursor in arrival order. The result is
// deterministic and order-preserving; it does not model partial
// availability, holidays, or multi-tasking.

/// Simulate one assignee's timeline. Entries come back in FIFO order
/// (`created_at` ascending, stable on ties); pending-derived intervals are
/// tagged `projected`.
pub fn project_for_person(demands: &[Demand], person_id: Ulid, now: Ms) -> Vec<ScheduledDemand> {
    let mut mine: Vec<&Demand> = demands
        .iter()
        .filter(|d| d.person_id == person_id && d.status != DemandStatus::Archived)
        .collect();
    mine.sort_by_key(|d| d.created_at); // stable: ties keep input order

    // The cursor starts at `now` and must clear every active interval
    // before any pending work may be placed.
    let mut cursor = now;
    for d in &mine {
        if d.status.is_active() {
            let span = active_span(d, now);
            cursor = cursor.max(span.end);
        }
    }

    mine.iter()
        .map(|d| match d.status {
            DemandStatus::Completed => ScheduledDemand {
                demand_id: d.id,
                span: completed_span(d),
                projected: false,
            },
            DemandStatus::InExecution | DemandStatus::Validation => ScheduledDemand {
                demand_id: d.id,
                span: active_span(d, now),
                projected: false,
            },
            _ => {
                let start = cursor;
                let end = start + d.planned_duration_ms();
                cursor = end;
                ScheduledDemand {
                    demand_id: d.id,
                    span: Span::new(start, end),
                    projected: true,
                }
            }
        })
        .collect()
}

/// Timeline rows for every assignee, clipped to a viewing window. Rows with
/// no interval touching the window are dropped.
pub fn project_window(
    demands: &[Demand],
    people: &[Person],
    window: &Span,
    now: Ms,
) -> Vec<PersonSchedule> {
    people
        .iter()
        .filter_map(|person| {
            let entries: Vec<ScheduledDemand> = project_for_person(demands, person.id, now)
                .into_iter()
                .filter(|entry| entry.span.overlaps(window))
                .collect();
            (!entries.is_empty()).then(|| PersonSchedule {
                person_id: person.id,
                entries,
            })
        })
        .collect()
}

/// Fixed interval of finished work, at least one day wide.
fn completed_span(demand: &Demand) -> Span {
    let start = demand.effective_start();
    let end = demand.finished_at.unwrap_or(start);
    Span::new(start, end.max(start + DAY_MS))
}

/// Interval of work in flight: planned duration from the start stamp, but
/// never ending in the past relative to `now`.
fn active_span(demand: &Demand, now: Ms) -> Span {
    let start = demand.effective_start();
    let end = start + demand.planned_duration_ms();
    Span::new(start, end.max(now).max(start + 1))
}
