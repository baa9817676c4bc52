use chrono::{DateTime, Datelike, Utc, Weekday};

use crate::model::*;

// ── Capacity Aggregation ─────────────────────────────────────────
//
// Two deliberately separate load views coexist:
//
//  * the dynamic-range allocation, whose capacity is derived from the
//    working days inside an arbitrary window, and
//  * the weekly heatmap, whose capacity is a fixed number of hours per
//    person per 7-day bucket.
//
// They are not required to agree numerically. Both measure *demanded*
// load from each demand's naive interval, so overlapping demands of one
// person stack — unlike the FIFO projection, which serializes them.

/// Hours of work one day of effort represents.
const DAY_HOURS: f64 = 8.0;

/// Count Mon–Fri days touched by the span (the day containing `end` is not
/// counted, matching the half-open convention).
pub fn working_days(span: &Span) -> u32 {
    let Some(first) = DateTime::<Utc>::from_timestamp_millis(span.start) else {
        return 0;
    };
    let Some(last) = DateTime::<Utc>::from_timestamp_millis(span.end - 1) else {
        return 0;
    };
    let mut day = first.date_naive();
    let last = last.date_naive();
    let mut count = 0;
    while day <= last {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    count
}

/// Capacity of a window: 8h per working day, floored at 8h so degenerate
/// windows never divide by zero.
pub fn window_capacity_hours(window: &Span) -> f64 {
    (working_days(window) as f64 * DAY_HOURS).max(DAY_HOURS)
}

/// Hours of one demand's naive interval that fall inside the window.
fn overlap_hours(demand: &Demand, window: &Span) -> f64 {
    match demand.load_span().intersect(window) {
        Some(overlap) => overlap.duration_days() * DAY_HOURS,
        None => 0.0,
    }
}

/// Sum of windowed load over a person's queued/active demands.
fn person_load_hours(demands: &[Demand], person_id: ulid::Ulid, window: &Span) -> f64 {
    demands
        .iter()
        .filter(|d| d.person_id == person_id && d.status.carries_load())
        .map(|d| overlap_hours(d, window))
        .sum()
}

fn load_status(allocated: f64, capacity: f64) -> LoadStatus {
    if allocated > capacity {
        LoadStatus::Overloaded
    } else if allocated > capacity * 0.8 {
        LoadStatus::High
    } else {
        LoadStatus::Normal
    }
}

fn utilization_pct(allocated: f64, capacity: f64) -> u32 {
    (allocated / capacity * 100.0).round().min(100.0) as u32
}

/// Dynamic-range allocation: each person's windowed load against the
/// window's own working-day capacity, busiest first.
pub fn allocation(
    demands: &[Demand],
    people: &[Person],
    coordinations: &[Coordination],
    window: &Span,
) -> Vec<PersonAllocation> {
    let capacity = window_capacity_hours(window);

    let mut rows: Vec<PersonAllocation> = people
        .iter()
        .map(|person| {
            let allocated = person_load_hours(demands, person.id, window).round();
            let coordination = coordinations
                .iter()
                .find(|c| c.id == person.coordination_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            PersonAllocation {
                person_id: person.id,
                name: person.name.clone(),
                coordination,
                capacity_hours: capacity,
                allocated_hours: allocated,
                available_hours: (capacity - allocated).max(0.0),
                utilization_pct: utilization_pct(allocated, capacity),
                status: load_status(allocated, capacity),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.utilization_pct
            .cmp(&a.utilization_pct)
            .then(a.person_id.cmp(&b.person_id))
    });
    rows
}

/// Roll person allocations up per coordination: loads and capacities are
/// summed before the ratio is taken, never averaged.
pub fn team_allocation(
    rows: &[PersonAllocation],
    people: &[Person],
    coordinations: &[Coordination],
) -> Vec<TeamAllocation> {
    coordinations
        .iter()
        .filter_map(|coordination| {
            let member_ids: Vec<ulid::Ulid> = people
                .iter()
                .filter(|p| p.coordination_id == coordination.id)
                .map(|p| p.id)
                .collect();
            if member_ids.is_empty() {
                return None;
            }
            let members = rows.iter().filter(|r| member_ids.contains(&r.person_id));
            let (mut allocated, mut capacity) = (0.0, 0.0);
            for row in members {
                allocated += row.allocated_hours;
                capacity += row.capacity_hours;
            }
            Some(TeamAllocation {
                coordination_id: coordination.id,
                name: coordination.name.clone(),
                capacity_hours: capacity,
                allocated_hours: allocated,
                utilization_pct: utilization_pct(allocated, capacity),
                status: load_status(allocated, capacity),
            })
        })
        .collect()
}

/// Occupancy band for a heatmap cell.
pub fn load_band(load: f64, capacity: f64) -> LoadBand {
    if capacity <= 0.0 || load == 0.0 {
        return LoadBand::Empty;
    }
    let ratio = load / capacity;
    if ratio < 0.5 {
        LoadBand::Low
    } else if ratio <= 0.9 {
        LoadBand::Optimal
    } else if ratio <= 1.1 {
        LoadBand::High
    } else {
        LoadBand::Overloaded
    }
}

/// Weekly heatmap over `span`: 7-day buckets from the span start, load per
/// person per bucket, rolled up per coordination (coordinations without
/// people are skipped), plus a grand-total series. Capacity for a cell is
/// `weekly_hours` per person; band classification is the consumer's call
/// via [`load_band`].
pub fn weekly_heatmap(
    demands: &[Demand],
    people: &[Person],
    coordinations: &[Coordination],
    span: &Span,
) -> Heatmap {
    let mut weeks = Vec::new();
    let mut current = span.start;
    while current < span.end {
        weeks.push(Span::new(current, current + 7 * DAY_MS));
        current += 7 * DAY_MS;
    }

    let mut rollups: Vec<CoordinationSeries> = Vec::new();
    for coordination in coordinations {
        let members: Vec<&Person> = people
            .iter()
            .filter(|p| p.coordination_id == coordination.id)
            .collect();
        if members.is_empty() {
            continue;
        }

        let mut coordination_hours = vec![0.0; weeks.len()];
        let mut rows = Vec::with_capacity(members.len());
        for person in members {
            let hours: Vec<f64> = weeks
                .iter()
                .map(|week| person_load_hours(demands, person.id, week))
                .collect();
            for (total, h) in coordination_hours.iter_mut().zip(&hours) {
                *total += h;
            }
            rows.push(PersonSeries {
                person_id: person.id,
                name: person.name.clone(),
                hours,
            });
        }
        rollups.push(CoordinationSeries {
            coordination_id: coordination.id,
            name: coordination.name.clone(),
            hours: coordination_hours,
            people: rows,
        });
    }

    let totals = (0..weeks.len())
        .map(|idx| rollups.iter().map(|c| c.hours[idx]).sum())
        .collect();

    Heatmap {
        weeks,
        coordinations: rollups,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::demand_fixture;
    use ulid::Ulid;

    // 2024-01-01 00:00 UTC, a Monday.
    const MONDAY: Ms = 1_704_067_200_000;

    fn carrying(person_id: Ulid, start: Ms, effort_hours: u32) -> Demand {
        let mut d = demand_fixture();
        d.person_id = person_id;
        d.created_at = start;
        d.effort_hours = effort_hours;
        d.status = DemandStatus::Queued;
        d
    }

    fn person(coordination_id: Ulid, name: &str) -> Person {
        Person {
            id: Ulid::new(),
            name: name.into(),
            role: "dev".into(),
            coordination_id,
            email: String::new(),
        }
    }

    fn coordination(name: &str) -> Coordination {
        Coordination {
            id: Ulid::new(),
            name: name.into(),
            description: String::new(),
        }
    }

    #[test]
    fn working_days_single_week() {
        assert_eq!(working_days(&Span::new(MONDAY, MONDAY + 7 * DAY_MS)), 5);
    }

    #[test]
    fn working_days_weekend_only() {
        let saturday = MONDAY + 5 * DAY_MS;
        assert_eq!(working_days(&Span::new(saturday, saturday + 2 * DAY_MS)), 0);
    }

    #[test]
    fn working_days_single_weekday() {
        assert_eq!(working_days(&Span::new(MONDAY, MONDAY + DAY_MS)), 1);
    }

    #[test]
    fn degenerate_window_capacity_floors_at_one_day() {
        let saturday = MONDAY + 5 * DAY_MS;
        assert_eq!(window_capacity_hours(&Span::new(saturday, saturday + DAY_MS)), 8.0);
    }

    #[test]
    fn empty_window_has_zero_load_and_zero_utilization() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let window = Span::new(MONDAY, MONDAY + 7 * DAY_MS);

        let rows = allocation(&[], &[p], &[coord], &window);
        assert_eq!(rows[0].allocated_hours, 0.0);
        assert_eq!(rows[0].utilization_pct, 0);
        assert_eq!(rows[0].status, LoadStatus::Normal);
    }

    #[test]
    fn fully_covered_demand_contributes_its_effort() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let window = Span::new(MONDAY, MONDAY + 14 * DAY_MS);
        let demands = vec![carrying(p.id, MONDAY, 40)]; // 5 days → 40h

        let rows = allocation(&demands, std::slice::from_ref(&p), &[coord], &window);
        assert_eq!(rows[0].allocated_hours, 40.0);
        assert_eq!(rows[0].capacity_hours, 80.0); // 10 working days
        assert_eq!(rows[0].utilization_pct, 50);
    }

    #[test]
    fn partial_overlap_is_prorated() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        // demand runs 4 days, window catches the last 2
        let demands = vec![carrying(p.id, MONDAY, 32)];
        let window = Span::new(MONDAY + 2 * DAY_MS, MONDAY + 14 * DAY_MS);

        let rows = allocation(&demands, &[p], &[coord], &window);
        assert_eq!(rows[0].allocated_hours, 16.0);
    }

    #[test]
    fn overlapping_demands_stack_for_one_person() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let window = Span::new(MONDAY, MONDAY + 7 * DAY_MS);
        // both run in the same days — demanded load, not a schedule
        let demands = vec![carrying(p.id, MONDAY, 16), carrying(p.id, MONDAY, 16)];

        let rows = allocation(&demands, &[p], &[coord], &window);
        assert_eq!(rows[0].allocated_hours, 32.0);
    }

    #[test]
    fn utilization_is_capped_at_100() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let window = Span::new(MONDAY, MONDAY + 7 * DAY_MS); // 40h capacity
        let demands = vec![carrying(p.id, MONDAY, 96)];

        let rows = allocation(&demands, &[p], &[coord], &window);
        assert!(rows[0].allocated_hours > rows[0].capacity_hours);
        assert_eq!(rows[0].utilization_pct, 100);
        assert_eq!(rows[0].status, LoadStatus::Overloaded);
        assert_eq!(rows[0].available_hours, 0.0);
    }

    #[test]
    fn busiest_person_sorts_first() {
        let coord = coordination("Tech");
        let idle = person(coord.id, "Idle");
        let busy = person(coord.id, "Busy");
        let window = Span::new(MONDAY, MONDAY + 7 * DAY_MS);
        let demands = vec![carrying(busy.id, MONDAY, 24)];

        let rows = allocation(&demands, &[idle.clone(), busy.clone()], &[coord], &window);
        assert_eq!(rows[0].person_id, busy.id);
        assert_eq!(rows[1].person_id, idle.id);
    }

    #[test]
    fn team_rollup_sums_loads_and_capacities() {
        let coord = coordination("Tech");
        let a = person(coord.id, "Ana");
        let b = person(coord.id, "Bia");
        let window = Span::new(MONDAY, MONDAY + 7 * DAY_MS);
        let demands = vec![carrying(a.id, MONDAY, 40), carrying(b.id, MONDAY, 24)];
        let people = vec![a, b];

        let rows = allocation(&demands, &people, std::slice::from_ref(&coord), &window);
        let teams = team_allocation(&rows, &people, &[coord]);
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].allocated_hours, 64.0);
        assert_eq!(teams[0].capacity_hours, 80.0);
        assert_eq!(teams[0].utilization_pct, 80);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(load_band(0.0, 40.0), LoadBand::Empty);
        assert_eq!(load_band(19.9, 40.0), LoadBand::Low);
        assert_eq!(load_band(20.0, 40.0), LoadBand::Optimal);
        assert_eq!(load_band(36.0, 40.0), LoadBand::Optimal); // 90% inclusive
        assert_eq!(load_band(36.1, 40.0), LoadBand::High);
        assert_eq!(load_band(44.0, 40.0), LoadBand::High); // 110% inclusive
        assert_eq!(load_band(44.1, 40.0), LoadBand::Overloaded);
    }

    #[test]
    fn heatmap_buckets_and_totals() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let span = Span::new(MONDAY, MONDAY + 21 * DAY_MS);
        // 2 days in week one only
        let demands = vec![carrying(p.id, MONDAY, 16)];

        let map = weekly_heatmap(&demands, std::slice::from_ref(&p), std::slice::from_ref(&coord), &span);
        assert_eq!(map.weeks.len(), 3);
        assert_eq!(map.coordinations.len(), 1);
        assert_eq!(map.coordinations[0].people[0].hours, vec![16.0, 0.0, 0.0]);
        assert_eq!(map.coordinations[0].hours, map.totals);
    }

    #[test]
    fn heatmap_splits_load_across_bucket_boundary() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let span = Span::new(MONDAY, MONDAY + 14 * DAY_MS);
        // 10 days of work starting mid-week-one: 7 days in week 1, 3 in week 2
        let demands = vec![carrying(p.id, MONDAY, 80)];

        let map = weekly_heatmap(&demands, &[p], &[coord], &span);
        assert_eq!(map.totals, vec![56.0, 24.0]);
    }

    #[test]
    fn heatmap_skips_empty_coordinations() {
        let staffed = coordination("Tech");
        let empty = coordination("Ghost");
        let p = person(staffed.id, "Ana");

        let span = Span::new(MONDAY, MONDAY + 7 * DAY_MS);
        let map = weekly_heatmap(&[], &[p], &[staffed, empty], &span);
        assert_eq!(map.coordinations.len(), 1);
        assert_eq!(map.coordinations[0].name, "Tech");
    }

    #[test]
    fn rerunning_the_aggregation_is_idempotent() {
        let coord = coordination("Tech");
        let p = person(coord.id, "Ana");
        let window = Span::new(MONDAY, MONDAY + 7 * DAY_MS);
        let demands = vec![carrying(p.id, MONDAY, 20), carrying(p.id, MONDAY + DAY_MS, 12)];
        let people = vec![p];
        let coords = vec![coord];

        assert_eq!(
            allocation(&demands, &people, &coords, &window),
            allocation(&demands, &people, &coords, &window)
        );
        assert_eq!(
            weekly_heatmap(&demands, &people, &coords, &window),
            weekly_heatmap(&demands, &people, &coords, &window)
        );
    }
}
