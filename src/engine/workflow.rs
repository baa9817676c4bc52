use crate::model::*;

use super::EngineError;

/// The six workflow statuses in lifecycle order. `Archived` sits outside
/// the line and is handled by `archive`/`restore` only.
pub const LINEAR_ORDER: [DemandStatus; 6] = [
    DemandStatus::Intake,
    DemandStatus::Qualification,
    DemandStatus::Queued,
    DemandStatus::InExecution,
    DemandStatus::Validation,
    DemandStatus::Completed,
];

/// Next status on the line, clamped at `Completed`.
pub fn next_status(current: DemandStatus) -> DemandStatus {
    match LINEAR_ORDER.iter().position(|s| *s == current) {
        Some(idx) => LINEAR_ORDER[(idx + 1).min(LINEAR_ORDER.len() - 1)],
        None => current,
    }
}

/// Previous status on the line, clamped at `Intake`.
pub fn prev_status(current: DemandStatus) -> DemandStatus {
    match LINEAR_ORDER.iter().position(|s| *s == current) {
        Some(idx) => LINEAR_ORDER[idx.saturating_sub(1)],
        None => current,
    }
}

/// Apply a workflow transition between linear statuses.
///
/// Stamps `started_at` on the first entry into `InExecution` and
/// `finished_at` on entry into `Completed` (cleared again when the demand
/// leaves `Completed`), appends a transition record, and updates the
/// per-status timestamp. Archive and restore do not go through here.
pub fn apply_transition(
    demand: &Demand,
    target: DemandStatus,
    now: Ms,
) -> Result<Demand, EngineError> {
    let conflict = || EngineError::StateConflict {
        from: demand.status,
        to: target,
    };
    if demand.status == DemandStatus::Archived || target == DemandStatus::Archived {
        return Err(conflict());
    }
    if demand.status == target {
        return Err(conflict());
    }

    let mut next = demand.clone();
    if target == DemandStatus::InExecution && next.started_at.is_none() {
        next.started_at = Some(now);
    }
    next.finished_at = (target == DemandStatus::Completed).then_some(now);
    next.status = target;
    record_transition(&mut next, demand.status, target, now);
    Ok(next)
}

/// Move a demand into `Archived`. Requires a non-empty justification,
/// recorded as the cancellation reason plus a history entry.
pub fn archive(
    demand: &Demand,
    justification: &str,
    actor: &str,
    now: Ms,
) -> Result<Demand, EngineError> {
    if demand.status.is_terminal() {
        return Err(EngineError::StateConflict {
            from: demand.status,
            to: DemandStatus::Archived,
        });
    }
    let justification = justification.trim();
    if justification.is_empty() {
        return Err(EngineError::Validation("archiving requires a justification"));
    }

    let mut next = demand.clone();
    next.cancellation_reason = Some(justification.to_string());
    next.status = DemandStatus::Archived;
    record_transition(&mut next, demand.status, DemandStatus::Archived, now);
    next.history.push(HistoryEntry {
        at: now,
        kind: HistoryKind::Cancellation,
        detail: format!("Archived. Reason: {justification}"),
        actor: actor.to_string(),
    });
    Ok(next)
}

/// Bring an archived demand back into the queue, clearing its cancellation
/// reason and recording the restoration.
pub fn restore(demand: &Demand, actor: &str, now: Ms) -> Result<Demand, EngineError> {
    if demand.status != DemandStatus::Archived {
        return Err(EngineError::StateConflict {
            from: demand.status,
            to: DemandStatus::Queued,
        });
    }

    let mut next = demand.clone();
    next.cancellation_reason = None;
    next.status = DemandStatus::Queued;
    record_transition(&mut next, DemandStatus::Archived, DemandStatus::Queued, now);
    next.history.push(HistoryEntry {
        at: now,
        kind: HistoryKind::Restoration,
        detail: "Restored from archive to queue".to_string(),
        actor: actor.to_string(),
    });
    Ok(next)
}

fn record_transition(demand: &mut Demand, from: DemandStatus, to: DemandStatus, now: Ms) {
    demand.workflow_log.push(WorkflowEntry { from, to, at: now });
    demand.status_timestamps.insert(to, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::demand_fixture;

    #[test]
    fn stepping_clamps_at_both_ends() {
        assert_eq!(prev_status(DemandStatus::Intake), DemandStatus::Intake);
        assert_eq!(next_status(DemandStatus::Intake), DemandStatus::Qualification);
        assert_eq!(next_status(DemandStatus::Validation), DemandStatus::Completed);
        assert_eq!(next_status(DemandStatus::Completed), DemandStatus::Completed);
        assert_eq!(prev_status(DemandStatus::Completed), DemandStatus::Validation);
        // archived is not on the line
        assert_eq!(next_status(DemandStatus::Archived), DemandStatus::Archived);
    }

    #[test]
    fn first_execution_entry_stamps_start_once() {
        let d = demand_fixture();
        let d = apply_transition(&d, DemandStatus::InExecution, 500).unwrap();
        assert_eq!(d.started_at, Some(500));

        // step back and forward again — the stamp survives
        let d = apply_transition(&d, DemandStatus::Queued, 600).unwrap();
        let d = apply_transition(&d, DemandStatus::InExecution, 700).unwrap();
        assert_eq!(d.started_at, Some(500));
    }

    #[test]
    fn finished_at_tracks_completed_exactly() {
        let d = demand_fixture();
        let d = apply_transition(&d, DemandStatus::Completed, 900).unwrap();
        assert_eq!(d.finished_at, Some(900));
        assert_eq!(d.status_timestamps[&DemandStatus::Completed], 900);

        let d = apply_transition(&d, DemandStatus::Validation, 950).unwrap();
        assert_eq!(d.finished_at, None);
    }

    #[test]
    fn transition_appends_workflow_entry() {
        let d = demand_fixture();
        let d = apply_transition(&d, DemandStatus::Queued, 100).unwrap();
        let d = apply_transition(&d, DemandStatus::InExecution, 200).unwrap();
        assert_eq!(d.workflow_log.len(), 2);
        assert_eq!(
            d.workflow_log[1],
            WorkflowEntry {
                from: DemandStatus::Queued,
                to: DemandStatus::InExecution,
                at: 200
            }
        );
    }

    #[test]
    fn same_status_transition_is_a_conflict() {
        let d = demand_fixture();
        let result = apply_transition(&d, DemandStatus::Intake, 100);
        assert!(matches!(result, Err(EngineError::StateConflict { .. })));
    }

    #[test]
    fn archived_demands_do_not_transition() {
        let d = archive(&demand_fixture(), "scope dropped", "ana", 100).unwrap();
        let result = apply_transition(&d, DemandStatus::Queued, 200);
        assert!(matches!(result, Err(EngineError::StateConflict { .. })));
    }

    #[test]
    fn archive_requires_justification() {
        let d = demand_fixture();
        assert!(matches!(
            archive(&d, "   ", "ana", 100),
            Err(EngineError::Validation(_))
        ));

        let archived = archive(&d, "priorities changed", "ana", 100).unwrap();
        assert_eq!(archived.status, DemandStatus::Archived);
        assert_eq!(
            archived.cancellation_reason.as_deref(),
            Some("priorities changed")
        );
        assert_eq!(archived.history.len(), 1);
        assert_eq!(archived.history[0].kind, HistoryKind::Cancellation);
        assert_eq!(archived.status_timestamps[&DemandStatus::Archived], 100);
    }

    #[test]
    fn completed_demands_cannot_be_archived() {
        let d = apply_transition(&demand_fixture(), DemandStatus::Completed, 100).unwrap();
        assert!(matches!(
            archive(&d, "cleanup", "ana", 200),
            Err(EngineError::StateConflict { .. })
        ));
    }

    #[test]
    fn restore_returns_to_queue_and_clears_reason() {
        let d = archive(&demand_fixture(), "on hold", "ana", 100).unwrap();
        let history_before = d.history.len();

        let restored = restore(&d, "carlos", 200).unwrap();
        assert_eq!(restored.status, DemandStatus::Queued);
        assert_eq!(restored.cancellation_reason, None);
        assert_eq!(restored.history.len(), history_before + 1);
        assert_eq!(restored.history.last().unwrap().kind, HistoryKind::Restoration);
        assert_eq!(restored.status_timestamps[&DemandStatus::Queued], 200);
    }

    #[test]
    fn restore_rejects_non_archived() {
        let d = demand_fixture();
        assert!(matches!(
            restore(&d, "ana", 100),
            Err(EngineError::StateConflict { .. })
        ));
    }
}
