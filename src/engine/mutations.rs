use std::collections::BTreeMap;
use std::time::Instant;

use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    MUTATIONS_TOTAL, MUTATION_DURATION_SECONDS, ROLLBACKS_TOTAL, SLA_BREACHES_TOTAL,
};

use super::{sla, workflow, Engine, EngineError};

// ── Optimistic Mutation Coordinator ──────────────────────────────
//
// Every write follows the same shape: validate (nothing touched on
// rejection), apply to the local snapshot so readers observe the change
// immediately, then await the persistence collaborator. A remote failure
// restores the exact pre-call entry — the mutation either fully commits
// or fully rolls back, multi-field edits included. There is no
// cancellation: once the remote call is in flight it runs to completion,
// and concurrent mutations of one entity resolve last-write-wins.

impl Engine {
    pub async fn create_demand(
        &self,
        input: NewDemand,
        actor: &str,
        now: Ms,
    ) -> Result<Demand, EngineError> {
        let title = input.title.trim();
        if title.chars().count() < 3 {
            return Err(EngineError::Validation("title must have at least 3 characters"));
        }
        if input.effort_hours > 10_000 {
            return Err(EngineError::Validation("effort must be at most 10000 hours"));
        }
        self.check_references(
            input.person_id,
            input.coordination_id,
            input.requester_area_id,
        )
        .await?;

        let kind = input
            .kind
            .unwrap_or_else(|| DemandKind::classify(&input.title, &input.description));
        let category = if input.category.trim().is_empty() {
            "General".to_string()
        } else {
            input.category
        };

        let demand = Demand {
            id: Ulid::new(),
            title: title.to_string(),
            description: input.description,
            category,
            kind,
            complexity: input.complexity,
            effort_hours: input.effort_hours,
            person_id: input.person_id,
            coordination_id: input.coordination_id,
            requester_name: input.requester_name,
            requester_area_id: input.requester_area_id,
            status: DemandStatus::Intake,
            is_priority: false,
            agreed_deadline: input.agreed_deadline,
            created_at: now,
            started_at: None,
            finished_at: None,
            delivery_summary: None,
            delay_justification: None,
            cancellation_reason: None,
            workflow_log: Vec::new(),
            history: vec![HistoryEntry {
                at: now,
                kind: HistoryKind::Creation,
                detail: "Demand created".to_string(),
                actor: actor.to_string(),
            }],
            status_timestamps: BTreeMap::from([(DemandStatus::Intake, now)]),
        };

        self.commit_create("create", demand).await
    }

    /// Replace the descriptive and relational fields, preserving status,
    /// stamps, and logs. Title and effort changes are summarized in an
    /// edit history entry; an edit that changes neither stays silent.
    pub async fn update_demand(
        &self,
        id: Ulid,
        edit: DemandEdit,
        actor: &str,
        now: Ms,
    ) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;

        let title = edit.title.trim();
        if title.chars().count() < 3 {
            return Err(EngineError::Validation("title must have at least 3 characters"));
        }
        if edit.effort_hours > 10_000 {
            return Err(EngineError::Validation("effort must be at most 10000 hours"));
        }
        self.check_references(edit.person_id, edit.coordination_id, edit.requester_area_id)
            .await?;

        let mut changes: Vec<String> = Vec::new();
        if demand.title != title {
            changes.push("title changed".to_string());
        }
        if demand.effort_hours != edit.effort_hours {
            changes.push(format!(
                "effort: {}h -> {}h",
                demand.effort_hours, edit.effort_hours
            ));
        }

        let mut updated = demand;
        updated.title = title.to_string();
        updated.description = edit.description;
        updated.category = edit.category;
        updated.kind = edit.kind;
        updated.complexity = edit.complexity;
        updated.effort_hours = edit.effort_hours;
        updated.person_id = edit.person_id;
        updated.coordination_id = edit.coordination_id;
        updated.requester_name = edit.requester_name;
        updated.requester_area_id = edit.requester_area_id;
        updated.agreed_deadline = edit.agreed_deadline;
        if !changes.is_empty() {
            updated.history.push(HistoryEntry {
                at: now,
                kind: HistoryKind::Edit,
                detail: changes.join("; "),
                actor: actor.to_string(),
            });
        }

        self.commit_update("update", updated).await
    }

    pub async fn delete_demand(&self, id: Ulid) -> Result<(), EngineError> {
        self.commit_delete("delete", id).await
    }

    /// Move a demand to another workflow status. Completion and archival
    /// carry extra obligations and go through `complete`/`archive`.
    pub async fn set_status(
        &self,
        id: Ulid,
        target: DemandStatus,
        now: Ms,
    ) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        if target == DemandStatus::Completed {
            return Err(EngineError::Validation(
                "completing a demand requires a delivery summary",
            ));
        }
        if target == DemandStatus::Archived {
            return Err(EngineError::Validation("archiving requires a justification"));
        }
        let updated = workflow::apply_transition(&demand, target, now)?;
        self.commit_update("set_status", updated).await
    }

    /// Step forward on the linear workflow. Clamped: advancing a completed
    /// demand is a no-op, not an error.
    pub async fn advance_status(&self, id: Ulid, now: Ms) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        if demand.status == DemandStatus::Archived {
            return Err(EngineError::StateConflict {
                from: DemandStatus::Archived,
                to: DemandStatus::Archived,
            });
        }
        let target = workflow::next_status(demand.status);
        if target == demand.status {
            return Ok(demand);
        }
        if target == DemandStatus::Completed {
            return Err(EngineError::Validation(
                "completing a demand requires a delivery summary",
            ));
        }
        let updated = workflow::apply_transition(&demand, target, now)?;
        self.commit_update("advance_status", updated).await
    }

    /// Step backward on the linear workflow, clamped at intake.
    pub async fn retreat_status(&self, id: Ulid, now: Ms) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        if demand.status == DemandStatus::Archived {
            return Err(EngineError::StateConflict {
                from: DemandStatus::Archived,
                to: DemandStatus::Archived,
            });
        }
        let target = workflow::prev_status(demand.status);
        if target == demand.status {
            return Ok(demand);
        }
        let updated = workflow::apply_transition(&demand, target, now)?;
        self.commit_update("retreat_status", updated).await
    }

    /// Complete a demand. Requires a delivery summary; when the SLA
    /// evaluator reports a breach, a delay justification as well. The
    /// status change, outcome fields, and history entries commit or roll
    /// back as one unit.
    pub async fn complete(
        &self,
        id: Ulid,
        delivery_summary: &str,
        delay_justification: Option<&str>,
        actor: &str,
        now: Ms,
    ) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        let summary = delivery_summary.trim();
        if summary.is_empty() {
            return Err(EngineError::Validation(
                "completing a demand requires a delivery summary",
            ));
        }

        let verdict = {
            let categories = self.categories.read().await;
            let configs = self.sla_configs.read().await;
            sla::evaluate(&demand, &configs, &categories, now)
        };
        let justification = delay_justification.map(str::trim).filter(|j| !j.is_empty());
        if verdict.breached && justification.is_none() {
            return Err(EngineError::Validation(
                "late completion requires a delay justification",
            ));
        }

        let mut updated = workflow::apply_transition(&demand, DemandStatus::Completed, now)?;
        updated.delivery_summary = Some(summary.to_string());
        let short: String = summary.chars().take(50).collect();
        updated.history.push(HistoryEntry {
            at: now,
            kind: HistoryKind::Completion,
            detail: format!("Delivered. {short}"),
            actor: actor.to_string(),
        });

        if verdict.breached
            && let Some(justification) = justification
        {
            updated.delay_justification = Some(justification.to_string());
            let actual = verdict.actual_hours.unwrap_or_default();
            let allowed = verdict.allowed_hours.unwrap_or_default();
            updated.history.push(HistoryEntry {
                at: now,
                kind: HistoryKind::Completion,
                detail: format!(
                    "SLA exceeded ({actual:.0}h vs {allowed:.0}h). Justification: {justification}"
                ),
                actor: actor.to_string(),
            });
            metrics::counter!(SLA_BREACHES_TOTAL).increment(1);
            tracing::warn!(demand = %id, actual, allowed, "completed past SLA");
        }

        self.commit_update("complete", updated).await
    }

    /// Archive (soft-delete) a demand with a mandatory justification.
    pub async fn archive(
        &self,
        id: Ulid,
        justification: &str,
        actor: &str,
        now: Ms,
    ) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        let updated = workflow::archive(&demand, justification, actor, now)?;
        self.commit_update("archive", updated).await
    }

    /// Bring an archived demand back to the queue.
    pub async fn restore(&self, id: Ulid, actor: &str, now: Ms) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        let updated = workflow::restore(&demand, actor, now)?;
        self.commit_update("restore", updated).await
    }

    /// Flip the priority flag. Not a workflow transition: works in any
    /// status and only touches the flag plus the history log.
    pub async fn toggle_priority(
        &self,
        id: Ulid,
        actor: &str,
        now: Ms,
    ) -> Result<Demand, EngineError> {
        let demand = self.current(id)?;
        let mut updated = demand;
        updated.is_priority = !updated.is_priority;
        updated.history.push(HistoryEntry {
            at: now,
            kind: HistoryKind::Prioritization,
            detail: if updated.is_priority {
                "Marked as priority".to_string()
            } else {
                "Removed from priority".to_string()
            },
            actor: actor.to_string(),
        });
        self.commit_update("toggle_priority", updated).await
    }

    // ── Commit/rollback plumbing ─────────────────────────────────

    async fn commit_create(&self, op: &'static str, demand: Demand) -> Result<Demand, EngineError> {
        let started = Instant::now();
        self.demands.insert(demand.id, demand.clone());
        match self.persistence.create_demand(&demand).await {
            Ok(_) => {
                finish(op, started);
                tracing::info!(demand = %demand.id, "demand created");
                Ok(demand)
            }
            Err(e) => {
                self.demands.remove(&demand.id);
                rollback(op, started, &e.to_string());
                Err(EngineError::Persistence(e.to_string()))
            }
        }
    }

    async fn commit_update(&self, op: &'static str, updated: Demand) -> Result<Demand, EngineError> {
        let started = Instant::now();
        let prev = self.demands.insert(updated.id, updated.clone());
        match self.persistence.update_demand(&updated).await {
            Ok(_) => {
                finish(op, started);
                Ok(updated)
            }
            Err(e) => {
                match prev {
                    Some(prev) => {
                        self.demands.insert(updated.id, prev);
                    }
                    None => {
                        self.demands.remove(&updated.id);
                    }
                }
                rollback(op, started, &e.to_string());
                Err(EngineError::Persistence(e.to_string()))
            }
        }
    }

    async fn commit_delete(&self, op: &'static str, id: Ulid) -> Result<(), EngineError> {
        let started = Instant::now();
        let Some((_, prev)) = self.demands.remove(&id) else {
            return Err(EngineError::NotFound(id));
        };
        match self.persistence.delete_demand(id).await {
            Ok(()) => {
                finish(op, started);
                tracing::info!(demand = %id, "demand deleted");
                Ok(())
            }
            Err(e) => {
                self.demands.insert(id, prev);
                rollback(op, started, &e.to_string());
                Err(EngineError::Persistence(e.to_string()))
            }
        }
    }
}

fn finish(op: &'static str, started: Instant) {
    metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    metrics::counter!(MUTATIONS_TOTAL, "op" => op, "status" => "ok").increment(1);
}

fn rollback(op: &'static str, started: Instant, error: &str) {
    metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    metrics::counter!(MUTATIONS_TOTAL, "op" => op, "status" => "error").increment(1);
    metrics::counter!(ROLLBACKS_TOTAL, "op" => op).increment(1);
    tracing::warn!(op, error, "persistence failed, local change rolled back");
}
