use ulid::Ulid;

use crate::model::DemandStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Unknown demand or reference-entity id.
    NotFound(Ulid),
    /// Input rejected before any state was touched.
    Validation(&'static str),
    /// A transition the lifecycle does not allow. Rejected with no log entry.
    StateConflict {
        from: DemandStatus,
        to: DemandStatus,
    },
    /// The persistence collaborator failed; local state has been rolled
    /// back to the pre-call snapshot.
    Persistence(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::StateConflict { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            EngineError::Persistence(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
