use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The requested action is not permitted from the entity's current state.
    #[error("{entity} cannot '{action}' while {state}")]
    InvalidTransition {
        entity: &'static str,
        state: String,
        action: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("remote store failure: {0}")]
    Remote(#[from] StoreError),
}

impl WorkflowError {
    pub fn invalid_transition(
        entity: &'static str,
        state: impl std::fmt::Display,
        action: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            state: state.to_string(),
            action: action.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_retryable())
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
