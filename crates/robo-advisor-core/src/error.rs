use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Validation failed: {field} — {reason}")]
    Validation { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid parameter: {field} — {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Computation failure: {function} did not converge after {iterations} iterations ({detail})")]
    Computation {
        function: String,
        iterations: u32,
        detail: String,
    },

    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AdvisorError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AdvisorError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AdvisorError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        AdvisorError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Message safe to hand back to a caller. Solver internals stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AdvisorError::Computation { .. } => {
                "Computation failed; no result was produced".to_string()
            }
            AdvisorError::Storage(_) => "Portfolio store is unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AdvisorError {
    fn from(e: serde_json::Error) -> Self {
        AdvisorError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for AdvisorError {
    fn from(e: std::io::Error) -> Self {
        AdvisorError::Storage(e.to_string())
    }
}
