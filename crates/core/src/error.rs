/// Domain error shared by every crate in the workspace.
///
/// Variants are the error taxonomy the HTTP layer maps to status codes.
/// History-read failures during version creation never appear here: they are
/// logged and absorbed by the repository.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Protected field: {0}")]
    ProtectedField(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_entity_and_id() {
        let err = CoreError::not_found("Asset", "server.srv1");
        assert_eq!(
            err.to_string(),
            "Entity not found: Asset with id server.srv1"
        );
    }

    #[test]
    fn protected_field_display() {
        let err = CoreError::ProtectedField("Cannot delete required field 'status'".into());
        assert!(err.to_string().contains("status"));
    }
}
