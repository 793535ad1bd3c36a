use thiserror::Error;

/// Typed error hierarchy for every pipeline operation.
///
/// Serializes as a plain string so job records and CLI JSON output carry the
/// same message the caller sees, while Rust code can still match on variants
/// or propagate them with `?`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or absent input: no timestamps, empty transcript, no chapters.
    #[error("{0}")]
    Structural(String),

    /// Outbound URL rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// Re-import precondition: records already exist for the episode.
    #[error("{0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-2xx response or transport failure from a content host.
    #[error("{0}")]
    Fetch(String),

    /// Completion service error or unusable model output.
    #[error("{0}")]
    Completion(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl serde::Serialize for AppError {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Fetch(e.to_string())
    }
}

/// Allows `ok_or_else(|| format!(…))?` to coerce into AppError.
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

/// Allows `.ok_or("literal string")?` to coerce into AppError.
impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_plain_message() {
        let err = AppError::NotFound("Episode 7".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Not found: Episode 7\"");
    }

    #[test]
    fn test_precondition_message_is_verbatim() {
        let err = AppError::AlreadyExists(
            "Episode already has 3 segments. Delete them first to re-import.".to_string(),
        );
        assert!(err.to_string().starts_with("Episode already has 3 segments"));
    }
}
