#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("Source `{source_key}` is unreachable: {reason}")]
    Unreachable { source_key: String, reason: String },

    #[error("Source `{source_key}` returned a malformed document: {reason}")]
    Malformed { source_key: String, reason: String },
}

impl FetchError {
    pub fn unreachable(source_key: &str, reason: impl ToString) -> Self {
        FetchError::Unreachable {
            source_key: source_key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(source_key: &str, reason: impl ToString) -> Self {
        FetchError::Malformed {
            source_key: source_key.to_string(),
            reason: reason.to_string(),
        }
    }
}
