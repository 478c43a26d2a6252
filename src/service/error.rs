#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("Invalid hour {hour} (0 <= hour <= 23).")]
    InvalidHour { hour: u8 },

    #[error("{field} must not be empty.")]
    EmptyField { field: &'static str },

    #[error("{field} must not contain the record delimiter `||`.")]
    ReservedDelimiter { field: &'static str },
}
