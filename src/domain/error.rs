use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("required field `{field}` is missing or empty")]
    MissingField { field: &'static str },
    #[error("quality score {score} is below the floor of {floor}")]
    QualityBelowFloor { score: f64, floor: f64 },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}
