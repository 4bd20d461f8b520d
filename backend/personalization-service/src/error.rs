use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersonalizationError>;

#[derive(Debug, Error)]
pub enum PersonalizationError {
    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PersonalizationError {
    /// Unavailable-dependency errors degrade the session instead of failing it.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            PersonalizationError::Redis(_) | PersonalizationError::Backend(_)
        )
    }
}

impl From<redis::RedisError> for PersonalizationError {
    fn from(err: redis::RedisError) -> Self {
        PersonalizationError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for PersonalizationError {
    fn from(err: serde_json::Error) -> Self {
        PersonalizationError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for PersonalizationError {
    fn from(err: reqwest::Error) -> Self {
        PersonalizationError::Backend(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PersonalizationError {
    fn from(err: ndarray::ShapeError) -> Self {
        PersonalizationError::Model(err.to_string())
    }
}

impl From<config::ConfigError> for PersonalizationError {
    fn from(err: config::ConfigError) -> Self {
        PersonalizationError::Configuration(err.to_string())
    }
}
