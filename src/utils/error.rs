use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid model: {message}")]
    InvalidModel { message: String },

    #[error("Contemporaneous links must not contain cycle")]
    CyclicContemporaneous,

    #[error("Lagged connectivity corresponds to a non-stationary process (max |eigenvalue| = {max_modulus:.4})")]
    NonStationary { max_modulus: f64 },

    #[error("Linear algebra error: {message}")]
    LinearAlgebraError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Model,
    Numerical,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit code for a run that failed with this severity.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl SimError {
    pub fn invalid_model(message: impl Into<String>) -> Self {
        SimError::InvalidModel {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SimError::TomlParseError(_)
            | SimError::ConfigError { .. }
            | SimError::ConfigValidationError { .. }
            | SimError::InvalidConfigValueError { .. }
            | SimError::MissingConfigError { .. } => ErrorCategory::Configuration,
            SimError::InvalidModel { .. } | SimError::CyclicContemporaneous => {
                ErrorCategory::Model
            }
            SimError::NonStationary { .. }
            | SimError::LinearAlgebraError { .. }
            | SimError::ProcessingError { .. } => ErrorCategory::Numerical,
            SimError::ZipError(_)
            | SimError::CsvError(_)
            | SimError::IoError(_)
            | SimError::SerializationError(_) => ErrorCategory::Output,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Model => ErrorSeverity::High,
            ErrorCategory::Numerical => ErrorSeverity::Medium,
            ErrorCategory::Output => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SimError::TomlParseError(_) => "Check the model file for TOML syntax errors",
            SimError::MissingConfigError { .. } => "Add the missing field to the model file",
            SimError::ConfigError { .. }
            | SimError::ConfigValidationError { .. }
            | SimError::InvalidConfigValueError { .. } => {
                "Fix the reported field in the model file and rerun"
            }
            SimError::InvalidModel { .. } => {
                "Check that variable ids are contiguous from 0 and all lags are <= 0"
            }
            SimError::CyclicContemporaneous => {
                "Remove or re-orient one of the lag-0 links forming the cycle"
            }
            SimError::NonStationary { .. } => {
                "Reduce the magnitude of the lagged coefficients"
            }
            SimError::LinearAlgebraError { .. } => {
                "Make sure the innovation covariance is symmetric positive-definite"
            }
            SimError::ProcessingError { .. } => "Rerun with --verbose for more detail",
            SimError::IoError(_) | SimError::ZipError(_) => {
                "Check that the model file is readable and the output path is writable"
            }
            SimError::CsvError(_) | SimError::SerializationError(_) => {
                "Rerun with --verbose and report the failing output format"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Model configuration problem: {}", self),
            ErrorCategory::Model => format!("The causal model is not valid: {}", self),
            ErrorCategory::Numerical => format!("Simulation failed: {}", self),
            ErrorCategory::Output => format!("Could not write simulation output: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_by_category() {
        assert_eq!(SimError::CyclicContemporaneous.severity(), ErrorSeverity::High);
        assert_eq!(
            SimError::NonStationary { max_modulus: 1.2 }.severity(),
            ErrorSeverity::Medium
        );
        let io = SimError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.category(), ErrorCategory::Output);
        assert_eq!(io.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_exit_codes_follow_severity() {
        assert_eq!(ErrorSeverity::Low.exit_code(), 0);
        assert_eq!(ErrorSeverity::High.exit_code(), 1);
        assert_eq!(ErrorSeverity::Medium.exit_code(), 2);

        // 模型檔不存在時屬於 IO 錯誤
        let missing = crate::config::toml_config::ModelConfig::from_file("/nonexistent/model.toml")
            .unwrap_err();
        assert!(matches!(missing, SimError::IoError(_)));
        assert_eq!(missing.severity().exit_code(), 3);
    }

    #[test]
    fn test_user_friendly_message_mentions_cause() {
        let err = SimError::invalid_model("lag must be non-positive");
        assert!(err.user_friendly_message().contains("lag must be non-positive"));
    }
}
