use thiserror::Error;

/// kp error types
#[derive(Error, Debug)]
pub enum KpError {
    /// Malformed location, archive, or label
    #[error("Format error: {0}")]
    FormatError(String),

    /// Source artifact does not exist
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Credentials rejected by a registry
    #[error("invalid credentials, ensure registry credentials for '{registry}' are available locally")]
    AuthenticationFailure { registry: String },

    /// Two artifacts expected to correspond disagree
    #[error("{0}")]
    MismatchError(String),

    /// A required upstream input was not supplied
    #[error("{0}")]
    ConfigurationError(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Fieldless discriminant of [`KpError`], for branching on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    NotFound,
    Authentication,
    Mismatch,
    Configuration,
    Registry,
    Io,
    Serialization,
    Other,
}

impl KpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KpError::FormatError(_) => ErrorKind::Format,
            KpError::NotFoundError(_) => ErrorKind::NotFound,
            KpError::AuthenticationFailure { .. } => ErrorKind::Authentication,
            KpError::MismatchError(_) => ErrorKind::Mismatch,
            KpError::ConfigurationError(_) => ErrorKind::Configuration,
            KpError::RegistryError { .. } => ErrorKind::Registry,
            KpError::IoError(_) => ErrorKind::Io,
            KpError::SerializationError(_) => ErrorKind::Serialization,
            KpError::Other(_) => ErrorKind::Other,
        }
    }

    /// Operator-facing hint for errors that have an obvious fix.
    pub fn hint(&self) -> Option<String> {
        match self {
            KpError::AuthenticationFailure { registry } => Some(format!(
                "run \"kp login {}\" or export REGISTRY_USERNAME and REGISTRY_PASSWORD",
                registry
            )),
            _ => None,
        }
    }

    /// Prefix the message with the artifact it belongs to, keeping the kind.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            KpError::FormatError(m) => KpError::FormatError(format!("{}: {}", context, m)),
            KpError::NotFoundError(m) => KpError::NotFoundError(format!("{}: {}", context, m)),
            KpError::MismatchError(m) => KpError::MismatchError(format!("{}: {}", context, m)),
            KpError::RegistryError { registry, message } => KpError::RegistryError {
                registry,
                message: format!("{}: {}", context, message),
            },
            KpError::Other(m) => KpError::Other(format!("{}: {}", context, m)),
            other => other,
        }
    }
}

impl From<serde_json::Error> for KpError {
    fn from(err: serde_json::Error) -> Self {
        KpError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for KpError {
    fn from(err: serde_yaml::Error) -> Self {
        KpError::SerializationError(err.to_string())
    }
}

/// Result type alias for kp operations
pub type Result<T> = std::result::Result<T, KpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failure_names_registry() {
        let error = KpError::AuthenticationFailure {
            registry: "kpackcr.org".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid credentials, ensure registry credentials for 'kpackcr.org' are available locally"
        );
        assert_eq!(error.kind(), ErrorKind::Authentication);
        assert!(error.hint().unwrap().contains("kpackcr.org"));
    }

    #[test]
    fn test_format_error_display() {
        let error = KpError::FormatError("bad reference 'a@b'".to_string());
        assert_eq!(error.to_string(), "Format error: bad reference 'a@b'");
        assert_eq!(error.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_mismatch_error_display() {
        let error = KpError::MismatchError(
            "build stack 'a' does not match run stack 'b'".to_string(),
        );
        assert_eq!(
            error.to_string(),
            "build stack 'a' does not match run stack 'b'"
        );
    }

    #[test]
    fn test_registry_error_display() {
        let error = KpError::RegistryError {
            registry: "ghcr.io".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(error.to_string(), "Registry error: ghcr.io - connection reset");
        assert!(error.hint().is_none());
    }

    #[test]
    fn test_with_context_keeps_kind() {
        let error = KpError::NotFoundError("some/image".to_string()).with_context("run image");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.to_string(), "Not found: run image: some/image");

        let auth = KpError::AuthenticationFailure {
            registry: "r.io".to_string(),
        }
        .with_context("build image");
        assert!(matches!(auth, KpError::AuthenticationFailure { .. }));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let kp_error: KpError = io_error.into();
        assert_eq!(kp_error.kind(), ErrorKind::Io);
        assert!(kp_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let kp_error: KpError = result.unwrap_err().into();
        assert!(matches!(kp_error, KpError::SerializationError(_)));
    }
}
