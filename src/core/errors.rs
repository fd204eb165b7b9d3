//! RSW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RegError>;

/// Top-level error type for the registry hygiene engine.
///
/// The first three variants form the store-access taxonomy: `NotFound` is
/// routine and scanners treat it as "skip"; `AccessDenied` triggers
/// escalation in force mode; `Os` is any other native failure and carries
/// the raw status code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegError {
    #[error("[RSW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[RSW-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RSW-2001] key or value not found: {address}")]
    NotFound { address: String },

    #[error("[RSW-2002] access denied: {address}")]
    AccessDenied { address: String },

    #[error("[RSW-2003] registry failure [{code}] at {address}: {message}")]
    Os {
        code: i32,
        message: String,
        address: String,
    },

    #[error("[RSW-3001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[RSW-3002] IO failure at {path}: {details}")]
    Io { path: PathBuf, details: String },

    #[error("[RSW-3003] backup format failure in {path}: {details}")]
    BackupFormat { path: PathBuf, details: String },

    #[error("[RSW-3900] escalation failure at {address}: {details}")]
    Escalation { address: String, details: String },
}

impl RegError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "RSW-1001",
            Self::ConfigParse { .. } => "RSW-1002",
            Self::NotFound { .. } => "RSW-2001",
            Self::AccessDenied { .. } => "RSW-2002",
            Self::Os { .. } => "RSW-2003",
            Self::Serialization { .. } => "RSW-3001",
            Self::Io { .. } => "RSW-3002",
            Self::BackupFormat { .. } => "RSW-3003",
            Self::Escalation { .. } => "RSW-3900",
        }
    }

    /// Whether the error means "the entry simply is not there".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error is a rights problem that escalation might resolve.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Convenience constructor for not-found at an address.
    #[must_use]
    pub fn not_found(address: impl Into<String>) -> Self {
        Self::NotFound {
            address: address.into(),
        }
    }

    /// Convenience constructor for access-denied at an address.
    #[must_use]
    pub fn access_denied(address: impl Into<String>) -> Self {
        Self::AccessDenied {
            address: address.into(),
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            details: source.to_string(),
        }
    }
}

impl From<serde_json::Error> for RegError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RegError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_unique() {
        let errors = vec![
            RegError::InvalidConfig {
                details: String::new(),
            },
            RegError::ConfigParse {
                context: "toml",
                details: String::new(),
            },
            RegError::not_found("HKLM\\Missing"),
            RegError::access_denied("HKLM\\Denied"),
            RegError::Os {
                code: 5,
                message: String::new(),
                address: String::new(),
            },
            RegError::Serialization {
                context: "serde_json",
                details: String::new(),
            },
            RegError::Io {
                path: PathBuf::new(),
                details: String::new(),
            },
            RegError::BackupFormat {
                path: PathBuf::new(),
                details: String::new(),
            },
            RegError::Escalation {
                address: String::new(),
                details: String::new(),
            },
        ];

        let mut codes: Vec<&str> = errors.iter().map(RegError::code).collect();
        codes.sort_unstable();
        let before = codes.len();
        codes.dedup();
        assert_eq!(before, codes.len());
    }

    #[test]
    fn display_includes_code_and_address() {
        let err = RegError::not_found("HKCU\\Software\\Gone");
        let text = err.to_string();
        assert!(text.contains("RSW-2001"));
        assert!(text.contains("HKCU\\Software\\Gone"));
    }

    #[test]
    fn taxonomy_predicates() {
        assert!(RegError::not_found("x").is_not_found());
        assert!(!RegError::not_found("x").is_access_denied());
        assert!(RegError::access_denied("x").is_access_denied());
    }
}
