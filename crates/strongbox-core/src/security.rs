use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How strongly a secret is protected at rest.
///
/// Variants are declared weakest first so the derived `Ord` reads naturally:
/// `SecureHardware > SecureSoftware > Any`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// No guarantee beyond "encrypted with some key".
    #[default]
    Any,
    /// Key material is held by an OS-managed secure store.
    SecureSoftware,
    /// Key material never leaves secure hardware.
    SecureHardware,
}

impl SecurityLevel {
    /// All levels, strongest first.
    pub const ALL: [SecurityLevel; 3] = [
        SecurityLevel::SecureHardware,
        SecurityLevel::SecureSoftware,
        SecurityLevel::Any,
    ];

    /// True when this level is at least as strong as `requested`.
    pub fn satisfies(self, requested: SecurityLevel) -> bool {
        self >= requested
    }

    /// The weaker of two levels.
    pub fn weakest(self, other: SecurityLevel) -> SecurityLevel {
        self.min(other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::Any => "ANY",
            SecurityLevel::SecureSoftware => "SECURE_SOFTWARE",
            SecurityLevel::SecureHardware => "SECURE_HARDWARE",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown security level: {0} (expected any, secure_software or secure_hardware)")]
pub struct ParseSecurityLevelError(String);

impl FromStr for SecurityLevel {
    type Err = ParseSecurityLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "any" => Ok(SecurityLevel::Any),
            "secure_software" => Ok(SecurityLevel::SecureSoftware),
            "secure_hardware" => Ok(SecurityLevel::SecureHardware),
            _ => Err(ParseSecurityLevelError(s.to_string())),
        }
    }
}
