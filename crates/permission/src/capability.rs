//! Capabilities and the host grant-code adapter.

use serde::{Deserialize, Serialize};

/// Host grant code meaning "granted". Every other code is a denial.
pub const PERMISSION_GRANTED: i32 = 0;

/// A runtime capability made of one or more host sub-permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Human-readable name used in logs.
    pub name: String,
    /// Host permission identifiers requested together.
    pub sub_permissions: Vec<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, sub_permissions: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sub_permissions,
        }
    }

    /// Microphone listening plus the location permission the detection
    /// service requests alongside it.
    pub fn listening() -> Self {
        Self::new(
            "listening",
            vec![
                "record_audio".to_string(),
                "access_fine_location".to_string(),
            ],
        )
    }

    /// Number of grant flags a well-formed host answer carries.
    pub fn expected_grants(&self) -> usize {
        self.sub_permissions.len().max(1)
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::listening()
    }
}

/// Convert host integer grant codes into grant flags.
pub fn grants_from_codes(codes: &[i32]) -> Vec<bool> {
    codes.iter().map(|&code| code == PERMISSION_GRANTED).collect()
}
