//! Topological Order Configuration
//!
//! Controls how aggressively [`TopoOrder`](crate::topo::TopoOrder)
//! re-derives its invariant after mutations. Verification walks every
//! required edge, so it turns each O(window) repair into an O(V + E) pass;
//! it is meant for test suites and stress runs.

use serde::{Deserialize, Serialize};

use crate::error::{DagError, Result};

/// When to re-verify the topological order after `build` and `insert_edge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    /// Never verify.
    Never,

    /// Verify in builds with debug assertions enabled and panic on failure.
    #[default]
    Debug,

    /// Verify in every build profile and report failures as
    /// [`DagError::InvariantBroken`].
    Always,
}

/// Options for building and maintaining a [`TopoOrder`](crate::topo::TopoOrder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopoConfig {
    pub verify: VerifyPolicy,
}

impl TopoConfig {
    /// Config that verifies after every mutation.
    pub fn stress() -> Self {
        Self {
            verify: VerifyPolicy::Always,
        }
    }

    /// Parse a config from JSON, e.g. `{"verify": "always"}`.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| DagError::InvalidConfig(err.to_string()))
    }

    /// Whether verification should run in the current build profile.
    pub(crate) fn should_verify(&self) -> bool {
        match self.verify {
            VerifyPolicy::Never => false,
            VerifyPolicy::Debug => cfg!(debug_assertions),
            VerifyPolicy::Always => true,
        }
    }
}
