//! Promotion policies

use serde::{Deserialize, Serialize};

/// Rules that govern promoting a build into an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionPolicy {
    pub name: String,
    pub description: Option<String>,

    /// Upper-case policy type, e.g. `PRODUCTION`
    pub policy_type: String,

    /// Gate types that must pass
    pub required_gates: Vec<String>,

    pub approvers: Vec<String>,
    pub auto_approve: bool,
    pub timeout_minutes: u32,
    pub allow_rollback: bool,
}

impl PromotionPolicy {
    /// A policy with no gates and no approvals
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            policy_type: name.to_uppercase(),
            name,
            description: None,
            required_gates: Vec::new(),
            approvers: Vec::new(),
            auto_approve: false,
            timeout_minutes: 0,
            allow_rollback: false,
        }
    }

    fn preset(name: &str, description: &str, gates: &[&str], auto_approve: bool, timeout_minutes: u32) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            policy_type: name.replace('-', "_").to_uppercase(),
            required_gates: gates.iter().map(|g| g.to_string()).collect(),
            approvers: Vec::new(),
            auto_approve,
            timeout_minutes,
            allow_rollback: true,
        }
    }

    /// Bypasses gates and approvals
    pub fn fast_track() -> Self {
        Self::preset("fast-track", "Fast-track promotion - bypasses most approvals", &[], true, 5)
    }

    pub fn standard() -> Self {
        Self::preset("standard", "Standard promotion with approval", &["test-passed"], false, 60)
    }

    pub fn production() -> Self {
        Self::preset(
            "production",
            "Production promotion - requires all gates and approval",
            &["test-passed", "coverage-threshold", "security-scan"],
            false,
            120,
        )
    }

    pub fn security_patch() -> Self {
        Self::preset(
            "security-patch",
            "Security patch - expedited approval",
            &["test-passed", "security-scan"],
            false,
            30,
        )
    }

    /// Resolve a preset by name; unknown names yield a custom policy with no gates
    pub fn from_type(policy_type: &str) -> Self {
        match policy_type.to_lowercase().as_str() {
            "fast-track" | "fasttrack" => Self::fast_track(),
            "standard" => Self::standard(),
            "production" => Self::production(),
            "security-patch" | "securitypatch" => Self::security_patch(),
            _ => Self::custom(policy_type),
        }
    }
}
