//! Deployment environments and per-environment overrides

use super::context::PipelineContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Order assumed for environments that do not declare one
const DEFAULT_ORDER: i64 = 999;

/// A deployment environment (dev, staging, prod, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Environment {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Position in the promotion chain
    #[serde(default)]
    pub order: Option<i64>,

    #[serde(default)]
    pub auto_promote: Option<bool>,

    #[serde(default)]
    pub deploy: Option<DeployConfig>,

    #[serde(default)]
    pub approval: Option<Approval>,

    /// Gate types required before promoting into this environment
    #[serde(default)]
    pub gates: Vec<String>,

    #[serde(default)]
    pub resources: Option<Resources>,

    #[serde(default)]
    pub replicas: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(rename = "type", default)]
    pub deploy_type: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    #[serde(rename = "type", default)]
    pub approval_type: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

impl Environment {
    pub fn new(name: impl Into<String>, order: i64) -> Self {
        Self {
            name: name.into(),
            order: Some(order),
            ..Self::default()
        }
    }

    fn sort_key(&self) -> i64 {
        self.order.unwrap_or(DEFAULT_ORDER)
    }
}

/// All known environments, keyed by name
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCatalog {
    environments: HashMap<String, Environment>,
}

impl EnvironmentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog; later entries replace earlier ones with the same name
    pub fn from_environments(environments: impl IntoIterator<Item = Environment>) -> Self {
        let mut catalog = Self::new();
        for env in environments {
            catalog.insert(env);
        }
        catalog
    }

    pub fn insert(&mut self, env: Environment) {
        self.environments.insert(env.name.clone(), env);
    }

    pub fn get(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Environments sorted by `order`, then name
    pub fn ordered(&self) -> Vec<&Environment> {
        let mut envs: Vec<&Environment> = self.environments.values().collect();
        envs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()).then_with(|| a.name.cmp(&b.name)));
        envs
    }

    /// The environment after `current` in promotion order
    pub fn next(&self, current: &str) -> Option<&Environment> {
        let ordered = self.ordered();
        let pos = ordered.iter().position(|e| e.name == current)?;
        ordered.get(pos + 1).copied()
    }

    /// The environment before `current` in promotion order
    pub fn previous(&self, current: &str) -> Option<&Environment> {
        let ordered = self.ordered();
        let pos = ordered.iter().position(|e| e.name == current)?;
        pos.checked_sub(1).and_then(|p| ordered.get(p).copied())
    }

    /// `from` and every environment after it, in promotion order
    pub fn promotion_chain(&self, from: &str) -> Vec<&Environment> {
        self.ordered()
            .into_iter()
            .skip_while(|e| e.name != from)
            .collect()
    }

    pub fn should_auto_promote(&self, name: &str) -> bool {
        self.get(name)
            .and_then(|e| e.auto_promote)
            .unwrap_or(false)
    }

    /// Resource and placement variables for an environment
    pub fn environment_variables(&self, name: &str) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let Some(env) = self.get(name) else {
            return vars;
        };

        if let Some(ref resources) = env.resources {
            if let Some(ref cpu) = resources.cpu {
                vars.insert("CPU".to_string(), cpu.clone());
            }
            if let Some(ref memory) = resources.memory {
                vars.insert("MEMORY".to_string(), memory.clone());
            }
        }

        if let Some(replicas) = env.replicas {
            vars.insert("REPLICAS".to_string(), replicas.to_string());
        }

        if let Some(ref deploy) = env.deploy {
            if let Some(ref namespace) = deploy.namespace {
                vars.insert("NAMESPACE".to_string(), namespace.clone());
            }
            if let Some(ref cluster) = deploy.cluster {
                vars.insert("CLUSTER".to_string(), cluster.clone());
            }
        }

        vars
    }

    /// Apply the context's environment settings to its variables
    ///
    /// Does nothing when the context has no environment or the environment is unknown.
    pub fn apply_overrides(&self, context: &mut PipelineContext) {
        let Some(env_name) = context.environment.clone().filter(|e| !e.trim().is_empty()) else {
            return;
        };
        let Some(env) = self.get(&env_name) else {
            warn!("Environment not found: {}", env_name);
            return;
        };

        for (key, value) in self.environment_variables(&env_name) {
            context.set_variable(key, value);
        }

        context.set_variable("ENVIRONMENT_NAME", env_name.clone());
        context.set_variable("ENVIRONMENT_ORDER", env.sort_key().to_string());

        if let Some(ref deploy) = env.deploy {
            if let Some(ref deploy_type) = deploy.deploy_type {
                context.set_variable("DEPLOY_TYPE", deploy_type.clone());
            }
            if let Some(ref namespace) = deploy.namespace {
                context.set_variable("DEPLOY_NAMESPACE", namespace.clone());
            }
            if let Some(ref cluster) = deploy.cluster {
                context.set_variable("DEPLOY_CLUSTER", cluster.clone());
            }
            if let Some(ref strategy) = deploy.strategy {
                context.set_variable("DEPLOY_STRATEGY", strategy.clone());
            }
        }

        if let Some(approval_type) = env.approval.as_ref().and_then(|a| a.approval_type.clone()) {
            context.set_variable("APPROVAL_TYPE", approval_type);
        }

        info!("Applied environment overrides for: {}", env_name);
    }
}
