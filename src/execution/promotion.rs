//! Promotion workflow - gates a release on its way into an environment

use crate::core::{EnvironmentCatalog, GateRequirement, PipelineContext, PromotionPolicy};
use crate::plugin::{GateExecutor, GateResult, Notification, NotificationLevel, PluginRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A request to promote a pipeline's output into an environment
#[derive(Debug, Clone)]
pub struct PromotionRequest {
    pub pipeline: String,

    /// Source environment; defaults to the one before `to`
    pub from: Option<String>,

    pub to: String,
    pub policy: PromotionPolicy,

    /// Gates declared by the pipeline's stages
    pub stage_gates: Vec<GateRequirement>,

    /// Report the gates without evaluating them
    pub dry_run: bool,
}

impl PromotionRequest {
    pub fn new(pipeline: impl Into<String>, to: impl Into<String>, policy: PromotionPolicy) -> Self {
        Self {
            pipeline: pipeline.into(),
            from: None,
            to: to.into(),
            policy,
            stage_gates: Vec::new(),
            dry_run: false,
        }
    }

    pub fn from_environment(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_stage_gates(mut self, gates: Vec<GateRequirement>) -> Self {
        self.stage_gates = gates;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What happened to a promotion request
#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    pub promoted: bool,
    pub from: Option<String>,
    pub to: String,

    /// Gates to evaluate, in evaluation order
    pub requirements: Vec<GateRequirement>,

    /// Evaluated gates; ends at the first failure
    pub gate_results: Vec<(String, GateResult)>,

    pub message: String,
}

impl PromotionOutcome {
    /// The gate that blocked the promotion, if any
    pub fn blocking_gate(&self) -> Option<&(String, GateResult)> {
        self.gate_results.iter().find(|(_, result)| !result.passed)
    }
}

/// Evaluates promotion gates and notifies about the decision
pub struct Promoter {
    gates: Arc<GateExecutor>,
    registry: Arc<PluginRegistry>,
    environments: EnvironmentCatalog,
}

impl Promoter {
    pub fn new(gates: Arc<GateExecutor>, registry: Arc<PluginRegistry>, environments: EnvironmentCatalog) -> Self {
        Self {
            gates,
            registry,
            environments,
        }
    }

    pub fn environments(&self) -> &EnvironmentCatalog {
        &self.environments
    }

    /// Policy gates, then the target environment's gates, then stage gates
    ///
    /// A gate type listed more than once keeps its first configuration.
    pub fn requirements(&self, request: &PromotionRequest) -> Vec<GateRequirement> {
        let environment_gates = self
            .environments
            .get(&request.to)
            .map(|env| env.gates.clone())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        request
            .policy
            .required_gates
            .iter()
            .chain(environment_gates.iter())
            .map(GateRequirement::new)
            .chain(request.stage_gates.iter().cloned())
            .filter(|req| seen.insert(req.gate_type.clone()))
            .collect()
    }

    /// Decide whether the run in `context` may be promoted
    pub fn promote(&self, request: &PromotionRequest, context: &PipelineContext) -> PromotionOutcome {
        let from = request
            .from
            .clone()
            .or_else(|| self.environments.previous(&request.to).map(|e| e.name.clone()));
        let requirements = self.requirements(request);
        let mut outcome = PromotionOutcome {
            promoted: false,
            from: from.clone(),
            to: request.to.clone(),
            requirements,
            gate_results: Vec::new(),
            message: String::new(),
        };

        info!(
            "Starting promotion of {}: from={}, to={}, policy={}",
            request.pipeline,
            from.as_deref().unwrap_or("none"),
            request.to,
            request.policy.name
        );

        if self.environments.get(&request.to).is_none() {
            outcome.message = format!("Target environment not found: {}", request.to);
            warn!("{}", outcome.message);
            self.notify(request, &outcome, NotificationLevel::Error);
            return outcome;
        }

        if request.dry_run {
            outcome.message = format!(
                "Dry run: would evaluate {} gate(s) for promotion to {}",
                outcome.requirements.len(),
                request.to
            );
            return outcome;
        }

        if self.environments.should_auto_promote(&request.to) {
            info!("Environment {} is configured for auto-promotion", request.to);
        }
        if !request.policy.auto_approve && request.policy.approvers.is_empty() {
            info!("Policy {} expects a manual approval", request.policy.name);
        }

        outcome.gate_results = self.gates.execute_requirements(&outcome.requirements, context);
        let blocked = outcome
            .blocking_gate()
            .map(|(gate_type, result)| format!("Promotion blocked - gate {} failed: {}", gate_type, result.message));
        match blocked {
            Some(message) => {
                warn!("{}", message);
                outcome.message = message;
            }
            None => {
                outcome.promoted = true;
                outcome.message = format!("Promotion completed to {}", request.to);
                info!("{}", outcome.message);
            }
        }

        let level = if outcome.promoted {
            NotificationLevel::Info
        } else {
            NotificationLevel::Error
        };
        self.notify(request, &outcome, level);
        outcome
    }

    fn notify(&self, request: &PromotionRequest, outcome: &PromotionOutcome, level: NotificationLevel) {
        let title = format!(
            "Promotion {} -> {}",
            outcome.from.as_deref().unwrap_or("none"),
            outcome.to
        );
        let notification = Notification::new(title, outcome.message.clone(), level)
            .with_metadata("pipeline", request.pipeline.clone())
            .with_metadata("policy", request.policy.name.clone());

        for notifier in self.registry.notifiers() {
            notifier.implementation.notify(&notification);
        }
    }
}
