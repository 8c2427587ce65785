//! Gate lookup and evaluation

use super::gates::builtin_gates;
use super::{Gate, GateContext, GateResult, PluginRegistry};
use crate::core::{ConfigMap, GateRequirement, PipelineContext};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluates gates against a snapshot of a pipeline run
///
/// Built-in gates are consulted first, then gate plugins in the registry.
pub struct GateExecutor {
    builtins: HashMap<String, Arc<dyn Gate>>,
    registry: Arc<PluginRegistry>,
}

impl GateExecutor {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            builtins: builtin_gates(),
            registry,
        }
    }

    fn resolve(&self, gate_type: &str) -> Option<Arc<dyn Gate>> {
        self.builtins.get(gate_type).cloned().or_else(|| {
            self.registry
                .get_gate_plugin(gate_type)
                .map(|plugin| plugin.implementation)
        })
    }

    /// Names of the built-in gates, sorted
    pub fn builtin_gate_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtins.keys().cloned().collect();
        names.sort();
        names
    }

    fn evaluate(&self, gate_type: &str, config: &ConfigMap, snapshot: &GateContext) -> GateResult {
        let Some(gate) = self.resolve(gate_type) else {
            warn!("Gate not found: {}", gate_type);
            return GateResult::fail(format!("Gate not found: {}", gate_type));
        };

        let result = catch_unwind(AssertUnwindSafe(|| gate.evaluate(config, snapshot)))
            .unwrap_or_else(|panic| {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("Gate {} panicked: {}", gate_type, reason);
                GateResult::fail(format!("Gate {} failed: {}", gate_type, reason))
            });

        debug!(
            "Gate {} -> passed={} severity={}: {}",
            gate_type, result.passed, result.severity, result.message
        );
        result
    }

    /// Evaluate one gate
    pub fn execute_gate(&self, gate_type: &str, config: &ConfigMap, context: &PipelineContext) -> GateResult {
        self.evaluate(gate_type, config, &GateContext::from_pipeline(context))
    }

    /// Evaluate gates in order, stopping after the first failure
    ///
    /// The failing result is the last element of the returned list.
    pub fn execute_gates(&self, gate_types: &[String], config: &ConfigMap, context: &PipelineContext) -> Vec<GateResult> {
        let snapshot = GateContext::from_pipeline(context);
        let mut results = Vec::with_capacity(gate_types.len());
        for gate_type in gate_types {
            let result = self.evaluate(gate_type, config, &snapshot);
            let passed = result.passed;
            results.push(result);
            if !passed {
                info!("Gate {} failed, skipping remaining gates", gate_type);
                break;
            }
        }
        results
    }

    /// Whether every gate passes (warnings count as passing)
    pub fn evaluate_all_gates(&self, gate_types: &[String], config: &ConfigMap, context: &PipelineContext) -> bool {
        self.execute_gates(gate_types, config, context)
            .iter()
            .all(|r| r.passed)
    }

    /// Like [`execute_gates`](Self::execute_gates), with per-gate configuration
    pub fn execute_requirements(
        &self,
        requirements: &[GateRequirement],
        context: &PipelineContext,
    ) -> Vec<(String, GateResult)> {
        let snapshot = GateContext::from_pipeline(context);
        let mut results = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let result = self.evaluate(&requirement.gate_type, &requirement.config, &snapshot);
            let passed = result.passed;
            results.push((requirement.gate_type.clone(), result));
            if !passed {
                break;
            }
        }
        results
    }
}
