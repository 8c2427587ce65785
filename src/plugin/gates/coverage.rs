use super::parse::{first_number, metadata_number, threshold};
use crate::core::ConfigMap;
use crate::plugin::{Gate, GateContext, GateResult};

const DEFAULT_MIN_COVERAGE: f64 = 80.0;
const KEYWORDS: [&str; 2] = ["test", "coverage"];
const LABELS: [&str; 5] = ["Coverage:", "coverage:", "TOTAL", "Lines:", "Line coverage:"];

/// Requires line coverage of at least `minCoverage` percent
#[derive(Debug, Default)]
pub struct CoverageGate;

impl Gate for CoverageGate {
    fn gate_type(&self) -> &str {
        "coverage-threshold"
    }

    fn evaluate(&self, config: &ConfigMap, context: &GateContext) -> GateResult {
        let min = threshold(config, "minCoverage", DEFAULT_MIN_COVERAGE);

        for (name, stage) in context.stages_matching(&KEYWORDS) {
            let Some(coverage) =
                metadata_number(stage, "coverage").or_else(|| first_number(&stage.output, &LABELS, false))
            else {
                continue;
            };

            let result = if coverage < min {
                GateResult::fail(format!(
                    "Coverage gate failed: {:.1}% < {:.1}% (stage: {})",
                    coverage, min, name
                ))
            } else {
                GateResult::pass(format!("Coverage gate passed: {:.1}% >= {:.1}%", coverage, min))
            };
            return result
                .with_metric("coverage", coverage)
                .with_metric("minCoverage", min)
                .with_metric("stage", name.as_str());
        }

        GateResult::warn("No coverage data found in test results")
    }
}
