use crate::core::ConfigMap;
use crate::plugin::{Gate, GateContext, GateResult};

/// Passes when every stage named like a test stage succeeded
#[derive(Debug, Default)]
pub struct TestPassedGate;

const KEYWORDS: [&str; 1] = ["test"];

impl Gate for TestPassedGate {
    fn gate_type(&self) -> &str {
        "test-passed"
    }

    fn evaluate(&self, _config: &ConfigMap, context: &GateContext) -> GateResult {
        let mut found = 0usize;
        for (name, stage) in context.stages_matching(&KEYWORDS) {
            found += 1;
            if !stage.success {
                let message = if stage.output.is_empty() {
                    format!("Test stage '{}' failed", name)
                } else {
                    format!("Test stage '{}' failed: {}", name, stage.output)
                };
                return GateResult::fail(message).with_metric("stage", name.as_str());
            }
        }

        if found == 0 {
            return GateResult::warn("No test stage found in pipeline - cannot verify test passed gate");
        }

        GateResult::pass("All test stages passed successfully").with_metric("testStages", found)
    }
}
