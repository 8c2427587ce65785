use super::parse::{count, metadata_number, number_after, threshold};
use crate::core::ConfigMap;
use crate::plugin::{Gate, GateContext, GateResult, StageSnapshot};

const KEYWORDS: [&str; 2] = ["security", "scan"];

/// Vulnerability counts reported by a scan stage
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Findings {
    critical: f64,
    high: f64,
    medium: f64,
    low: f64,
}

impl Findings {
    /// Counts from metadata, falling back to the stage output; `None` without data
    fn from_stage(stage: &StageSnapshot) -> Option<Self> {
        let meta = |key: &str| metadata_number(stage, key);
        if meta("critical").is_some() || meta("high").is_some() {
            return Some(Self {
                critical: meta("critical").unwrap_or(0.0),
                high: meta("high").unwrap_or(0.0),
                medium: meta("medium").unwrap_or(0.0),
                low: meta("low").unwrap_or(0.0),
            });
        }

        let critical = number_after(&stage.output, "critical vulnerabilities", true);
        let high = number_after(&stage.output, "high vulnerabilities", true);
        if critical.is_none() && high.is_none() {
            return None;
        }
        Some(Self {
            critical: critical.unwrap_or(0.0),
            high: high.unwrap_or(0.0),
            medium: number_after(&stage.output, "medium vulnerabilities", true).unwrap_or(0.0),
            low: number_after(&stage.output, "low vulnerabilities", true).unwrap_or(0.0),
        })
    }
}

/// Limits critical and high vulnerabilities found by scan stages
#[derive(Debug, Default)]
pub struct SecurityScanGate;

impl Gate for SecurityScanGate {
    fn gate_type(&self) -> &str {
        "security-scan"
    }

    fn evaluate(&self, config: &ConfigMap, context: &GateContext) -> GateResult {
        let max_critical = threshold(config, "maxCritical", 0.0);
        let max_high = threshold(config, "maxHigh", 0.0);

        for (name, stage) in context.stages_matching(&KEYWORDS) {
            let Some(findings) = Findings::from_stage(stage) else {
                continue;
            };

            let result = if findings.critical > max_critical {
                GateResult::fail(format!(
                    "Security gate failed: {} critical vulnerabilities (max: {})",
                    count(findings.critical),
                    count(max_critical)
                ))
            } else if findings.high > max_high {
                GateResult::fail(format!(
                    "Security gate failed: {} high vulnerabilities (max: {})",
                    count(findings.high),
                    count(max_high)
                ))
            } else {
                GateResult::pass(format!(
                    "Security gate passed: {} critical, {} high, {} medium, {} low",
                    count(findings.critical),
                    count(findings.high),
                    count(findings.medium),
                    count(findings.low)
                ))
            };
            return result
                .with_metric("critical", findings.critical)
                .with_metric("high", findings.high)
                .with_metric("stage", name.as_str());
        }

        GateResult::warn("No security scan results found")
    }
}
