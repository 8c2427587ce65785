use super::parse::{count, first_number, metadata_number, number_after, threshold};
use crate::core::ConfigMap;
use crate::plugin::{Gate, GateContext, GateResult, StageSnapshot};

const KEYWORDS: [&str; 2] = ["sonar", "quality"];
const COVERAGE_LABELS: [&str; 2] = ["Coverage:", "Line coverage:"];

/// Metrics reported by a SonarQube analysis; absent metrics are not checked
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Analysis {
    coverage: Option<f64>,
    blocker: Option<f64>,
    critical: Option<f64>,
    major: Option<f64>,
    rating: Option<f64>,
}

impl Analysis {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn from_metadata(stage: &StageSnapshot) -> Self {
        Self {
            coverage: metadata_number(stage, "coverage"),
            blocker: metadata_number(stage, "blocker"),
            critical: metadata_number(stage, "critical"),
            major: metadata_number(stage, "major"),
            rating: metadata_number(stage, "qualityGateRating"),
        }
    }

    fn from_output(output: &str) -> Self {
        Self {
            coverage: first_number(output, &COVERAGE_LABELS, false),
            blocker: number_after(output, "BLOCKER Issues:", false),
            critical: number_after(output, "CRITICAL Issues:", false),
            major: number_after(output, "MAJOR Issues:", false),
            rating: None,
        }
    }

    /// Metadata wins; the stage output is parsed only when metadata has no metrics
    fn from_stage(stage: &StageSnapshot) -> Option<Self> {
        let analysis = Self::from_metadata(stage);
        let analysis = if analysis.is_empty() {
            Self::from_output(&stage.output)
        } else {
            analysis
        };
        (!analysis.is_empty()).then_some(analysis)
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    min_coverage: f64,
    max_blocker: f64,
    max_critical: f64,
    max_major: f64,
    min_rating: f64,
}

impl Limits {
    fn from_config(config: &ConfigMap) -> Self {
        Self {
            min_coverage: threshold(config, "minCoverage", 0.0),
            max_blocker: threshold(config, "maxBlocker", 0.0),
            max_critical: threshold(config, "maxCritical", 0.0),
            max_major: threshold(config, "maxMajor", 0.0),
            min_rating: threshold(config, "minQualityGateRating", 1.0),
        }
    }

    /// First violated limit, checked in a fixed order
    fn violation(&self, a: &Analysis) -> Option<String> {
        if let Some(coverage) = a.coverage.filter(|c| *c < self.min_coverage) {
            return Some(format!(
                "coverage {}% < {}%",
                count(coverage),
                count(self.min_coverage)
            ));
        }
        let issues = [
            ("blocker", a.blocker, self.max_blocker),
            ("critical", a.critical, self.max_critical),
            ("major", a.major, self.max_major),
        ];
        for (kind, value, max) in issues {
            if let Some(value) = value.filter(|v| *v > max) {
                return Some(format!("{} {} issues (max: {})", count(value), kind, count(max)));
            }
        }
        if let Some(rating) = a.rating.filter(|r| *r < self.min_rating) {
            return Some(format!(
                "quality gate rating {} < {}",
                count(rating),
                count(self.min_rating)
            ));
        }
        None
    }
}

/// Checks SonarQube coverage, issue counts and quality gate rating
#[derive(Debug, Default)]
pub struct SonarQubeGate;

impl Gate for SonarQubeGate {
    fn gate_type(&self) -> &str {
        "sonarqube"
    }

    fn evaluate(&self, config: &ConfigMap, context: &GateContext) -> GateResult {
        let limits = Limits::from_config(config);

        for (name, stage) in context.stages_matching(&KEYWORDS) {
            let Some(analysis) = Analysis::from_stage(stage) else {
                continue;
            };
            let result = match limits.violation(&analysis) {
                Some(violation) => GateResult::fail(format!("SonarQube gate failed: {}", violation)),
                None => GateResult::pass("SonarQube gate passed"),
            };
            return result.with_metric("stage", name.as_str());
        }

        GateResult::warn("No SonarQube results found")
    }
}
