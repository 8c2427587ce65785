//! Built-in quality gates
//!
//! Each gate scans the stage results whose names contain its keywords
//! (ignoring case), in name order. Structured metadata is preferred over
//! parsing the stage's text output; a gate with no usable data warns
//! rather than failing.

pub mod coverage;
pub mod parse;
pub mod security_scan;
pub mod sonarqube;
pub mod test_passed;

use super::Gate;
use std::collections::HashMap;
use std::sync::Arc;

pub use coverage::CoverageGate;
pub use security_scan::SecurityScanGate;
pub use sonarqube::SonarQubeGate;
pub use test_passed::TestPassedGate;

/// Built-in gates keyed by gate type
pub fn builtin_gates() -> HashMap<String, Arc<dyn Gate>> {
    let gates: [Arc<dyn Gate>; 4] = [
        Arc::new(TestPassedGate),
        Arc::new(CoverageGate),
        Arc::new(SecurityScanGate),
        Arc::new(SonarQubeGate),
    ];
    gates
        .into_iter()
        .map(|gate| (gate.gate_type().to_string(), gate))
        .collect()
}
