//! CLI output formatting

use crate::core::{StageResult, ValidationResult};
use crate::execution::ExecutionEvent;
use crate::plugin::{GateResult, Severity};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted { run_id, pipeline_name } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { stage, attempt } => {
            if *attempt > 1 {
                format!("{} {} (attempt {})", SPINNER, style(stage).cyan(), style(attempt).dim())
            } else {
                format!("{} {}", SPINNER, style(stage).cyan())
            }
        }
        ExecutionEvent::StageRetrying {
            stage,
            attempt,
            max_retries,
        } => format!(
            "{} {} retrying (attempt {}/{})",
            WARN,
            style(stage).yellow(),
            attempt,
            max_retries + 1
        ),
        ExecutionEvent::StageCompleted { stage, duration_ms } => format!(
            "{} {} {}",
            CHECK,
            style(stage).green(),
            style(format_duration_ms(*duration_ms)).dim()
        ),
        ExecutionEvent::StageFailed { stage, error } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(first_line(error)).dim())
        }
        ExecutionEvent::StageSkipped { stage } => {
            format!("{} {} {}", SKIP, style(stage).dim(), style("(disabled)").dim())
        }
        ExecutionEvent::PipelineCompleted { run_id, success } => {
            let status = if *success {
                format!("{} completed", style("successfully").green())
            } else {
                style("failed").red().to_string()
            };
            format!("{} Pipeline ({}) {}", INFO, style(&run_id.to_string()[..8]).dim(), status)
        }
    }
}

/// One summary line per stage result
pub fn format_stage_result(result: &StageResult) -> String {
    let (icon, status) = if result.is_skipped() {
        (SKIP, style("SKIPPED").dim().to_string())
    } else if result.success {
        (CHECK, style("PASSED").green().to_string())
    } else {
        (CROSS, style("FAILED").red().to_string())
    };

    let attempts = if result.attempt > 1 {
        format!(" after {} attempts", result.attempt)
    } else {
        String::new()
    };

    format!(
        "{}{:<24} {} {}{}",
        icon,
        result.stage_name,
        status,
        style(format_duration_ms(result.duration_ms)).dim(),
        attempts
    )
}

/// Format a gate evaluation for display
pub fn format_gate_result(gate_type: &str, result: &GateResult) -> String {
    let icon = match (result.passed, result.severity) {
        (false, _) => CROSS,
        (true, Severity::Warn) => WARN,
        (true, _) => CHECK,
    };
    format!(
        "{}{} [{}] {}",
        icon,
        style(gate_type).bold(),
        result.severity,
        result.message
    )
}

/// Human-readable validation report
pub fn format_validation(name: &str, result: &ValidationResult) -> String {
    if result.valid {
        return format!("{} Pipeline {} is valid", CHECK, style(name).bold());
    }

    let mut lines = vec![format!(
        "{} Pipeline {} has {} error(s):",
        CROSS,
        style(name).bold(),
        result.errors.len()
    )];
    lines.extend(result.errors.iter().map(|e| format!("  - {}", style(e).red())));
    lines.join("\n")
}

/// Format stage output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
