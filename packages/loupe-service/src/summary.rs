//! Post-run summary rendering: a compact terminal scorecard, a verbose
//! stage-by-stage breakdown, and a markdown file next to the artifact.
//! Pure string formatting; the file writer is fault-isolated and returns
//! `None` instead of failing the run.

use std::path::{Path, PathBuf};

use serde_json::Value;

use loupe_config::Calibration;
use loupe_trace::{
	QualityReading, Trace,
	model::{format_timestamp, stages},
};

pub fn format_compact_summary(cfg: &Calibration, trace: &Trace) -> String {
	let quality = QualityReading::from_trace(trace).unwrap_or_default();
	let evidence = evidence_counts(trace);
	let cost = synthesis_cost(trace);
	let mut lines = vec!["── Trace Summary ──────────────────────────".to_string()];

	lines.push(format!(
		"Quality: {}/{:.1}  {:<8}Duration: {}",
		fmt_score(quality.overall_score),
		cfg.quality_scale_max,
		pass_label(quality.passed),
		fmt_duration(trace.duration_seconds),
	));
	lines.push(format!("Cost: {:<20}Evidence: {}", fmt_cost(cost), fmt_evidence(&evidence)));

	if !quality.gap_categories.is_empty() {
		lines.push(format!("Gaps: {}", quality.gap_categories.join(", ")));
	}

	lines.push(format!("Trace: {}", trace.trace_id));
	lines.push("────────────────────────────────────────────".to_string());

	lines.join("\n")
}

pub fn format_verbose_summary(cfg: &Calibration, trace: &Trace) -> String {
	let quality = QualityReading::from_trace(trace).unwrap_or_default();
	let evidence = evidence_counts(trace);
	let mut lines = vec!["══ Trace Detail ═══════════════════════════════".to_string()];

	lines.push(format!("Trace ID:  {}", trace.trace_id));
	lines.push(format!("Project:   {}", trace.project_name.as_deref().unwrap_or("—")));
	lines.push(format!("Query:     {}", truncate(trace.query.as_deref().unwrap_or("—"), 80)));
	lines.push(format!(
		"Intent:    {}    Domain: {}",
		trace.intent.as_deref().unwrap_or("—"),
		trace.domain.as_deref().unwrap_or("—"),
	));
	lines.push(format!(
		"Status:    {}    Duration: {}",
		trace.status,
		fmt_duration(trace.duration_seconds),
	));
	lines.push(String::new());
	lines.push("── Quality Gate ───────────────────────────────".to_string());
	lines.push(format!(
		"Score: {}/{:.1}  {}",
		fmt_score(quality.overall_score),
		cfg.quality_scale_max,
		pass_label(quality.passed),
	));

	if let Some(scores) = &quality.category_scores
		&& !scores.is_empty()
	{
		lines.push("Category Scores:".to_string());

		for (category, score) in scores {
			let marker = if quality.gap_categories.iter().any(|gap| gap == category) {
				" <gap"
			} else {
				""
			};

			lines.push(format!("  {category}: {score}{marker}"));
		}
	}
	if !quality.gap_categories.is_empty() {
		lines.push(format!("Gap Categories: {}", quality.gap_categories.join(", ")));
	}
	if !quality.strength_categories.is_empty() {
		lines.push(format!("Strengths: {}", quality.strength_categories.join(", ")));
	}

	lines.push(String::new());
	lines.push("── Stages ─────────────────────────────────────".to_string());

	for stage in &trace.stages {
		lines.push(format!(
			"  {:<16} {:>8}  ({} decisions)",
			stage.name,
			fmt_duration(stage.duration_seconds),
			stage.decisions.len(),
		));
	}

	lines.push(String::new());
	lines.push("── Evidence ───────────────────────────────────".to_string());
	lines.push(format!(
		"Collected: {}  Passed: {}  Filtered: {}",
		fmt_count(evidence.collected),
		fmt_count(evidence.passed),
		fmt_count(evidence.filtered),
	));

	if let Some(stage) = trace.stage(stages::SYNTHESIS) {
		let outputs = &stage.outputs;

		lines.push(String::new());
		lines.push("── Synthesis ──────────────────────────────────".to_string());
		lines.push(format!(
			"Model: {}",
			outputs.get("model").and_then(Value::as_str).unwrap_or("—"),
		));

		if let Some(usage) = outputs.get("token_usage").and_then(Value::as_object) {
			lines.push(format!(
				"Tokens: {} in / {} out",
				fmt_count(usage.get("input_tokens").and_then(Value::as_i64)),
				fmt_count(usage.get("output_tokens").and_then(Value::as_i64)),
			));
		}

		lines.push(format!("Cost: {}", fmt_cost(outputs.get("cost_usd").and_then(Value::as_f64))));
	}

	lines.push("═══════════════════════════════════════════════".to_string());

	lines.join("\n")
}

/// Write the markdown summary next to the trace artifact. Returns `None` on
/// any failure — summaries never fail the run.
pub fn write_summary_file(
	archive_root: &Path,
	cfg: &Calibration,
	trace: &Trace,
) -> Option<PathBuf> {
	let project = trace.project_name.as_deref().unwrap_or("unknown");
	let dir = archive_root.join("projects").join(project).join("_traces");

	if let Err(err) = std::fs::create_dir_all(&dir) {
		tracing::error!(error = %err, "Failed to create summary directory.");

		return None;
	}

	let path = dir.join(format!("{}_summary.md", trace.trace_id));
	let markdown = render_summary_markdown(cfg, trace);

	match std::fs::write(&path, markdown) {
		Ok(()) => {
			tracing::info!(path = %path.display(), "Trace summary written.");

			Some(path)
		},
		Err(err) => {
			tracing::error!(error = %err, "Failed to write trace summary file.");

			None
		},
	}
}

fn render_summary_markdown(cfg: &Calibration, trace: &Trace) -> String {
	let quality = QualityReading::from_trace(trace).unwrap_or_default();
	let evidence = evidence_counts(trace);
	let mut md = vec![format!("# Trace Summary: {}", trace.trace_id), String::new()];

	md.push(format!("**Project:** {}", trace.project_name.as_deref().unwrap_or("—")));
	md.push(format!("**Query:** {}", trace.query.as_deref().unwrap_or("—")));
	md.push(format!(
		"**Intent:** {} | **Domain:** {}",
		trace.intent.as_deref().unwrap_or("—"),
		trace.domain.as_deref().unwrap_or("—"),
	));
	md.push(format!(
		"**Report Type:** {} | **Research Type:** {}",
		trace.report_type.as_deref().unwrap_or("—"),
		trace.research_type.as_deref().unwrap_or("—"),
	));
	md.push(format!("**Status:** {}", trace.status));
	md.push(format!(
		"**Started:** {}",
		trace.started_at.map(format_timestamp).unwrap_or_else(|| "—".to_string()),
	));
	md.push(format!(
		"**Completed:** {}",
		trace.completed_at.map(format_timestamp).unwrap_or_else(|| "—".to_string()),
	));
	md.push(format!("**Duration:** {}", fmt_duration(trace.duration_seconds)));
	md.push(String::new());
	md.push("## Quality Gate".to_string());
	md.push(String::new());
	md.push(match quality.passed {
		Some(true) =>
			format!("**Result:** PASS ({}/{:.1})", fmt_score(quality.overall_score), cfg.quality_scale_max),
		Some(false) =>
			format!("**Result:** FAIL ({}/{:.1})", fmt_score(quality.overall_score), cfg.quality_scale_max),
		None => "**Result:** Not evaluated".to_string(),
	});

	if !quality.gap_categories.is_empty() {
		md.push(format!("**Gap Categories:** {}", quality.gap_categories.join(", ")));
	}
	if !quality.strength_categories.is_empty() {
		md.push(format!("**Strength Categories:** {}", quality.strength_categories.join(", ")));
	}
	if let Some(scores) = &quality.category_scores
		&& !scores.is_empty()
	{
		md.push(String::new());
		md.push("| Category | Score | Status |".to_string());
		md.push("|----------|-------|--------|".to_string());

		for (category, score) in scores {
			let status = if quality.gap_categories.iter().any(|gap| gap == category) {
				"Gap"
			} else {
				"OK"
			};

			md.push(format!("| {category} | {score} | {status} |"));
		}
	}

	md.push(String::new());
	md.push("## Evidence".to_string());
	md.push(String::new());
	md.push(format!("- **Collected:** {}", fmt_count(evidence.collected)));
	md.push(format!("- **Passed filter:** {}", fmt_count(evidence.passed)));
	md.push(format!("- **Filtered out:** {}", fmt_count(evidence.filtered)));
	md.push(String::new());
	md.push("## Stage Breakdown".to_string());
	md.push(String::new());
	md.push("| Stage | Duration | Decisions |".to_string());
	md.push("|-------|----------|-----------|".to_string());

	for stage in &trace.stages {
		md.push(format!(
			"| {} | {} | {} |",
			stage.name,
			fmt_duration(stage.duration_seconds),
			stage.decisions.len(),
		));
	}

	md.push(String::new());
	md.push("## Decision Log".to_string());
	md.push(String::new());

	for stage in &trace.stages {
		if stage.decisions.is_empty() {
			continue;
		}

		md.push(format!("### {}", stage.name));
		md.push(String::new());

		for decision in &stage.decisions {
			md.push(format!("- **{}**: {}", decision.category, decision.value));

			if !decision.rationale.is_empty() {
				md.push(format!("  - Why: {}", decision.rationale));
			}
			if decision.confidence < 1.0 {
				md.push(format!("  - Confidence: {:.0}%", decision.confidence * 100.0));
			}
		}

		md.push(String::new());
	}

	if !trace.iterations.is_empty() {
		md.push("## Iterations".to_string());
		md.push(String::new());
		md.push(format!("- **Total iterations:** {}", trace.iteration_count));
		md.push(format!("- **Failures:** {}", trace.failure_count));

		for (index, iteration) in trace.iterations.iter().enumerate() {
			let passed = iteration.get("passed").and_then(Value::as_bool).unwrap_or(true);

			md.push(format!("- Iteration {}: {}", index + 1, if passed { "PASS" } else { "FAIL" }));
		}

		md.push(String::new());
	}

	if !trace.outputs.is_empty() {
		md.push("## Outputs".to_string());
		md.push(String::new());

		for (key, value) in &trace.outputs {
			md.push(format!("- **{key}:** {value}"));
		}

		md.push(String::new());
	}

	md.push("---".to_string());
	md.push(format!("*Generated from trace {}*", trace.trace_id));

	md.join("\n")
}

struct EvidenceCounts {
	collected: Option<i64>,
	passed: Option<i64>,
	filtered: Option<i64>,
}

fn evidence_counts(trace: &Trace) -> EvidenceCounts {
	let Some(stage) = trace.stage(stages::COLLECTION) else {
		return EvidenceCounts { collected: None, passed: None, filtered: None };
	};

	EvidenceCounts {
		collected: stage.evidence.get("collected_count").and_then(Value::as_i64),
		passed: stage.outputs.get("evidence_passed").and_then(Value::as_i64),
		filtered: stage.outputs.get("evidence_filtered").and_then(Value::as_i64),
	}
}

fn synthesis_cost(trace: &Trace) -> Option<f64> {
	trace.stage(stages::SYNTHESIS)?.outputs.get("cost_usd").and_then(Value::as_f64)
}

fn pass_label(passed: Option<bool>) -> &'static str {
	match passed {
		Some(true) => "PASS",
		Some(false) => "FAIL",
		None => "N/A",
	}
}

fn fmt_duration(seconds: Option<f64>) -> String {
	let Some(seconds) = seconds else {
		return "—".to_string();
	};

	if seconds < 60.0 {
		return format!("{seconds:.1}s");
	}

	let minutes = (seconds / 60.0).floor() as i64;
	let rest = seconds % 60.0;

	format!("{minutes}m {rest:.0}s")
}

fn fmt_cost(cost: Option<f64>) -> String {
	match cost {
		Some(cost) => format!("${cost:.2}"),
		None => "—".to_string(),
	}
}

fn fmt_score(score: Option<f64>) -> String {
	match score {
		Some(score) => format!("{score:.1}"),
		None => "—".to_string(),
	}
}

fn fmt_count(count: Option<i64>) -> String {
	match count {
		Some(count) => count.to_string(),
		None => "—".to_string(),
	}
}

fn fmt_evidence(evidence: &EvidenceCounts) -> String {
	match (evidence.collected, evidence.passed) {
		(Some(collected), Some(passed)) => format!("{collected}→{passed}"),
		(Some(collected), None) => collected.to_string(),
		_ => "—".to_string(),
	}
}

fn truncate(text: &str, max_chars: usize) -> String {
	text.chars().take(max_chars).collect()
}
