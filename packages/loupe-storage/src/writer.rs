//! Dual persistence for finished traces.
//!
//! `write_artifact` stores the full serialized document as an indented JSON
//! file under the archive root; `write_row` projects the queryable subset into
//! the `traces` table. The two paths are independent: callers isolate each
//! failure instead of letting one abort the other.

use std::{
	fs,
	path::{Path, PathBuf},
};

use serde_json::{Value, json};
use uuid::Uuid;

use loupe_trace::{
	QualityReading, Trace,
	model::{output_keys, stages},
};

use crate::{Error, Result, db::Db};

pub fn write_artifact(archive_root: &Path, trace: &Trace) -> Result<PathBuf> {
	let project = trace.project_name.as_deref().unwrap_or("unknown");
	let dir = archive_root.join("projects").join(project).join("_traces");

	fs::create_dir_all(&dir).map_err(|err| Error::Io { path: dir.clone(), source: err })?;

	let path = dir.join(format!("{}.json", trace.trace_id));
	let rendered = serde_json::to_string_pretty(&trace.serialize())?;

	fs::write(&path, rendered).map_err(|err| Error::Io { path: path.clone(), source: err })?;
	tracing::info!(path = %path.display(), "Trace artifact written.");

	Ok(path)
}

/// Insert one denormalized row for the trace. Every referenced stage may be
/// absent; absent stages project as nulls. Values are bound, never
/// interpolated into the query text.
pub async fn write_row(db: &Db, trace: &Trace) -> Result<()> {
	let quality = QualityReading::from_trace(trace).unwrap_or_default();
	let synthesis = synthesis_fields(trace);
	let evidence = evidence_fields(trace);
	let enriched = enriched_fields(trace);
	let category_scores = match &quality.category_scores {
		Some(scores) => serde_json::to_value(scores)?,
		None => json!({}),
	};
	let started_at = trace.started_at.unwrap_or_else(time::OffsetDateTime::now_utc);
	let report_file_path = trace
		.outputs
		.get(output_keys::REPORT_FILE_PATH)
		.or_else(|| trace.outputs.get(output_keys::REPORT_PATH))
		.and_then(Value::as_str);

	sqlx::query(
		"\
INSERT INTO traces (
	trace_id, project_id, project_name,
	query, intent, domain, report_type, research_type,
	status, quality_gate_passed, overall_quality_score,
	started_at, completed_at, duration_seconds,
	intake_duration, rubric_duration, collection_duration,
	synthesis_duration, quality_gate_duration,
	evidence_collected, evidence_passed, evidence_filtered,
	synthesis_model, synthesis_input_tokens, synthesis_output_tokens,
	synthesis_cost_usd,
	category_scores, gap_categories, strength_categories,
	iteration_count, failure_count,
	trace_file_path, report_file_path, output_file_paths,
	flagged_for_review, review_notes,
	tier_config, rubric_scores, category_breakdown,
	qg_iteration_count, retrieval_method,
	evidence_retrieved, evidence_used,
	retrieval_tokens, retrieval_cost_usd
)
VALUES (
	$1, $2, $3,
	$4, $5, $6, $7, $8,
	$9, $10, $11,
	$12, $13, $14,
	$15, $16, $17,
	$18, $19,
	$20, $21, $22,
	$23, $24, $25,
	$26,
	$27, $28, $29,
	$30, $31,
	$32, $33, $34,
	$35, $36,
	$37, $38, $39,
	$40, $41,
	$42, $43,
	$44, $45
)",
	)
	.bind(trace.trace_id.as_str())
	.bind(project_uuid(trace))
	.bind(trace.project_name.as_deref())
	.bind(trace.query.as_deref())
	.bind(trace.intent.as_deref())
	.bind(trace.domain.as_deref())
	.bind(trace.report_type.as_deref())
	.bind(trace.research_type.as_deref())
	.bind(trace.status.as_str())
	.bind(quality.passed)
	.bind(quality.overall_score)
	.bind(started_at)
	.bind(trace.completed_at)
	.bind(trace.duration_seconds)
	.bind(stage_duration(trace, stages::INTAKE))
	.bind(stage_duration(trace, stages::RUBRIC))
	.bind(stage_duration(trace, stages::COLLECTION))
	.bind(stage_duration(trace, stages::SYNTHESIS))
	.bind(stage_duration(trace, stages::QUALITY_GATE))
	.bind(evidence.collected)
	.bind(evidence.passed)
	.bind(evidence.filtered)
	.bind(synthesis.model)
	.bind(synthesis.input_tokens)
	.bind(synthesis.output_tokens)
	.bind(synthesis.cost_usd)
	.bind(category_scores)
	.bind(non_empty(quality.gap_categories))
	.bind(non_empty(quality.strength_categories))
	.bind(trace.iteration_count as i32)
	.bind(trace.failure_count as i32)
	.bind(trace.outputs.get(output_keys::TRACE_FILE_PATH).and_then(Value::as_str))
	.bind(report_file_path)
	.bind(output_file_paths(trace))
	.bind(false)
	.bind(None::<String>)
	.bind(enriched.tier_config)
	.bind(enriched.rubric_scores)
	.bind(enriched.category_breakdown)
	.bind(enriched.qg_iteration_count)
	.bind(enriched.retrieval_method)
	.bind(enriched.evidence_retrieved)
	.bind(enriched.evidence_used)
	.bind(enriched.retrieval_tokens)
	.bind(enriched.retrieval_cost_usd)
	.execute(&db.pool)
	.await?;

	tracing::info!(trace_id = %trace.trace_id, "Trace row written.");

	Ok(())
}

/// Flip the review flag after calibration flags fire. Idempotent; the value
/// only ever moves false to true, so racing writers are safe.
pub async fn mark_flagged_for_review(db: &Db, trace_id: &str) -> Result<()> {
	sqlx::query("UPDATE traces SET flagged_for_review = TRUE WHERE trace_id = $1")
		.bind(trace_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

#[derive(Debug, Default)]
struct SynthesisFields {
	model: Option<String>,
	input_tokens: Option<i32>,
	output_tokens: Option<i32>,
	cost_usd: Option<f64>,
}

#[derive(Debug, Default)]
struct EvidenceFields {
	collected: Option<i32>,
	passed: Option<i32>,
	filtered: Option<i32>,
}

#[derive(Debug, Default)]
struct EnrichedFields {
	tier_config: Option<String>,
	rubric_scores: Option<Value>,
	category_breakdown: Option<Value>,
	qg_iteration_count: Option<i32>,
	retrieval_method: Option<String>,
	evidence_retrieved: Option<i32>,
	evidence_used: Option<i32>,
	retrieval_tokens: Option<i32>,
	retrieval_cost_usd: Option<f64>,
}

fn stage_duration(trace: &Trace, name: &str) -> Option<f64> {
	trace.stage(name).and_then(|stage| stage.duration_seconds)
}

fn synthesis_fields(trace: &Trace) -> SynthesisFields {
	let Some(stage) = trace.stage(stages::SYNTHESIS) else {
		return SynthesisFields::default();
	};
	let outputs = &stage.outputs;
	let token_usage = outputs.get("token_usage").and_then(Value::as_object);

	SynthesisFields {
		model: outputs.get("model").and_then(Value::as_str).map(str::to_string),
		input_tokens: as_i32(token_usage.and_then(|usage| usage.get("input_tokens"))),
		output_tokens: as_i32(token_usage.and_then(|usage| usage.get("output_tokens"))),
		cost_usd: outputs.get("cost_usd").and_then(Value::as_f64),
	}
}

fn evidence_fields(trace: &Trace) -> EvidenceFields {
	let Some(stage) = trace.stage(stages::COLLECTION) else {
		return EvidenceFields::default();
	};

	EvidenceFields {
		collected: as_i32(stage.evidence.get("collected_count")),
		passed: as_i32(stage.outputs.get("evidence_passed")),
		filtered: as_i32(stage.outputs.get("evidence_filtered")),
	}
}

fn enriched_fields(trace: &Trace) -> EnrichedFields {
	let outputs = &trace.outputs;

	EnrichedFields {
		tier_config: outputs.get("tier_config").and_then(Value::as_str).map(str::to_string),
		rubric_scores: outputs.get("rubric_scores").filter(|value| value.is_object()).cloned(),
		category_breakdown: outputs.get("category_breakdown").filter(|value| !value.is_null()).cloned(),
		qg_iteration_count: as_i32(outputs.get("qg_iteration_count")),
		retrieval_method: outputs
			.get("retrieval_method")
			.and_then(Value::as_str)
			.map(str::to_string),
		evidence_retrieved: as_i32(outputs.get("evidence_retrieved")),
		evidence_used: as_i32(outputs.get("evidence_used")),
		retrieval_tokens: as_i32(outputs.get("retrieval_tokens")),
		retrieval_cost_usd: outputs.get("retrieval_cost_usd").and_then(Value::as_f64),
	}
}

/// String outputs that look like file paths, for the row's path array.
fn output_file_paths(trace: &Trace) -> Option<Vec<String>> {
	let paths = trace
		.outputs
		.values()
		.filter_map(Value::as_str)
		.filter(|text| text.contains('/') || text.contains('\\'))
		.map(str::to_string)
		.collect::<Vec<_>>();

	non_empty(paths)
}

fn project_uuid(trace: &Trace) -> Option<Uuid> {
	trace.project_id.as_deref().and_then(|raw| Uuid::parse_str(raw).ok())
}

fn as_i32(value: Option<&Value>) -> Option<i32> {
	value.and_then(Value::as_i64).and_then(|n| i32::try_from(n).ok())
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
	if values.is_empty() { None } else { Some(values) }
}
