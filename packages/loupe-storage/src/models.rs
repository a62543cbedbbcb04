use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Denormalized projection of one run, as stored in the `traces` table.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct TraceRow {
	pub trace_id: String,
	pub project_id: Option<Uuid>,
	pub project_name: Option<String>,
	pub query: Option<String>,
	pub intent: Option<String>,
	pub domain: Option<String>,
	pub report_type: Option<String>,
	pub research_type: Option<String>,
	pub status: String,
	pub quality_gate_passed: Option<bool>,
	pub overall_quality_score: Option<f64>,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub completed_at: Option<OffsetDateTime>,
	pub duration_seconds: Option<f64>,
	pub intake_duration: Option<f64>,
	pub rubric_duration: Option<f64>,
	pub collection_duration: Option<f64>,
	pub synthesis_duration: Option<f64>,
	pub quality_gate_duration: Option<f64>,
	pub evidence_collected: Option<i32>,
	pub evidence_passed: Option<i32>,
	pub evidence_filtered: Option<i32>,
	pub synthesis_model: Option<String>,
	pub synthesis_input_tokens: Option<i32>,
	pub synthesis_output_tokens: Option<i32>,
	pub synthesis_cost_usd: Option<f64>,
	pub category_scores: Value,
	pub gap_categories: Option<Vec<String>>,
	pub strength_categories: Option<Vec<String>>,
	pub iteration_count: i32,
	pub failure_count: i32,
	pub trace_file_path: Option<String>,
	pub report_file_path: Option<String>,
	pub output_file_paths: Option<Vec<String>>,
	pub flagged_for_review: bool,
	pub review_notes: Option<String>,
	pub tier_config: Option<String>,
	pub rubric_scores: Option<Value>,
	pub category_breakdown: Option<Value>,
	pub qg_iteration_count: Option<i32>,
	pub retrieval_method: Option<String>,
	pub evidence_retrieved: Option<i32>,
	pub evidence_used: Option<i32>,
	pub retrieval_tokens: Option<i32>,
	pub retrieval_cost_usd: Option<f64>,
}

/// One recurring gap category and how often it recurred.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CategoryPattern {
	pub category_id: String,
	pub fail_count: i64,
}

/// Pairwise comparison of two runs. Deltas are B minus A; the gap-category
/// partitions are sorted for determinism.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceComparison {
	pub trace_a: String,
	pub trace_b: String,
	pub quality_delta: Option<f64>,
	pub duration_delta: Option<f64>,
	pub cost_delta: Option<f64>,
	pub gaps_a_only: Vec<String>,
	pub gaps_b_only: Vec<String>,
	pub gaps_both: Vec<String>,
}

/// Aggregate counts and averages across the whole store. Averages cover
/// completed runs only and are absent on an empty store.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct TraceSummary {
	pub total_runs: i64,
	pub complete: i64,
	pub failed: i64,
	pub incomplete: i64,
	pub qg_passed: i64,
	pub qg_failed: i64,
	pub avg_quality: Option<f64>,
	pub avg_duration: Option<f64>,
	pub avg_cost: Option<f64>,
}

/// The slice of a prior run the regression check needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriorRun {
	pub trace_id: String,
	pub quality_gate_passed: Option<bool>,
	pub overall_quality_score: Option<f64>,
}
