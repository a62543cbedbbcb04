//! Read-side query API over the trace row store.
//!
//! All listings restricted to completed runs order most-recent-first by
//! `started_at`; ties are not broken further. Set outputs are sorted so
//! results stay deterministic.

use std::collections::BTreeSet;

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{CategoryPattern, PriorRun, TraceComparison, TraceRow, TraceSummary},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
	Intent,
	Domain,
	Project,
}

impl Dimension {
	pub fn column(&self) -> &'static str {
		match self {
			Self::Intent => "intent",
			Self::Domain => "domain",
			Self::Project => "project_name",
		}
	}
}

/// Completed runs matching one classification tag.
pub async fn by_dimension(
	db: &Db,
	dimension: Dimension,
	value: &str,
	limit: i64,
) -> Result<Vec<TraceRow>> {
	let mut builder = sqlx::QueryBuilder::new("SELECT * FROM traces WHERE ");

	builder.push(dimension.column());
	builder.push(" = ");
	builder.push_bind(value);
	builder.push(" AND status = 'complete' ORDER BY started_at DESC LIMIT ");
	builder.push_bind(limit);

	Ok(builder.build_query_as::<TraceRow>().fetch_all(&db.pool).await?)
}

/// Completed runs that explicitly failed the quality gate.
pub async fn quality_gate_failures(db: &Db, limit: i64) -> Result<Vec<TraceRow>> {
	let rows = sqlx::query_as::<_, TraceRow>(
		"\
SELECT * FROM traces
WHERE quality_gate_passed = FALSE AND status = 'complete'
ORDER BY started_at DESC
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Completed runs where one category scored below `threshold`.
pub async fn low_scoring(
	db: &Db,
	category_id: &str,
	threshold: f64,
	limit: i64,
) -> Result<Vec<TraceRow>> {
	let rows = sqlx::query_as::<_, TraceRow>(
		"\
SELECT * FROM traces
WHERE (category_scores->>$1)::float8 < $2
	AND status = 'complete'
ORDER BY started_at DESC
LIMIT $3",
	)
	.bind(category_id)
	.bind(threshold)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Runs flagged for calibration review, irrespective of completion status.
pub async fn flagged_for_review(db: &Db, limit: i64) -> Result<Vec<TraceRow>> {
	let rows = sqlx::query_as::<_, TraceRow>(
		"\
SELECT * FROM traces
WHERE flagged_for_review = TRUE
ORDER BY started_at DESC
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Categories that recur as gaps across completed runs, most frequent first.
pub async fn category_patterns(db: &Db, min_occurrences: i64) -> Result<Vec<CategoryPattern>> {
	let rows = sqlx::query_as::<_, CategoryPattern>(
		"\
SELECT
	unnest(gap_categories) AS category_id,
	COUNT(*) AS fail_count
FROM traces
WHERE status = 'complete' AND gap_categories IS NOT NULL
GROUP BY category_id
HAVING COUNT(*) >= $1
ORDER BY fail_count DESC",
	)
	.bind(min_occurrences)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Side-by-side comparison of two runs. Errors if either is missing.
pub async fn compare(db: &Db, trace_id_a: &str, trace_id_b: &str) -> Result<TraceComparison> {
	let row_a = fetch_row(db, trace_id_a)
		.await?
		.ok_or_else(|| Error::NotFound(format!("trace {trace_id_a}")))?;
	let row_b = fetch_row(db, trace_id_b)
		.await?
		.ok_or_else(|| Error::NotFound(format!("trace {trace_id_b}")))?;
	let gaps_a = gap_set(&row_a);
	let gaps_b = gap_set(&row_b);

	Ok(TraceComparison {
		trace_a: trace_id_a.to_string(),
		trace_b: trace_id_b.to_string(),
		quality_delta: delta(row_a.overall_quality_score, row_b.overall_quality_score),
		duration_delta: delta(row_a.duration_seconds, row_b.duration_seconds),
		cost_delta: delta(row_a.synthesis_cost_usd, row_b.synthesis_cost_usd),
		gaps_a_only: gaps_a.difference(&gaps_b).cloned().collect(),
		gaps_b_only: gaps_b.difference(&gaps_a).cloned().collect(),
		gaps_both: gaps_a.intersection(&gaps_b).cloned().collect(),
	})
}

/// The full stored document for a run: row lookup, then artifact read.
/// Absent row, path, file, or parse all surface as `None`, never an error.
pub async fn full_document(db: &Db, trace_id: &str) -> Result<Option<Value>> {
	let path: Option<Option<String>> =
		sqlx::query_scalar("SELECT trace_file_path FROM traces WHERE trace_id = $1")
			.bind(trace_id)
			.fetch_optional(&db.pool)
			.await?;
	let Some(Some(path)) = path else {
		return Ok(None);
	};
	let raw = match std::fs::read_to_string(&path) {
		Ok(raw) => raw,
		Err(err) => {
			tracing::warn!(path = %path, error = %err, "Trace artifact not readable.");

			return Ok(None);
		},
	};

	match serde_json::from_str(&raw) {
		Ok(document) => Ok(Some(document)),
		Err(err) => {
			tracing::error!(path = %path, error = %err, "Trace artifact failed to parse.");

			Ok(None)
		},
	}
}

/// Aggregate counts plus averages over completed runs. An empty store yields
/// zero counts and absent averages, never an error.
pub async fn summary(db: &Db) -> Result<TraceSummary> {
	let summary = sqlx::query_as::<_, TraceSummary>(
		"\
SELECT
	COUNT(*) AS total_runs,
	COUNT(*) FILTER (WHERE status = 'complete') AS complete,
	COUNT(*) FILTER (WHERE status = 'failed') AS failed,
	COUNT(*) FILTER (WHERE status = 'incomplete') AS incomplete,
	COUNT(*) FILTER (WHERE quality_gate_passed = TRUE) AS qg_passed,
	COUNT(*) FILTER (WHERE quality_gate_passed = FALSE) AS qg_failed,
	AVG(overall_quality_score) FILTER (WHERE status = 'complete') AS avg_quality,
	AVG(duration_seconds) FILTER (WHERE status = 'complete') AS avg_duration,
	AVG(synthesis_cost_usd) FILTER (WHERE status = 'complete') AS avg_cost
FROM traces",
	)
	.fetch_one(&db.pool)
	.await?;

	Ok(summary)
}

/// How often a category appeared as a gap across completed runs in the
/// trailing window.
pub async fn recent_gap_count(db: &Db, category_id: &str, days: i32) -> Result<i64> {
	let count: i64 = sqlx::query_scalar(
		"\
SELECT COUNT(*)
FROM traces
WHERE $1 = ANY(gap_categories)
	AND started_at > NOW() - make_interval(days => $2)
	AND status = 'complete'",
	)
	.bind(category_id)
	.bind(days)
	.fetch_one(&db.pool)
	.await?;

	Ok(count)
}

/// Average quality score for one classification-tag value, completed runs
/// with a recorded score only.
pub async fn avg_quality_for(db: &Db, dimension: Dimension, value: &str) -> Result<Option<f64>> {
	let mut builder = sqlx::QueryBuilder::new(
		"SELECT AVG(overall_quality_score) FROM traces WHERE status = 'complete' \
		 AND overall_quality_score IS NOT NULL AND ",
	);

	builder.push(dimension.column());
	builder.push(" = ");
	builder.push_bind(value);

	let avg: Option<f64> = builder.build_query_scalar().fetch_one(&db.pool).await?;

	Ok(avg)
}

/// All-time average quality score across completed runs.
pub async fn overall_avg_quality(db: &Db) -> Result<Option<f64>> {
	let avg: Option<f64> = sqlx::query_scalar(
		"\
SELECT AVG(overall_quality_score)
FROM traces
WHERE status = 'complete' AND overall_quality_score IS NOT NULL",
	)
	.fetch_one(&db.pool)
	.await?;

	Ok(avg)
}

/// The most recent completed run for a project strictly before `before`.
pub async fn previous_completed_for_project(
	db: &Db,
	project_id: Uuid,
	before: OffsetDateTime,
) -> Result<Option<PriorRun>> {
	let row = sqlx::query_as::<_, PriorRun>(
		"\
SELECT trace_id, quality_gate_passed, overall_quality_score
FROM traces
WHERE project_id = $1 AND status = 'complete' AND started_at < $2
ORDER BY started_at DESC
LIMIT 1",
	)
	.bind(project_id)
	.bind(before)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

async fn fetch_row(db: &Db, trace_id: &str) -> Result<Option<TraceRow>> {
	let row = sqlx::query_as::<_, TraceRow>("SELECT * FROM traces WHERE trace_id = $1")
		.bind(trace_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(row)
}

fn gap_set(row: &TraceRow) -> BTreeSet<String> {
	row.gap_categories.clone().unwrap_or_default().into_iter().collect()
}

fn delta(a: Option<f64>, b: Option<f64>) -> Option<f64> {
	match (a, b) {
		(Some(a), Some(b)) => Some(b - a),
		_ => None,
	}
}
