//! Calibration flags: advisory pattern detection over a finished trace.
//!
//! Flags never block or modify the run. Every historical lookup is isolated;
//! a failed lookup drops that one check and the rest still contribute.

use std::{io::Write, path::Path};

use time::OffsetDateTime;
use uuid::Uuid;

use loupe_config::Calibration;
use loupe_storage::{
	db::Db,
	query::{self, Dimension},
};
use loupe_trace::{QualityReading, Trace, model::format_timestamp};

/// Analyze a finished trace against history. Returns human-readable flag
/// messages; an empty list means nothing warrants attention.
pub async fn check(db: &Db, cfg: &Calibration, trace: &Trace) -> Vec<String> {
	let mut flags = Vec::new();
	let Some(reading) = QualityReading::from_trace(trace) else {
		return flags;
	};

	// Repeated gap categories in the trailing window.
	for category_id in reading.gap_candidates(cfg.low_score_threshold) {
		match query::recent_gap_count(db, &category_id, cfg.recent_window_days).await {
			Ok(count) if count >= cfg.recent_failure_min => flags.push(format!(
				"Category {category_id} has scored below threshold {count} times in the last {} \
				 days. Consider reviewing calibration.",
				cfg.recent_window_days,
			)),
			Ok(_) => {},
			Err(err) => {
				tracing::warn!(category = %category_id, error = %err, "Failed to check recent gap count.");
			},
		}
	}

	// Intent quality disparity.
	if let Some(intent) = trace.intent.as_deref() {
		match disparity(db, Dimension::Intent, intent, cfg).await {
			Ok(Some((tag_avg, overall_avg))) => flags.push(format!(
				"{intent} intent runs average {tag_avg:.1} quality vs {overall_avg:.1} overall. \
				 May need intent-specific tuning.",
			)),
			Ok(None) => {},
			Err(err) => {
				tracing::warn!(error = %err, "Failed to check intent disparity.");
			},
		}
	}

	// Domain quality disparity.
	if let Some(domain) = trace.domain.as_deref() {
		match disparity(db, Dimension::Domain, domain, cfg).await {
			Ok(Some((tag_avg, overall_avg))) => flags.push(format!(
				"{domain} domain runs average {tag_avg:.1} quality vs {overall_avg:.1} overall.",
			)),
			Ok(None) => {},
			Err(err) => {
				tracing::warn!(error = %err, "Failed to check domain disparity.");
			},
		}
	}

	// Quality regression against the project's previous completed run.
	if reading.passed == Some(false)
		&& let Some(project_id) =
			trace.project_id.as_deref().and_then(|raw| Uuid::parse_str(raw).ok())
		&& let Some(started_at) = trace.started_at
	{
		match query::previous_completed_for_project(db, project_id, started_at).await {
			Ok(Some(prev)) if prev.quality_gate_passed == Some(true) => {
				let label =
					trace.project_name.clone().unwrap_or_else(|| project_id.to_string());

				flags.push(format!(
					"Quality regression detected for project {label}: this run failed quality \
					 gate after previous run passed.",
				));
			},
			Ok(_) => {},
			Err(err) => {
				tracing::warn!(error = %err, "Failed to check quality regression.");
			},
		}
	}

	flags
}

fn disparity_exceeded(tag_avg: f64, overall_avg: f64, threshold: f64) -> bool {
	overall_avg - tag_avg > threshold
}

async fn disparity(
	db: &Db,
	dimension: Dimension,
	value: &str,
	cfg: &Calibration,
) -> loupe_storage::Result<Option<(f64, f64)>> {
	let tag_avg = query::avg_quality_for(db, dimension, value).await?;
	let overall_avg = query::overall_avg_quality(db).await?;

	if let (Some(tag_avg), Some(overall_avg)) = (tag_avg, overall_avg)
		&& disparity_exceeded(tag_avg, overall_avg, cfg.disparity_threshold)
	{
		return Ok(Some((tag_avg, overall_avg)));
	}

	Ok(None)
}

/// Append flag messages to the project's `_calibration_alerts.md`.
/// Append-only; the file header is written once on creation.
pub fn append_alert_file(
	archive_root: &Path,
	trace: &Trace,
	flags: &[String],
) -> loupe_storage::Result<()> {
	let project = trace.project_name.as_deref().unwrap_or("unknown");
	let dir = archive_root.join("projects").join(project);

	std::fs::create_dir_all(&dir)
		.map_err(|err| loupe_storage::Error::Io { path: dir.clone(), source: err })?;

	let path = dir.join("_calibration_alerts.md");
	let timestamp = trace
		.completed_at
		.map(format_timestamp)
		.unwrap_or_else(|| format_timestamp(OffsetDateTime::now_utc()));
	let mut entry = format!("## {timestamp}\n**Trace:** `{}`\n\n", trace.trace_id);

	for message in flags {
		entry.push_str(&format!("- {message}\n"));
	}

	entry.push_str("\n---\n\n");

	let mut file = if path.exists() {
		std::fs::OpenOptions::new()
			.append(true)
			.open(&path)
			.map_err(|err| loupe_storage::Error::Io { path: path.clone(), source: err })?
	} else {
		let mut file = std::fs::File::create(&path)
			.map_err(|err| loupe_storage::Error::Io { path: path.clone(), source: err })?;

		file.write_all(
			b"# Calibration Alerts\n\nAuto-generated alerts when trace patterns suggest \
			calibration attention.\n\n---\n\n",
		)
		.map_err(|err| loupe_storage::Error::Io { path: path.clone(), source: err })?;

		file
	};

	file.write_all(entry.as_bytes())
		.map_err(|err| loupe_storage::Error::Io { path: path.clone(), source: err })?;

	tracing::info!(path = %path.display(), "Calibration alert appended.");

	Ok(())
}
