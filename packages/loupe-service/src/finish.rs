use std::path::PathBuf;

use serde_json::Value;

use loupe_storage::writer;
use loupe_trace::{TraceHandle, TraceStatus, context, model::output_keys};

use crate::{RunContext, calibration, summary};

/// What finishing a run actually achieved, sink by sink. A failure in one
/// sink is recorded here and never prevents the others.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct FinishOutcome {
	pub trace_id: Option<String>,
	pub status: Option<TraceStatus>,
	pub saved: bool,
	pub skipped_reason: Option<String>,
	pub artifact_path: Option<PathBuf>,
	pub artifact_error: Option<String>,
	pub row_saved: bool,
	pub row_error: Option<String>,
	pub summary_path: Option<PathBuf>,
	pub calibration_flags: Vec<String>,
	pub flagged_for_review: bool,
}

impl RunContext {
	/// Finish a trace: demote `in_progress` to `incomplete`, persist to the
	/// artifact file and the row store independently, render the post-run
	/// summary, run the calibration analyzer, and clear the run's binding.
	///
	/// Every step is fault-isolated; this never fails the owning run.
	pub async fn finish(&self, handle: TraceHandle) -> FinishOutcome {
		let mut outcome = FinishOutcome::default();

		if !handle.is_enabled() {
			context::clear();
			outcome.skipped_reason = Some("tracing_disabled".to_string());

			return outcome;
		}

		if handle.status() == Some(TraceStatus::InProgress) {
			handle.mark_incomplete();
		}

		let Some(mut snapshot) = handle.snapshot() else {
			context::clear();

			return outcome;
		};

		outcome.trace_id = Some(snapshot.trace_id.clone());
		outcome.status = Some(snapshot.status);

		match writer::write_artifact(&self.cfg.storage.archive_root, &snapshot) {
			Ok(path) => {
				let stamped = Value::String(path.display().to_string());

				// Stamp the path back so the row projection references it.
				handle.with(|trace| {
					trace
						.outputs
						.insert(output_keys::TRACE_FILE_PATH.to_string(), stamped.clone())
				});
				snapshot = handle.snapshot().unwrap_or(snapshot);
				outcome.artifact_path = Some(path);
			},
			Err(err) => {
				tracing::error!(error = %err, "Failed to write trace artifact.");
				outcome.artifact_error = Some(err.to_string());
			},
		}

		match writer::write_row(&self.db, &snapshot).await {
			Ok(()) => outcome.row_saved = true,
			Err(err) => {
				tracing::error!(error = %err, "Failed to write trace row.");
				outcome.row_error = Some(err.to_string());
			},
		}

		outcome.saved = outcome.artifact_path.is_some() || outcome.row_saved;
		outcome.summary_path =
			summary::write_summary_file(&self.cfg.storage.archive_root, &self.cfg.calibration, &snapshot);

		let flags = calibration::check(&self.db, &self.cfg.calibration, &snapshot).await;

		if !flags.is_empty() {
			match writer::mark_flagged_for_review(&self.db, &snapshot.trace_id).await {
				Ok(()) => outcome.flagged_for_review = true,
				Err(err) => {
					tracing::error!(error = %err, "Failed to set flagged_for_review.");
				},
			}

			if let Err(err) =
				calibration::append_alert_file(&self.cfg.storage.archive_root, &snapshot, &flags)
			{
				tracing::error!(error = %err, "Failed to write calibration alert file.");
			}
		}

		outcome.calibration_flags = flags;

		context::clear();
		tracing::info!(
			trace_id = %snapshot.trace_id,
			status = %snapshot.status,
			"Trace finished."
		);

		outcome
	}
}
