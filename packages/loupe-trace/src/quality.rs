//! Canonical reading of a trace's quality-evaluation stage.
//!
//! Category scores arrive in either of two shapes — a list of `{id, score}`
//! records or a flat map — and are normalized into one map here so the
//! ambiguity never reaches the writer, the analyzer, or the summary.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{Trace, stages};

/// Output keys the quality stage is expected to populate.
pub mod keys {
	pub const PASSED: &str = "passed";
	pub const OVERALL_SCORE: &str = "overall_score";
	pub const CATEGORY_SCORES: &str = "category_scores";
	pub const GAP_CATEGORIES: &str = "gap_categories";
	pub const STRENGTH_CATEGORIES: &str = "strength_categories";
}

#[derive(Clone, Debug, Default)]
pub struct QualityReading {
	pub passed: Option<bool>,
	pub overall_score: Option<f64>,
	pub category_scores: Option<BTreeMap<String, f64>>,
	pub gap_categories: Vec<String>,
	pub strength_categories: Vec<String>,
}

impl QualityReading {
	/// Read the quality stage, or `None` if the trace never reached one.
	pub fn from_trace(trace: &Trace) -> Option<Self> {
		let stage = trace.stage(stages::QUALITY_GATE)?;
		let outputs = &stage.outputs;

		Some(Self {
			passed: outputs.get(keys::PASSED).and_then(Value::as_bool),
			overall_score: outputs.get(keys::OVERALL_SCORE).and_then(Value::as_f64),
			category_scores: outputs.get(keys::CATEGORY_SCORES).and_then(normalize_category_scores),
			gap_categories: string_list(outputs.get(keys::GAP_CATEGORIES)),
			strength_categories: string_list(outputs.get(keys::STRENGTH_CATEGORIES)),
		})
	}

	/// The explicit gap list, augmented with any category scoring strictly
	/// below `low_score_threshold`.
	pub fn gap_candidates(&self, low_score_threshold: f64) -> Vec<String> {
		let mut candidates = self.gap_categories.clone();

		if let Some(scores) = &self.category_scores {
			for (category, score) in scores {
				if *score < low_score_threshold
					&& !candidates.iter().any(|existing| existing == category)
				{
					candidates.push(category.clone());
				}
			}
		}

		candidates
	}
}

/// Accepts `[{"id": "META-1", "score": 3}, …]` or `{"META-1": 3, …}`.
/// Entries that do not fit either shape are skipped, not errors.
pub fn normalize_category_scores(raw: &Value) -> Option<BTreeMap<String, f64>> {
	match raw {
		Value::Array(items) => {
			let mut scores = BTreeMap::new();

			for item in items {
				let Some(record) = item.as_object() else { continue };
				let Some(id) = record.get("id").and_then(Value::as_str) else { continue };
				let Some(score) = record.get("score").and_then(Value::as_f64) else { continue };

				scores.insert(id.to_string(), score);
			}

			Some(scores)
		},
		Value::Object(map) => {
			let mut scores = BTreeMap::new();

			for (id, score) in map {
				if let Some(score) = score.as_f64() {
					scores.insert(id.clone(), score);
				}
			}

			Some(scores)
		},
		_ => None,
	}
}

fn string_list(raw: Option<&Value>) -> Vec<String> {
	raw.and_then(Value::as_array)
		.map(|items| {
			items.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>()
		})
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::model::{RunMetadata, stages};

	fn trace_with_quality_outputs(outputs: Value) -> Trace {
		let mut trace = Trace::begin("trc_test".to_string(), RunMetadata::default());

		trace.start_stage(stages::QUALITY_GATE);
		trace.end_stage(
			stages::QUALITY_GATE,
			Some(outputs.as_object().cloned().unwrap_or_default()),
			None,
		);

		trace
	}

	#[test]
	fn missing_quality_stage_reads_as_none() {
		let trace = Trace::begin("trc_test".to_string(), RunMetadata::default());

		assert!(QualityReading::from_trace(&trace).is_none());
	}

	#[test]
	fn list_shape_normalizes_to_map() {
		let trace = trace_with_quality_outputs(json!({
			"passed": true,
			"overall_score": 2.8,
			"category_scores": [
				{"id": "META-1", "score": 3},
				{"id": "META-2", "score": 1},
				{"not_a_record": true},
			],
		}));
		let reading = QualityReading::from_trace(&trace).unwrap();
		let scores = reading.category_scores.unwrap();

		assert_eq!(scores.len(), 2);
		assert_eq!(scores["META-2"], 1.0);
	}

	#[test]
	fn map_shape_normalizes_to_map() {
		let trace = trace_with_quality_outputs(json!({
			"category_scores": {"META-1": 3, "META-2": 1.5},
		}));
		let reading = QualityReading::from_trace(&trace).unwrap();
		let scores = reading.category_scores.unwrap();

		assert_eq!(scores["META-1"], 3.0);
		assert_eq!(scores["META-2"], 1.5);
	}

	#[test]
	fn gap_candidates_augment_explicit_gaps_with_low_scores() {
		let trace = trace_with_quality_outputs(json!({
			"gap_categories": ["META-9"],
			"category_scores": {"META-1": 3, "META-2": 1, "META-9": 0},
		}));
		let reading = QualityReading::from_trace(&trace).unwrap();
		let candidates = reading.gap_candidates(2.0);

		// META-9 appears once even though it is both listed and low-scoring.
		assert_eq!(candidates, vec!["META-9".to_string(), "META-2".to_string()]);
	}

	#[test]
	fn non_collection_scores_read_as_none() {
		let trace = trace_with_quality_outputs(json!({"category_scores": "corrupt"}));
		let reading = QualityReading::from_trace(&trace).unwrap();

		assert!(reading.category_scores.is_none());
	}
}
