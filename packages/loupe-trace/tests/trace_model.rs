use std::{thread, time::Duration};

use serde_json::{Map, Value, json};

use loupe_trace::{
	DecisionData, RunMetadata, Trace, TraceHandle, TraceStatus,
	model::{output_keys, stages},
};

fn map(value: Value) -> Map<String, Value> {
	value.as_object().cloned().unwrap_or_default()
}

fn new_trace() -> Trace {
	Trace::begin("trc_20260213_143022_a1b2c3d4".to_string(), RunMetadata::default())
}

#[test]
fn ending_an_unstarted_stage_changes_nothing() {
	let mut trace = new_trace();

	trace.end_stage("collection", Some(map(json!({"evidence_passed": 3}))), None);

	assert!(trace.stages.is_empty());
}

#[test]
fn stage_duration_is_positive_and_timestamps_ordered() {
	let mut trace = new_trace();

	trace.start_stage(stages::COLLECTION);
	thread::sleep(Duration::from_millis(10));
	trace.end_stage(stages::COLLECTION, None, None);

	let stage = trace.stage(stages::COLLECTION).unwrap();

	assert!(stage.duration_seconds.unwrap() > 0.0);
	assert!(stage.completed_at.unwrap() >= stage.started_at.unwrap());
}

#[test]
fn restarting_a_stage_resets_it() {
	let mut trace = new_trace();

	trace.start_stage(stages::INTAKE);
	trace.record(stages::INTAKE, "classified_intent", DecisionData::default());
	trace.start_stage(stages::INTAKE);

	let stage = trace.stage(stages::INTAKE).unwrap();

	assert!(stage.decisions.is_empty());
	assert!(stage.started_at.is_some());
	assert_eq!(trace.stages.len(), 1);
}

#[test]
fn recording_auto_creates_an_unstarted_stage() {
	let mut trace = new_trace();

	trace.record(
		stages::RUBRIC,
		"rubric_loaded",
		DecisionData {
			value: json!(42),
			rationale: "Loaded the active rubric.".to_string(),
			..Default::default()
		},
	);

	let stage = trace.stage(stages::RUBRIC).unwrap();

	assert!(stage.started_at.is_none());
	assert_eq!(stage.decisions.len(), 1);
	assert_eq!(stage.decisions[0].confidence, 1.0);
}

#[test]
fn decisions_preserve_call_order_with_non_decreasing_timestamps() {
	let mut trace = new_trace();

	trace.start_stage(stages::INTAKE);

	for index in 0..5 {
		trace.record(
			stages::INTAKE,
			"step",
			DecisionData { value: json!(index), ..Default::default() },
		);
	}

	let stage = trace.stage(stages::INTAKE).unwrap();

	for (index, decision) in stage.decisions.iter().enumerate() {
		assert_eq!(decision.value, json!(index));

		if index > 0 {
			assert!(decision.recorded_at >= stage.decisions[index - 1].recorded_at);
		}
	}
}

#[test]
fn end_stage_outputs_merge_across_calls() {
	let mut trace = new_trace();

	trace.start_stage(stages::COLLECTION);
	trace.end_stage(stages::COLLECTION, Some(map(json!({"a": 1}))), None);
	trace.end_stage(
		stages::COLLECTION,
		Some(map(json!({"b": 2}))),
		Some("late timeout".to_string()),
	);

	let stage = trace.stage(stages::COLLECTION).unwrap();

	assert_eq!(stage.outputs["a"], json!(1));
	assert_eq!(stage.outputs["b"], json!(2));
	assert_eq!(stage.error.as_deref(), Some("late timeout"));
}

#[test]
fn iteration_counters_track_calls_and_failures() {
	let mut trace = new_trace();

	trace.record_iteration(json!({"passed": true}));
	trace.record_iteration(json!({"passed": false}));
	trace.record_iteration(json!({"score": 2.1}));
	trace.record_iteration(json!({"passed": 0}));

	assert_eq!(trace.iteration_count, 4);
	assert_eq!(trace.iterations.len(), 4);
	assert_eq!(trace.failure_count, 2);
	assert!(trace.failure_count <= trace.iteration_count);
}

#[test]
fn evidence_and_prompts_replace_wholesale() {
	let mut trace = new_trace();

	trace.record_evidence(stages::COLLECTION, map(json!({"collected_count": 10})));
	trace.record_evidence(stages::COLLECTION, map(json!({"collected_count": 28})));
	trace.record_prompts(
		stages::SYNTHESIS,
		[("system_prompt".to_string(), "You are a synthesizer.".to_string())].into(),
	);

	assert_eq!(
		trace.stage(stages::COLLECTION).unwrap().evidence["collected_count"],
		json!(28)
	);
	assert_eq!(trace.stage(stages::SYNTHESIS).unwrap().prompts.len(), 1);
}

#[test]
fn terminal_marks_set_status_duration_and_error() {
	let mut trace = new_trace();

	thread::sleep(Duration::from_millis(5));
	trace.mark_failed("synthesis exploded");

	assert_eq!(trace.status, TraceStatus::Failed);
	assert!(trace.status.is_terminal());
	assert!(trace.duration_seconds.unwrap() > 0.0);
	assert_eq!(trace.outputs[output_keys::ERROR], json!("synthesis exploded"));

	let mut trace = new_trace();

	trace.mark_incomplete();

	assert_eq!(trace.status, TraceStatus::Incomplete);
}

#[test]
fn serialized_document_is_self_describing() {
	let mut trace = Trace::begin(
		"trc_20260213_143022_a1b2c3d4".to_string(),
		RunMetadata {
			project_name: Some("edtech".to_string()),
			query: Some("Do spaced-repetition apps improve retention?".to_string()),
			intent: Some("validating".to_string()),
			domain: Some("edtech".to_string()),
			..Default::default()
		},
	);

	trace.start_stage(stages::INTAKE);
	trace.record(
		stages::INTAKE,
		"classified_intent",
		DecisionData {
			value: json!("validating"),
			rationale: "User has an existing hypothesis.".to_string(),
			confidence: Some(0.85),
			alternatives: vec!["exploring (0.10)".to_string()],
			inputs: map(json!({"query_text": "Do spaced-repetition apps improve retention?"})),
		},
	);
	trace.end_stage(stages::INTAKE, None, None);
	trace.record_iteration(json!({"passed": false}));
	trace.set_outputs(map(json!({"report_file_path": "projects/edtech/report.md"})));
	trace.child_traces.push(json!({"trace_id": "trc_20260213_143100_00c0ffee"}));
	trace.mark_complete();

	let document = trace.serialize();

	assert_eq!(document["schema_version"], json!(1));
	assert_eq!(document["trace_id"], json!("trc_20260213_143022_a1b2c3d4"));
	assert_eq!(document["run"]["intent"], json!("validating"));
	assert_eq!(document["run"]["status"], json!("complete"));
	assert!(document["run"]["started_at"].is_string());

	let intake = &document["stages"]["intake"];
	let decision = &intake["decisions"][0];

	assert_eq!(decision["category"], json!("classified_intent"));
	assert_eq!(decision["confidence"], json!(0.85));
	assert_eq!(decision["alternatives"], json!(["exploring (0.10)"]));
	assert!(decision["timestamp"].is_string());
	assert_eq!(document["iteration_count"], json!(1));
	assert_eq!(document["failure_count"], json!(1));
	assert_eq!(document["outputs"]["report_file_path"], json!("projects/edtech/report.md"));
	assert_eq!(document["child_traces"][0]["trace_id"], json!("trc_20260213_143100_00c0ffee"));
	assert_eq!(document["metadata"]["generator"], json!(loupe_trace::GENERATOR));
	assert_eq!(document["metadata"]["trace_version"], json!(1));
}

#[test]
fn disabled_handle_ignores_every_recording_call() {
	let handle = TraceHandle::disabled();

	handle.start_stage(stages::INTAKE);
	handle.record(stages::INTAKE, "classified_intent", DecisionData::default());
	handle.record_evidence(stages::COLLECTION, map(json!({"collected_count": 3})));
	handle.record_iteration(json!({"passed": false}));
	handle.set_outputs(map(json!({"x": 1})));
	handle.mark_complete();

	assert!(!handle.is_enabled());
	assert!(handle.snapshot().is_none());
	assert!(handle.trace_id().is_none());
	assert!(handle.status().is_none());
}

#[test]
fn recording_handle_mutates_shared_state() {
	let handle = TraceHandle::new(new_trace());
	let clone = handle.clone();

	clone.start_stage(stages::INTAKE);
	handle.record(stages::INTAKE, "step", DecisionData::default());

	let snapshot = handle.snapshot().unwrap();

	assert_eq!(snapshot.stage(stages::INTAKE).unwrap().decisions.len(), 1);
	assert_eq!(handle.status(), Some(TraceStatus::InProgress));
}
