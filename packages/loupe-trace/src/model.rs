use std::{
	collections::{BTreeMap, HashMap},
	time::Instant,
};

use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub const SCHEMA_VERSION: u32 = 1;
pub const GENERATOR: &str = "loupe-observability-v1";

/// Stage names the row projection knows how to mine.
pub mod stages {
	pub const INTAKE: &str = "intake";
	pub const RUBRIC: &str = "rubric";
	pub const COLLECTION: &str = "collection";
	pub const SYNTHESIS: &str = "synthesis";
	pub const QUALITY_GATE: &str = "quality_gate";
}

/// Reserved trace-level output keys.
pub mod output_keys {
	pub const ERROR: &str = "error";
	pub const TRACE_FILE_PATH: &str = "trace_file_path";
	pub const REPORT_FILE_PATH: &str = "report_file_path";
	pub const REPORT_PATH: &str = "report_path";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
	InProgress,
	Complete,
	Incomplete,
	Failed,
}

impl TraceStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::InProgress => "in_progress",
			Self::Complete => "complete",
			Self::Incomplete => "incomplete",
			Self::Failed => "failed",
		}
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, Self::InProgress)
	}
}

impl std::fmt::Display for TraceStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Classification metadata captured when a run starts.
#[derive(Clone, Debug, Default)]
pub struct RunMetadata {
	pub project_id: Option<String>,
	pub project_name: Option<String>,
	pub query: Option<String>,
	pub intent: Option<String>,
	pub domain: Option<String>,
	pub report_type: Option<String>,
	pub research_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Decision {
	pub category: String,
	pub value: Value,
	pub rationale: String,
	pub confidence: f64,
	pub alternatives: Vec<String>,
	pub inputs: Map<String, Value>,
	pub recorded_at: OffsetDateTime,
}

/// Payload for [`Trace::record`]. Confidence defaults to 1.0 when absent.
#[derive(Clone, Debug, Default)]
pub struct DecisionData {
	pub value: Value,
	pub rationale: String,
	pub confidence: Option<f64>,
	pub alternatives: Vec<String>,
	pub inputs: Map<String, Value>,
}

#[derive(Clone, Debug)]
pub struct Stage {
	pub name: String,
	pub started_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
	pub duration_seconds: Option<f64>,
	pub decisions: Vec<Decision>,
	pub outputs: Map<String, Value>,
	pub evidence: Map<String, Value>,
	pub prompts: BTreeMap<String, String>,
	pub error: Option<String>,
}

impl Stage {
	fn new(name: &str, started_at: Option<OffsetDateTime>) -> Self {
		Self {
			name: name.to_string(),
			started_at,
			completed_at: None,
			duration_seconds: None,
			decisions: Vec::new(),
			outputs: Map::new(),
			evidence: Map::new(),
			prompts: BTreeMap::new(),
			error: None,
		}
	}
}

/// Full recorded history of one pipeline run.
///
/// Created by `RunContext::start`, populated through the recording API by the
/// owning logical run (single-writer discipline), persisted by the writer once
/// the run reaches a terminal status.
#[derive(Clone, Debug)]
pub struct Trace {
	pub trace_id: String,
	pub project_id: Option<String>,
	pub project_name: Option<String>,

	pub query: Option<String>,
	pub intent: Option<String>,
	pub domain: Option<String>,
	pub report_type: Option<String>,
	pub research_type: Option<String>,

	pub started_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
	pub duration_seconds: Option<f64>,

	pub status: TraceStatus,

	/// Stages in first-start order; lookup is by name.
	pub stages: Vec<Stage>,

	pub iterations: Vec<Value>,
	pub iteration_count: u32,
	pub failure_count: u32,

	pub outputs: Map<String, Value>,
	pub child_traces: Vec<Value>,

	// Monotonic anchors for duration computation. Never serialized.
	start_instant: Option<Instant>,
	stage_start_instants: HashMap<String, Instant>,
}

impl Trace {
	pub fn begin(trace_id: String, meta: RunMetadata) -> Self {
		Self {
			trace_id,
			project_id: meta.project_id,
			project_name: meta.project_name,
			query: meta.query,
			intent: meta.intent,
			domain: meta.domain,
			report_type: meta.report_type,
			research_type: meta.research_type,
			started_at: Some(OffsetDateTime::now_utc()),
			completed_at: None,
			duration_seconds: None,
			status: TraceStatus::InProgress,
			stages: Vec::new(),
			iterations: Vec::new(),
			iteration_count: 0,
			failure_count: 0,
			outputs: Map::new(),
			child_traces: Vec::new(),
			start_instant: Some(Instant::now()),
			stage_start_instants: HashMap::new(),
		}
	}

	pub fn stage(&self, name: &str) -> Option<&Stage> {
		self.stages.iter().find(|stage| stage.name == name)
	}

	fn stage_mut(&mut self, name: &str) -> Option<&mut Stage> {
		self.stages.iter_mut().find(|stage| stage.name == name)
	}

	fn ensure_stage(&mut self, name: &str) -> &mut Stage {
		if self.stage(name).is_none() {
			tracing::debug!(stage = name, "Recording against a stage that was never started.");
			self.stages.push(Stage::new(name, None));
		}

		// The stage exists now; the index lookup cannot fail.
		let idx = self.stages.iter().position(|stage| stage.name == name).unwrap_or(0);

		&mut self.stages[idx]
	}

	/// Mark the start of a pipeline stage. Re-starting a stage resets it.
	pub fn start_stage(&mut self, name: &str) {
		let fresh = Stage::new(name, Some(OffsetDateTime::now_utc()));

		match self.stage_mut(name) {
			Some(stage) => *stage = fresh,
			None => self.stages.push(fresh),
		}

		self.stage_start_instants.insert(name.to_string(), Instant::now());
	}

	/// Mark the end of a stage. Ending a never-started stage is a logged no-op.
	pub fn end_stage(
		&mut self,
		name: &str,
		outputs: Option<Map<String, Value>>,
		error: Option<String>,
	) {
		let duration =
			self.stage_start_instants.get(name).map(|start| start.elapsed().as_secs_f64());
		let Some(stage) = self.stage_mut(name) else {
			tracing::warn!(stage = name, "end_stage called for unstarted stage.");

			return;
		};
		let mut completed_at = OffsetDateTime::now_utc();

		// Completion never precedes start, even across wall-clock adjustments.
		if let Some(started_at) = stage.started_at
			&& completed_at < started_at
		{
			completed_at = started_at;
		}

		stage.completed_at = Some(completed_at);

		if duration.is_some() {
			stage.duration_seconds = duration;
		}
		if let Some(outputs) = outputs {
			for (key, value) in outputs {
				stage.outputs.insert(key, value);
			}
		}
		if error.is_some() {
			stage.error = error;
		}
	}

	/// Record a decision within a stage, auto-creating the stage if absent.
	pub fn record(&mut self, stage_name: &str, category: &str, data: DecisionData) {
		let mut recorded_at = OffsetDateTime::now_utc();
		let stage = self.ensure_stage(stage_name);

		// Keep decision timestamps non-decreasing within the stage.
		if let Some(last) = stage.decisions.last()
			&& recorded_at < last.recorded_at
		{
			recorded_at = last.recorded_at;
		}

		stage.decisions.push(Decision {
			category: category.to_string(),
			value: data.value,
			rationale: data.rationale,
			confidence: data.confidence.unwrap_or(1.0),
			alternatives: data.alternatives,
			inputs: data.inputs,
			recorded_at,
		});
	}

	/// Replace a stage's evidence map, auto-creating the stage if absent.
	pub fn record_evidence(&mut self, stage_name: &str, evidence: Map<String, Value>) {
		self.ensure_stage(stage_name).evidence = evidence;
	}

	/// Replace a stage's prompt texts, auto-creating the stage if absent.
	pub fn record_prompts(&mut self, stage_name: &str, prompts: BTreeMap<String, String>) {
		self.ensure_stage(stage_name).prompts = prompts;
	}

	/// Record one retry-loop iteration. An iteration counts as a failure when
	/// its `passed` flag is falsy; a missing flag counts as passed.
	pub fn record_iteration(&mut self, iteration: Value) {
		let passed = iteration.get("passed").map(value_truthy).unwrap_or(true);

		self.iterations.push(iteration);
		self.iteration_count = self.iterations.len() as u32;

		if !passed {
			self.failure_count += 1;
		}
	}

	/// Replace the trace-level output map.
	pub fn set_outputs(&mut self, outputs: Map<String, Value>) {
		self.outputs = outputs;
	}

	pub fn mark_complete(&mut self) {
		self.finish_with(TraceStatus::Complete);
	}

	pub fn mark_failed(&mut self, error: &str) {
		self.finish_with(TraceStatus::Failed);
		self.outputs.insert(output_keys::ERROR.to_string(), Value::String(error.to_string()));
	}

	pub fn mark_incomplete(&mut self) {
		self.finish_with(TraceStatus::Incomplete);
	}

	fn finish_with(&mut self, status: TraceStatus) {
		self.status = status;
		self.completed_at = Some(OffsetDateTime::now_utc());

		if let Some(start) = self.start_instant {
			self.duration_seconds = Some(start.elapsed().as_secs_f64());
		}
	}

	/// Render the trace as a self-describing document for the artifact writer.
	pub fn serialize(&self) -> Value {
		let mut stages = Map::new();

		for stage in &self.stages {
			let decisions = stage
				.decisions
				.iter()
				.map(|decision| {
					json!({
						"category": decision.category,
						"value": decision.value,
						"rationale": decision.rationale,
						"confidence": decision.confidence,
						"alternatives": decision.alternatives,
						"inputs": decision.inputs,
						"timestamp": format_timestamp(decision.recorded_at),
					})
				})
				.collect::<Vec<_>>();

			stages.insert(
				stage.name.clone(),
				json!({
					"started_at": optional_timestamp(stage.started_at),
					"completed_at": optional_timestamp(stage.completed_at),
					"duration_seconds": stage.duration_seconds,
					"decisions": decisions,
					"outputs": stage.outputs,
					"evidence": stage.evidence,
					"prompts": stage.prompts,
					"error": stage.error,
				}),
			);
		}

		json!({
			"schema_version": SCHEMA_VERSION,
			"trace_id": self.trace_id,
			"project_id": self.project_id,
			"project_name": self.project_name,
			"run": {
				"query": self.query,
				"intent": self.intent,
				"domain": self.domain,
				"report_type": self.report_type,
				"research_type": self.research_type,
				"started_at": optional_timestamp(self.started_at),
				"completed_at": optional_timestamp(self.completed_at),
				"duration_seconds": self.duration_seconds,
				"status": self.status.as_str(),
			},
			"stages": stages,
			"iterations": self.iterations,
			"iteration_count": self.iteration_count,
			"failure_count": self.failure_count,
			"outputs": self.outputs,
			"child_traces": self.child_traces,
			"metadata": {
				"trace_version": SCHEMA_VERSION,
				"generator": GENERATOR,
			},
		})
	}
}

/// Rfc3339 with a stringify fallback, so an unformattable timestamp degrades
/// instead of failing the whole document.
pub fn format_timestamp(ts: OffsetDateTime) -> String {
	ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

fn optional_timestamp(ts: Option<OffsetDateTime>) -> Value {
	match ts {
		Some(ts) => Value::String(format_timestamp(ts)),
		None => Value::Null,
	}
}

fn value_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(flag) => *flag,
		Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
		Value::String(text) => !text.is_empty(),
		Value::Array(items) => !items.is_empty(),
		Value::Object(map) => !map.is_empty(),
	}
}
