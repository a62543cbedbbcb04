use std::{
	collections::BTreeMap,
	sync::{Arc, Mutex},
};

use serde_json::{Map, Value};

use crate::model::{DecisionData, Trace, TraceStatus};

/// Shared, cloneable handle to a run's trace.
///
/// `Recording` wraps the live trace; `Disabled` is the no-op variant returned
/// when tracing is switched off, so instrumentation call-sites need no guards.
/// Mutation goes through one logical run at a time by contract; the mutex only
/// makes the handle safe to clone across the run's own call graph.
#[derive(Clone, Debug)]
pub enum TraceHandle {
	Recording(Arc<Mutex<Trace>>),
	Disabled,
}

impl TraceHandle {
	pub fn new(trace: Trace) -> Self {
		Self::Recording(Arc::new(Mutex::new(trace)))
	}

	pub fn disabled() -> Self {
		Self::Disabled
	}

	pub fn is_enabled(&self) -> bool {
		matches!(self, Self::Recording(_))
	}

	/// Run `f` against the live trace. Returns `None` on the disabled variant.
	pub fn with<T>(&self, f: impl FnOnce(&mut Trace) -> T) -> Option<T> {
		match self {
			Self::Recording(inner) => {
				let mut trace = inner.lock().unwrap_or_else(|err| err.into_inner());

				Some(f(&mut trace))
			},
			Self::Disabled => None,
		}
	}

	/// Clone the current trace state for read-side consumers.
	pub fn snapshot(&self) -> Option<Trace> {
		self.with(|trace| trace.clone())
	}

	pub fn trace_id(&self) -> Option<String> {
		self.with(|trace| trace.trace_id.clone())
	}

	pub fn status(&self) -> Option<TraceStatus> {
		self.with(|trace| trace.status)
	}

	pub fn start_stage(&self, name: &str) {
		self.with(|trace| trace.start_stage(name));
	}

	pub fn end_stage(&self, name: &str, outputs: Option<Map<String, Value>>, error: Option<String>) {
		self.with(|trace| trace.end_stage(name, outputs, error));
	}

	pub fn record(&self, stage: &str, category: &str, data: DecisionData) {
		self.with(|trace| trace.record(stage, category, data));
	}

	pub fn record_evidence(&self, stage: &str, evidence: Map<String, Value>) {
		self.with(|trace| trace.record_evidence(stage, evidence));
	}

	pub fn record_prompts(&self, stage: &str, prompts: BTreeMap<String, String>) {
		self.with(|trace| trace.record_prompts(stage, prompts));
	}

	pub fn record_iteration(&self, iteration: Value) {
		self.with(|trace| trace.record_iteration(iteration));
	}

	pub fn set_outputs(&self, outputs: Map<String, Value>) {
		self.with(|trace| trace.set_outputs(outputs));
	}

	pub fn mark_complete(&self) {
		self.with(|trace| trace.mark_complete());
	}

	pub fn mark_failed(&self, error: &str) {
		self.with(|trace| trace.mark_failed(error));
	}

	pub fn mark_incomplete(&self) {
		self.with(|trace| trace.mark_incomplete());
	}
}
