pub mod calibration;
pub mod finish;
pub mod summary;

pub use finish::FinishOutcome;

use std::future::Future;

use time::OffsetDateTime;

use loupe_config::Config;
use loupe_storage::db::Db;
use loupe_trace::{RunMetadata, Trace, TraceHandle, TraceStatus, context, id};

/// Binds "the active trace" to the calling logical run and owns the
/// finish-time persistence pipeline.
///
/// A run executes inside [`RunContext::scope`]; every component underneath can
/// then reach the run's trace through [`RunContext::current`] without having a
/// reference threaded to it. Interleaved runs on a shared scheduler each see
/// only their own binding.
pub struct RunContext {
	pub cfg: Config,
	pub db: Db,
}

impl RunContext {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db }
	}

	/// Create a trace, bind it as current for the calling logical run, and
	/// return its handle. With tracing disabled this hands out the no-op
	/// variant instead, so call-sites stay unconditional.
	pub fn start(&self, meta: RunMetadata) -> TraceHandle {
		if !self.cfg.tracing.enabled {
			let handle = TraceHandle::disabled();

			context::bind(handle.clone());

			return handle;
		}

		let trace_id = id::generate(OffsetDateTime::now_utc());
		let handle = TraceHandle::new(Trace::begin(trace_id.clone(), meta));

		if !context::bind(handle.clone()) {
			tracing::debug!(
				trace_id = %trace_id,
				"No run scope active; trace is not discoverable via current()."
			);
		}

		tracing::info!(trace_id = %trace_id, "Trace started.");

		handle
	}

	/// The trace bound to the calling logical run, if any. Never panics.
	pub fn current() -> Option<TraceHandle> {
		context::current()
	}

	/// Run `fut` with its own trace slot.
	pub async fn scope<F>(fut: F) -> F::Output
	where
		F: Future,
	{
		context::scope(fut).await
	}

	/// Wrap a whole run: create and bind the trace, mark it `complete` on
	/// success or `failed` on error, and always finish — so the binding is
	/// cleared and partial data persisted on every exit path.
	pub async fn run_traced<F, Fut, T, E>(&self, meta: RunMetadata, f: F) -> Result<T, E>
	where
		F: FnOnce(TraceHandle) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: std::fmt::Display,
	{
		Self::scope(async move {
			let handle = self.start(meta);
			let result = f(handle.clone()).await;

			match &result {
				Ok(_) =>
					if handle.status() == Some(TraceStatus::InProgress) {
						handle.mark_complete();
					},
				Err(err) => handle.mark_failed(&err.to_string()),
			}

			let outcome = self.finish(handle).await;

			if let Some(trace_id) = outcome.trace_id.as_deref() {
				tracing::debug!(trace_id, saved = outcome.saved, "Traced run finished.");
			}

			result
		})
		.await
	}
}
