//! Task-local binding between a logical run and its trace.
//!
//! Each logical run executes inside [`scope`], which installs an independent
//! slot for that run's future. Interleaved runs multiplexed on the same worker
//! therefore never observe each other's trace, and [`current`] outside any
//! scope simply returns `None`.

use std::{cell::RefCell, future::Future};

use crate::handle::TraceHandle;

tokio::task_local! {
	static ACTIVE_TRACE: RefCell<Option<TraceHandle>>;
}

/// Run `fut` with its own trace slot. Everything awaited inside shares the
/// slot; nothing outside can see it.
pub async fn scope<F>(fut: F) -> F::Output
where
	F: Future,
{
	ACTIVE_TRACE.scope(RefCell::new(None), fut).await
}

/// Synchronous variant of [`scope`] for non-async entry points.
pub fn sync_scope<F, T>(f: F) -> T
where
	F: FnOnce() -> T,
{
	ACTIVE_TRACE.sync_scope(RefCell::new(None), f)
}

/// Bind `handle` as the calling run's current trace. Returns `false` when no
/// scope is active (the handle still works, it just cannot be rediscovered via
/// [`current`]).
pub fn bind(handle: TraceHandle) -> bool {
	ACTIVE_TRACE
		.try_with(|slot| {
			*slot.borrow_mut() = Some(handle);
		})
		.is_ok()
}

/// The trace bound to the calling logical run, if any. Never panics.
pub fn current() -> Option<TraceHandle> {
	ACTIVE_TRACE.try_with(|slot| slot.borrow().clone()).ok().flatten()
}

/// Clear the calling run's binding so a later run can rebind cleanly.
pub fn clear() {
	let _ = ACTIVE_TRACE.try_with(|slot| slot.borrow_mut().take());
}
