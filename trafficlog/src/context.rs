//! Binding traffic entries to request-scoped contexts.
//!
//! Lookups never fail: a context without a bound entry yields a clone of the
//! process-wide default, so callers always get a usable handle and can never
//! reach the shared default itself.

use crate::entry::TrafficEntry;
use crate::global;
use http::Extensions;
use std::future::Future;
use std::sync::Arc;

/// Immutable bag of request-scoped values, keyed by type.
///
/// Deriving a context with [`Context::with_value`] leaves the parent as it
/// was, matching how request contexts are passed down a call chain.
#[derive(Clone, Default)]
pub struct Context {
    values: Arc<Extensions>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value<T: Clone + Send + Sync + 'static>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(value);
        Self {
            values: Arc::new(values),
        }
    }

    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Private key type; only this module can bind or read the entry.
#[derive(Clone)]
struct Bound(TrafficEntry);

/// Derive a context carrying `entry`.
pub fn store(ctx: &Context, entry: TrafficEntry) -> Context {
    ctx.with_value(Bound(entry))
}

/// The entry bound to `ctx`, or a clone of the process-wide default.
pub fn retrieve(ctx: &Context) -> TrafficEntry {
    match ctx.value::<Bound>() {
        Some(Bound(entry)) => entry.clone(),
        None => global::default_entry(),
    }
}

/// Bind the entry from `src` (or the default) onto `dst`.
pub fn transplant(src: &Context, dst: &Context) -> Context {
    store(dst, retrieve(src))
}

/// Bind `entry` to an HTTP request's extensions.
pub fn store_in(extensions: &mut Extensions, entry: TrafficEntry) {
    extensions.insert(Bound(entry));
}

/// The entry bound to an HTTP request's extensions, or the default.
pub fn retrieve_from(extensions: &Extensions) -> TrafficEntry {
    match extensions.get::<Bound>() {
        Some(Bound(entry)) => entry.clone(),
        None => global::default_entry(),
    }
}

// ── Task-local scope ─────────────────────────────────────────────────────────

tokio::task_local! {
    static TASK_ENTRY: TrafficEntry;
}

/// Run `fut` with `entry` as the task's current entry.
pub async fn scope<F: Future>(entry: TrafficEntry, fut: F) -> F::Output {
    TASK_ENTRY.scope(entry, fut).await
}

/// The current task's entry, or the default outside any [`scope`].
pub fn current() -> TrafficEntry {
    TASK_ENTRY
        .try_with(TrafficEntry::clone)
        .unwrap_or_else(|_| global::default_entry())
}
