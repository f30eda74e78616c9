//! Type aliases for commonly used shared-state types.
//!
//! State shared between the dispatcher thread and its readers, such as the
//! status view folded by the display subscriber, sits behind
//! `Arc<parking_lot::Mutex<_>>`.
//!
//! ```rust,ignore
//! use uplink_core::types::*;
//!
//! // Instead of: Arc<Mutex<StatusView>>
//! let view: ThreadSafe<StatusView> = thread_safe(StatusView::default());
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

/// A thread-safe, reference-counted, mutex-protected wrapper.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// Create a new `ThreadSafe<T>`.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}
