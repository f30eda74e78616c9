//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: `ThreadSafe<T>` alias for `Arc<Mutex<T>>`

pub mod aliases;

pub use aliases::*;
