//! Closure runtime.
//!
//! Defines what a compiled command line looks like to the shell loop:
//! a [`Closure`] invoked repeatedly until it reports [`Status::REMOVE`] or
//! fails with a [`ClosureError`].

pub mod closure;
pub mod detach;
pub mod error;
pub(crate) mod host;
pub mod runner;
pub mod status;

pub use closure::Closure;
pub use detach::Detachables;
pub use error::ClosureError;
pub use host::parse_exit_status;
pub use runner::{Environment, Runner};
pub use status::Status;
