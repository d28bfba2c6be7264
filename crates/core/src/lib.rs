//! Core types for the mx reconciler.
//!
//! - [`Value`] / [`AttributeMap`]: the desired and observed state of a remote
//!   object, with checked accessors instead of dynamic casts
//! - [`Diagnostics`]: ordered warning/error records handed back to the
//!   declarative orchestrator
//! - [`Error`]: attribute shape errors

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod diagnostic;
pub mod error;
pub mod result;
pub mod value;

pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use error::Error;
pub use result::{Result, ResultExt};
pub use value::{AttributeMap, Value};
