//! Core definitions shared by all parex-* crates: the error taxonomy and the
//! `Result` alias.

pub mod error;
pub mod result;

pub use error::{AggregateFailure, Error, ErrorKind, Failure};
pub use result::Result;
