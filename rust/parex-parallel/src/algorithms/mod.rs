//! Algorithms built on the dispatcher.

pub mod generate;

pub use generate::{generate, generate_n};
