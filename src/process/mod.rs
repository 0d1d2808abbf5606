//! # External Process Module
//!
//! Everything that leaves the process goes through here: a [`ProcessRunner`]
//! that supervises a child and reports a structured [`ProcessOutcome`], and
//! command builders for the two inference tools.
//!
//! A child exiting non-zero is an *outcome*, not an error. Only failing to
//! start, losing the child or hitting a timeout produce an `Err`.

pub mod runner;
pub mod tools;

pub use runner::{CommandSpec, ProcessOutcome, ProcessRunner};
pub use tools::{FaceRestorationTool, LipSyncTool};
