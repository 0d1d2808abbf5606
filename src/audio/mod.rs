//! # Audio Module
//!
//! The pipeline never touches samples; it only needs to know how long the
//! replacement track is, to check it is readable before the expensive
//! inference stages and to record it in the item report.

pub mod probe;

pub use probe::AudioProbe;
