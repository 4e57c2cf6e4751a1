//! Source dependency tracking.
//!
//! - [`scanner`]: byte-level import scanner
//! - [`resolve`]: module name ↔ file path within source directories
//! - [`graph`]: which targets a changed file may affect

pub mod graph;
pub mod resolve;
pub mod scanner;

pub use graph::ModuleGraph;
