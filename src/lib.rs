//! Coelacanth: a randomized test-program generator.
//!
//! From a seed and a configuration the pipeline derives, in stages, a
//! complete abstract description of a synthesizable program:
//!
//! 1. a type graph of scalars, structs, arrays, and pointers
//! 2. a call graph with per-function metastructure and signatures
//! 3. per-round variable assignments
//! 4. per-function control graphs built by split-tree refinement
//!
//! Stages run as tasks on a worker pool. Every task owns a config
//! forked from its parent with a freshly drawn seed, so a run is
//! byte-identical for a given seed regardless of the consumer count.

pub mod callgraph;
pub mod cli;
pub mod config;
pub mod controlgraph;
pub mod dbgstream;
pub mod driver;
pub mod errors;
pub mod semitree;
pub mod tasks;
pub mod typegraph;
pub mod varassign;
