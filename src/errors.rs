//! Error kinds surfaced by the generator pipeline.

use thiserror::Error;

use crate::config::options::Opt;

/// Errors raised while resolving or querying the configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("{0}")]
    Cli(String),

    #[error("configuration has no value for option '{}'", .0.name())]
    OutOfRange(Opt),

    #[error("option '{}' has kind {found}, expected {expected}", .opt.name())]
    InvalidKind {
        opt: Opt,
        expected: &'static str,
        found: &'static str,
    },

    #[error("probability function '{}' expects {expected} entries, got {got}", .opt.name())]
    ProbfArity {
        opt: Opt,
        expected: usize,
        got: usize,
    },

    #[error("probability function '{}' must be non-decreasing with a positive total", .0.name())]
    ProbfShape(Opt),

    #[error("flag option '{}' needs a positive total", .0.name())]
    PflagShape(Opt),

    #[error("range option '{}' has min {from} greater than max {to}", .opt.name())]
    BadRange { opt: Opt, from: i32, to: i32 },

    #[error("specify both {name}-min and {name}-max or neither")]
    HalfRange { name: String },

    #[error("scalar catalog has no 'int' entry to synthesize an index type")]
    NoIndexScalar,
}

/// Errors surfaced to the orchestrator by pipeline stages.
#[derive(Error, Debug)]
pub enum GenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("graph construction failed: {0}")]
    GraphBuild(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
