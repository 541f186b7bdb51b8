//! Command-line interface for secb-eval.
//!
//! Provides the `evaluate` and `extract` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, EvaluateArgs, ExtractArgs, ModeArg};
