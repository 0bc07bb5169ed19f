#![doc = include_str!("../../../README.md")]

mod dead_store;
mod error;
mod hoist;
mod optimize;
mod parse;
mod purity;
mod render;
mod scope;
pub mod tracer;
pub mod tree;

pub use crate::{
    error::OptimizeError,
    hoist::TEMP_PREFIX,
    optimize::{
        DEFAULT_MAX_ROUNDS, OptimizeOptions, Optimizer, hoist_invariants, optimize, optimize_source, remove_useless,
    },
    parse::{ParseError, parse},
    purity::{PureBuiltin, PurityOracle, PurityTable},
    render::{render, render_expr},
    scope::{
        Binding, RedirectTarget, Resolution, ScopeEnv, ScopeKind, ScopeTable, ValidationError, free_names,
        is_builtin_name, validate,
    },
    tracer::{HoistKind, NoopTracer, OptimizeEvent, OptimizeTracer, Pass, RecordingTracer, StderrTracer},
};
