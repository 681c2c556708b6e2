//! CEL (Common Expression Language) evaluation of policy matchers
//!
//! Matchers such as `g(r.sub, p.sub) && r.obj == p.obj` are valid CEL. The
//! request and policy rows are bound as maps `r` and `p`, grouping relations
//! and matching built-ins are registered as functions.

pub mod context;
pub mod convert;
pub mod engine;
pub mod error;

pub use context::EvalContext;
pub use engine::{compile, evaluate, ProgramCache};
pub use error::{CelError, Result};
