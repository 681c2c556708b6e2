//! Matcher compilation and evaluation

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::Program;
use dashmap::DashMap;
use std::sync::Arc;

use crate::cel::{
    context::EvalContext,
    error::{CelError, Result},
};

/// Compile a matcher expression.
pub fn compile(expr: &str) -> Result<Program> {
    Program::compile(expr).map_err(|e| CelError::CompilationError(format!("{e:?}")))
}

/// Compiled matchers keyed by expression text.
///
/// ABAC rewrites only rename attributes to slot names, so an enforcer sees a
/// handful of distinct expressions at most.
#[derive(Default)]
pub struct ProgramCache {
    programs: DashMap<String, Arc<Program>>,
}

impl ProgramCache {
    pub fn get_or_compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(program) = self.programs.get(expr) {
            return Ok(Arc::clone(program.value()));
        }
        let program = Arc::new(compile(expr)?);
        self.programs.insert(expr.to_string(), Arc::clone(&program));
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn clear(&self) {
        self.programs.clear();
    }
}

/// Execute `program` against `ctx` and require a boolean result.
pub fn evaluate(program: &Program, ctx: &EvalContext) -> Result<bool> {
    let result = program
        .execute(ctx.as_cel())
        .map_err(|e| CelError::EvaluationError(format!("{e:?}")))?;
    to_bool(&result)
}

fn to_bool(value: &CelValue) -> Result<bool> {
    match value {
        CelValue::Bool(b) => Ok(*b),
        _ => Err(CelError::NonBooleanResult),
    }
}
