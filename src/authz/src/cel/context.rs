//! Evaluation context for matcher expressions

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::Context;
use std::sync::Arc;

use crate::cel::convert::string_map;
use crate::model::functions::{MatchFn, BUILTINS};
use crate::role_manager::RoleManager;

/// Variables and functions visible to one enforcement call.
pub struct EvalContext {
    inner: Context<'static>,
}

impl EvalContext {
    /// Context with the matching built-ins (`keyMatch`, `globMatch`, ...) registered.
    pub fn new() -> Self {
        let mut ctx = Self {
            inner: Context::default(),
        };
        for (name, f) in BUILTINS {
            ctx.add_match_fn(name, *f);
        }
        ctx
    }

    /// Bind `name` to an arbitrary value; rebinding replaces the previous value.
    pub fn bind(&mut self, name: &str, value: CelValue) {
        self.inner.add_variable_from_value(name, value);
    }

    /// Bind `name` to a map of string fields, e.g. `p = {sub, obj, act}`.
    pub fn bind_fields<'a>(&mut self, name: &str, fields: impl IntoIterator<Item = (&'a str, CelValue)>) {
        self.bind(name, string_map(fields));
    }

    /// Register a two-argument string predicate.
    pub fn add_match_fn(&mut self, name: &str, f: MatchFn) {
        self.inner
            .add_function(name, move |a: Arc<String>, b: Arc<String>| f(&a, &b));
    }

    /// Register a grouping relation; three-arity relations pass the domain.
    pub fn add_role_fn(&mut self, name: &str, rm: Arc<RoleManager>, arity: usize) {
        if arity >= 3 {
            self.inner.add_function(
                name,
                move |a: Arc<String>, b: Arc<String>, domain: Arc<String>| rm.has_link(&a, &b, Some(domain.as_str())),
            );
        } else {
            self.inner
                .add_function(name, move |a: Arc<String>, b: Arc<String>| rm.has_link(&a, &b, None));
        }
    }

    pub(crate) fn as_cel(&self) -> &Context<'static> {
        &self.inner
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}
