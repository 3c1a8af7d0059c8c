//! Cooperative module evaluation
//!
//! A module advances only when ticked. Each tick either observes that the
//! evaluation promise settled or runs one queued job. Settled states are
//! final.

use crate::context::Context;
use crate::value::{PromiseState, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    Pending,
    /// Carries the string form of the module's completion value.
    Fulfilled(String),
    /// Carries the string form of the rejection reason.
    Rejected(String),
}

impl ModuleState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// An ES module being evaluated in a [`Context`].
pub struct Module {
    // Released before `context`.
    promise: Option<Value<'static>>,
    context: Context,
    name: String,
    state: ModuleState,
}

impl Module {
    pub(crate) fn pending(context: Context, name: &str, promise: Value<'static>) -> Self {
        Self {
            promise: Some(promise),
            context,
            name: name.to_owned(),
            state: ModuleState::Pending,
        }
    }

    pub(crate) fn rejected(context: Context, name: &str, reason: String) -> Self {
        Self {
            promise: None,
            context,
            name: name.to_owned(),
            state: ModuleState::Rejected(reason),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    /// Advance evaluation by one step and return the resulting state.
    pub fn tick(&mut self) -> &ModuleState {
        if !self.state.is_pending() {
            return &self.state;
        }
        let Some(promise) = &self.promise else {
            self.state = ModuleState::Rejected("module has no evaluation promise".into());
            return &self.state;
        };

        let settled = self.context.with(|ctx| {
            let promise = promise.attach(ctx)?;
            let state = promise.promise_state()?;
            let result = || {
                promise
                    .promise_result()
                    .map(|value| value.to_string())
                    .unwrap_or_default()
            };
            Some(match state {
                PromiseState::Pending => None,
                PromiseState::Fulfilled => Some(ModuleState::Fulfilled(result())),
                PromiseState::Rejected => Some(ModuleState::Rejected(result())),
            })
        });

        match settled {
            Some(Some(state)) => self.state = state,
            Some(None) => {
                if let Err(reason) = self.context.execute_pending_job() {
                    self.state = ModuleState::Rejected(reason);
                }
            }
            None => {
                self.state = ModuleState::Rejected("module evaluation promise was lost".into())
            }
        }

        if !self.state.is_pending() {
            self.promise = None;
            tracing::debug!(module = %self.name, state = ?self.state, "module settled");
        }
        &self.state
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{native, Runtime};

    fn tick_until_settled(module: &mut Module, max: usize) -> ModuleState {
        for _ in 0..max {
            if !module.tick().is_pending() {
                break;
            }
        }
        module.state().clone()
    }

    #[test]
    fn synchronous_module_fulfills_on_first_tick() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        let mut module = context.eval("globalThis.ran = 1 + 1;", "sync.js");

        assert_eq!(module.state(), &ModuleState::Pending);
        assert_eq!(module.tick(), &ModuleState::Fulfilled("undefined".into()));
        assert_eq!(
            context.with(|ctx| ctx.eval_script("ran").unwrap().to_int32()),
            Some(2)
        );
    }

    #[test]
    fn thrown_errors_reject() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        let mut module = context.eval("throw new Error('boom');", "throws.js");

        assert_eq!(
            tick_until_settled(&mut module, 4),
            ModuleState::Rejected("Error: boom".into())
        );
        assert_eq!(module.tick(), &ModuleState::Rejected("Error: boom".into()));
    }

    #[test]
    fn awaiting_modules_progress_one_job_per_tick() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        let mut module = context.eval(
            "globalThis.steps = 0;\n\
             for (let i = 0; i < 3; i++) { await null; steps++; }",
            "await.js",
        );

        assert!(module.tick().is_pending());
        assert!(matches!(
            tick_until_settled(&mut module, 32),
            ModuleState::Fulfilled(_)
        ));
        let steps = context.with(|ctx| ctx.eval_script("steps").unwrap().to_int32());
        assert_eq!(steps, Some(3));
    }

    #[test]
    fn never_settling_module_stays_pending() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        let mut module = context.eval("await new Promise(() => {});", "forever.js");

        assert_eq!(tick_until_settled(&mut module, 16), ModuleState::Pending);
    }

    #[test]
    fn host_resolved_promises_resume_the_module() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        context.with(|ctx| {
            let ask = ctx
                .create_function_bare(
                    "ask",
                    native(|ctx, _this, _args| {
                        let promise = ctx.create_promise()?;
                        promise
                            .resolve
                            .call(ctx.create_undefined(), vec![ctx.create_int32(42)])?;
                        Ok(promise.value)
                    }),
                )
                .unwrap();
            ctx.global_object().set_property("ask", ask).unwrap();
        });

        let mut module = context.eval("globalThis.answer = await ask();", "ask.js");
        assert!(matches!(
            tick_until_settled(&mut module, 16),
            ModuleState::Fulfilled(_)
        ));
        let answer = context.with(|ctx| ctx.eval_script("answer").unwrap().to_int32());
        assert_eq!(answer, Some(42));
    }
}
