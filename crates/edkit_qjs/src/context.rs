//! Execution contexts
//!
//! [`Context`] is the owned handle; it can be stored and cloned freely.
//! Script values can only be touched inside [`Context::with`], which hands
//! out a scoped [`Ctx`]. The same `Ctx` type is given to native callbacks,
//! so host code never re-enters a context it is already running in.

use crate::error::{Error, Result};
use crate::module::Module;
use crate::runtime::{Runtime, WeakRuntime};
use crate::value::Value;
use std::fmt;

/// Owned handle to a QuickJS context.
#[derive(Clone)]
pub struct Context {
    raw: rquickjs::Context,
    rt: rquickjs::Runtime,
    runtime: WeakRuntime,
}

impl Context {
    /// New context with the full set of standard intrinsics.
    pub fn create(runtime: &Runtime) -> Result<Self> {
        let rt = runtime.raw()?.clone();
        let raw = rquickjs::Context::full(&rt)?;
        Ok(Self {
            raw,
            rt,
            runtime: runtime.weak(),
        })
    }

    pub fn runtime(&self) -> &WeakRuntime {
        &self.runtime
    }

    /// Enter the context.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(&Ctx<'js>) -> R,
    {
        self.raw.with(|raw| {
            let ctx = Ctx::new(raw, self.runtime.clone());
            f(&ctx)
        })
    }

    /// Compile and start evaluating `code` as an ES module named
    /// `filename`.
    ///
    /// Never fails outright: compile errors and synchronous throws come
    /// back as a module that is already rejected.
    pub fn eval(&self, code: &str, filename: &str) -> Module {
        let started = self.with(|ctx| -> Result<Value<'static>, String> {
            let declared = rquickjs::Module::declare(ctx.raw().clone(), filename, code)
                .map_err(|err| ctx.describe(err))?;
            let (_module, promise) = declared.eval().map_err(|err| ctx.describe(err))?;
            Ok(Value::own(ctx, promise.into_value()).detach())
        });

        match started {
            Ok(promise) => Module::pending(self.clone(), filename, promise),
            Err(reason) => {
                tracing::debug!(module = filename, %reason, "module failed to start");
                Module::rejected(self.clone(), filename, reason)
            }
        }
    }

    /// Run one queued job (promise reaction or async continuation).
    ///
    /// Returns whether a job ran, or the exception it threw.
    pub fn execute_pending_job(&self) -> Result<bool, String> {
        match self.rt.execute_pending_job() {
            Ok(ran) => Ok(ran),
            Err(_) => Err(self.with(|ctx| ctx.take_exception().to_string())),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

/// A context entered for the duration of a call.
#[derive(Clone)]
pub struct Ctx<'js> {
    raw: rquickjs::Ctx<'js>,
    runtime: WeakRuntime,
}

/// A fresh promise together with its settle functions.
pub struct Promise<'js> {
    pub value: Value<'js>,
    pub resolve: Value<'js>,
    pub reject: Value<'js>,
}

impl<'js> Ctx<'js> {
    pub(crate) fn new(raw: rquickjs::Ctx<'js>, runtime: WeakRuntime) -> Self {
        Self { raw, runtime }
    }

    pub fn raw(&self) -> &rquickjs::Ctx<'js> {
        &self.raw
    }

    pub fn runtime(&self) -> &WeakRuntime {
        &self.runtime
    }

    pub fn global_object(&self) -> Value<'js> {
        Value::own(self, self.raw.globals().into_value())
    }

    /// Take the pending exception, leaving none behind.
    pub fn take_exception(&self) -> Value<'js> {
        Value::own(self, self.raw.catch())
    }

    /// Evaluate classic (non-module) script source and return its result.
    pub fn eval_script(&self, code: &str) -> Result<Value<'js>> {
        self.raw
            .eval::<rquickjs::Value<'js>, _>(code)
            .map(|raw| Value::own(self, raw))
            .map_err(|err| Error::Exception(self.describe(err)))
    }

    pub fn create_undefined(&self) -> Value<'js> {
        Value::own(self, rquickjs::Value::new_undefined(self.raw.clone()))
    }

    pub fn create_null(&self) -> Value<'js> {
        Value::own(self, rquickjs::Value::new_null(self.raw.clone()))
    }

    pub fn create_bool(&self, value: bool) -> Value<'js> {
        Value::own(self, rquickjs::Value::new_bool(self.raw.clone(), value))
    }

    pub fn create_int32(&self, value: i32) -> Value<'js> {
        Value::own(self, rquickjs::Value::new_int(self.raw.clone(), value))
    }

    pub fn create_number(&self, value: f64) -> Value<'js> {
        Value::own(self, rquickjs::Value::new_number(self.raw.clone(), value))
    }

    pub fn create_string(&self, value: &str) -> Result<Value<'js>> {
        let string = rquickjs::String::from_str(self.raw.clone(), value)?;
        Ok(Value::own(self, string.into_value()))
    }

    pub fn create_array(&self) -> Result<Value<'js>> {
        let array = rquickjs::Array::new(self.raw.clone())?;
        Ok(Value::own(self, array.into_value()))
    }

    pub fn create_object(&self) -> Result<Value<'js>> {
        let object = rquickjs::Object::new(self.raw.clone())?;
        Ok(Value::own(self, object.into_value()))
    }

    pub fn create_promise(&self) -> Result<Promise<'js>> {
        let (promise, resolve, reject) = rquickjs::Promise::new(&self.raw)?;
        Ok(Promise {
            value: Value::own(self, promise.into_value()),
            resolve: Value::own(self, resolve.into_value()),
            reject: Value::own(self, reject.into_value()),
        })
    }

    /// Throw `Error(message)` in this context. Return the result from a
    /// native callback to propagate the exception.
    pub fn throw_error(&self, message: &str) -> Error {
        Error::Engine(rquickjs::Exception::throw_message(&self.raw, message))
    }

    pub fn throw_type_error(&self, message: &str) -> Error {
        tracing::debug!(%message, "throwing TypeError");
        Error::Engine(rquickjs::Exception::throw_type(&self.raw, message))
    }

    /// Turn a host error into a pending script exception.
    pub(crate) fn rethrow(&self, err: Error) -> rquickjs::Error {
        match err {
            Error::Engine(err) => err,
            Error::Marshal(err) => rquickjs::Exception::throw_type(&self.raw, &err.to_string()),
            err => rquickjs::Exception::throw_message(&self.raw, &err.to_string()),
        }
    }

    /// String form of an engine error; consumes the pending exception if
    /// there is one.
    pub(crate) fn describe(&self, err: rquickjs::Error) -> String {
        match err {
            rquickjs::Error::Exception => self.take_exception().to_string(),
            err => err.to_string(),
        }
    }

    /// Call a static method of the global `Object` constructor.
    pub(crate) fn object_builtin(&self, method: &str, args: Vec<Value<'js>>) -> Result<Value<'js>> {
        let object = self
            .global_object()
            .property("Object")
            .ok_or(Error::Exception("Object is not defined".into()))?;
        let function = object
            .property(method)
            .ok_or_else(|| Error::Exception(format!("Object.{method} is not defined")))?;
        function.call(object, args)
    }
}

impl fmt::Debug for Ctx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleState;

    #[test]
    fn scalars_report_their_type() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        context.with(|ctx| {
            assert_eq!(ctx.create_undefined().type_name(), "undefined");
            assert_eq!(ctx.create_null().type_name(), "null");
            assert_eq!(ctx.create_bool(true).type_name(), "bool");
            assert_eq!(ctx.create_int32(3).type_name(), "int");
            assert_eq!(ctx.create_number(0.5).type_name(), "float64");
            assert_eq!(ctx.create_string("hi").unwrap().type_name(), "string");
            assert_eq!(ctx.create_array().unwrap().type_name(), "array");
            assert_eq!(ctx.create_object().unwrap().type_name(), "object");
        });
    }

    #[test]
    fn thrown_errors_are_caught_once() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        context.with(|ctx| {
            let err = ctx.eval_script("throw new RangeError('too far')").unwrap_err();
            assert_eq!(err.to_string(), "RangeError: too far");
            assert_eq!(ctx.eval_script("1 + 1").unwrap().to_int32(), Some(2));
        });
    }

    #[test]
    fn promise_resolves_through_its_function() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        context.with(|ctx| {
            let promise = ctx.create_promise().unwrap();
            assert_eq!(promise.value.type_name(), "promise");

            promise
                .resolve
                .call(ctx.create_undefined(), vec![ctx.create_int32(5)])
                .unwrap();
            assert_eq!(promise.value.promise_result().unwrap().to_int32(), Some(5));
        });
    }

    #[test]
    fn syntax_errors_reject_the_module_up_front() {
        let runtime = Runtime::create().unwrap();
        let context = Context::create(&runtime).unwrap();
        let module = context.eval("let = ;", "broken.js");

        match module.state() {
            ModuleState::Rejected(reason) => assert!(reason.contains("SyntaxError"), "{reason}"),
            other => panic!("unexpected state {other:?}"),
        }
    }
}
