//! Script value handles
//!
//! A [`Value`] is either bound to a context (`Value<'js>`, usable inside
//! [`Context::with`](crate::Context::with)) or detached (`Value<'static>`,
//! storable anywhere and bound only to its runtime). Cloning a bound value
//! adds one engine reference, dropping it releases one.
//!
//! Detached values must be dropped before their runtime. If the runtime is
//! already gone the handle is forgotten instead of released.

use crate::context::Ctx;
use crate::error::{Error, MarshalError, Result};
use crate::runtime::WeakRuntime;
use rquickjs::convert::Coerced;
use rquickjs::{qjs, FromJs, Persistent};
use std::fmt;

/// Settlement state of a promise value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// Handle to a script value.
#[derive(Clone)]
pub struct Value<'js> {
    repr: Repr<'js>,
}

#[derive(Clone)]
enum Repr<'js> {
    Context {
        ctx: Ctx<'js>,
        raw: rquickjs::Value<'js>,
    },
    Runtime(Detached),
}

struct Detached {
    runtime: WeakRuntime,
    raw: Option<Persistent<rquickjs::Value<'static>>>,
}

impl Detached {
    fn restore<'js>(&self, ctx: &Ctx<'js>) -> Option<rquickjs::Value<'js>> {
        if !self.runtime.is_alive() {
            return None;
        }
        self.raw.clone()?.restore(ctx.raw()).ok()
    }
}

impl Clone for Detached {
    fn clone(&self) -> Self {
        let raw = if self.runtime.is_alive() {
            self.raw.clone()
        } else {
            None
        };
        Self {
            runtime: self.runtime.clone(),
            raw,
        }
    }
}

impl Drop for Detached {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            if self.runtime.is_alive() {
                drop(raw);
            } else {
                std::mem::forget(raw);
            }
        }
    }
}

impl<'js> Value<'js> {
    /// Adopt `raw` without adding a reference.
    pub fn own(ctx: &Ctx<'js>, raw: rquickjs::Value<'js>) -> Self {
        Self {
            repr: Repr::Context {
                ctx: ctx.clone(),
                raw,
            },
        }
    }

    /// Wrap `raw`, adding one reference.
    pub fn copy(ctx: &Ctx<'js>, raw: &rquickjs::Value<'js>) -> Self {
        Self::own(ctx, raw.clone())
    }

    /// Unbind from the context so the value can be stored across calls.
    pub fn detach(self) -> Value<'static> {
        let detached = match self.repr {
            Repr::Context { ctx, raw } => Detached {
                runtime: ctx.runtime().clone(),
                raw: Some(Persistent::save(ctx.raw(), raw)),
            },
            Repr::Runtime(detached) => detached,
        };
        Value {
            repr: Repr::Runtime(detached),
        }
    }

    /// Bind a copy of this value to `ctx`. `None` once the runtime is gone
    /// or when `ctx` belongs to another runtime.
    pub fn attach<'a>(&self, ctx: &Ctx<'a>) -> Option<Value<'a>> {
        let raw = match &self.repr {
            Repr::Context { ctx: own, raw } => {
                let saved: Persistent<rquickjs::Value<'static>> =
                    Persistent::save(own.raw(), raw.clone());
                saved.restore(ctx.raw()).ok()?
            }
            Repr::Runtime(detached) => detached.restore(ctx)?,
        };
        Some(Value::own(ctx, raw))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.repr, Repr::Runtime(_))
    }

    pub fn ctx(&self) -> Option<&Ctx<'js>> {
        match &self.repr {
            Repr::Context { ctx, .. } => Some(ctx),
            Repr::Runtime(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&rquickjs::Value<'js>> {
        match &self.repr {
            Repr::Context { raw, .. } => Some(raw),
            Repr::Runtime(_) => None,
        }
    }

    pub fn runtime(&self) -> WeakRuntime {
        match &self.repr {
            Repr::Context { ctx, .. } => ctx.runtime().clone(),
            Repr::Runtime(detached) => detached.runtime.clone(),
        }
    }

    /// Hand the value to the engine in `ctx`. Detached values whose runtime
    /// is gone become `undefined`.
    pub(crate) fn into_raw_in(self, ctx: &Ctx<'js>) -> rquickjs::Value<'js> {
        match self.repr {
            Repr::Context { raw, .. } => raw,
            Repr::Runtime(detached) => detached
                .restore(ctx)
                .unwrap_or_else(|| rquickjs::Value::new_undefined(ctx.raw().clone())),
        }
    }

    /// Engine reference count of a heap value; `None` for immediates and
    /// detached values.
    pub fn ref_count(&self) -> Option<i32> {
        let raw = self.raw()?.as_raw();
        // SAFETY: the header is only read for tags that carry one, and the
        // value is kept alive by `self`.
        unsafe {
            if !qjs::JS_VALUE_HAS_REF_COUNT(raw) {
                return None;
            }
            let header = qjs::JS_VALUE_GET_PTR(raw) as *const qjs::JSRefCountHeader;
            Some((*header).ref_count)
        }
    }

    /// Short type name used in conversion errors.
    pub fn type_name(&self) -> String {
        let Some(raw) = self.raw() else {
            return "unknown".to_owned();
        };
        let name = if raw.is_undefined() {
            "undefined"
        } else if raw.is_null() {
            "null"
        } else if raw.is_bool() {
            "bool"
        } else if raw.is_int() {
            "int"
        } else if raw.is_float() {
            "float64"
        } else if raw.is_string() {
            "string"
        } else if raw.is_symbol() {
            "symbol"
        } else if raw.is_array() {
            "array"
        } else if raw.is_promise() {
            "promise"
        } else if raw.is_function() {
            "function"
        } else if raw.is_exception() {
            "exception"
        } else if raw.is_object() {
            return self.class_name().unwrap_or_else(|| "object".to_owned());
        } else {
            "unknown"
        };
        name.to_owned()
    }

    fn check(&self, predicate: impl FnOnce(&rquickjs::Value<'js>) -> bool) -> bool {
        self.raw().is_some_and(predicate)
    }

    pub fn is_undefined(&self) -> bool {
        self.check(|raw| raw.is_undefined())
    }

    pub fn is_null(&self) -> bool {
        self.check(|raw| raw.is_null())
    }

    pub fn is_bool(&self) -> bool {
        self.check(|raw| raw.is_bool())
    }

    pub fn is_number(&self) -> bool {
        self.check(|raw| raw.is_number())
    }

    pub fn is_string(&self) -> bool {
        self.check(|raw| raw.is_string())
    }

    pub fn is_array(&self) -> bool {
        self.check(|raw| raw.is_array())
    }

    /// True for every heap object, arrays and functions included.
    pub fn is_object(&self) -> bool {
        self.check(|raw| raw.is_object())
    }

    pub fn is_function(&self) -> bool {
        self.check(|raw| raw.is_function())
    }

    pub fn is_promise(&self) -> bool {
        self.check(|raw| raw.is_promise())
    }

    pub fn is_exception(&self) -> bool {
        self.check(|raw| raw.is_exception())
    }

    fn coerce<T>(&self) -> Option<T>
    where
        Coerced<T>: FromJs<'js>,
    {
        let Repr::Context { ctx, raw } = &self.repr else {
            return None;
        };
        Coerced::<T>::from_js(ctx.raw(), raw.clone())
            .map(|Coerced(value)| value)
            .map_err(|err| discard(ctx, err))
            .ok()
    }

    /// Truthiness; `false` when detached.
    pub fn to_bool(&self) -> bool {
        self.coerce::<bool>().unwrap_or(false)
    }

    pub fn to_int32(&self) -> Option<i32> {
        self.coerce::<i32>()
    }

    pub fn to_number(&self) -> Option<f64> {
        self.coerce::<f64>()
    }

    fn object(&self) -> Result<(&Ctx<'js>, &rquickjs::Object<'js>)> {
        let Repr::Context { ctx, raw } = &self.repr else {
            return Err(Error::Detached);
        };
        let object = raw
            .as_object()
            .ok_or_else(|| MarshalError::mismatch("object", &self.type_name()))?;
        Ok((ctx, object))
    }

    /// Property lookup, prototype chain included. `None` when the property
    /// does not exist, as opposed to existing with value `undefined`.
    pub fn property(&self, name: &str) -> Option<Value<'js>> {
        let (ctx, object) = self.object().ok()?;
        if !object.contains_key(name).map_err(|err| discard(ctx, err)).ok()? {
            return None;
        }
        let raw = object
            .get::<_, rquickjs::Value<'js>>(name)
            .map_err(|err| discard(ctx, err))
            .ok()?;
        Some(Value::own(ctx, raw))
    }

    pub fn set_property(&self, name: &str, value: Value<'js>) -> Result<()> {
        let (ctx, object) = self.object()?;
        object.set(name, value.into_raw_in(ctx))?;
        Ok(())
    }

    /// Define an enumerable data property. Read-only properties are also
    /// non-configurable.
    pub fn define_property(&self, name: &str, value: Value<'js>, readonly: bool) -> Result<()> {
        let (ctx, _) = self.object()?;
        let descriptor = ctx.create_object()?;
        descriptor.set_property("value", value)?;
        descriptor.set_property("enumerable", ctx.create_bool(true))?;
        descriptor.set_property("writable", ctx.create_bool(!readonly))?;
        descriptor.set_property("configurable", ctx.create_bool(!readonly))?;
        self.define_with(ctx, name, descriptor)
    }

    pub(crate) fn define_with(&self, ctx: &Ctx<'js>, name: &str, descriptor: Value<'js>) -> Result<()> {
        ctx.object_builtin(
            "defineProperty",
            vec![self.clone(), ctx.create_string(name)?, descriptor],
        )?;
        Ok(())
    }

    /// Own enumerable string keys, in engine order.
    pub fn property_names(&self) -> Vec<String> {
        let Ok((_, object)) = self.object() else {
            return Vec::new();
        };
        object.keys::<String>().filter_map(|key| key.ok()).collect()
    }

    /// Own enumerable properties, in engine order.
    pub fn properties(&self) -> Vec<(String, Value<'js>)> {
        let Ok((ctx, object)) = self.object() else {
            return Vec::new();
        };
        object
            .props::<String, rquickjs::Value<'js>>()
            .filter_map(|prop| prop.ok())
            .map(|(key, raw)| (key, Value::own(ctx, raw)))
            .collect()
    }

    fn array(&self) -> Option<(&Ctx<'js>, &rquickjs::Array<'js>)> {
        let Repr::Context { ctx, raw } = &self.repr else {
            return None;
        };
        Some((ctx, raw.as_array()?))
    }

    /// Array length, or the numeric `length` property of other values.
    pub fn length(&self) -> Option<usize> {
        if let Some((_, array)) = self.array() {
            return Some(array.len());
        }
        let length = self.property("length")?.to_number()?;
        (length >= 0.0).then_some(length as usize)
    }

    pub fn array_item(&self, index: usize) -> Option<Value<'js>> {
        let (ctx, array) = self.array()?;
        if index >= array.len() {
            return None;
        }
        let raw = array.get::<rquickjs::Value<'js>>(index).ok()?;
        Some(Value::own(ctx, raw))
    }

    pub fn array_items(&self) -> Vec<Value<'js>> {
        let Some((ctx, array)) = self.array() else {
            return Vec::new();
        };
        array
            .iter::<rquickjs::Value<'js>>()
            .filter_map(|item| item.ok())
            .map(|raw| Value::own(ctx, raw))
            .collect()
    }

    pub fn push(&self, value: Value<'js>) -> Result<()> {
        let (ctx, array) = self
            .array()
            .ok_or_else(|| MarshalError::mismatch("array", &self.type_name()))?;
        array.set(array.len(), value.into_raw_in(ctx))?;
        Ok(())
    }

    /// Call this function value. A script exception stays pending on the
    /// context and is reported as `Error::Engine(Exception)`.
    pub fn call(&self, this: Value<'js>, args: Vec<Value<'js>>) -> Result<Value<'js>> {
        let Repr::Context { ctx, raw } = &self.repr else {
            return Err(Error::Detached);
        };
        let function = raw
            .as_function()
            .ok_or_else(|| MarshalError::mismatch("function", &self.type_name()))?;

        let mut call_args = rquickjs::function::Args::new(ctx.raw().clone(), args.len());
        call_args.this(this.into_raw_in(ctx))?;
        for arg in args {
            call_args.push_arg(arg.into_raw_in(ctx))?;
        }
        let result = function.call_arg::<rquickjs::Value<'js>>(call_args)?;
        Ok(Value::own(ctx, result))
    }

    pub fn promise_state(&self) -> Option<PromiseState> {
        let promise = self.raw()?.as_promise()?;
        Some(match promise.state() {
            rquickjs::promise::PromiseState::Pending => PromiseState::Pending,
            rquickjs::promise::PromiseState::Resolved => PromiseState::Fulfilled,
            rquickjs::promise::PromiseState::Rejected => PromiseState::Rejected,
        })
    }

    /// Fulfillment value or rejection reason of a settled promise.
    pub fn promise_result(&self) -> Option<Value<'js>> {
        let Repr::Context { ctx, raw } = &self.repr else {
            return None;
        };
        match raw.as_promise()?.result::<rquickjs::Value<'js>>()? {
            Ok(value) => Some(Value::own(ctx, value)),
            Err(rquickjs::Error::Exception) => Some(ctx.take_exception()),
            Err(_) => None,
        }
    }
}

/// Clear the exception a failed lookup or conversion left pending, so it
/// cannot surface in an unrelated later call.
fn discard(ctx: &Ctx<'_>, err: rquickjs::Error) {
    if matches!(err, rquickjs::Error::Exception) {
        ctx.raw().catch();
    }
}

/// Coerced string form; empty for detached values.
impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.coerce::<String>() {
            Some(text) => f.write_str(&text),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name())
            .field("detached", &self.is_detached())
            .finish()
    }
}
