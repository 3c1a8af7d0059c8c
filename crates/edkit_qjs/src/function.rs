//! Native functions and accessors
//!
//! Function bodies live in the runtime registry; the engine-side function
//! only carries the registry id. A call looks the body up, converts `this`
//! and the arguments, runs it and converts the result back. Conversion
//! failures become a `TypeError` naming the function.

use crate::context::Ctx;
use crate::convert::{ArgList, Marshal};
use crate::error::{PathSegment, Result};
use crate::runtime::{FunctionId, WeakRuntime};
use crate::value::Value;
use rquickjs::function::{Rest, This};
use std::rc::Rc;

/// Untyped native function body: `(ctx, this, args) -> result`.
pub type NativeFn = Rc<dyn for<'js> Fn(&Ctx<'js>, Value<'js>, Vec<Value<'js>>) -> Result<Value<'js>>>;

pub fn native<F>(f: F) -> NativeFn
where
    F: for<'js> Fn(&Ctx<'js>, Value<'js>, Vec<Value<'js>>) -> Result<Value<'js>> + 'static,
{
    Rc::new(f)
}

/// A host closure taking a converted `this` followed by converted
/// positional arguments.
pub trait HostFunction<This, Args, R>: 'static {
    fn invoke(&self, this: This, args: Args) -> R;
}

macro_rules! impl_host_function {
    ($($arg:ident),*) => {
        impl<F, This, R, $($arg,)*> HostFunction<This, ($($arg,)*), R> for F
        where
            F: Fn(This, $($arg),*) -> R + 'static,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, this: This, ($($arg,)*): ($($arg,)*)) -> R {
                self(this, $($arg),*)
            }
        }
    };
}

impl_host_function!();
impl_host_function!(A);
impl_host_function!(A, B);
impl_host_function!(A, B, C);
impl_host_function!(A, B, C, D);
impl_host_function!(A, B, C, D, E);

/// Wrap a typed host closure as a [`NativeFn`]. `name` is used in
/// conversion error messages.
pub fn wrap<This, Args, R, F>(name: impl Into<String>, f: F) -> NativeFn
where
    F: HostFunction<This, Args, R>,
    This: for<'js> Marshal<'js>,
    Args: for<'js> ArgList<'js>,
    R: for<'js> Marshal<'js>,
{
    let name = name.into();
    native(move |ctx, this, args| {
        let this = This::from_value(ctx, this)
            .map_err(|err| err.at(PathSegment::This(name.clone())))
            .map_err(|err| ctx.throw_type_error(&err.to_string()))?;
        let args = Args::from_args(ctx, &args)
            .map_err(|err| err.at(PathSegment::Arguments(name.clone())))
            .map_err(|err| ctx.throw_type_error(&err.to_string()))?;
        f.invoke(this, args).into_value(ctx)
    })
}

impl<'js> Ctx<'js> {
    /// Register `function` with the runtime and return a script function
    /// that calls it.
    pub fn create_function_bare(&self, name: &str, function: NativeFn) -> Result<Value<'js>> {
        let id = self.runtime().register_function(function)?;
        let runtime = self.runtime().clone();
        let raw = rquickjs::Function::new(
            self.raw().clone(),
            move |raw: rquickjs::Ctx<'js>,
                  this: This<rquickjs::Value<'js>>,
                  args: Rest<rquickjs::Value<'js>>|
                  -> rquickjs::Result<rquickjs::Value<'js>> {
                dispatch(&runtime, id, raw, this.0, args.0)
            },
        )?
        .with_name(name)?;
        Ok(Value::own(self, raw.into_value()))
    }

    /// Register a typed host closure. See [`wrap`].
    pub fn create_function<This, Args, R, F>(&self, name: &str, f: F) -> Result<Value<'js>>
    where
        F: HostFunction<This, Args, R>,
        This: for<'a> Marshal<'a>,
        Args: for<'a> ArgList<'a>,
        R: for<'a> Marshal<'a>,
    {
        self.create_function_bare(name, wrap(name, f))
    }
}

fn dispatch<'js>(
    runtime: &WeakRuntime,
    id: FunctionId,
    raw: rquickjs::Ctx<'js>,
    this: rquickjs::Value<'js>,
    args: Vec<rquickjs::Value<'js>>,
) -> rquickjs::Result<rquickjs::Value<'js>> {
    let ctx = Ctx::new(raw, runtime.clone());
    let Some(function) = runtime.function(id) else {
        return Err(rquickjs::Exception::throw_internal(
            ctx.raw(),
            "native function is no longer registered",
        ));
    };

    let this = Value::own(&ctx, this);
    let args = args.into_iter().map(|arg| Value::own(&ctx, arg)).collect();
    match function(&ctx, this, args) {
        Ok(result) => Ok(result.into_raw_in(&ctx)),
        Err(err) => Err(ctx.rethrow(err)),
    }
}

impl<'js> Value<'js> {
    /// Define an enumerable accessor property backed by native functions.
    /// The functions are named `<name>.get` and `<name>.set`.
    pub fn define_accessor(&self, name: &str, getter: NativeFn, setter: Option<NativeFn>) -> Result<()> {
        let ctx = self.ctx().ok_or(crate::Error::Detached)?.clone();
        let descriptor = ctx.create_object()?;
        descriptor.set_property(
            "get",
            ctx.create_function_bare(&format!("{name}.get"), getter)?,
        )?;
        if let Some(setter) = setter {
            descriptor.set_property(
                "set",
                ctx.create_function_bare(&format!("{name}.set"), setter)?,
            )?;
        }
        descriptor.set_property("enumerable", ctx.create_bool(true))?;
        descriptor.set_property("configurable", ctx.create_bool(true))?;
        self.define_with(&ctx, name, descriptor)
    }

    /// Read-only accessor from a typed getter.
    pub fn define_getter<This, R, G>(&self, name: &str, getter: G) -> Result<()>
    where
        G: HostFunction<This, (), R>,
        This: for<'a> Marshal<'a>,
        R: for<'a> Marshal<'a>,
    {
        self.define_accessor(name, wrap(format!("{name}.get"), getter), None)
    }

    /// Read-write accessor from a typed getter and setter.
    pub fn define_getter_setter<This, R, T, S, G, W>(&self, name: &str, getter: G, setter: W) -> Result<()>
    where
        G: HostFunction<This, (), R>,
        W: HostFunction<This, (T,), S>,
        This: for<'a> Marshal<'a>,
        R: for<'a> Marshal<'a>,
        T: for<'a> Marshal<'a>,
        S: for<'a> Marshal<'a>,
    {
        self.define_accessor(
            name,
            wrap(format!("{name}.get"), getter),
            Some(wrap(format!("{name}.set"), setter)),
        )
    }
}
