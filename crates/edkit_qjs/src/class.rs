//! Host-backed script classes
//!
//! Every instance is a single engine class, `HostObject`, tagged with the
//! [`ClassId`] it was created for. The host payload lives in the instance
//! and is handed to the class finalizer once the engine collects it.

use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::runtime::{ClassId, WeakRuntime};
use crate::value::Value;
use rquickjs::class::Trace;
use rquickjs::{Class, FromJs, IntoJs};
use std::any::Any;

#[derive(Trace)]
#[rquickjs::class]
pub struct HostObject {
    #[qjs(skip_trace)]
    class: ClassId,
    #[qjs(skip_trace)]
    payload: Option<Box<dyn Any>>,
    #[qjs(skip_trace)]
    runtime: WeakRuntime,
}

impl Drop for HostObject {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            self.runtime.finalize(self.class, payload);
        }
    }
}

impl<'js> Ctx<'js> {
    /// Create an instance of `class` carrying `payload`, with the class
    /// prototype if one was set.
    pub fn create_instance(&self, class: ClassId, payload: Box<dyn Any>) -> Result<Value<'js>> {
        if !self.runtime().has_class(class) {
            return Err(Error::UnknownClass(format!("{class:?}")));
        }

        let object = HostObject {
            class,
            payload: Some(payload),
            runtime: self.runtime().clone(),
        };
        let instance = Class::instance(self.raw().clone(), object)?;
        let value = Value::own(self, instance.into_js(self.raw())?);

        if let Some(prototype) = self
            .runtime()
            .prototype(class)
            .and_then(|prototype| prototype.attach(self))
        {
            self.object_builtin("setPrototypeOf", vec![value.clone(), prototype])?;
        }
        Ok(value)
    }

    /// Set the prototype given to new instances of `class`.
    pub fn set_class_proto(&self, class: ClassId, prototype: Value<'js>) -> Result<()> {
        self.runtime().set_prototype(class, prototype.detach())
    }
}

impl<'js> Value<'js> {
    fn host_object(&self) -> Option<Class<'js, HostObject>> {
        let ctx = self.ctx()?;
        Class::<HostObject>::from_js(ctx.raw(), self.raw()?.clone()).ok()
    }

    /// Registered class name, for host-backed instances.
    pub(crate) fn class_name(&self) -> Option<String> {
        let class = self.host_object()?.borrow().class;
        self.runtime().class_name(class)
    }

    /// Whether this is an instance of `class`.
    pub fn is_class(&self, class: ClassId) -> bool {
        self.host_object()
            .is_some_and(|object| object.borrow().class == class)
    }

    /// Copy of the instance payload when it has type `T`.
    pub fn opaque<T: Clone + 'static>(&self) -> Option<T> {
        let object = self.host_object()?;
        let object = object.borrow();
        object.payload.as_ref()?.downcast_ref::<T>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Context, Runtime};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct Handle(Rc<i32>);

    #[test]
    fn instances_carry_their_payload() {
        let runtime = Runtime::create().unwrap();
        let class = runtime.create_class("Handle", |_, _| {}).unwrap();
        let other = runtime.create_class("Other", |_, _| {}).unwrap();
        let context = Context::create(&runtime).unwrap();

        context.with(|ctx| {
            let value = ctx
                .create_instance(class, Box::new(Handle(Rc::new(5))))
                .unwrap();
            assert!(value.is_class(class));
            assert!(!value.is_class(other));
            assert_eq!(value.type_name(), "Handle");
            assert_eq!(value.opaque::<Handle>().map(|h| *h.0), Some(5));
            assert!(value.opaque::<String>().is_none());
            assert!(!ctx.create_object().unwrap().is_class(class));
        });
    }

    #[test]
    fn finalizer_runs_when_collected() {
        let finalized = Rc::new(RefCell::new(Vec::new()));
        let runtime = Runtime::create().unwrap();
        let log = Rc::clone(&finalized);
        let class = runtime
            .create_class("Handle", move |runtime, payload| {
                assert!(runtime.is_alive());
                if let Ok(handle) = payload.downcast::<Handle>() {
                    log.borrow_mut().push(*handle.0);
                }
            })
            .unwrap();
        let context = Context::create(&runtime).unwrap();

        let shared = Rc::new(1);
        context.with(|ctx| {
            let value = ctx
                .create_instance(class, Box::new(Handle(Rc::clone(&shared))))
                .unwrap();
            assert_eq!(Rc::strong_count(&shared), 2);
            drop(value);
        });
        runtime.run_gc();

        assert_eq!(*finalized.borrow(), vec![1]);
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn live_instances_are_finalized_at_teardown() {
        let count = Rc::new(RefCell::new(0));
        let runtime = Runtime::create().unwrap();
        let seen = Rc::clone(&count);
        let class = runtime
            .create_class("Handle", move |_, _| *seen.borrow_mut() += 1)
            .unwrap();
        let context = Context::create(&runtime).unwrap();

        context.with(|ctx| {
            let value = ctx.create_instance(class, Box::new(Handle(Rc::new(0)))).unwrap();
            ctx.global_object().set_property("kept", value).unwrap();
        });
        assert_eq!(*count.borrow(), 0);

        drop(context);
        drop(runtime);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn payload_is_released_when_runtime_goes_first() {
        let finalized = Rc::new(RefCell::new(0));
        let runtime = Runtime::create().unwrap();
        let seen = Rc::clone(&finalized);
        let class = runtime
            .create_class("Handle", move |_, _| *seen.borrow_mut() += 1)
            .unwrap();
        let context = Context::create(&runtime).unwrap();

        let shared = Rc::new(0);
        context.with(|ctx| {
            let value = ctx
                .create_instance(class, Box::new(Handle(Rc::clone(&shared))))
                .unwrap();
            ctx.global_object().set_property("kept", value).unwrap();
        });

        drop(runtime);
        assert_eq!(Rc::strong_count(&shared), 2);

        drop(context);
        assert_eq!(Rc::strong_count(&shared), 1);
        assert_eq!(*finalized.borrow(), 0);
    }

    #[test]
    fn instances_share_the_class_prototype() {
        let runtime = Runtime::create().unwrap();
        let class = runtime.create_class("Handle", |_, _| {}).unwrap();
        let context = Context::create(&runtime).unwrap();

        context.with(|ctx| {
            let proto = ctx.eval_script("({ kind() { return 'handle'; } })").unwrap();
            ctx.set_class_proto(class, proto).unwrap();

            let value = ctx.create_instance(class, Box::new(Handle(Rc::new(0)))).unwrap();
            ctx.global_object().set_property("h", value).unwrap();
            let kind = ctx.eval_script("h.kind()").unwrap();
            assert_eq!(kind.to_string(), "handle");
        });
    }
}
