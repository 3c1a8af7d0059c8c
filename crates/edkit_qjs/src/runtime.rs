//! Runtime ownership and the per-runtime registry
//!
//! A [`Runtime`] is the single owner of a QuickJS heap. Everything else that
//! needs to know which runtime it belongs to holds a [`WeakRuntime`], which
//! reports expiry once the owner is gone. Values that outlive their runtime
//! become inert instead of touching freed memory.
//!
//! The registry keeps the host-side state QuickJS cannot hold directly:
//! class names and finalizers, class prototypes and native function bodies.

use crate::error::{Error, Result};
use crate::function::NativeFn;
use crate::value::Value;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{self, Rc};

/// Identifies a host-backed class within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

/// Identifies a registered native function within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

/// Receives the payload of a collected class instance.
pub(crate) type Finalizer = Rc<dyn Fn(&WeakRuntime, Box<dyn Any>)>;

#[derive(Default)]
pub(crate) struct Registry {
    classes: HashMap<String, ClassId>,
    class_names: HashMap<ClassId, String>,
    finalizers: HashMap<ClassId, Finalizer>,
    prototypes: HashMap<ClassId, Value<'static>>,
    functions: HashMap<FunctionId, NativeFn>,
    next_class: u32,
    next_function: u32,
}

pub(crate) struct RuntimeState {
    registry: RefCell<Registry>,
    closed: Cell<bool>,
}

/// Owning handle to a QuickJS runtime.
///
/// Dropping it collects every remaining object, runs pending class
/// finalizers and only then invalidates outstanding [`WeakRuntime`]s.
///
/// Every [`Context`](crate::Context) also holds the engine heap, so the heap
/// is freed when the last of the runtime and its contexts is dropped. Drop
/// contexts first to have finalizers see a live runtime. Instances collected
/// after the runtime itself is gone skip their finalizer and only drop
/// their payload.
pub struct Runtime {
    raw: Option<rquickjs::Runtime>,
    state: Rc<RuntimeState>,
}

impl Runtime {
    pub fn create() -> Result<Self> {
        let raw = rquickjs::Runtime::new()?;
        tracing::trace!("runtime created");
        Ok(Self {
            raw: Some(raw),
            state: Rc::new(RuntimeState {
                registry: RefCell::new(Registry::default()),
                closed: Cell::new(false),
            }),
        })
    }

    pub fn weak(&self) -> WeakRuntime {
        WeakRuntime {
            state: Rc::downgrade(&self.state),
        }
    }

    pub(crate) fn raw(&self) -> Result<&rquickjs::Runtime> {
        self.raw.as_ref().ok_or(Error::RuntimeGone)
    }

    /// Cap the heap size in bytes.
    pub fn set_memory_limit(&self, bytes: usize) {
        if let Some(raw) = &self.raw {
            raw.set_memory_limit(bytes);
        }
    }

    pub fn set_max_stack_size(&self, bytes: usize) {
        if let Some(raw) = &self.raw {
            raw.set_max_stack_size(bytes);
        }
    }

    pub fn run_gc(&self) {
        if let Some(raw) = &self.raw {
            raw.run_gc();
        }
    }

    /// Register a class by name.
    ///
    /// `finalizer` receives the payload of each instance once the engine
    /// collects it, including instances still alive at runtime teardown.
    pub fn create_class<F>(&self, name: &str, finalizer: F) -> Result<ClassId>
    where
        F: Fn(&WeakRuntime, Box<dyn Any>) + 'static,
    {
        let mut registry = self.state.registry.borrow_mut();
        if registry.classes.contains_key(name) {
            return Err(Error::DuplicateClass(name.to_owned()));
        }

        let id = ClassId(registry.next_class);
        registry.next_class += 1;
        registry.classes.insert(name.to_owned(), id);
        registry.class_names.insert(id, name.to_owned());
        registry.finalizers.insert(id, Rc::new(finalizer));
        tracing::debug!(class = name, "registered script class");
        Ok(id)
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.state.registry.borrow().classes.get(name).copied()
    }

    /// Number of native functions registered so far.
    pub fn function_count(&self) -> usize {
        self.state.registry.borrow().functions.len()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("alive", &self.raw.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Release the host's references first. The tables are moved out so
        // nothing is freed while the registry is borrowed.
        let (functions, prototypes) = {
            let mut registry = self.state.registry.borrow_mut();
            (
                std::mem::take(&mut registry.functions),
                std::mem::take(&mut registry.prototypes),
            )
        };
        drop(functions);
        drop(prototypes);

        if let Some(raw) = self.raw.take() {
            raw.run_gc();
            drop(raw);
        }
        self.state.closed.set(true);
        tracing::trace!("runtime destroyed");
    }
}

/// Non-owning handle to a [`Runtime`].
#[derive(Clone, Default)]
pub struct WeakRuntime {
    state: rc::Weak<RuntimeState>,
}

impl WeakRuntime {
    /// Whether the runtime can still be used.
    pub fn is_alive(&self) -> bool {
        self.state.upgrade().is_some_and(|state| !state.closed.get())
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.with_registry(|registry| registry.classes.get(name).copied())
            .flatten()
    }

    pub fn class_name(&self, id: ClassId) -> Option<String> {
        self.with_registry(|registry| registry.class_names.get(&id).cloned())
            .flatten()
    }

    /// Runs `f` against the registry. Must not call back into the engine.
    fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> Option<R> {
        let state = self.state.upgrade()?;
        let mut registry = state.registry.borrow_mut();
        Some(f(&mut registry))
    }

    pub(crate) fn register_function(&self, function: NativeFn) -> Result<FunctionId> {
        self.with_registry(|registry| {
            let id = FunctionId(registry.next_function);
            registry.next_function += 1;
            registry.functions.insert(id, function);
            id
        })
        .ok_or(Error::RuntimeGone)
    }

    pub(crate) fn function(&self, id: FunctionId) -> Option<NativeFn> {
        self.with_registry(|registry| registry.functions.get(&id).cloned())
            .flatten()
    }

    pub(crate) fn set_prototype(&self, class: ClassId, prototype: Value<'static>) -> Result<()> {
        let previous = self
            .with_registry(|registry| {
                if !registry.class_names.contains_key(&class) {
                    return Err(Error::UnknownClass(format!("{class:?}")));
                }
                Ok(registry.prototypes.insert(class, prototype))
            })
            .ok_or(Error::RuntimeGone)??;
        drop(previous);
        Ok(())
    }

    pub(crate) fn prototype(&self, class: ClassId) -> Option<Value<'static>> {
        self.with_registry(|registry| registry.prototypes.get(&class).cloned())
            .flatten()
    }

    pub(crate) fn has_class(&self, class: ClassId) -> bool {
        self.with_registry(|registry| registry.class_names.contains_key(&class))
            .unwrap_or(false)
    }

    /// Route a collected instance's payload to its class finalizer.
    pub(crate) fn finalize(&self, class: ClassId, payload: Box<dyn Any>) {
        let finalizer = self
            .with_registry(|registry| registry.finalizers.get(&class).cloned())
            .flatten();
        match finalizer {
            Some(finalizer) => finalizer(self, payload),
            None => drop(payload),
        }
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_handle_expires_with_owner() {
        let runtime = Runtime::create().unwrap();
        let weak = runtime.weak();
        assert!(weak.is_alive());

        drop(runtime);
        assert!(!weak.is_alive());
        assert_eq!(weak.class_id("GameObject"), None);
    }

    #[test]
    fn default_weak_handle_is_expired() {
        assert!(!WeakRuntime::default().is_alive());
    }

    #[test]
    fn class_names_are_unique_per_runtime() {
        let runtime = Runtime::create().unwrap();
        let id = runtime.create_class("GameObject", |_, _| {}).unwrap();

        assert_eq!(runtime.class_id("GameObject"), Some(id));
        assert_eq!(runtime.weak().class_name(id).as_deref(), Some("GameObject"));
        assert!(matches!(
            runtime.create_class("GameObject", |_, _| {}),
            Err(Error::DuplicateClass(name)) if name == "GameObject"
        ));

        let other = Runtime::create().unwrap();
        assert!(other.create_class("GameObject", |_, _| {}).is_ok());
    }

    #[test]
    fn finalize_without_class_drops_payload() {
        let runtime = Runtime::create().unwrap();
        let marker = Rc::new(());
        runtime
            .weak()
            .finalize(ClassId(99), Box::new(Rc::clone(&marker)));
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
