//! QuickJS binding layer
//!
//! Ownership-correct handles over the QuickJS heap and a typed bridge
//! between host values and script values.
//!
//! ## Layers
//!
//! - **Handles:** [`Runtime`] / [`WeakRuntime`], [`Context`] / [`Ctx`],
//!   [`Value`] and the cooperative [`Module`] state machine
//! - **Marshaling:** [`Marshal`] converts between host types and script
//!   values, [`ArgList`] converts positional arguments
//! - **Registration:** native functions ([`NativeFn`], [`HostFunction`]),
//!   accessors and host-backed classes
//!
//! Nothing here runs on a background thread. Scripts only advance when the
//! host calls [`Module::tick`].

mod class;
mod context;
mod convert;
mod error;
mod function;
mod module;
mod runtime;
mod value;

pub use context::{Context, Ctx, Promise};
pub use convert::{ArgList, Marshal, Null, Resolved};
pub use error::{Error, MarshalError, PathSegment, Result};
pub use function::{native, wrap, HostFunction, NativeFn};
pub use module::{Module, ModuleState};
pub use runtime::{ClassId, FunctionId, Runtime, WeakRuntime};
pub use value::{PromiseState, Value};

pub use rquickjs;
