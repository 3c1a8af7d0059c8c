//! Host <-> script value conversion
//!
//! | Host type                     | Script value                       |
//! |-------------------------------|------------------------------------|
//! | `bool`                        | any value, by truthiness           |
//! | `i32`                         | number (truncated)                 |
//! | `f32`, `f64`                  | number                             |
//! | `String`                      | string                             |
//! | `()`                          | `undefined` (accepts anything)     |
//! | [`Null`]                      | `null`                             |
//! | `Option<T>`                   | `T`, or `null`/`undefined`         |
//! | `Vec<T>`                      | array                              |
//! | tuples of 1..=6               | array of exactly that length       |
//! | `HashMap` / `BTreeMap<String, T>` | plain object                   |
//! | [`Resolved<T>`]               | promise already resolved with `T`  |
//! | [`Value`]                     | passed through                     |

use crate::context::Ctx;
use crate::error::{MarshalError, PathSegment, Result};
use crate::value::{PromiseState, Value};
use std::collections::{BTreeMap, HashMap};

/// Conversion between a host type and a script value.
pub trait Marshal<'js>: Sized {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError>;

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>>;
}

/// Positional arguments: a tuple converted element by element.
///
/// Fails without converting anything when the count differs.
pub trait ArgList<'js>: Sized {
    const ARITY: usize;

    fn from_args(ctx: &Ctx<'js>, args: &[Value<'js>]) -> Result<Self, MarshalError>;
}

/// The script `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

/// Hands the value to the script as an already resolved promise.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T>(pub T);

impl<'js> Marshal<'js> for Value<'js> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if value.is_detached() {
            return value
                .attach(ctx)
                .ok_or_else(|| MarshalError::new("Value belongs to a destroyed runtime"));
        }
        Ok(value)
    }

    fn into_value(self, _ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(self)
    }
}

impl<'js> Marshal<'js> for () {
    fn from_value(_ctx: &Ctx<'js>, _value: Value<'js>) -> Result<Self, MarshalError> {
        Ok(())
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(ctx.create_undefined())
    }
}

impl<'js> Marshal<'js> for Null {
    fn from_value(_ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if !value.is_null() {
            return Err(MarshalError::mismatch("null", &value.type_name()));
        }
        Ok(Null)
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(ctx.create_null())
    }
}

impl<'js> Marshal<'js> for bool {
    fn from_value(_ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        Ok(value.to_bool())
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(ctx.create_bool(self))
    }
}

impl<'js> Marshal<'js> for i32 {
    fn from_value(_ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if !value.is_number() {
            return Err(MarshalError::mismatch("integer", &value.type_name()));
        }
        value
            .to_int32()
            .ok_or_else(|| MarshalError::mismatch("integer", &value.type_name()))
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(ctx.create_int32(self))
    }
}

impl<'js> Marshal<'js> for f64 {
    fn from_value(_ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if !value.is_number() {
            return Err(MarshalError::mismatch("number", &value.type_name()));
        }
        value
            .to_number()
            .ok_or_else(|| MarshalError::mismatch("number", &value.type_name()))
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(ctx.create_number(self))
    }
}

impl<'js> Marshal<'js> for f32 {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        f64::from_value(ctx, value).map(|n| n as f32)
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        Ok(ctx.create_number(f64::from(self)))
    }
}

impl<'js> Marshal<'js> for String {
    fn from_value(_ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if !value.is_string() {
            return Err(MarshalError::mismatch("string", &value.type_name()));
        }
        Ok(value.to_string())
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        ctx.create_string(&self)
    }
}

impl<'js, T: Marshal<'js>> Marshal<'js> for Option<T> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        T::from_value(ctx, value).map(Some)
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        match self {
            Some(value) => value.into_value(ctx),
            None => Ok(ctx.create_null()),
        }
    }
}

impl<'js, T: Marshal<'js>> Marshal<'js> for Vec<T> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if !value.is_array() {
            return Err(MarshalError::mismatch("array", &value.type_name()));
        }
        value
            .array_items()
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                T::from_value(ctx, item).map_err(|err| err.at(PathSegment::ArrayIndex(index)))
            })
            .collect()
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        let array = ctx.create_array()?;
        for item in self {
            array.push(item.into_value(ctx)?)?;
        }
        Ok(array)
    }
}

fn object_entries<'js, T: Marshal<'js>>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
) -> Result<Vec<(String, T)>, MarshalError> {
    if !value.is_object() {
        return Err(MarshalError::mismatch("object", &value.type_name()));
    }
    value
        .properties()
        .into_iter()
        .map(|(key, item)| {
            let item = T::from_value(ctx, item).map_err(|err| err.at(PathSegment::Key(key.clone())))?;
            Ok((key, item))
        })
        .collect()
}

fn build_object<'js, T: Marshal<'js>>(
    ctx: &Ctx<'js>,
    entries: impl IntoIterator<Item = (String, T)>,
) -> Result<Value<'js>> {
    let object = ctx.create_object()?;
    for (key, item) in entries {
        object.set_property(&key, item.into_value(ctx)?)?;
    }
    Ok(object)
}

impl<'js, T: Marshal<'js>> Marshal<'js> for HashMap<String, T> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        object_entries(ctx, value).map(|entries| entries.into_iter().collect())
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        build_object(ctx, self)
    }
}

impl<'js, T: Marshal<'js>> Marshal<'js> for BTreeMap<String, T> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        object_entries(ctx, value).map(|entries| entries.into_iter().collect())
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        build_object(ctx, self)
    }
}

impl<'js, T: Marshal<'js>> Marshal<'js> for Resolved<T> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if value.promise_state() != Some(PromiseState::Fulfilled) {
            return Err(MarshalError::mismatch("resolved promise", &value.type_name()));
        }
        let result = value
            .promise_result()
            .ok_or_else(|| MarshalError::mismatch("resolved promise", &value.type_name()))?;
        T::from_value(ctx, result).map(Resolved)
    }

    fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        let promise = ctx.create_promise()?;
        promise
            .resolve
            .call(ctx.create_undefined(), vec![self.0.into_value(ctx)?])?;
        Ok(promise.value)
    }
}

macro_rules! impl_tuples {
    ($len:expr; $($ty:ident $idx:tt),*) => {
        impl<'js, $($ty: Marshal<'js>,)*> ArgList<'js> for ($($ty,)*) {
            const ARITY: usize = $len;

            #[allow(unused_variables)]
            fn from_args(ctx: &Ctx<'js>, args: &[Value<'js>]) -> Result<Self, MarshalError> {
                if args.len() != Self::ARITY {
                    return Err(MarshalError::arity(Self::ARITY, args.len()));
                }
                Ok(($(
                    <$ty as Marshal<'js>>::from_value(ctx, args[$idx].clone())
                        .map_err(|err| err.at(PathSegment::Index($idx)))?,
                )*))
            }
        }
    };
}

impl_tuples!(0;);
impl_tuples!(1; A 0);
impl_tuples!(2; A 0, B 1);
impl_tuples!(3; A 0, B 1, C 2);
impl_tuples!(4; A 0, B 1, C 2, D 3);
impl_tuples!(5; A 0, B 1, C 2, D 3, E 4);
impl_tuples!(6; A 0, B 1, C 2, D 3, E 4, F 5);

macro_rules! impl_tuple_marshal {
    ($len:expr; $($ty:ident $idx:tt),+) => {
        impl<'js, $($ty: Marshal<'js>,)+> Marshal<'js> for ($($ty,)+) {
            fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
                if !value.is_array() {
                    return Err(MarshalError::mismatch("array", &value.type_name()));
                }
                let items = value.array_items();
                if items.len() != $len {
                    return Err(MarshalError::length($len, items.len()));
                }
                <Self as ArgList<'js>>::from_args(ctx, &items)
                    .map_err(|err| err.at(PathSegment::TupleOfSize($len)))
            }

            fn into_value(self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
                let array = ctx.create_array()?;
                $(array.push(self.$idx.into_value(ctx)?)?;)+
                Ok(array)
            }
        }
    };
}

impl_tuple_marshal!(1; A 0);
impl_tuple_marshal!(2; A 0, B 1);
impl_tuple_marshal!(3; A 0, B 1, C 2);
impl_tuple_marshal!(4; A 0, B 1, C 2, D 3);
impl_tuple_marshal!(5; A 0, B 1, C 2, D 3, E 4);
impl_tuple_marshal!(6; A 0, B 1, C 2, D 3, E 4, F 5);
