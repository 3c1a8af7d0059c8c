//! Typed input requested by scripts through `input()`

use edkit_qjs::{Ctx, Marshal, MarshalError, Null, PathSegment, Value};
use edkit_services::InputDefaults;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Int,
    Number,
    String,
}

/// One requested input: `{ type, name, description? }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInput {
    pub kind: InputKind,
    pub name: String,
    pub description: Option<String>,
}

impl<'js> Marshal<'js> for ScriptInput {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        let props = HashMap::<String, String>::from_value(ctx, value)
            .map_err(|err| err.at(PathSegment::Within("script input item".into())))?;

        let kind = match props.get("type").map(String::as_str) {
            None => return Err(missing("type")),
            Some("int") => InputKind::Int,
            Some("number") => InputKind::Number,
            Some("string") => InputKind::String,
            Some(other) => {
                return Err(MarshalError::new(format!(
                    "Invalid script input item type \"{other}\""
                )))
            }
        };
        let name = props.get("name").cloned().ok_or_else(|| missing("name"))?;
        if let Some(key) = props
            .keys()
            .find(|key| !matches!(key.as_str(), "type" | "name" | "description"))
        {
            return Err(MarshalError::new(format!(
                "Invalid script input item key \"{key}\""
            )));
        }

        Ok(Self {
            kind,
            name,
            description: props.get("description").cloned(),
        })
    }

    fn into_value(self, ctx: &Ctx<'js>) -> edkit_qjs::Result<Value<'js>> {
        Null.into_value(ctx)
    }
}

fn missing(property: &str) -> MarshalError {
    MarshalError::new(format!(
        "Script input item is missing required property \"{property}\""
    ))
}

/// A value handed back for one requested input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Int(i32),
    Number(f64),
    String(String),
}

impl<'js> Marshal<'js> for InputValue {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        if value.is_string() {
            return String::from_value(ctx, value).map(Self::String);
        }
        if value.type_name() == "int" {
            return i32::from_value(ctx, value).map(Self::Int);
        }
        if value.is_number() {
            return f64::from_value(ctx, value).map(Self::Number);
        }
        Err(MarshalError::mismatch("int, number or string", &value.type_name()))
    }

    fn into_value(self, ctx: &Ctx<'js>) -> edkit_qjs::Result<Value<'js>> {
        match self {
            Self::Int(value) => value.into_value(ctx),
            Self::Number(value) => value.into_value(ctx),
            Self::String(value) => value.into_value(ctx),
        }
    }
}

/// Decides what a script receives when it asks for input.
pub trait InputPolicy {
    fn value_for(&self, key: &str, input: &ScriptInput) -> InputValue;
}

/// Answers every request with the configured default for its type.
#[derive(Debug, Clone, Default)]
pub struct FixedInputs {
    defaults: InputDefaults,
}

impl FixedInputs {
    pub fn new(defaults: InputDefaults) -> Self {
        Self { defaults }
    }
}

impl InputPolicy for FixedInputs {
    fn value_for(&self, key: &str, input: &ScriptInput) -> InputValue {
        tracing::debug!(key, name = %input.name, kind = ?input.kind, "script requested input");
        match input.kind {
            InputKind::Int => InputValue::Int(self.defaults.int),
            InputKind::Number => InputValue::Number(self.defaults.number),
            InputKind::String => InputValue::String(self.defaults.string.clone()),
        }
    }
}
