//! Script globals: `print`, `input`, `editor` and the `GameObject` class

use crate::input::{InputPolicy, InputValue, ScriptInput};
use crate::log::{LogLevel, ScriptLog};
use edkit_core::glam::Vec2;
use edkit_core::level::{EditorHost, LevelObject};
use edkit_qjs::{
    native, ClassId, Ctx, Marshal, MarshalError, Null, PathSegment, Resolved, Runtime, Value,
};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

const GAME_OBJECT_CLASS: &str = "GameObject";

/// A level object as seen by scripts. The instance holds a strong
/// reference until the engine collects it.
#[derive(Debug, Clone)]
pub struct GameObject(pub Rc<LevelObject>);

impl<'js> Marshal<'js> for GameObject {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        let class = ctx.runtime().class_id(GAME_OBJECT_CLASS);
        if !class.is_some_and(|class| value.is_class(class)) {
            return Err(MarshalError::mismatch(GAME_OBJECT_CLASS, &value.type_name()));
        }
        value
            .opaque::<GameObject>()
            .ok_or_else(|| MarshalError::mismatch(GAME_OBJECT_CLASS, &value.type_name()))
    }

    fn into_value(self, ctx: &Ctx<'js>) -> edkit_qjs::Result<Value<'js>> {
        let class = ctx
            .runtime()
            .class_id(GAME_OBJECT_CLASS)
            .ok_or_else(|| edkit_qjs::Error::UnknownClass(GAME_OBJECT_CLASS.to_owned()))?;
        ctx.create_instance(class, Box::new(self))
    }
}

/// A position: `{ x, y }` or `[x, y]` from scripts, `{ x, y }` to them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point(pub Vec2);

impl<'js> Marshal<'js> for Point {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Result<Self, MarshalError> {
        let in_point = |err: MarshalError| err.at(PathSegment::Within("point".into()));

        if value.is_array() {
            let (x, y) = <(f32, f32)>::from_value(ctx, value).map_err(in_point)?;
            return Ok(Self(Vec2::new(x, y)));
        }
        if !value.is_object() {
            return Err(in_point(MarshalError::mismatch(
                "object or array",
                &value.type_name(),
            )));
        }

        let coordinate = |key: &str| {
            let item = value
                .property(key)
                .ok_or_else(|| MarshalError::new(format!("Missing property \"{key}\"")))?;
            f32::from_value(ctx, item).map_err(|err| err.at(PathSegment::Key(key.to_owned())))
        };
        let x = coordinate("x").map_err(in_point)?;
        let y = coordinate("y").map_err(in_point)?;
        Ok(Self(Vec2::new(x, y)))
    }

    fn into_value(self, ctx: &Ctx<'js>) -> edkit_qjs::Result<Value<'js>> {
        let object = ctx.create_object()?;
        object.set_property("x", self.0.x.into_value(ctx)?)?;
        object.set_property("y", self.0.y.into_value(ctx)?)?;
        Ok(object)
    }
}

/// Host services the globals talk to.
pub(crate) struct Bindings {
    pub host: Rc<dyn EditorHost>,
    pub inputs: Rc<dyn InputPolicy>,
    pub log: Rc<ScriptLog>,
}

/// Register the `GameObject` class. Collected instances release their
/// level object.
pub(crate) fn register_classes(runtime: &Runtime) -> edkit_qjs::Result<ClassId> {
    runtime.create_class(GAME_OBJECT_CLASS, |_runtime, payload| {
        if let Ok(object) = payload.downcast::<GameObject>() {
            tracing::trace!(uid = object.0.uid(), "script released level object");
        }
    })
}

pub(crate) fn install(ctx: &Ctx<'_>, class: ClassId, bindings: &Bindings) -> edkit_qjs::Result<()> {
    install_game_object_proto(ctx, class, &bindings.host)?;

    let global = ctx.global_object();

    let log = Rc::clone(&bindings.log);
    let print = native(move |ctx, _this, args| {
        let message = args
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        log.push(LogLevel::Info, message);
        Ok(ctx.create_undefined())
    });
    global.set_property("print", ctx.create_function_bare("print", print)?)?;

    let inputs = Rc::clone(&bindings.inputs);
    global.set_property(
        "input",
        ctx.create_function(
            "input",
            move |_: (), items: HashMap<String, ScriptInput>| {
                let values: BTreeMap<String, InputValue> = items
                    .iter()
                    .map(|(key, item)| (key.clone(), inputs.value_for(key, item)))
                    .collect();
                Resolved(values)
            },
        )?,
    )?;

    global.set_property("editor", editor_object(ctx, &bindings.host)?)?;
    Ok(())
}

fn install_game_object_proto(
    ctx: &Ctx<'_>,
    class: ClassId,
    host: &Rc<dyn EditorHost>,
) -> edkit_qjs::Result<()> {
    let proto = ctx.create_object()?;

    proto.define_getter("id", |this: GameObject| this.0.object_id())?;

    let mover = Rc::clone(host);
    proto.define_getter_setter(
        "x",
        |this: GameObject| this.0.position().x,
        move |this: GameObject, x: f32| {
            let current = this.0.position();
            mover.move_object(&this.0, Vec2::new(x - current.x, 0.0));
            this.0.position().x
        },
    )?;

    let mover = Rc::clone(host);
    proto.define_getter_setter(
        "y",
        |this: GameObject| this.0.position().y,
        move |this: GameObject, y: f32| {
            let current = this.0.position();
            mover.move_object(&this.0, Vec2::new(0.0, y - current.y));
            this.0.position().y
        },
    )?;

    let selector = Rc::clone(host);
    proto.define_getter_setter(
        "selected",
        |this: GameObject| this.0.is_selected(),
        move |this: GameObject, selected: bool| {
            if selected {
                selector.select_object(&this.0);
            } else {
                selector.deselect_object(&this.0);
            }
            this.0.is_selected()
        },
    )?;

    proto.define_getter_setter(
        "rotation",
        |this: GameObject| this.0.rotation(),
        |this: GameObject, rotation: f32| {
            this.0.set_rotation(rotation);
            rotation
        },
    )?;

    ctx.set_class_proto(class, proto)
}

fn editor_object<'js>(ctx: &Ctx<'js>, host: &Rc<dyn EditorHost>) -> edkit_qjs::Result<Value<'js>> {
    let editor = ctx.create_object()?;

    let h = Rc::clone(host);
    editor.set_property(
        "createObject",
        ctx.create_function("editor.createObject", move |_: (), object_id: i32| {
            GameObject(h.create_object(object_id, Vec2::ZERO))
        })?,
    )?;

    let h = Rc::clone(host);
    editor.set_property(
        "moveObjectsBy",
        ctx.create_function(
            "editor.moveObjectsBy",
            move |_: (), objects: Vec<GameObject>, by: Point| {
                for object in &objects {
                    h.move_object(&object.0, by.0);
                }
                Null
            },
        )?,
    )?;

    let h = Rc::clone(host);
    editor.set_property(
        "getSelectedObjects",
        ctx.create_function("editor.getSelectedObjects", move |_: ()| {
            h.selected_objects()
                .into_iter()
                .map(GameObject)
                .collect::<Vec<_>>()
        })?,
    )?;

    let h = Rc::clone(host);
    editor.set_property(
        "getViewCenter",
        ctx.create_function("editor.getViewCenter", move |_: ()| Point(h.view_center()))?,
    )?;

    let h = Rc::clone(host);
    editor.set_property(
        "deselectAll",
        ctx.create_function("editor.deselectAll", move |_: ()| h.deselect_all())?,
    )?;

    let h = Rc::clone(host);
    editor.set_property(
        "getObjectCount",
        ctx.create_function("editor.getObjectCount", move |_: ()| {
            i32::try_from(h.object_count()).unwrap_or(i32::MAX)
        })?,
    )?;

    Ok(editor)
}
