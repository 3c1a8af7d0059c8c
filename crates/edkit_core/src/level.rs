//! Level object model
//!
//! The editor owns `LevelObject`s through `Rc`; anything else that wants to
//! keep an object alive (a script value, the selection list) holds its own
//! `Rc` clone, so the strong count is the host-side reference count.
//!
//! Positions and selection are only changed through an [`EditorHost`], never
//! by writing fields directly, so the host can apply its own rules (grid
//! snapping, selection bookkeeping).

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A placed object in the level.
#[derive(Debug)]
pub struct LevelObject {
    uid: u64,
    object_id: i32,
    position: Cell<Vec2>,
    rotation: Cell<f32>,
    selected: Cell<bool>,
}

impl LevelObject {
    fn new(uid: u64, object_id: i32, position: Vec2) -> Self {
        Self {
            uid,
            object_id,
            position: Cell::new(position),
            rotation: Cell::new(0.0),
            selected: Cell::new(false),
        }
    }

    /// Unique instance identifier within its level.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Object kind identifier (which block/trigger this is).
    pub fn object_id(&self) -> i32 {
        self.object_id
    }

    pub fn position(&self) -> Vec2 {
        self.position.get()
    }

    pub fn rotation(&self) -> f32 {
        self.rotation.get()
    }

    pub fn set_rotation(&self, degrees: f32) {
        self.rotation.set(degrees);
    }

    pub fn is_selected(&self) -> bool {
        self.selected.get()
    }

    pub fn snapshot(&self) -> ObjectSnapshot {
        let position = self.position();
        ObjectSnapshot {
            uid: self.uid,
            object_id: self.object_id,
            x: position.x,
            y: position.y,
            rotation: self.rotation(),
            selected: self.is_selected(),
        }
    }
}

/// Plain-data view of a level object, for dumps and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub uid: u64,
    pub object_id: i32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub selected: bool,
}

/// Editor operations exposed to scripts.
pub trait EditorHost {
    /// Place a new object of the given kind.
    fn create_object(&self, object_id: i32, position: Vec2) -> Rc<LevelObject>;

    /// Move an object by `delta`, applying the host's placement rules.
    fn move_object(&self, object: &LevelObject, delta: Vec2);

    /// Add an object to the current selection.
    fn select_object(&self, object: &Rc<LevelObject>);

    /// Remove an object from the current selection.
    fn deselect_object(&self, object: &LevelObject);

    fn deselect_all(&self);

    /// Currently selected objects, in selection order.
    fn selected_objects(&self) -> Vec<Rc<LevelObject>>;

    /// Center of the visible area in level coordinates.
    fn view_center(&self) -> Vec2;

    fn object_count(&self) -> usize;
}

/// In-memory level: the default `EditorHost`.
#[derive(Debug, Default)]
pub struct Level {
    objects: RefCell<Vec<Rc<LevelObject>>>,
    selection: RefCell<Vec<Rc<LevelObject>>>,
    view_center: Cell<Vec2>,
    grid_snap: Option<f32>,
    next_uid: Cell<u64>,
}

impl Level {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snap every moved object to a grid of `size` units.
    pub fn with_grid_snap(mut self, size: f32) -> Self {
        self.grid_snap = (size > 0.0).then_some(size);
        self
    }

    pub fn set_view_center(&self, center: Vec2) {
        self.view_center.set(center);
    }

    pub fn objects(&self) -> Vec<Rc<LevelObject>> {
        self.objects.borrow().clone()
    }

    pub fn snapshot(&self) -> Vec<ObjectSnapshot> {
        self.objects.borrow().iter().map(|obj| obj.snapshot()).collect()
    }

    /// Drop an object from the level; script values may still hold it.
    pub fn remove_object(&self, object: &LevelObject) {
        self.deselect_object(object);
        self.objects.borrow_mut().retain(|o| o.uid != object.uid);
    }

    fn snap(&self, position: Vec2) -> Vec2 {
        match self.grid_snap {
            Some(size) => (position / size).round() * size,
            None => position,
        }
    }
}

impl EditorHost for Level {
    fn create_object(&self, object_id: i32, position: Vec2) -> Rc<LevelObject> {
        let uid = self.next_uid.get();
        self.next_uid.set(uid + 1);

        let object = Rc::new(LevelObject::new(uid, object_id, self.snap(position)));
        self.objects.borrow_mut().push(Rc::clone(&object));
        tracing::trace!(uid, object_id, "created level object");
        object
    }

    fn move_object(&self, object: &LevelObject, delta: Vec2) {
        object.position.set(self.snap(object.position() + delta));
    }

    fn select_object(&self, object: &Rc<LevelObject>) {
        if object.selected.replace(true) {
            return;
        }
        self.selection.borrow_mut().push(Rc::clone(object));
    }

    fn deselect_object(&self, object: &LevelObject) {
        object.selected.set(false);
        self.selection.borrow_mut().retain(|o| o.uid != object.uid);
    }

    fn deselect_all(&self) {
        for object in self.selection.borrow_mut().drain(..) {
            object.selected.set(false);
        }
    }

    fn selected_objects(&self) -> Vec<Rc<LevelObject>> {
        self.selection.borrow().clone()
    }

    fn view_center(&self) -> Vec2 {
        self.view_center.get()
    }

    fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_move() {
        let level = Level::new();
        let obj = level.create_object(1, Vec2::new(10.0, 20.0));
        level.move_object(&obj, Vec2::new(5.0, -5.0));

        assert_eq!(obj.position(), Vec2::new(15.0, 15.0));
        assert_eq!(level.object_count(), 1);
    }

    #[test]
    fn moves_snap_to_grid() {
        let level = Level::new().with_grid_snap(30.0);
        let obj = level.create_object(1, Vec2::ZERO);
        level.move_object(&obj, Vec2::new(44.0, 16.0));

        assert_eq!(obj.position(), Vec2::new(30.0, 30.0));
    }

    #[test]
    fn selection_tracks_order_and_flags() {
        let level = Level::new();
        let a = level.create_object(1, Vec2::ZERO);
        let b = level.create_object(2, Vec2::ZERO);

        level.select_object(&b);
        level.select_object(&a);
        level.select_object(&a);

        let selected: Vec<_> = level.selected_objects().iter().map(|o| o.uid()).collect();
        assert_eq!(selected, vec![b.uid(), a.uid()]);

        level.deselect_object(&b);
        assert!(!b.is_selected());
        assert_eq!(level.selected_objects().len(), 1);

        level.deselect_all();
        assert!(!a.is_selected());
        assert!(level.selected_objects().is_empty());
    }

    #[test]
    fn removed_objects_stay_alive_while_referenced() {
        let level = Level::new();
        let obj = level.create_object(7, Vec2::ZERO);
        level.select_object(&obj);
        assert_eq!(Rc::strong_count(&obj), 3);

        level.remove_object(&obj);
        assert_eq!(Rc::strong_count(&obj), 1);
        assert_eq!(obj.object_id(), 7);
    }
}
