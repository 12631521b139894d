use crate::link::{Attachment, LinkContext};
use ember_common::{ByteReader, ByteWriter, ClassId, CoreError, InstanceId};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Behavior shared by every managed object.
///
/// A record on the wire is a header (class id, instance id) written by the
/// manager, followed by whatever [`Object::write`] emits. `read` must consume
/// exactly those bytes. References to other objects are stored unresolved by
/// `read` and resolved by `link` once the whole stream has been decoded.
pub trait Object: Send + Sync + 'static {
    /// Dynamic class id of this instance.
    fn class_id(&self) -> ClassId;

    fn write(&self, _out: &mut ByteWriter) -> Result<(), CoreError> {
        Ok(())
    }

    fn read(&mut self, _input: &mut ByteReader<'_>) -> Result<(), CoreError> {
        Ok(())
    }

    fn link(&mut self, _ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        Ok(())
    }

    /// Write the object's fields for diagnostics, indented by `indent` levels.
    fn dump(&self, _indent: usize, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }

    /// Owner back-relation, for objects that can be attached to an owner.
    fn attachment(&self) -> Option<&Attachment> {
        None
    }

    fn attachment_mut(&mut self) -> Option<&mut Attachment> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Static class information for a concrete object type.
pub trait ObjectType: Object + Default {
    const CLASS_ID: ClassId;
    const BASE_CLASS_ID: ClassId;
    const NAME: &'static str;
}

/// Instance of the root class: no state beyond its identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainObject;

impl Object for PlainObject {
    fn class_id(&self) -> ClassId {
        Self::CLASS_ID
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ObjectType for PlainObject {
    const CLASS_ID: ClassId = ClassId::OBJECT;
    const BASE_CLASS_ID: ClassId = ClassId::UNDEFINED;
    const NAME: &'static str = "Object";
}

/// Manager-owned storage for one object: its identity, the logical deletion
/// flag and the object itself behind a reader/writer lock.
pub struct ObjectCell {
    instance_id: InstanceId,
    class_id: ClassId,
    deleted: AtomicBool,
    object: RwLock<Box<dyn Object>>,
}

/// Shared pointer to an object's storage. Does not count as an owner.
pub type ObjectPtr = Arc<ObjectCell>;

impl ObjectCell {
    pub(crate) fn new(instance_id: InstanceId, object: Box<dyn Object>) -> Self {
        Self {
            instance_id,
            class_id: object.class_id(),
            deleted: AtomicBool::new(false),
            object: RwLock::new(object),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Whether the last owning handle has been released.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn Object>> {
        self.object.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Object>> {
        self.object.write()
    }

    /// Borrow the object as `T` if that is its concrete type.
    pub fn get<T: Object>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.object.read(), |object| {
            object.as_any().downcast_ref::<T>()
        })
        .ok()
    }

    /// Mutably borrow the object as `T` if that is its concrete type.
    pub fn get_mut<T: Object>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.object.write(), |object| {
            object.as_any_mut().downcast_mut::<T>()
        })
        .ok()
    }
}

impl fmt::Debug for ObjectCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCell")
            .field("instance_id", &self.instance_id)
            .field("class_id", &self.class_id)
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}
