//! Owning and weak references to managed objects.
//!
//! An owning [`Handle`] is reference counted. When the last clone is dropped
//! the object is marked deleted; its storage stays in the manager until the
//! next sweep. A [`WeakHandle`] is an arena key that is re-validated on every
//! access and never keeps an object alive.

use crate::arena::{ObjectKey, Store};
use crate::object::{Object, ObjectPtr};
use crate::registry::TypeRegistry;
use ember_common::{ClassId, InstanceId};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::{Arc, Weak};

pub(crate) struct HandleShared {
    key: ObjectKey,
    cell: ObjectPtr,
    registry: Arc<TypeRegistry>,
    store: Weak<Store>,
}

impl Drop for HandleShared {
    fn drop(&mut self) {
        // Weak::upgrade fails once the strong count reaches zero, so a
        // released object can never be handed out again.
        self.cell.mark_deleted();
        tracing::trace!(id = %self.cell.instance_id(), "last owning handle released");
    }
}

/// Owning reference to a managed object.
#[derive(Clone)]
pub struct Handle {
    shared: Arc<HandleShared>,
}

impl Handle {
    pub(crate) fn new(
        key: ObjectKey,
        cell: ObjectPtr,
        registry: Arc<TypeRegistry>,
        store: Weak<Store>,
    ) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                key,
                cell,
                registry,
                store,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<HandleShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade_shared(&self) -> Weak<HandleShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn instance_id(&self) -> InstanceId {
        self.shared.cell.instance_id()
    }

    pub fn class_id(&self) -> ClassId {
        self.shared.cell.class_id()
    }

    pub fn key(&self) -> ObjectKey {
        self.shared.key
    }

    pub fn is_deleted(&self) -> bool {
        self.shared.cell.is_deleted()
    }

    /// Whether the object's dynamic class is `ancestor` or derives from it.
    pub fn is_derived_from(&self, ancestor: ClassId) -> bool {
        self.shared
            .registry
            .is_derived_from(self.class_id(), ancestor)
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.shared.registry
    }

    pub fn ptr(&self) -> &ObjectPtr {
        &self.shared.cell
    }

    pub fn weak(&self) -> WeakHandle {
        WeakHandle {
            key: self.shared.key,
            instance_id: self.instance_id(),
            class_id: self.class_id(),
            store: self.shared.store.clone(),
        }
    }

    /// Whether both handles share the same owning group.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn Object>> {
        self.shared.cell.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Object>> {
        self.shared.cell.write()
    }

    pub fn get<T: Object>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.shared.cell.get::<T>()
    }

    pub fn get_mut<T: Object>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        self.shared.cell.get_mut::<T>()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("instance_id", &self.instance_id())
            .field("class_id", &self.class_id())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// Non-owning reference to a managed object.
#[derive(Clone)]
pub struct WeakHandle {
    key: ObjectKey,
    instance_id: InstanceId,
    class_id: ClassId,
    store: Weak<Store>,
}

impl WeakHandle {
    pub(crate) fn new(
        key: ObjectKey,
        instance_id: InstanceId,
        class_id: ClassId,
        store: Weak<Store>,
    ) -> Self {
        Self {
            key,
            instance_id,
            class_id,
            store,
        }
    }

    /// Instance id of the observed object, valid even after it is reaped.
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn key(&self) -> ObjectKey {
        self.key
    }

    /// Obtain an owning handle if the object still has owners.
    ///
    /// Returns `None` once the manager is gone, the slot has been reaped or
    /// reused, or every owning handle has been released.
    pub fn upgrade(&self) -> Option<Handle> {
        let store = self.store.upgrade()?;
        let arena = store.arena.lock();
        let entry = arena.get(self.key)?;
        entry.owner.upgrade().map(Handle::from_shared)
    }

    /// Whether the observed object is still registered and owned.
    pub fn is_live(&self) -> bool {
        self.upgrade().is_some_and(|handle| !handle.is_deleted())
    }
}

impl PartialEq for WeakHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.store, &other.store)
    }
}

impl Eq for WeakHandle {}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("instance_id", &self.instance_id)
            .field("class_id", &self.class_id)
            .field("key", &self.key)
            .finish()
    }
}
