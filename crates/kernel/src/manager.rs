use crate::arena::Store;
use crate::decode::{RawRecord, RecordDecoder, RecordHeader};
use crate::handle::{Handle, WeakHandle};
use crate::link::{LinkContext, RemapTable};
use crate::object::{Object, ObjectCell, ObjectPtr, ObjectType};
use crate::registry::TypeRegistry;
use ember_common::{ByteReader, ByteWriter, ClassId, CoreError, InstanceId};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Authoritative registry of every object it created or was handed.
///
/// Owns object storage, allocates instance ids and implements snapshot
/// serialization. Each public operation is atomic with respect to the
/// registry; a whole save/load cycle is not, so callers must not mutate
/// the population from other threads while one is in progress.
///
/// The registry lock is only held while the population is enumerated or
/// changed, never while an object's own lock is taken.
pub struct ObjectManager {
    store: Arc<Store>,
}

impl ObjectManager {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            store: Arc::new(Store::new(registry)),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.store.registry
    }

    /// Construct a default instance of `class_id` and register it.
    pub fn create_default(&self, class_id: ClassId) -> Result<Handle, CoreError> {
        let object = self.store.registry.create(class_id)?;
        self.register_obj(object)
    }

    pub fn create_default_obj<T: ObjectType>(&self) -> Result<Handle, CoreError> {
        self.create_default(T::CLASS_ID)
    }

    /// Take ownership of `object`, assign it the next instance id and return
    /// the first owning handle to it.
    pub fn register_obj(&self, object: Box<dyn Object>) -> Result<Handle, CoreError> {
        let class_id = object.class_id();
        if !self.store.registry.contains(class_id) {
            return Err(CoreError::UnknownClass(class_id));
        }
        let id = self.allocate_id()?;
        let cell: ObjectPtr = Arc::new(ObjectCell::new(id, object));

        let mut arena = self.store.arena.lock();
        let key = arena.insert(Arc::clone(&cell));
        let handle = Handle::new(
            key,
            cell,
            Arc::clone(&self.store.registry),
            Arc::downgrade(&self.store),
        );
        arena.set_owner(key, handle.downgrade_shared());
        drop(arena);

        tracing::trace!(id = %id, class = %class_id, "registered object");
        Ok(handle)
    }

    fn allocate_id(&self) -> Result<InstanceId, CoreError> {
        self.store
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
                next.checked_add(1)
            })
            .map(InstanceId)
            .map_err(|_| CoreError::IdSpaceExhausted)
    }

    pub fn object_exists(&self, id: InstanceId) -> bool {
        self.store.arena.lock().contains(id)
    }

    /// Owning handle to object `id`.
    ///
    /// `Ok(None)` when the object is registered but every owning handle has
    /// been released; `NotFound` when it was never registered or is reaped.
    pub fn get_object(&self, id: InstanceId) -> Result<Option<Handle>, CoreError> {
        let arena = self.store.arena.lock();
        let (_, entry) = arena.lookup(id).ok_or(CoreError::NotFound(id))?;
        Ok(entry.owner.upgrade().map(Handle::from_shared))
    }

    /// Storage of object `id`, including logically deleted objects.
    pub fn get_object_ptr(&self, id: InstanceId) -> Result<ObjectPtr, CoreError> {
        let arena = self.store.arena.lock();
        let (_, entry) = arena.lookup(id).ok_or(CoreError::NotFound(id))?;
        Ok(Arc::clone(&entry.cell))
    }

    /// Non-owning handle to object `id`. Works for deleted but unreaped
    /// objects.
    pub fn weak_handle(&self, id: InstanceId) -> Result<WeakHandle, CoreError> {
        let arena = self.store.arena.lock();
        let (key, entry) = arena.lookup(id).ok_or(CoreError::NotFound(id))?;
        Ok(WeakHandle::new(
            key,
            entry.cell.instance_id(),
            entry.cell.class_id(),
            Arc::downgrade(&self.store),
        ))
    }

    /// Number of registered objects, deleted ones included.
    pub fn len(&self) -> usize {
        self.store.arena.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self) -> usize {
        self.store
            .arena
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.cell.is_deleted())
            .count()
    }

    /// Every registered object in instance id order.
    pub fn objects(&self) -> Vec<ObjectPtr> {
        self.store
            .arena
            .lock()
            .iter()
            .map(|(_, entry)| Arc::clone(&entry.cell))
            .collect()
    }

    fn live_objects(&self) -> Vec<ObjectPtr> {
        self.store
            .arena
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.cell.is_deleted())
            .map(|(_, entry)| Arc::clone(&entry.cell))
            .collect()
    }

    /// Reap every logically deleted object. Returns how many were freed.
    pub fn release_unused_objects(&self) -> usize {
        let evicted: Vec<_> = {
            let mut arena = self.store.arena.lock();
            let dead: Vec<_> = arena
                .iter()
                .filter(|(_, entry)| entry.cell.is_deleted())
                .map(|(key, _)| key)
                .collect();
            dead.into_iter()
                .filter_map(|key| arena.remove(key))
                .collect()
        };
        // Storage is dropped outside the lock: freeing an object can release
        // handles it held.
        let count = evicted.len();
        drop(evicted);
        if count > 0 {
            tracing::debug!(count, "released unused objects");
        }
        count
    }

    /// Write every live object as one record, in instance id order. Returns
    /// the number of records written.
    pub fn serialize(&self, out: &mut ByteWriter) -> Result<usize, CoreError> {
        let _span = tracing::info_span!("serialize").entered();
        let objects = self.live_objects();
        for cell in &objects {
            RecordHeader {
                class_id: cell.class_id(),
                instance_id: cell.instance_id(),
            }
            .write(out);
            cell.read().write(out)?;
        }
        tracing::debug!(objects = objects.len(), bytes = out.len(), "serialized population");
        Ok(objects.len())
    }

    /// Rebuild every record in `input` as a new object and relink their
    /// references. Returns owning handles to the new objects in stream order.
    ///
    /// On failure the partially rebuilt objects are released and reaped by
    /// the next sweep.
    pub fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<Vec<Handle>, CoreError> {
        let _span = tracing::info_span!("deserialize").entered();
        let (objects, remap) = self.reconstruct(input)?;
        self.link_objects(&objects, &remap)?;
        tracing::debug!(objects = objects.len(), "deserialized population");
        Ok(objects)
    }

    /// First phase: decode records, register each object under a new id and
    /// record the old-to-new mapping.
    pub fn reconstruct(
        &self,
        input: &mut ByteReader<'_>,
    ) -> Result<(Vec<Handle>, RemapTable), CoreError> {
        let registry = Arc::clone(&self.store.registry);
        let mut objects = Vec::new();
        let mut remap = RemapTable::new();
        for record in RecordDecoder::new(input, &registry) {
            let RawRecord { header, object } = record?;
            let handle = self.register_obj(object)?;
            remap.insert(header.instance_id, handle.instance_id())?;
            objects.push(handle);
        }
        Ok((objects, remap))
    }

    /// Second phase: resolve each object's stored old ids through `remap`.
    pub fn link_objects(&self, objects: &[Handle], remap: &RemapTable) -> Result<(), CoreError> {
        let ctx = LinkContext::new(self, remap);
        for handle in objects {
            handle.write().link(&ctx)?;
        }
        tracing::trace!(objects = objects.len(), "linked objects");
        Ok(())
    }

    /// Human readable listing of every live object.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Err(e) = self.write_dump(&mut out) {
            tracing::warn!(error = %e, "dump truncated");
        }
        out
    }

    fn write_dump(&self, out: &mut String) -> fmt::Result {
        for cell in self.live_objects() {
            let name = self
                .store
                .registry
                .class_name(cell.class_id())
                .unwrap_or("<unknown>");
            writeln!(out, "{name} {{")?;
            writeln!(out, "    type: {}", cell.class_id())?;
            writeln!(out, "    ID: {}", cell.instance_id())?;
            cell.read().dump(1, out)?;
            writeln!(out, "}}")?;
        }
        Ok(())
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        // Handles that outlive the manager observe a deleted object.
        let arena = self.store.arena.lock();
        for (_, entry) in arena.iter() {
            entry.cell.mark_deleted();
        }
    }
}

impl fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectManager")
            .field("objects", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ObjectLink;
    use crate::object::PlainObject;
    use std::any::Any;
    use std::collections::BTreeSet;

    const NODE: ClassId = ClassId(3000);

    /// Test object with one owning reference and one weak reference.
    #[derive(Default)]
    struct Node {
        next: Option<ObjectLink<Handle>>,
        back: Option<ObjectLink<WeakHandle>>,
    }

    impl Node {
        fn write_link(out: &mut ByteWriter, id: Option<InstanceId>) {
            match id {
                None => out.write_i32(0),
                Some(id) => {
                    out.write_i32(1);
                    out.write_u32(id.0);
                }
            }
        }

        fn read_link(input: &mut ByteReader<'_>) -> Result<Option<InstanceId>, CoreError> {
            match input.read_i32()? {
                0 => Ok(None),
                _ => Ok(Some(InstanceId(input.read_u32()?))),
            }
        }
    }

    impl Object for Node {
        fn class_id(&self) -> ClassId {
            NODE
        }

        fn write(&self, out: &mut ByteWriter) -> Result<(), CoreError> {
            Self::write_link(out, self.next.as_ref().map(|l| l.target_id()).transpose()?);
            Self::write_link(out, self.back.as_ref().map(|l| l.target_id()).transpose()?);
            Ok(())
        }

        fn read(&mut self, input: &mut ByteReader<'_>) -> Result<(), CoreError> {
            self.next = Self::read_link(input)?.map(ObjectLink::Unresolved);
            self.back = Self::read_link(input)?.map(ObjectLink::Unresolved);
            Ok(())
        }

        fn link(&mut self, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
            if let Some(ObjectLink::Unresolved(old)) = self.next {
                self.next = Some(ObjectLink::Resolved(ctx.resolve_handle(old)?));
            }
            if let Some(ObjectLink::Unresolved(old)) = self.back {
                self.back = Some(ObjectLink::Resolved(ctx.resolve_weak(old)?));
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl ObjectType for Node {
        const CLASS_ID: ClassId = NODE;
        const BASE_CLASS_ID: ClassId = ClassId::OBJECT;
        const NAME: &'static str = "Node";
    }

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry.register_type::<Node>().unwrap();
        Arc::new(registry)
    }

    fn snapshot(manager: &ObjectManager) -> Vec<u8> {
        let mut out = ByteWriter::new();
        manager.serialize(&mut out).unwrap();
        out.into_bytes()
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let manager = ObjectManager::new(registry());
        let handles: Vec<Handle> = (0..10)
            .map(|_| manager.create_default(ClassId::OBJECT).unwrap())
            .collect();
        for pair in handles.windows(2) {
            assert!(pair[0].instance_id() < pair[1].instance_id());
        }
        assert!(handles.iter().all(|h| h.instance_id().is_valid()));
    }

    #[test]
    fn concurrent_registration_yields_distinct_ids() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let manager = &ObjectManager::new(registry());
        let handles: Vec<Handle> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(move || {
                        (0..PER_THREAD)
                            .map(|_| manager.create_default(ClassId::OBJECT).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        let ids: BTreeSet<InstanceId> = handles.iter().map(Handle::instance_id).collect();
        assert_eq!(ids.len(), THREADS * PER_THREAD);
        assert!(!ids.contains(&InstanceId::NONE));
        assert_eq!(manager.len(), THREADS * PER_THREAD);
        for id in &ids {
            assert!(manager.object_exists(*id));
        }
    }

    #[test]
    fn sweep_alongside_handle_drops_reaps_everything() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 250;

        let manager = ObjectManager::new(registry());
        let batches: Vec<Vec<Handle>> = (0..THREADS)
            .map(|_| {
                (0..PER_THREAD)
                    .map(|_| manager.create_default(ClassId::OBJECT).unwrap())
                    .collect()
            })
            .collect();
        let weak: Vec<WeakHandle> = batches.iter().flatten().map(Handle::weak).collect();

        let mut reaped = 0;
        std::thread::scope(|s| {
            let workers: Vec<_> = batches
                .into_iter()
                .map(|batch| {
                    s.spawn(move || {
                        for handle in batch {
                            drop(handle);
                        }
                    })
                })
                .collect();
            while workers.iter().any(|worker| !worker.is_finished()) {
                reaped += manager.release_unused_objects();
            }
        });
        reaped += manager.release_unused_objects();

        assert_eq!(reaped, THREADS * PER_THREAD);
        assert!(manager.is_empty());
        assert!(weak.iter().all(|w| w.upgrade().is_none()));
    }

    #[test]
    fn ids_are_not_reused_after_reaping() {
        let manager = ObjectManager::new(registry());
        let first = manager.create_default(ClassId::OBJECT).unwrap();
        let first_id = first.instance_id();
        drop(first);
        assert_eq!(manager.release_unused_objects(), 1);
        let second = manager.create_default(ClassId::OBJECT).unwrap();
        assert!(second.instance_id() > first_id);
    }

    #[test]
    fn create_unknown_class_fails() {
        let manager = ObjectManager::new(registry());
        assert_eq!(
            manager.create_default(ClassId(77)).unwrap_err(),
            CoreError::UnknownClass(ClassId(77))
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn typed_creation_and_downcast() {
        let manager = ObjectManager::new(registry());
        let handle = manager.create_default_obj::<Node>().unwrap();
        assert_eq!(handle.class_id(), NODE);
        assert!(handle.is_derived_from(ClassId::OBJECT));
        assert!(handle.get::<Node>().is_some());
        assert!(handle.get::<PlainObject>().is_none());
    }

    #[test]
    fn exhausted_id_space_is_fatal() {
        let manager = ObjectManager::new(registry());
        manager.store.next_id.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(
            manager.create_default(ClassId::OBJECT).unwrap_err(),
            CoreError::IdSpaceExhausted
        );
    }

    #[test]
    fn logical_deletion_then_reap() {
        let manager = ObjectManager::new(registry());
        let handle = manager.create_default(ClassId::OBJECT).unwrap();
        let id = handle.instance_id();
        drop(handle);

        let ptr = manager.get_object_ptr(id).unwrap();
        assert!(ptr.is_deleted());
        assert!(manager.object_exists(id));
        assert!(manager.get_object(id).unwrap().is_none());

        assert_eq!(manager.release_unused_objects(), 1);
        assert!(!manager.object_exists(id));
        assert_eq!(
            manager.get_object_ptr(id).unwrap_err(),
            CoreError::NotFound(id)
        );
        assert!(matches!(
            manager.get_object(id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn clones_keep_the_object_alive() {
        let manager = ObjectManager::new(registry());
        let handle = manager.create_default(ClassId::OBJECT).unwrap();
        let id = handle.instance_id();
        let fetched = manager.get_object(id).unwrap().unwrap();
        assert!(fetched.ptr_eq(&handle));
        drop(handle);
        assert!(!fetched.is_deleted());
        assert_eq!(manager.release_unused_objects(), 0);
        drop(fetched);
        assert_eq!(manager.release_unused_objects(), 1);
    }

    #[test]
    fn weak_handle_stops_resolving_after_release() {
        let manager = ObjectManager::new(registry());
        let handle = manager.create_default(ClassId::OBJECT).unwrap();
        let weak = handle.weak();
        assert!(weak.is_live());
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
        manager.release_unused_objects();
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.instance_id().0, 1);
    }

    #[test]
    fn weak_handle_does_not_resolve_to_reused_slot() {
        let manager = ObjectManager::new(registry());
        let handle = manager.create_default(ClassId::OBJECT).unwrap();
        let weak = handle.weak();
        drop(handle);
        manager.release_unused_objects();
        let replacement = manager.create_default(ClassId::OBJECT).unwrap();
        assert_eq!(replacement.key().index, weak.key().index);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dropping_the_manager_marks_everything_deleted() {
        let manager = ObjectManager::new(registry());
        let handle = manager.create_default(ClassId::OBJECT).unwrap();
        let weak = handle.weak();
        drop(manager);
        assert!(handle.is_deleted());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn serialize_skips_deleted_objects() {
        let manager = ObjectManager::new(registry());
        let keep = manager.create_default(ClassId::OBJECT).unwrap();
        drop(manager.create_default(ClassId::OBJECT).unwrap());
        let bytes = snapshot(&manager);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[4..8], &keep.instance_id().0.to_le_bytes());
        assert_eq!(manager.live_count(), 1);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn round_trip_relinks_forward_and_back_references() {
        let source = ObjectManager::new(registry());
        let head = source.create_default_obj::<Node>().unwrap();
        let tail = source.create_default_obj::<Node>().unwrap();
        // head owns tail (a reference to a later record); tail points back weakly.
        head.get_mut::<Node>().unwrap().next = Some(ObjectLink::Resolved(tail.clone()));
        tail.get_mut::<Node>().unwrap().back = Some(ObjectLink::Resolved(head.weak()));
        let bytes = snapshot(&source);

        let target = ObjectManager::new(registry());
        // Offset the id counter so old and new ids differ.
        let _filler = target.create_default(ClassId::OBJECT).unwrap();
        let objects = target.deserialize(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(objects.len(), 2);

        let new_head = &objects[0];
        let new_tail = &objects[1];
        assert_ne!(new_head.instance_id(), head.instance_id());

        let next = new_head.get::<Node>().unwrap().next.clone().unwrap();
        assert!(next.resolved().unwrap().ptr_eq(new_tail));
        let back = new_tail.get::<Node>().unwrap().back.clone().unwrap();
        assert_eq!(back.resolved().unwrap().instance_id(), new_head.instance_id());
    }

    #[test]
    fn dangling_reference_fails_to_link() {
        let mut out = ByteWriter::new();
        RecordHeader {
            class_id: NODE,
            instance_id: InstanceId(5),
        }
        .write(&mut out);
        Node::write_link(&mut out, Some(InstanceId(99)));
        Node::write_link(&mut out, None);
        let bytes = out.into_bytes();

        let manager = ObjectManager::new(registry());
        let err = manager.deserialize(&mut ByteReader::new(&bytes)).unwrap_err();
        assert_eq!(err, CoreError::DanglingReference(InstanceId(99)));
        // The half-built object was released with the failed pass.
        assert_eq!(manager.release_unused_objects(), 1);
    }

    #[test]
    fn truncated_stream_fails() {
        let source = ObjectManager::new(registry());
        let node = source.create_default_obj::<Node>().unwrap();
        let bytes = snapshot(&source);
        drop(node);

        let manager = ObjectManager::new(registry());
        let err = manager
            .deserialize(&mut ByteReader::new(&bytes[..bytes.len() - 2]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Truncated { .. }));
    }

    #[test]
    fn dump_lists_live_objects() {
        let manager = ObjectManager::new(registry());
        let node = manager.create_default_obj::<Node>().unwrap();
        drop(manager.create_default(ClassId::OBJECT).unwrap());
        let dump = manager.dump();
        assert!(dump.contains("Node {"));
        assert!(dump.contains(&format!("ID: {}", node.instance_id())));
        assert!(!dump.contains("Object {"));
    }
}
