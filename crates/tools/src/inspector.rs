use ember_common::{ClassId, InstanceId};
use ember_kernel::ObjectManager;
use std::collections::BTreeMap;
use std::fmt;

/// Object inspector for developer tooling.
///
/// Read-only queries against a manager's population for debugging and
/// command line output.
pub struct ObjectInspector;

impl ObjectInspector {
    /// Count registered, live and deleted objects, and live objects per class.
    pub fn summary(manager: &ObjectManager) -> PopulationSummary {
        let registry = manager.registry();
        let mut summary = PopulationSummary {
            classes: registry.len(),
            ..PopulationSummary::default()
        };
        for cell in manager.objects() {
            summary.registered += 1;
            if cell.is_deleted() {
                summary.deleted += 1;
                continue;
            }
            summary.live += 1;
            let name = registry
                .class_name(cell.class_id())
                .map_or_else(|| cell.class_id().to_string(), str::to_string);
            *summary.live_by_class.entry(name).or_default() += 1;
        }
        summary
    }

    /// Details of object `id`, including deleted but unreaped objects.
    pub fn inspect(manager: &ObjectManager, id: InstanceId) -> Option<ObjectInfo> {
        let cell = manager.get_object_ptr(id).ok()?;
        let registry = manager.registry();

        let mut ancestry = Vec::new();
        let mut class = registry.super_class_id(cell.class_id());
        while class.is_defined() {
            ancestry.push(class);
            class = registry.super_class_id(class);
        }

        let mut fields = String::new();
        if let Err(e) = cell.read().dump(1, &mut fields) {
            tracing::warn!(id = %id, error = %e, "dump truncated");
        }

        Some(ObjectInfo {
            id,
            class_id: cell.class_id(),
            class_name: registry.class_name(cell.class_id()).map(str::to_string),
            ancestry,
            deleted: cell.is_deleted(),
            fields,
        })
    }

    /// Ids of every live object in instance id order.
    pub fn list_live(manager: &ObjectManager) -> Vec<InstanceId> {
        manager
            .objects()
            .iter()
            .filter(|cell| !cell.is_deleted())
            .map(|cell| cell.instance_id())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulationSummary {
    /// Registered classes.
    pub classes: usize,
    pub registered: usize,
    pub live: usize,
    /// Released but not yet reaped.
    pub deleted: usize,
    pub live_by_class: BTreeMap<String, usize>,
}

impl fmt::Display for PopulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Population: classes={} registered={} live={} deleted={}",
            self.classes, self.registered, self.live, self.deleted
        )?;
        for (name, count) in &self.live_by_class {
            write!(f, "\n  {name}: {count}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub id: InstanceId,
    pub class_id: ClassId,
    pub class_name: Option<String>,
    /// Base classes, nearest first.
    pub ancestry: Vec<ClassId>,
    pub deleted: bool,
    /// Output of the object's dump, one field per line.
    pub fields: String,
}

impl fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Object [{}] class={} ({})",
            self.id,
            self.class_id,
            self.class_name.as_deref().unwrap_or("<unknown>")
        )?;
        if self.deleted {
            write!(f, " deleted")?;
        }
        if !self.fields.is_empty() {
            write!(f, "\n{}", self.fields.trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ecs::{GameObject, MessageTable, register_component_class, register_core_classes};
    use ember_kernel::{Object, ObjectType, TypeRegistry};
    use std::any::Any;
    use std::sync::Arc;

    const MOVER: ClassId = ClassId(2001);

    /// Writes one field, then fails.
    #[derive(Default)]
    struct FailingDump;

    impl Object for FailingDump {
        fn class_id(&self) -> ClassId {
            Self::CLASS_ID
        }

        fn dump(&self, indent: usize, out: &mut dyn fmt::Write) -> fmt::Result {
            writeln!(out, "{:indent$}state: partial", "", indent = indent * 2)?;
            Err(fmt::Error)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl ObjectType for FailingDump {
        const CLASS_ID: ClassId = ClassId(2100);
        const BASE_CLASS_ID: ClassId = ClassId::OBJECT;
        const NAME: &'static str = "FailingDump";
    }

    fn manager() -> ObjectManager {
        let mut registry = TypeRegistry::new();
        register_core_classes(&mut registry).unwrap();
        register_component_class(&mut registry, MOVER, "Mover").unwrap();
        ObjectManager::new(Arc::new(registry))
    }

    #[test]
    fn summary_empty_population() {
        let manager = manager();
        let summary = ObjectInspector::summary(&manager);
        assert_eq!(summary.classes, 4);
        assert_eq!(summary.registered, 0);
        assert!(summary.live_by_class.is_empty());
    }

    #[test]
    fn summary_counts_live_and_deleted() {
        let manager = manager();
        let owner = manager.create_default_obj::<GameObject>().unwrap();
        let mover = manager.create_default(MOVER).unwrap();
        GameObject::add_component(&owner, mover, &MessageTable::new()).unwrap();
        drop(manager.create_default(ClassId::OBJECT).unwrap());

        let summary = ObjectInspector::summary(&manager);
        assert_eq!(summary.registered, 3);
        assert_eq!(summary.live, 2);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.live_by_class.get("Mover"), Some(&1));
        assert_eq!(summary.live_by_class.get("GameObject"), Some(&1));
        assert!(!summary.live_by_class.contains_key("Object"));
    }

    #[test]
    fn inspect_component() {
        let manager = manager();
        let owner = manager.create_default_obj::<GameObject>().unwrap();
        let mover = manager.create_default(MOVER).unwrap();
        GameObject::add_component(&owner, mover.clone(), &MessageTable::new()).unwrap();

        let info = ObjectInspector::inspect(&manager, mover.instance_id()).unwrap();
        assert_eq!(info.class_name.as_deref(), Some("Mover"));
        assert_eq!(info.ancestry, vec![ClassId::COMPONENT, ClassId::OBJECT]);
        assert!(!info.deleted);
        assert!(info.fields.contains(&format!("owner: {}", owner.instance_id())));
    }

    #[test]
    fn inspect_deleted_and_reaped() {
        let manager = manager();
        let handle = manager.create_default(ClassId::OBJECT).unwrap();
        let id = handle.instance_id();
        drop(handle);
        let info = ObjectInspector::inspect(&manager, id).unwrap();
        assert!(info.deleted);
        assert!(info.to_string().contains("deleted"));

        manager.release_unused_objects();
        assert!(ObjectInspector::inspect(&manager, id).is_none());
    }

    #[test]
    fn inspect_keeps_fields_written_before_a_failed_dump() {
        let mut registry = TypeRegistry::new();
        register_core_classes(&mut registry).unwrap();
        registry.register_type::<FailingDump>().unwrap();
        let manager = ObjectManager::new(Arc::new(registry));
        let handle = manager.create_default_obj::<FailingDump>().unwrap();

        let info = ObjectInspector::inspect(&manager, handle.instance_id()).unwrap();
        assert_eq!(info.class_name.as_deref(), Some("FailingDump"));
        assert_eq!(info.ancestry, vec![ClassId::OBJECT]);
        assert!(info.fields.contains("state: partial"));
    }

    #[test]
    fn list_live_skips_deleted() {
        let manager = manager();
        let a = manager.create_default(ClassId::OBJECT).unwrap();
        drop(manager.create_default(ClassId::OBJECT).unwrap());
        let c = manager.create_default(ClassId::OBJECT).unwrap();
        assert_eq!(
            ObjectInspector::list_live(&manager),
            vec![a.instance_id(), c.instance_id()]
        );
    }

    #[test]
    fn summary_display() {
        let manager = manager();
        let _owner = manager.create_default_obj::<GameObject>().unwrap();
        let s = ObjectInspector::summary(&manager).to_string();
        assert!(s.contains("live=1"));
        assert!(s.contains("GameObject: 1"));
    }
}
