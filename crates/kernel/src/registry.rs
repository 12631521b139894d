use crate::object::{Object, ObjectType, PlainObject};
use ember_common::{ClassId, CoreError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Constructs a default instance of a class.
pub type Factory = Arc<dyn Fn() -> Box<dyn Object> + Send + Sync>;

/// Reflection record for one class id.
#[derive(Clone)]
pub struct Rtti {
    pub base: ClassId,
    pub size: usize,
    pub name: String,
    factory: Factory,
}

impl Rtti {
    pub fn factory(&self) -> &Factory {
        &self.factory
    }
}

impl fmt::Debug for Rtti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rtti")
            .field("base", &self.base)
            .field("size", &self.size)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Table mapping class ids to their reflection records.
///
/// Classes form a tree rooted at [`ClassId::OBJECT`], which every registry
/// contains from construction. A registry is populated during start-up and
/// then shared read-only (behind an `Arc`) by every manager and handle.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    classes: BTreeMap<ClassId, Rtti>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a registry containing only the root `Object` class.
    pub fn new() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(
            PlainObject::CLASS_ID,
            Rtti {
                base: ClassId::UNDEFINED,
                size: std::mem::size_of::<PlainObject>(),
                name: PlainObject::NAME.to_string(),
                factory: Arc::new(|| Box::new(PlainObject)),
            },
        );
        Self { classes }
    }

    /// Register a class.
    ///
    /// Fails if `class_id` is undefined, already registered, or its base
    /// class is unknown.
    pub fn register_class(
        &mut self,
        class_id: ClassId,
        base: ClassId,
        name: impl Into<String>,
        size: usize,
        factory: Factory,
    ) -> Result<(), CoreError> {
        if !class_id.is_defined() {
            return Err(CoreError::UndefinedClassId);
        }
        if self.classes.contains_key(&class_id) {
            return Err(CoreError::DuplicateClass(class_id));
        }
        if !self.classes.contains_key(&base) {
            return Err(CoreError::UnknownBaseClass {
                class: class_id,
                base,
            });
        }
        let name = name.into();
        tracing::debug!(class = %class_id, base = %base, name = %name, "registered class");
        self.classes.insert(
            class_id,
            Rtti {
                base,
                size,
                name,
                factory,
            },
        );
        Ok(())
    }

    /// Register a class described by its [`ObjectType`] implementation.
    pub fn register_type<T: ObjectType>(&mut self) -> Result<(), CoreError> {
        self.register_class(
            T::CLASS_ID,
            T::BASE_CLASS_ID,
            T::NAME,
            std::mem::size_of::<T>(),
            Arc::new(|| Box::new(T::default())),
        )
    }

    /// Reflection record for `class_id`.
    pub fn class_rtti(&self, class_id: ClassId) -> Result<&Rtti, CoreError> {
        self.classes
            .get(&class_id)
            .ok_or(CoreError::UnknownClass(class_id))
    }

    pub fn contains(&self, class_id: ClassId) -> bool {
        self.classes.contains_key(&class_id)
    }

    /// Construct a default instance through the class factory.
    pub fn create(&self, class_id: ClassId) -> Result<Box<dyn Object>, CoreError> {
        let rtti = self.class_rtti(class_id)?;
        let object = (rtti.factory)();
        debug_assert_eq!(object.class_id(), class_id, "factory built the wrong class");
        Ok(object)
    }

    /// Whether `class_id` is `ancestor` or inherits from it.
    ///
    /// Walks the base chain, so the cost is the depth of the class tree.
    pub fn is_derived_from(&self, class_id: ClassId, ancestor: ClassId) -> bool {
        let mut search = class_id;
        while search.is_defined() {
            if search == ancestor {
                return true;
            }
            search = self.super_class_id(search);
        }
        false
    }

    /// Base class of `class_id`, or [`ClassId::UNDEFINED`] for the root and
    /// for unknown classes.
    pub fn super_class_id(&self, class_id: ClassId) -> ClassId {
        self.classes
            .get(&class_id)
            .map_or(ClassId::UNDEFINED, |rtti| rtti.base)
    }

    /// Class id registered under `name`. Linear scan; meant for tooling.
    pub fn class_id_from_name(&self, name: &str) -> ClassId {
        self.classes
            .iter()
            .find(|(_, rtti)| rtti.name == name)
            .map_or(ClassId::UNDEFINED, |(id, _)| *id)
    }

    pub fn class_name(&self, class_id: ClassId) -> Option<&str> {
        self.classes.get(&class_id).map(|rtti| rtti.name.as_str())
    }

    /// All registered classes in class id order.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Rtti)> {
        self.classes.iter().map(|(id, rtti)| (*id, rtti))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
