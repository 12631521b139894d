use crate::component::Component;
use crate::game_object::GameObject;
use ember_common::{ClassId, CoreError};
use ember_kernel::TypeRegistry;

/// Register `Component` and `GameObject` on top of the root class.
pub fn register_core_classes(registry: &mut TypeRegistry) -> Result<(), CoreError> {
    registry.register_type::<Component>()?;
    registry.register_type::<GameObject>()?;
    Ok(())
}

/// Register a stateless component class deriving from `Component`.
pub fn register_component_class(
    registry: &mut TypeRegistry,
    class_id: ClassId,
    name: &str,
) -> Result<(), CoreError> {
    register_component_subclass(registry, class_id, ClassId::COMPONENT, name)
}

/// Register a stateless component class deriving from `base`, which must
/// itself be a component class.
pub fn register_component_subclass(
    registry: &mut TypeRegistry,
    class_id: ClassId,
    base: ClassId,
    name: &str,
) -> Result<(), CoreError> {
    if registry.contains(base) && !registry.is_derived_from(base, ClassId::COMPONENT) {
        return Err(CoreError::NotDerived {
            class: base,
            expected: ClassId::COMPONENT,
        });
    }
    registry.register_class(
        class_id,
        base,
        name,
        std::mem::size_of::<Component>(),
        Component::factory(class_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_hierarchy() {
        let mut registry = TypeRegistry::new();
        register_core_classes(&mut registry).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.is_derived_from(ClassId::GAME_OBJECT, ClassId::OBJECT));
        assert!(registry.is_derived_from(ClassId::COMPONENT, ClassId::OBJECT));
        assert!(!registry.is_derived_from(ClassId::GAME_OBJECT, ClassId::COMPONENT));
        assert_eq!(registry.class_id_from_name("GameObject"), ClassId::GAME_OBJECT);
        assert_eq!(
            register_core_classes(&mut registry).unwrap_err(),
            CoreError::DuplicateClass(ClassId::COMPONENT)
        );
    }

    #[test]
    fn component_subclass_chain() {
        let mut registry = TypeRegistry::new();
        register_core_classes(&mut registry).unwrap();
        register_component_class(&mut registry, ClassId(2000), "Collider").unwrap();
        register_component_subclass(&mut registry, ClassId(2001), ClassId(2000), "SphereCollider")
            .unwrap();
        assert!(registry.is_derived_from(ClassId(2001), ClassId::COMPONENT));
        assert_eq!(registry.super_class_id(ClassId(2001)), ClassId(2000));
        assert_eq!(registry.create(ClassId(2001)).unwrap().class_id(), ClassId(2001));
    }

    #[test]
    fn component_base_must_be_a_component() {
        let mut registry = TypeRegistry::new();
        register_core_classes(&mut registry).unwrap();
        let err = register_component_subclass(
            &mut registry,
            ClassId(2000),
            ClassId::GAME_OBJECT,
            "Broken",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NotDerived { .. }));
    }
}
