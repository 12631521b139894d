use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer identity of a concrete runtime class.
///
/// Ids are assigned once per class when it is registered and never reused
/// while the process runs. `-1` is the "undefined" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub i32);

impl ClassId {
    pub const UNDEFINED: Self = Self(-1);
    /// Root of the class tree.
    pub const OBJECT: Self = Self(1000);
    pub const COMPONENT: Self = Self(1001);
    pub const GAME_OBJECT: Self = Self(1002);

    pub const fn is_defined(self) -> bool {
        self.0 != Self::UNDEFINED.0
    }
}

impl Default for ClassId {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manager-scoped identifier assigned to an object when it is registered.
///
/// `0` marks an uninitialized id and is never handed out to a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

impl InstanceId {
    pub const NONE: Self = Self(0);

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_class_is_not_defined() {
        assert!(!ClassId::UNDEFINED.is_defined());
        assert!(ClassId::OBJECT.is_defined());
        assert_eq!(ClassId::default(), ClassId::UNDEFINED);
    }

    #[test]
    fn zero_instance_id_is_invalid() {
        assert!(!InstanceId::NONE.is_valid());
        assert!(InstanceId(1).is_valid());
    }

    #[test]
    fn core_class_ids_are_distinct() {
        assert_ne!(ClassId::OBJECT, ClassId::COMPONENT);
        assert_ne!(ClassId::COMPONENT, ClassId::GAME_OBJECT);
        assert_eq!(format!("{}", ClassId::GAME_OBJECT), "1002");
    }
}
