use crate::types::{ClassId, InstanceId};
use std::panic::Location;

/// Broad classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer error: a broken contract. Not meant to be retried.
    Contract,
    /// Bad input data: truncated streams, dangling references, unknown ids.
    Data,
}

/// Errors raised by the object core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("the undefined class id cannot be registered")]
    UndefinedClassId,
    #[error("class {0} is already registered")]
    DuplicateClass(ClassId),
    #[error("base class {base} of class {class} is not registered")]
    UnknownBaseClass { class: ClassId, base: ClassId },
    #[error("rtti information for class {0} not found")]
    UnknownClass(ClassId),
    #[error("class {class} is not derived from {expected}")]
    NotDerived { class: ClassId, expected: ClassId },
    #[error("instance id space exhausted")]
    IdSpaceExhausted,
    #[error("{message} (at {location})")]
    Contract {
        message: String,
        location: &'static Location<'static>,
    },
    #[error("stream truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("instance id {0} appears more than once in the stream")]
    DuplicateInstance(InstanceId),
    #[error("trying to link to a nonexistent object (old instance id {0})")]
    DanglingReference(InstanceId),
    #[error("object {0} not found")]
    NotFound(InstanceId),
    #[error("object {0} has no owning handles left")]
    Released(InstanceId),
}

impl CoreError {
    /// Build a contract error that records the caller's source location.
    #[track_caller]
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract {
            message: message.into(),
            location: Location::caller(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UndefinedClassId
            | Self::DuplicateClass(_)
            | Self::UnknownBaseClass { .. }
            | Self::UnknownClass(_)
            | Self::NotDerived { .. }
            | Self::IdSpaceExhausted
            | Self::Contract { .. } => ErrorKind::Contract,
            Self::Truncated { .. }
            | Self::Malformed(_)
            | Self::DuplicateInstance(_)
            | Self::DanglingReference(_)
            | Self::NotFound(_)
            | Self::Released(_) => ErrorKind::Data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_error_records_location() {
        let err = CoreError::contract("null owning reference");
        match &err {
            CoreError::Contract { location, .. } => {
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("expected contract error, got {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Contract);
        assert!(err.to_string().contains("null owning reference"));
    }

    #[test]
    fn data_errors_are_classified() {
        assert_eq!(
            CoreError::DanglingReference(InstanceId(7)).kind(),
            ErrorKind::Data
        );
        assert_eq!(
            CoreError::Truncated {
                needed: 4,
                remaining: 1
            }
            .kind(),
            ErrorKind::Data
        );
        assert_eq!(CoreError::NotFound(InstanceId(3)).kind(), ErrorKind::Data);
    }

    #[test]
    fn registry_errors_are_contract_errors() {
        assert_eq!(
            CoreError::DuplicateClass(ClassId::OBJECT).kind(),
            ErrorKind::Contract
        );
        assert_eq!(
            CoreError::UnknownClass(ClassId(42)).kind(),
            ErrorKind::Contract
        );
    }
}
