//! Object kernel: runtime type registry, managed objects, owning and weak
//! handles, and the object manager that serializes and relinks them.
//!
//! # Invariants
//! - Instance ids are unique for the lifetime of a manager and never reused.
//! - An object is logically deleted when its last owning handle is dropped
//!   and physically freed only by [`ObjectManager::release_unused_objects`].
//! - A weak handle never resolves to an object other than the one it was
//!   created from.
//! - The registry lock is never held while waiting on an object lock.

mod arena;
pub mod decode;
pub mod handle;
pub mod link;
pub mod manager;
pub mod object;
pub mod registry;

pub use arena::ObjectKey;
pub use decode::{RECORD_HEADER_LEN, RawRecord, RecordDecoder, RecordHeader};
pub use handle::{Handle, WeakHandle};
pub use link::{Attachment, LinkContext, LinkTarget, ObjectLink, RemapTable};
pub use manager::ObjectManager;
pub use object::{Object, ObjectCell, ObjectPtr, ObjectType, PlainObject};
pub use registry::{Factory, Rtti, TypeRegistry};
