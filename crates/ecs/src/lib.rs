//! Component model on top of the object kernel.
//!
//! A [`GameObject`] owns at most one component per component class and
//! broadcasts messages between them. Components point back at their owner
//! weakly, so a game object and its components never keep each other alive.
//!
//! # Invariants
//! - A component is attached to at most one live game object at a time.
//! - Message delivery is synchronous and never reaches the sender's class.

pub mod classes;
pub mod component;
pub mod context;
pub mod game_object;
pub mod messages;

pub use classes::{register_component_class, register_component_subclass, register_core_classes};
pub use component::Component;
pub use context::{CoreContext, CoreContextBuilder, ShutdownReport};
pub use game_object::GameObject;
pub use messages::{Message, MessageCallback, MessageId, MessagePayload, MessageTable};
