//! Sibling broadcast messages between the components of one game object.
//!
//! Delivery is synchronous: the sender's call returns after every matching
//! callback has run on the calling thread.

use ember_common::{ClassId, InstanceId};
use ember_kernel::Handle;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

impl MessageId {
    /// Sentinel; cannot be sent.
    pub const UNDEFINED: Self = Self(0);
    /// Broadcast by a game object to its other components after a component
    /// was added.
    pub const DID_ADD_COMPONENT: Self = Self(1);
    pub const TRANSFORM_CHANGED: Self = Self(2);
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNDEFINED => write!(f, "undefined"),
            Self::DID_ADD_COMPONENT => write!(f, "did-add-component"),
            Self::TRANSFORM_CHANGED => write!(f, "transform-changed"),
            Self(other) => write!(f, "message#{other}"),
        }
    }
}

#[derive(Clone)]
pub enum MessagePayload {
    Empty,
    ComponentAdded {
        class_id: ClassId,
        instance_id: InstanceId,
    },
    /// Application defined data.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl MessagePayload {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for MessagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::ComponentAdded {
                class_id,
                instance_id,
            } => f
                .debug_struct("ComponentAdded")
                .field("class_id", class_id)
                .field("instance_id", instance_id)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    /// Class of the component that sent the message.
    pub sender: ClassId,
    pub payload: MessagePayload,
}

/// Invoked with the receiving component and the message.
pub type MessageCallback = Arc<dyn Fn(&Handle, &Message) + Send + Sync>;

/// Callbacks keyed by (message id, receiver class id).
#[derive(Clone, Default)]
pub struct MessageTable {
    callbacks: BTreeMap<(MessageId, ClassId), MessageCallback>,
}

impl MessageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for components of `receiver` receiving `message`.
    /// Replaces any earlier callback for the same pair.
    pub fn register_callback<F>(&mut self, message: MessageId, receiver: ClassId, callback: F)
    where
        F: Fn(&Handle, &Message) + Send + Sync + 'static,
    {
        if self
            .callbacks
            .insert((message, receiver), Arc::new(callback))
            .is_some()
        {
            tracing::warn!(message_id = %message, %receiver, "replaced message callback");
        }
    }

    pub fn has_callback(&self, message: MessageId, receiver: ClassId) -> bool {
        self.callbacks.contains_key(&(message, receiver))
    }

    /// Deliver `message` to `receiver`. Returns whether a callback ran.
    pub fn handle_message(&self, receiver: &Handle, message: &Message) -> bool {
        match self.callbacks.get(&(message.id, receiver.class_id())) {
            Some(callback) => {
                callback(receiver, message);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for MessageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.callbacks.keys()).finish()
    }
}
