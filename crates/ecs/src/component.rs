use crate::game_object::GameObject;
use crate::messages::{MessageId, MessagePayload, MessageTable};
use ember_common::{ByteReader, ByteWriter, ClassId, CoreError};
use ember_kernel::{Attachment, Factory, Handle, LinkContext, Object, ObjectType, WeakHandle};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A unit of behavior attached to at most one [`GameObject`].
///
/// Application component classes that carry no state of their own are
/// `Component` instances registered under their own class id with
/// [`Component::factory`]; their class derives from [`ClassId::COMPONENT`].
#[derive(Debug, Clone)]
pub struct Component {
    class_id: ClassId,
    attachment: Attachment,
}

impl Default for Component {
    fn default() -> Self {
        Self::with_class(ClassId::COMPONENT)
    }
}

impl Component {
    pub fn with_class(class_id: ClassId) -> Self {
        Self {
            class_id,
            attachment: Attachment::default(),
        }
    }

    /// Factory building components of `class_id`.
    pub fn factory(class_id: ClassId) -> Factory {
        Arc::new(move || Box::new(Self::with_class(class_id)))
    }

    /// Weak handle to the owning game object, once attached and linked.
    pub fn owner(&self) -> Option<&WeakHandle> {
        self.attachment.owner()
    }

    /// Broadcast `message` to the other components of `component`'s owner,
    /// with `component`'s class as the sender.
    ///
    /// Returns the number of callbacks invoked; `0` when the component is not
    /// attached or its owner has been released.
    pub fn send_message(
        component: &Handle,
        message: MessageId,
        payload: MessagePayload,
        table: &MessageTable,
    ) -> Result<usize, CoreError> {
        let owner = component
            .read()
            .attachment()
            .and_then(Attachment::owner)
            .cloned();
        match owner.and_then(|owner| owner.upgrade()) {
            Some(owner) => {
                GameObject::send_message(&owner, component.class_id(), message, payload, table)
            }
            None => Ok(0),
        }
    }
}

impl Object for Component {
    fn class_id(&self) -> ClassId {
        self.class_id
    }

    fn write(&self, out: &mut ByteWriter) -> Result<(), CoreError> {
        self.attachment.write(out)
    }

    fn read(&mut self, input: &mut ByteReader<'_>) -> Result<(), CoreError> {
        self.attachment.read(input)
    }

    fn link(&mut self, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        self.attachment.link(ctx)
    }

    fn dump(&self, indent: usize, out: &mut dyn fmt::Write) -> fmt::Result {
        self.attachment.dump(indent, out)
    }

    fn attachment(&self) -> Option<&Attachment> {
        Some(&self.attachment)
    }

    fn attachment_mut(&mut self) -> Option<&mut Attachment> {
        Some(&mut self.attachment)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ObjectType for Component {
    const CLASS_ID: ClassId = ClassId::COMPONENT;
    const BASE_CLASS_ID: ClassId = ClassId::OBJECT;
    const NAME: &'static str = "Component";
}
