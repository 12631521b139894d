use crate::messages::{Message, MessageId, MessagePayload, MessageTable};
use ember_common::{ByteReader, ByteWriter, ClassId, CoreError, InstanceId};
use ember_kernel::{Handle, LinkContext, Object, ObjectLink, ObjectType};
use std::any::Any;
use std::fmt;

/// Bytes per component entry on the wire: class id and instance id.
const COMPONENT_ENTRY_LEN: usize = 8;

/// Container owning at most one component per component class.
///
/// Components are kept in the order they were first added; re-adding a class
/// replaces the entry in place.
#[derive(Debug, Clone, Default)]
pub struct GameObject {
    components: Vec<(ClassId, ObjectLink<Handle>)>,
}

impl GameObject {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn has_component(&self, class_id: ClassId) -> bool {
        self.components.iter().any(|(class, _)| *class == class_id)
    }

    /// Handle to the component registered under `class_id`.
    pub fn component(&self, class_id: ClassId) -> Option<&Handle> {
        self.components
            .iter()
            .find(|(class, _)| *class == class_id)
            .and_then(|(_, link)| link.resolved())
    }

    pub fn get_component<T: ObjectType>(&self) -> Option<&Handle> {
        self.component(T::CLASS_ID)
    }

    /// Component handles in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &Handle> {
        self.components.iter().filter_map(|(_, link)| link.resolved())
    }

    /// Store `component` under `class_id`, returning the handle it replaced.
    fn insert(&mut self, class_id: ClassId, component: Handle) -> Option<Handle> {
        let link = ObjectLink::Resolved(component);
        match self.components.iter_mut().find(|(class, _)| *class == class_id) {
            Some((_, slot)) => match std::mem::replace(slot, link) {
                ObjectLink::Resolved(previous) => Some(previous),
                ObjectLink::Unresolved(_) => None,
            },
            None => {
                self.components.push((class_id, link));
                None
            }
        }
    }

    fn take(&mut self, class_id: ClassId) -> Option<Handle> {
        let index = self.components.iter().position(|(class, _)| *class == class_id)?;
        match self.components.remove(index).1 {
            ObjectLink::Resolved(handle) => Some(handle),
            ObjectLink::Unresolved(_) => None,
        }
    }

    /// Attach `component` to the game object behind `owner` and notify the
    /// owner's other components with [`MessageId::DID_ADD_COMPONENT`].
    ///
    /// Fails if `component` was released, is not a component class, is
    /// attached to another live game object, or if `owner` is not a game
    /// object.
    #[track_caller]
    pub fn add_component(
        owner: &Handle,
        component: Handle,
        table: &MessageTable,
    ) -> Result<(), CoreError> {
        if component.is_deleted() {
            return Err(CoreError::contract(format!(
                "component {} was released before being added",
                component.instance_id()
            )));
        }
        if !component.is_derived_from(ClassId::COMPONENT) {
            return Err(CoreError::NotDerived {
                class: component.class_id(),
                expected: ClassId::COMPONENT,
            });
        }
        if owner.get::<GameObject>().is_none() {
            return Err(CoreError::NotDerived {
                class: owner.class_id(),
                expected: ClassId::GAME_OBJECT,
            });
        }

        {
            let mut object = component.write();
            let attachment = object.attachment_mut().ok_or_else(|| {
                CoreError::contract(format!(
                    "class {} cannot be attached to an owner",
                    component.class_id()
                ))
            })?;
            attachment.attach(owner.weak())?;
        }

        let class_id = component.class_id();
        let instance_id = component.instance_id();
        let replaced = owner
            .get_mut::<GameObject>()
            .and_then(|mut game_object| game_object.insert(class_id, component.clone()));
        if let Some(previous) = replaced {
            if !previous.ptr_eq(&component) {
                detach(&previous);
                tracing::debug!(
                    owner = %owner.instance_id(),
                    class = %class_id,
                    replaced = %previous.instance_id(),
                    "replaced component"
                );
            }
        }
        tracing::trace!(owner = %owner.instance_id(), component = %instance_id, "added component");

        Self::send_message(
            owner,
            class_id,
            MessageId::DID_ADD_COMPONENT,
            MessagePayload::ComponentAdded {
                class_id,
                instance_id,
            },
            table,
        )?;
        Ok(())
    }

    /// Remove and detach the component registered under `class_id`.
    pub fn remove_component(
        owner: &Handle,
        class_id: ClassId,
    ) -> Result<Option<Handle>, CoreError> {
        let removed = owner
            .get_mut::<GameObject>()
            .ok_or(CoreError::NotDerived {
                class: owner.class_id(),
                expected: ClassId::GAME_OBJECT,
            })?
            .take(class_id);
        if let Some(component) = &removed {
            detach(component);
        }
        Ok(removed)
    }

    /// Deliver `message` to every component of `owner` whose class is not
    /// `sender` and has a callback for it, in insertion order.
    ///
    /// Returns the number of callbacks invoked.
    #[track_caller]
    pub fn send_message(
        owner: &Handle,
        sender: ClassId,
        message: MessageId,
        payload: MessagePayload,
        table: &MessageTable,
    ) -> Result<usize, CoreError> {
        if message == MessageId::UNDEFINED {
            return Err(CoreError::contract("cannot send the undefined message"));
        }
        // Recipients are collected first so callbacks may lock the owner.
        let recipients: Vec<Handle> = owner
            .get::<GameObject>()
            .ok_or(CoreError::NotDerived {
                class: owner.class_id(),
                expected: ClassId::GAME_OBJECT,
            })?
            .components()
            .filter(|component| {
                component.class_id() != sender && table.has_callback(message, component.class_id())
            })
            .cloned()
            .collect();

        let message = Message {
            id: message,
            sender,
            payload,
        };
        let mut delivered = 0;
        for component in &recipients {
            if table.handle_message(component, &message) {
                delivered += 1;
            }
        }
        tracing::trace!(owner = %owner.instance_id(), message_id = %message.id, delivered, "sent message");
        Ok(delivered)
    }
}

fn detach(component: &Handle) {
    if let Some(attachment) = component.write().attachment_mut() {
        attachment.detach();
    }
}

impl Object for GameObject {
    fn class_id(&self) -> ClassId {
        Self::CLASS_ID
    }

    fn write(&self, out: &mut ByteWriter) -> Result<(), CoreError> {
        let count = u32::try_from(self.components.len())
            .map_err(|_| CoreError::contract("too many components to encode"))?;
        out.write_u32(count);
        for (class_id, link) in &self.components {
            out.write_i32(class_id.0);
            out.write_u32(link.target_id()?.0);
        }
        Ok(())
    }

    fn read(&mut self, input: &mut ByteReader<'_>) -> Result<(), CoreError> {
        let count = input.read_u32()? as usize;
        let needed = count.saturating_mul(COMPONENT_ENTRY_LEN);
        if needed > input.remaining() {
            return Err(CoreError::Truncated {
                needed,
                remaining: input.remaining(),
            });
        }
        self.components.clear();
        for _ in 0..count {
            let class_id = ClassId(input.read_i32()?);
            let link = ObjectLink::Unresolved(InstanceId(input.read_u32()?));
            // One component per class: a repeated class replaces the earlier
            // entry in place.
            match self.components.iter_mut().find(|(class, _)| *class == class_id) {
                Some((_, slot)) => *slot = link,
                None => self.components.push((class_id, link)),
            }
        }
        Ok(())
    }

    fn link(&mut self, ctx: &LinkContext<'_>) -> Result<(), CoreError> {
        for (_, link) in &mut self.components {
            if let ObjectLink::Unresolved(old) = *link {
                *link = ObjectLink::Resolved(ctx.resolve_handle(old)?);
            }
        }
        Ok(())
    }

    fn dump(&self, indent: usize, out: &mut dyn fmt::Write) -> fmt::Result {
        let pad = "    ".repeat(indent);
        writeln!(out, "{pad}components: {}", self.components.len())?;
        for (class_id, link) in &self.components {
            match link {
                ObjectLink::Resolved(handle) => {
                    writeln!(out, "{pad}    {class_id}: {}", handle.instance_id())?
                }
                ObjectLink::Unresolved(old) => {
                    writeln!(out, "{pad}    {class_id}: unlinked({old})")?
                }
            }
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

impl ObjectType for GameObject {
    const CLASS_ID: ClassId = ClassId::GAME_OBJECT;
    const BASE_CLASS_ID: ClassId = ClassId::OBJECT;
    const NAME: &'static str = "GameObject";
}
