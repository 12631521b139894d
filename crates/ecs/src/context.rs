//! Application context owning the type registry, the object manager and the
//! message table.
//!
//! Nothing here is process global: any number of contexts may coexist, each
//! with its own class set and object population.

use crate::classes::{register_component_class, register_component_subclass, register_core_classes};
use crate::game_object::GameObject;
use crate::messages::{Message, MessageId, MessagePayload, MessageTable};
use ember_common::{ClassId, CoreConfig, CoreError};
use ember_kernel::{Factory, Handle, ObjectManager, ObjectType, TypeRegistry};
use std::sync::Arc;

/// Collects classes and message callbacks before the registry is frozen.
pub struct CoreContextBuilder {
    config: CoreConfig,
    registry: TypeRegistry,
    messages: MessageTable,
}

impl CoreContextBuilder {
    pub fn register_class(
        mut self,
        class_id: ClassId,
        base: ClassId,
        name: &str,
        size: usize,
        factory: Factory,
    ) -> Result<Self, CoreError> {
        self.registry
            .register_class(class_id, base, name, size, factory)?;
        Ok(self)
    }

    pub fn register_type<T: ObjectType>(mut self) -> Result<Self, CoreError> {
        self.registry.register_type::<T>()?;
        Ok(self)
    }

    /// Register a stateless component class deriving from `Component`.
    pub fn register_component(mut self, class_id: ClassId, name: &str) -> Result<Self, CoreError> {
        register_component_class(&mut self.registry, class_id, name)?;
        Ok(self)
    }

    pub fn register_component_subclass(
        mut self,
        class_id: ClassId,
        base: ClassId,
        name: &str,
    ) -> Result<Self, CoreError> {
        register_component_subclass(&mut self.registry, class_id, base, name)?;
        Ok(self)
    }

    pub fn on_message<F>(mut self, message: MessageId, receiver: ClassId, callback: F) -> Self
    where
        F: Fn(&Handle, &Message) + Send + Sync + 'static,
    {
        self.messages.register_callback(message, receiver, callback);
        self
    }

    /// Freeze the registry and start the object manager.
    pub fn init(self) -> Result<CoreContext, CoreError> {
        let registry = Arc::new(self.registry);
        let manager = ObjectManager::new(Arc::clone(&registry));
        tracing::info!(
            classes = registry.len(),
            callbacks = self.messages.len(),
            "core context initialized"
        );
        Ok(CoreContext {
            config: self.config,
            registry,
            manager,
            messages: self.messages,
        })
    }
}

/// Counts reported by [`CoreContext::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Objects reaped by the final sweep.
    pub released: usize,
    /// Objects still owned by handles outside the context.
    pub still_referenced: usize,
}

pub struct CoreContext {
    config: CoreConfig,
    registry: Arc<TypeRegistry>,
    manager: ObjectManager,
    messages: MessageTable,
}

impl CoreContext {
    /// Start building a context. The core classes are registered up front.
    pub fn builder(config: CoreConfig) -> Result<CoreContextBuilder, CoreError> {
        let mut registry = TypeRegistry::new();
        register_core_classes(&mut registry)?;
        Ok(CoreContextBuilder {
            config,
            registry,
            messages: MessageTable::new(),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.manager
    }

    pub fn messages(&self) -> &MessageTable {
        &self.messages
    }

    pub fn create(&self, class_id: ClassId) -> Result<Handle, CoreError> {
        self.manager.create_default(class_id)
    }

    pub fn add_component(&self, owner: &Handle, component: Handle) -> Result<(), CoreError> {
        GameObject::add_component(owner, component, &self.messages)
    }

    pub fn send_message(
        &self,
        owner: &Handle,
        sender: ClassId,
        message: MessageId,
        payload: MessagePayload,
    ) -> Result<usize, CoreError> {
        GameObject::send_message(owner, sender, message, payload, &self.messages)
    }

    /// Sweep released objects and tear the context down.
    pub fn shutdown(self) -> Result<ShutdownReport, CoreError> {
        let released = self.manager.release_unused_objects();
        let report = ShutdownReport {
            released,
            still_referenced: self.manager.live_count(),
        };
        if report.still_referenced > 0 {
            tracing::warn!(
                objects = report.still_referenced,
                "objects still referenced at shutdown"
            );
        }
        tracing::info!(released = report.released, "core context shut down");
        Ok(report)
    }
}
