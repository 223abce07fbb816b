//! Inbound command routing.

use std::sync::Arc;

use tokio::sync::mpsc;
use wallbridge_common::TopicBuilder;

use crate::lifecycle::Shutdown;
use crate::registry::EntityRegistry;
use crate::transport::InboundMessage;

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The write accessor ran successfully.
    Applied,
    /// No entity with that key.
    UnknownEntity,
    /// The entity has no write accessor.
    ReadOnly,
    /// The write accessor returned an error.
    Failed(String),
}

/// Routes command payloads to entity write accessors.
///
/// Every failure is logged and swallowed; a bad command never stops the
/// bridge. Writes are awaited one at a time without a timeout.
pub struct CommandDispatcher<S> {
    registry: Arc<EntityRegistry<S>>,
}

impl<S: Send + Sync + 'static> CommandDispatcher<S> {
    pub fn new(registry: Arc<EntityRegistry<S>>) -> Self {
        Self { registry }
    }

    /// Apply one command to the entity named `entity_key`.
    pub async fn dispatch(&self, entity_key: &str, payload: &str) -> DispatchOutcome {
        let Some(entity) = self.registry.get(entity_key) else {
            tracing::warn!(entity = %entity_key, "Command for unknown entity dropped");
            return DispatchOutcome::UnknownEntity;
        };

        let Some(writer) = entity.writer() else {
            tracing::warn!(entity = %entity_key, "Command for read-only entity dropped");
            return DispatchOutcome::ReadOnly;
        };

        tracing::info!(entity = %entity_key, payload = %payload, "Setting entity");
        match writer.write(payload).await {
            Ok(()) => DispatchOutcome::Applied,
            Err(e) => {
                tracing::error!(entity = %entity_key, error = %e, "Write failed");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Apply one inbound message from the command filter.
    pub async fn dispatch_message(
        &self,
        topics: &TopicBuilder,
        message: &InboundMessage,
    ) -> DispatchOutcome {
        match topics.parse_command(&message.topic) {
            Some(entity_key) => self.dispatch(entity_key, &message.payload_str()).await,
            None => {
                tracing::warn!(topic = %message.topic, "Ignoring message on unexpected topic");
                DispatchOutcome::UnknownEntity
            }
        }
    }

    /// Consume command messages until the channel closes or shutdown.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<InboundMessage>,
        topics: TopicBuilder,
        mut shutdown: Shutdown,
    ) {
        tracing::info!(filter = %topics.command_filter(), "Command dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                message = commands.recv() => match message {
                    Some(message) => {
                        self.dispatch_message(&topics, &message).await;
                    }
                    None => {
                        tracing::warn!("Command subscription closed");
                        break;
                    }
                },
            }
        }

        tracing::info!("Command dispatcher stopped");
    }
}
