// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Consumer
//!
//! This module provides functionality for consuming messages from durable
//! queues with explicit acknowledgment. The channel prefetch limit is
//! pinned to a single unacknowledged message, so handler execution is
//! serialized per registration and the broker never buffers more than one
//! in-flight delivery. A handler failure resolves into a negative
//! acknowledgment without requeue; the message is dropped, not redelivered,
//! so handlers must tolerate at-least-once semantics on the broker side.

use crate::{
    channel::ChannelSupervisor,
    errors::{AmqpError, HandlerError},
    queue::ensure_queue,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Unacknowledged-message limit per channel. One in-flight message bounds
/// memory and enforces strict per-message backpressure.
const PREFETCH_COUNT: u16 = 1;

/// A delivered message handed to a [`QueueHandler`].
///
/// The delivery token stays inside the consumer loop; handlers only see
/// the payload and its metadata, and acknowledgment is decided from the
/// handler's return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Name of the queue the message was delivered from.
    pub queue: String,
    /// Immutable message payload.
    pub data: Vec<u8>,
    /// Whether the broker flagged this delivery as a redelivery.
    pub redelivered: bool,
}

impl QueueMessage {
    /// Deserializes the payload as JSON.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// Processes deliveries from a queue.
///
/// Implementations must be idempotent-safe under redelivery; the client
/// does not deduplicate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Handles one delivery. `Ok` acknowledges the message, `Err` discards
    /// it (nack without requeue).
    async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError>;
}

/// What the delivery loop does with a message once its handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Acknowledge; the broker removes the message permanently.
    Ack,
    /// Negatively acknowledge without requeue; the message is dropped.
    Discard,
}

/// Runs the handler and maps its outcome to exactly one disposition.
pub(crate) async fn dispose(handler: &dyn QueueHandler, message: &QueueMessage) -> Disposition {
    match handler.handle(message).await {
        Ok(()) => {
            debug!(queue = message.queue.as_str(), "message successfully processed");
            Disposition::Ack
        }
        Err(err) => {
            error!(
                error = err.to_string(),
                queue = message.queue.as_str(),
                "handler failed, discarding message"
            );
            Disposition::Discard
        }
    }
}

/// Registration handle for a running consumer.
///
/// Lets the host process abort or await the delivery loop during
/// coordinated shutdown.
#[derive(Debug)]
pub struct ConsumerHandle {
    tag: String,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// The consumer tag registered with the broker.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Aborts the delivery loop task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the delivery loop to finish, which happens when the
    /// broker cancels the consumer or the channel closes.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// RabbitMQ queue consumer with explicit ack/nack.
pub struct AmqpConsumer {
    supervisor: Arc<ChannelSupervisor>,
}

impl AmqpConsumer {
    /// Creates a new consumer on top of the given supervisor.
    ///
    /// # Returns
    /// An Arc-wrapped AmqpConsumer instance for thread-safe sharing
    pub fn new(supervisor: Arc<ChannelSupervisor>) -> Arc<AmqpConsumer> {
        Arc::new(AmqpConsumer { supervisor })
    }

    /// Registers a handler on a durable queue and spawns its delivery loop.
    ///
    /// The loop issues exactly one of {ack, nack-without-requeue} per
    /// delivery, after the handler completed. Transport failures while
    /// acknowledging are logged and never crash the loop. When the stream
    /// ends (the broker cancelled the consumer or the channel died), the
    /// loop logs a warning and stops; there is nothing left to acknowledge
    /// at that point.
    ///
    /// # Errors
    /// * supervisor errors ([`AmqpError::NotConfigured`],
    ///   [`AmqpError::ConnectionUnavailable`]) propagated unchanged; no
    ///   registration is created
    /// * [`AmqpError::DeclareQueueError`] - empty queue name or failed
    ///   declaration
    /// * [`AmqpError::QosError`] - setting the prefetch limit failed
    /// * [`AmqpError::ConsumerError`] - the broker rejected the consumer
    pub async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn QueueHandler>,
    ) -> Result<ConsumerHandle, AmqpError> {
        if queue.is_empty() {
            return Err(AmqpError::DeclareQueueError(queue.to_owned()));
        }

        let channel = self.supervisor.channel().await?;
        ensure_queue(&channel, queue).await?;

        if let Err(err) = channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
        {
            error!(error = err.to_string(), queue, "failure to configure qos");
            return Err(AmqpError::QosError(queue.to_owned()));
        }

        let tag = format!("{}-{}", queue, Uuid::new_v4());
        let mut deliveries = match channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), queue, "error to create the consumer");
                return Err(AmqpError::ConsumerError(queue.to_owned()));
            }
        };

        debug!(queue, tag = tag.as_str(), "consumer registered");

        let queue_name = queue.to_owned();
        let task = tokio::spawn(async move {
            while let Some(result) = deliveries.next().await {
                let delivery = match result {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        error!(
                            error = err.to_string(),
                            queue = queue_name.as_str(),
                            "error receiving delivery"
                        );
                        continue;
                    }
                };

                let message = QueueMessage {
                    queue: queue_name.clone(),
                    data: delivery.data.clone(),
                    redelivered: delivery.redelivered,
                };

                match dispose(handler.as_ref(), &message).await {
                    Disposition::Ack => {
                        if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                            error!(
                                error = err.to_string(),
                                queue = queue_name.as_str(),
                                "error to ack msg"
                            );
                        }
                    }
                    Disposition::Discard => {
                        if let Err(err) = delivery
                            .nack(BasicNackOptions {
                                multiple: false,
                                requeue: false,
                            })
                            .await
                        {
                            error!(
                                error = err.to_string(),
                                queue = queue_name.as_str(),
                                "error to nack msg"
                            );
                        }
                    }
                }
            }

            warn!(queue = queue_name.as_str(), "consumer cancelled");
        });

        Ok(ConsumerHandle { tag, task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmqpConfig;
    use serde::Deserialize;

    fn message(data: &[u8]) -> QueueMessage {
        QueueMessage {
            queue: "notes.created".to_owned(),
            data: data.to_vec(),
            redelivered: false,
        }
    }

    #[tokio::test]
    async fn successful_handler_resolves_to_ack() {
        let mut handler = MockQueueHandler::new();
        handler.expect_handle().times(1).returning(|_| Ok(()));

        let disposition = dispose(&handler, &message(b"{\"id\":\"abc\"}")).await;

        assert_eq!(disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn failing_handler_resolves_to_discard() {
        let mut handler = MockQueueHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(HandlerError::new("boom")));

        let disposition = dispose(&handler, &message(b"{}")).await;

        assert_eq!(disposition, Disposition::Discard);
    }

    #[tokio::test]
    async fn consume_rejects_empty_queue_name_before_connecting() {
        let consumer = AmqpConsumer::new(ChannelSupervisor::new(&AmqpConfig::default()));
        let handler = Arc::new(MockQueueHandler::new());

        assert_eq!(
            consumer.consume("", handler).await.unwrap_err(),
            AmqpError::DeclareQueueError(String::new())
        );
    }

    #[tokio::test]
    async fn consume_propagates_supervisor_errors_without_registering() {
        let consumer = AmqpConsumer::new(ChannelSupervisor::new(&AmqpConfig::default()));
        let handler = Arc::new(MockQueueHandler::new());

        assert_eq!(
            consumer.consume("notes.created", handler).await.unwrap_err(),
            AmqpError::NotConfigured
        );
    }

    #[test]
    fn payload_json_decodes_the_delivery() {
        #[derive(Debug, Deserialize)]
        struct NoteCreated {
            id: String,
        }

        let decoded: NoteCreated = message(b"{\"id\":\"abc\"}").payload_json().unwrap();
        assert_eq!(decoded.id, "abc");

        let err = message(b"not json").payload_json::<NoteCreated>().unwrap_err();
        assert!(err.to_string().starts_with("handler failed: "));
    }
}
