// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Publisher
//!
//! This module provides functionality for publishing messages to durable
//! queues. Messages are marked persistent so they survive a broker restart
//! together with the durable queue holding them. The `Publisher` trait is
//! the seam the event publishing adapter depends on.

use crate::{channel::ChannelSupervisor, errors::AmqpError, queue::ensure_queue};
use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode for messages persisted by the broker
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Sends a payload to a named durable queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes the payload to the queue, creating the queue (durable)
    /// when it does not exist yet.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the [`Publisher`] trait.
///
/// Publishes to the default exchange with the queue name as routing key,
/// which is the direct-to-queue pattern; no exchange topology is involved.
pub struct AmqpPublisher {
    supervisor: Arc<ChannelSupervisor>,
}

impl AmqpPublisher {
    /// Creates a new publisher on top of the given supervisor.
    ///
    /// # Returns
    /// An Arc-wrapped AmqpPublisher instance for thread-safe sharing
    pub fn new(supervisor: Arc<ChannelSupervisor>) -> Arc<AmqpPublisher> {
        Arc::new(AmqpPublisher { supervisor })
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    /// Publishes a persistent message to a durable queue.
    ///
    /// Obtaining the channel may trigger the lazy connect; supervisor
    /// errors propagate unchanged and nothing is retried here. Success
    /// means the send call returned without error - there is no
    /// publisher-confirm round trip, so end-to-end delivery is not
    /// verified by this client.
    ///
    /// # Errors
    /// * supervisor errors ([`AmqpError::NotConfigured`],
    ///   [`AmqpError::ConnectionUnavailable`]) propagated unchanged
    /// * [`AmqpError::DeclareQueueError`] - empty queue name or failed
    ///   declaration
    /// * [`AmqpError::PublishError`] - the send call itself failed
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), AmqpError> {
        if queue.is_empty() {
            return Err(AmqpError::DeclareQueueError(queue.to_owned()));
        }

        let channel = self.supervisor.channel().await?;
        ensure_queue(&channel, queue).await?;

        match channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_message_id(ShortString::from(Uuid::new_v4().to_string())),
            )
            .await
        {
            Ok(_) => {
                debug!(queue, "message published");
                Ok(())
            }
            Err(err) => {
                error!(error = err.to_string(), queue, "error publishing message");
                Err(AmqpError::PublishError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmqpConfig;

    #[tokio::test]
    async fn publish_rejects_empty_queue_name_before_connecting() {
        // An unconfigured supervisor would fail with NotConfigured if the
        // name check happened after the channel lookup.
        let publisher = AmqpPublisher::new(ChannelSupervisor::new(&AmqpConfig::default()));

        assert_eq!(
            publisher.publish("", b"{}").await.unwrap_err(),
            AmqpError::DeclareQueueError(String::new())
        );
    }

    #[tokio::test]
    async fn publish_propagates_supervisor_errors_unchanged() {
        let publisher = AmqpPublisher::new(ChannelSupervisor::new(&AmqpConfig::default()));

        assert_eq!(
            publisher.publish("notes.created", b"{}").await.unwrap_err(),
            AmqpError::NotConfigured
        );
    }
}
