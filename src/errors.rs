// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Queue Client
//!
//! This module provides the error types surfaced by the AMQP queue client.
//! The `AmqpError` enum covers connection supervision, queue declaration,
//! publishing and consumer registration. `HandlerError` is the separate
//! failure type returned by message handlers; it is resolved inside the
//! delivery loop (negative acknowledgment plus a log entry) and is never
//! propagated to broker-facing callers.

use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
///
/// `NotConfigured` and `ConnectionUnavailable` come from the connection
/// supervisor; the remaining variants report a specific operation that
/// failed after a channel had been obtained.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// No broker URL is configured; non-retryable until configuration changes
    #[error("broker url is not configured")]
    NotConfigured,

    /// The broker is unreachable, connection/channel creation failed, or the
    /// client was already closed
    #[error("broker connection unavailable")]
    ConnectionUnavailable,

    /// Error declaring a durable queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error configuring the prefetch limit on the channel
    #[error("failure to configure qos on `{0}`")]
    QosError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishError,

    /// Error registering a consumer on the given queue
    #[error("failure to start a consumer on `{0}`")]
    ConsumerError(String),
}

/// Failure raised by a [`QueueHandler`](crate::consumer::QueueHandler)
/// while processing a delivery.
///
/// The delivery loop converts this into a nack without requeue; the message
/// is dropped, not redelivered.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("handler failed: {0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(detail: impl Into<String>) -> HandlerError {
        HandlerError(detail.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amqp_error_messages_carry_the_queue_name() {
        assert_eq!(
            AmqpError::DeclareQueueError("notes.created".to_owned()).to_string(),
            "failure to declare a queue `notes.created`"
        );
        assert_eq!(
            AmqpError::ConsumerError("notes.created".to_owned()).to_string(),
            "failure to start a consumer on `notes.created`"
        );
    }

    #[test]
    fn handler_error_wraps_serde_failures() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let handler_err = HandlerError::from(err);
        assert!(handler_err.to_string().starts_with("handler failed: "));
    }
}
