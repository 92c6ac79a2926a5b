// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Assertion
//!
//! Durable queue declaration shared by the publisher and the consumer.
//! Declaration is idempotent on the broker side, so both sides assert the
//! queue before using it. Queue names double as domain event type tags
//! (e.g. `notes.created`), which makes them a wire-level contract with
//! downstream services.

use crate::errors::AmqpError;
use lapin::{options::QueueDeclareOptions, types::FieldTable, Channel};
use tracing::{debug, error};

/// Asserts that the named durable queue exists.
///
/// Durable queues survive a broker restart, preserving persistent messages.
/// Callers validate the name before obtaining a channel.
pub(crate) async fn ensure_queue(channel: &Channel, name: &str) -> Result<(), AmqpError> {
    debug!(queue = name, "declaring queue...");
    match channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(_) => {
            debug!(queue = name, "queue declared");
            Ok(())
        }
        Err(err) => {
            error!(error = err.to_string(), queue = name, "failure to declare");
            Err(AmqpError::DeclareQueueError(name.to_owned()))
        }
    }
}
