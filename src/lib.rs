// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! AMQP queue client for the notes service: one lazily-established
//! connection and channel, persistent publishes to durable queues,
//! prefetch(1) consumption with explicit ack/nack, and a domain event
//! publishing adapter with a no-op variant for broker-less configurations.

mod queue;

pub mod channel;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod publisher;
