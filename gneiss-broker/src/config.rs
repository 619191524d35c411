/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing types for configuring the session engine.
 */

use crate::decode::MAXIMUM_PACKET_SIZE;
use crate::encode::DEFAULT_WRITE_BUFFER_SIZE;

const DEFAULT_MAX_PENDING_MESSAGES_PER_CLIENT : usize = 250;
const DEFAULT_MAXIMUM_RETAINED_MESSAGES : usize = 10000;
const DEFAULT_ASSIGNED_CLIENT_ID_LENGTH : usize = 23;

/// Controls what happens when a PUBLISH is enqueued for a client whose packet bus already
/// holds the maximum number of pending messages.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum PendingMessagesOverflowStrategy {

    /// The oldest queued application message is discarded to make room for the new one.
    #[default]
    DropOldestQueuedMessage,

    /// The incoming message is discarded and the queue is left as it is.
    DropNewMessage,
}

/// Server-wide configuration consumed by sessions, the session manager, and connections.
#[derive(Clone, Debug)]
pub struct ServerOptions {

    pub(crate) max_pending_messages_per_client: usize,

    pub(crate) pending_messages_overflow_strategy: PendingMessagesOverflowStrategy,

    pub(crate) write_buffer_size: usize,

    pub(crate) maximum_packet_size: u32,

    pub(crate) maximum_retained_messages: usize,

    pub(crate) assigned_client_id_length: usize,
}

impl ServerOptions {

    /// Maximum number of packets a client's bus may hold before a new PUBLISH triggers the
    /// overflow strategy
    pub fn max_pending_messages_per_client(&self) -> usize { self.max_pending_messages_per_client }

    /// What to drop when a client's bus is full
    pub fn pending_messages_overflow_strategy(&self) -> PendingMessagesOverflowStrategy { self.pending_messages_overflow_strategy }

    /// Initial size of pooled encode buffers
    pub fn write_buffer_size(&self) -> usize { self.write_buffer_size }

    /// Largest framed packet accepted from a client
    pub fn maximum_packet_size(&self) -> u32 { self.maximum_packet_size }

    /// Capacity of the in-memory retained message store
    pub fn maximum_retained_messages(&self) -> usize { self.maximum_retained_messages }

    /// Length of client ids generated for clients that connect without one
    pub fn assigned_client_id_length(&self) -> usize { self.assigned_client_id_length }
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            max_pending_messages_per_client: DEFAULT_MAX_PENDING_MESSAGES_PER_CLIENT,
            pending_messages_overflow_strategy: PendingMessagesOverflowStrategy::default(),
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            maximum_packet_size: MAXIMUM_PACKET_SIZE,
            maximum_retained_messages: DEFAULT_MAXIMUM_RETAINED_MESSAGES,
            assigned_client_id_length: DEFAULT_ASSIGNED_CLIENT_ID_LENGTH,
        }
    }
}

/// A builder for server-wide options
#[derive(Debug, Default)]
pub struct ServerOptionsBuilder {
    options: ServerOptions
}

impl ServerOptionsBuilder {

    /// Creates a new builder object for ServerOptions
    pub fn new() -> Self {
        ServerOptionsBuilder {
            ..Default::default()
        }
    }

    /// Creates a new builder object starting from an existing ServerOptions value
    pub fn new_from_existing(options: ServerOptions) -> Self {
        ServerOptionsBuilder {
            options
        }
    }

    /// Sets the maximum number of packets that may be pending on a single client's bus.  A
    /// PUBLISH enqueued while the bus holds at least this many packets is subject to the
    /// overflow strategy.
    pub fn with_max_pending_messages_per_client(&mut self, max_pending_messages: usize) -> &mut Self {
        self.options.max_pending_messages_per_client = max_pending_messages;
        self
    }

    /// Configures what is dropped when a client's bus is full
    pub fn with_pending_messages_overflow_strategy(&mut self, strategy: PendingMessagesOverflowStrategy) -> &mut Self {
        self.options.pending_messages_overflow_strategy = strategy;
        self
    }

    /// Sets the initial size of the buffers used to encode outbound packets.  Buffers grow
    /// as needed.
    pub fn with_write_buffer_size(&mut self, write_buffer_size: usize) -> &mut Self {
        self.options.write_buffer_size = write_buffer_size;
        self
    }

    /// Sets the largest framed packet, in bytes, that will be accepted from a client.  Larger
    /// packets are a protocol violation.
    pub fn with_maximum_packet_size(&mut self, maximum_packet_size: u32) -> &mut Self {
        self.options.maximum_packet_size = maximum_packet_size;
        self
    }

    /// Sets how many retained messages the in-memory store keeps before evicting the least
    /// recently used.
    pub fn with_maximum_retained_messages(&mut self, maximum_retained_messages: usize) -> &mut Self {
        self.options.maximum_retained_messages = maximum_retained_messages;
        self
    }

    pub fn with_assigned_client_id_length(&mut self, length: usize) -> &mut Self {
        self.options.assigned_client_id_length = length;
        self
    }

    /// Builds a new set of server options
    pub fn build(&self) -> ServerOptions {
        self.options.clone()
    }
}
