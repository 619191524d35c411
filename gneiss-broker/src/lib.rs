/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Server-side MQTT 3.1/3.1.1 wire codec and per-client session packet-delivery engine.

Inbound bytes are framed by a [`PacketDecoder`] and decoded by a version-specific
[`PacketFormatter`].  Published messages are routed by the [`SessionManager`] to every
[`Session`] with a matching subscription, where they wait on a prioritized [`PacketBus`] until a
connection's sender drains them.  QoS 1 and 2 publishes stay on the session until acknowledged
and are redelivered when a persistent session is resumed.
 */

pub mod bus;
pub mod config;
pub mod connection;
mod decode;
mod encode;
pub mod error;
pub mod formatter;
mod logging;
pub mod mqtt;
pub mod retained;
pub mod session;
pub mod session_manager;
pub mod subscription;
mod validate;

pub use error::{BrokerError, BrokerResult};

pub use mqtt::QualityOfService;
pub use mqtt::ProtocolVersion;
pub use mqtt::ConnectReturnCode;
pub use mqtt::SubscribeReturnCode;
pub use mqtt::AuthenticateReasonCode;
pub use mqtt::Subscription;
pub use mqtt::ApplicationMessage;
pub use mqtt::MqttPacket;
pub use mqtt::PacketType;

pub use mqtt::AuthPacket;
pub use mqtt::ConnackPacket;
pub use mqtt::ConnectPacket;
pub use mqtt::DisconnectPacket;
pub use mqtt::PingreqPacket;
pub use mqtt::PingrespPacket;
pub use mqtt::PubackPacket;
pub use mqtt::PubcompPacket;
pub use mqtt::PublishPacket;
pub use mqtt::PubrecPacket;
pub use mqtt::PubrelPacket;
pub use mqtt::SubackPacket;
pub use mqtt::SubscribePacket;
pub use mqtt::UnsubackPacket;
pub use mqtt::UnsubscribePacket;
pub use mqtt::connect::detect_protocol_version;

pub use decode::{MAXIMUM_PACKET_SIZE, PacketDecoder, RawPacket};
pub use encode::{BufferPool, DEFAULT_WRITE_BUFFER_SIZE, PacketWriter, PooledBuffer};

pub use bus::{PacketBus, PacketBusItem, PacketBusPartition};
pub use config::{PendingMessagesOverflowStrategy, ServerOptions, ServerOptionsBuilder};
pub use connection::{accept_connect, process_client_packet, run_sender_loop, ClientPacketOutcome, PacketReceiver, PacketSender, TransportReader, TransportWriter};
pub use formatter::PacketFormatter;
pub use retained::{InMemoryRetainedMessageStore, RetainedMessageStore};
pub use session::{PacketEnqueueResult, Session};
pub use session_manager::{SessionCreation, SessionManager};
pub use subscription::{MatchedSubscription, SubscriptionMatcher};
