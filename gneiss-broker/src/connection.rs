/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Connection-level plumbing between a byte transport and a session.

The transport is reached through two small seams, [`TransportReader`] and [`TransportWriter`],
both implemented for any tokio `AsyncRead`/`AsyncWrite`.  [`PacketReceiver`] turns inbound
bytes into packets, selecting the protocol version from the client's CONNECT.
[`PacketSender`] encodes packets with pooled buffers.  [`run_sender_loop`] drains a session's
packet bus onto the transport.
 */

use crate::bus::PacketBusItem;
use crate::config::ServerOptions;
use crate::decode::*;
use crate::encode::*;
use crate::error::{BrokerError, BrokerResult};
use crate::formatter::PacketFormatter;
use crate::logging::log_packet;
use crate::mqtt::*;
use crate::mqtt::connect::detect_protocol_version;
use crate::session::Session;
use crate::session_manager::*;

use log::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

const READ_BUFFER_SIZE : usize = 4096;

/// Source of inbound bytes for a single connection
pub trait TransportReader {

    /// Waits for the next chunk of bytes.  A transport that has closed fails with
    /// [`BrokerError::CommunicationFailure`].
    fn receive(&mut self) -> impl Future<Output = BrokerResult<Vec<u8>>> + Send;
}

/// Sink for outbound bytes of a single connection
pub trait TransportWriter {

    /// Writes and flushes all of `bytes`
    fn send(&mut self, bytes: &[u8]) -> impl Future<Output = BrokerResult<()>> + Send;
}

impl<T> TransportReader for T where T : AsyncRead + Unpin + Send {
    async fn receive(&mut self) -> BrokerResult<Vec<u8>> {
        let mut inbound_data = vec![0u8; READ_BUFFER_SIZE];
        let bytes_read = self.read(inbound_data.as_mut_slice()).await.map_err(BrokerError::new_communication_failure)?;
        if bytes_read == 0 {
            info!("TransportReader - connection closed for read (0 bytes)");
            return Err(BrokerError::new_communication_failure("connection closed"));
        }

        debug!("TransportReader - read {} bytes from connection stream", bytes_read);
        inbound_data.truncate(bytes_read);
        Ok(inbound_data)
    }
}

impl<T> TransportWriter for T where T : AsyncWrite + Unpin + Send {
    async fn send(&mut self, bytes: &[u8]) -> BrokerResult<()> {
        self.write_all(bytes).await.map_err(BrokerError::new_communication_failure)?;
        self.flush().await.map_err(BrokerError::new_communication_failure)?;

        debug!("TransportWriter - wrote {} bytes to connection stream", bytes.len());
        Ok(())
    }
}

/// Reads packets from a transport.
///
/// Until the first packet arrives the protocol version is unknown.  That packet must be a
/// CONNECT; its protocol name and level select the formatter used for the rest of the
/// connection.
pub struct PacketReceiver<R> {
    reader: R,
    decoder: PacketDecoder,
    formatter: Option<PacketFormatter>,
    decoded_packets: VecDeque<RawPacket>,
}

impl<R> PacketReceiver<R> where R : TransportReader {

    /// Creates a receiver that detects the protocol version from the client's CONNECT
    pub fn new(reader: R, maximum_packet_size: u32) -> PacketReceiver<R> {
        PacketReceiver {
            reader,
            decoder: PacketDecoder::new(maximum_packet_size),
            formatter: None,
            decoded_packets: VecDeque::new(),
        }
    }

    /// Creates a receiver that enforces the server's configured maximum packet size
    pub fn new_from_options(reader: R, options: &ServerOptions) -> PacketReceiver<R> {
        PacketReceiver::new(reader, options.maximum_packet_size())
    }

    /// Creates a receiver for a connection whose protocol version is already known
    pub fn new_with_protocol_version(reader: R, maximum_packet_size: u32, protocol_version: ProtocolVersion) -> BrokerResult<PacketReceiver<R>> {
        let mut receiver = PacketReceiver::new(reader, maximum_packet_size);
        receiver.formatter = Some(PacketFormatter::new(protocol_version)?);

        Ok(receiver)
    }

    /// Protocol version of the connection, once known
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.formatter.as_ref().map(|formatter| formatter.protocol_version())
    }

    /// Formatter selected for the connection, once known
    pub fn formatter(&self) -> Option<&PacketFormatter> {
        self.formatter.as_ref()
    }

    /// Waits for the next complete packet.  Any decode failure leaves the stream untrusted and
    /// the connection should be closed.
    pub async fn receive_packet(&mut self) -> BrokerResult<MqttPacket> {
        loop {
            if let Some(raw_packet) = self.decoded_packets.pop_front() {
                let packet = self.decode_packet(&raw_packet)?;
                log_packet("Received: ", &packet);
                return Ok(packet);
            }

            let bytes = self.reader.receive().await?;
            self.decoder.decode_bytes(&bytes, &mut self.decoded_packets)?;
        }
    }

    fn decode_packet(&mut self, raw_packet: &RawPacket) -> BrokerResult<MqttPacket> {
        let packet_type = raw_packet.packet_type()?;

        match &self.formatter {
            Some(formatter) => {
                if packet_type == PacketType::Connect {
                    let message = "PacketReceiver::decode_packet - a connection may only send CONNECT once";
                    error!("{}", message);
                    return Err(BrokerError::new_protocol_violation(message));
                }

                formatter.decode_raw(raw_packet)
            }
            None => {
                if packet_type != PacketType::Connect {
                    let message = format!("PacketReceiver::decode_packet - first packet must be CONNECT, received {}", packet_type);
                    error!("{}", message);
                    return Err(BrokerError::new_protocol_violation(message));
                }

                let protocol_version = detect_protocol_version(&raw_packet.body)?;
                let formatter = PacketFormatter::new(protocol_version)?;
                let packet = formatter.decode_raw(raw_packet)?;

                info!("PacketReceiver - connection using protocol version {}", protocol_version);
                self.formatter = Some(formatter);

                Ok(packet)
            }
        }
    }
}

/// Encodes packets onto a transport, one pooled buffer per sender
pub struct PacketSender<W> {
    writer: W,
    packet_writer: PacketWriter,
    formatter: PacketFormatter,
}

impl<W> PacketSender<W> where W : TransportWriter {

    pub fn new(writer: W, formatter: PacketFormatter, pool: &Arc<BufferPool>) -> PacketSender<W> {
        PacketSender {
            writer,
            packet_writer: PacketWriter::new(pool),
            formatter,
        }
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.formatter.protocol_version()
    }

    /// Encodes and transmits one packet
    pub async fn send_packet(&mut self, packet: &MqttPacket) -> BrokerResult<()> {
        let bytes = self.formatter.encode(packet, &mut self.packet_writer)?;
        log_packet("Sending: ", packet);

        self.writer.send(bytes).await
    }
}

/// Transmits packets from a session's bus until `cancel` completes or the transport fails.
///
/// Cancellation returns `Ok(())`.  A packet taken off the bus when cancellation lands mid-write
/// is not put back; QoS 1 and 2 publishes remain unacknowledged and are resent by the session's
/// next recovery.
pub async fn run_sender_loop<W, F>(session: Arc<Session>, sender: &mut PacketSender<W>, cancel: F) -> BrokerResult<()> where W : TransportWriter, F : Future<Output = ()> {
    let mut cancel = pin!(cancel);

    loop {
        let item : PacketBusItem =
            match session.dequeue_packet_or_cancel(cancel.as_mut()).await {
                Ok(item) => { item }
                Err(BrokerError::OperationCancelled(_)) => {
                    info!("run_sender_loop - session {} sender cancelled", session.client_id());
                    return Ok(());
                }
                Err(error) => { return Err(error); }
            };

        tokio::select! {
            biased;
            _ = cancel.as_mut() => {
                info!("run_sender_loop - session {} sender cancelled during write", session.client_id());
                return Ok(());
            }
            send_result = sender.send_packet(&item.packet) => {
                if let Err(error) = send_result {
                    error!("run_sender_loop - session {} transport failure: {}", session.client_id(), error);
                    return Err(error);
                }
            }
        }
    }
}

/// Binds a CONNECT to a session and builds the CONNACK to return.  A rejected connection
/// yields no session and a CONNACK carrying the rejection code.
pub fn accept_connect(session_manager: &SessionManager, connect: &ConnectPacket) -> (Option<SessionCreation>, ConnackPacket) {
    match session_manager.create_session(connect) {
        Ok(creation) => {
            let connack = ConnackPacket {
                session_present: creation.session_present,
                return_code: ConnectReturnCode::Accepted,
            };

            (Some(creation), connack)
        }
        Err(error) => {
            info!("accept_connect - rejecting client \"{}\": {}", connect.client_id, error);
            let connack = ConnackPacket {
                session_present: false,
                return_code: ConnectReturnCode::IdentifierRejected,
            };

            (None, connack)
        }
    }
}

/// What the connection should do after a client packet was processed
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClientPacketOutcome {

    /// Keep reading
    Continue,

    /// The client disconnected normally
    Disconnect,
}

/// Applies one packet received from a connected client to its session.
///
/// Publishes are routed through the session manager and acknowledged (PUBACK for QoS 1, PUBREC
/// for QoS 2, with PUBREL answered by PUBCOMP) even when some subscribers could not take the
/// message; only an invalid topic fails the packet.  Acknowledgements of outbound publishes,
/// SUBSCRIBE, UNSUBSCRIBE, and PINGREQ are handled by the session.  DISCONNECT suppresses the
/// will message.  Server-to-client packet types are protocol violations.
pub fn process_client_packet(session_manager: &SessionManager, session: &Session, packet: MqttPacket) -> BrokerResult<ClientPacketOutcome> {
    match &packet {
        MqttPacket::Publish(publish) => {
            session_manager.dispatch_application_message(&ApplicationMessage::from(publish))?;
            match publish.qos {
                QualityOfService::AtMostOnce => {}
                QualityOfService::AtLeastOnce => {
                    session.enqueue_packet(MqttPacket::Puback(PubackPacket { packet_id: publish.packet_id }))?;
                }
                QualityOfService::ExactlyOnce => {
                    session.enqueue_packet(MqttPacket::Pubrec(PubrecPacket { packet_id: publish.packet_id }))?;
                }
            }
        }
        MqttPacket::Pubrel(pubrel) => {
            session.enqueue_packet(MqttPacket::Pubcomp(PubcompPacket { packet_id: pubrel.packet_id }))?;
        }
        MqttPacket::Puback(_) | MqttPacket::Pubrec(_) | MqttPacket::Pubcomp(_) => {
            session.handle_acknowledgement(&packet)?;
        }
        MqttPacket::Subscribe(subscribe) => {
            session.subscribe(subscribe, session_manager.retained_store())?;
        }
        MqttPacket::Unsubscribe(unsubscribe) => {
            session.unsubscribe(unsubscribe)?;
        }
        MqttPacket::Pingreq(_) => {
            session.enqueue_packet(MqttPacket::Pingresp(PingrespPacket {}))?;
        }
        MqttPacket::Disconnect(_) => {
            session.clear_will_message();
            info!("process_client_packet - session {} disconnected", session.client_id());
            return Ok(ClientPacketOutcome::Disconnect);
        }
        _ => {
            let message = format!("process_client_packet - unexpected {} from client", packet.packet_type());
            error!("{}", message);
            return Err(BrokerError::new_protocol_violation(message));
        }
    }

    Ok(ClientPacketOutcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::decode::testing::*;
    use assert_matches::assert_matches;
    use tokio::io::duplex;

    fn connect_packet(client_id: &str) -> MqttPacket {
        MqttPacket::Connect(ConnectPacket {
            client_id: client_id.to_string(),
            clean_session: true,
            keep_alive_interval_seconds: 60,
            ..Default::default()
        })
    }

    fn subscribe_packet() -> MqttPacket {
        MqttPacket::Subscribe(SubscribePacket {
            packet_id: 3,
            subscriptions: vec![ Subscription::new("a/#", QualityOfService::AtLeastOnce) ],
        })
    }

    #[tokio::test]
    async fn receiver_detects_protocol_version_from_connect() {
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new(server, MAXIMUM_PACKET_SIZE);

        let mut bytes = encode_packet_for_test(&connect_packet("receiver"), ProtocolVersion::V311);
        bytes.extend(encode_packet_for_test(&subscribe_packet(), ProtocolVersion::V311));

        // dribble the bytes in to exercise framing across reads
        for chunk in bytes.chunks(3) {
            client.write_all(chunk).await.unwrap();
        }

        assert_eq!(None, receiver.protocol_version());
        assert_eq!(connect_packet("receiver"), receiver.receive_packet().await.unwrap());
        assert_eq!(Some(ProtocolVersion::V311), receiver.protocol_version());
        assert_eq!(subscribe_packet(), receiver.receive_packet().await.unwrap());
    }

    #[tokio::test]
    async fn receiver_detects_mqtt310() {
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new(server, MAXIMUM_PACKET_SIZE);

        client.write_all(&encode_packet_for_test(&connect_packet("legacy"), ProtocolVersion::V310)).await.unwrap();

        assert_eq!(connect_packet("legacy"), receiver.receive_packet().await.unwrap());
        assert_eq!(Some(ProtocolVersion::V310), receiver.protocol_version());
    }

    #[tokio::test]
    async fn receiver_requires_connect_first() {
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new(server, MAXIMUM_PACKET_SIZE);

        client.write_all(&encode_packet_for_test(&subscribe_packet(), ProtocolVersion::V311)).await.unwrap();

        assert_matches!(receiver.receive_packet().await, Err(BrokerError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn receiver_rejects_second_connect() {
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new(server, MAXIMUM_PACKET_SIZE);

        let mut bytes = encode_packet_for_test(&connect_packet("twice"), ProtocolVersion::V311);
        bytes.extend(encode_packet_for_test(&connect_packet("twice"), ProtocolVersion::V311));
        client.write_all(&bytes).await.unwrap();

        assert!(receiver.receive_packet().await.is_ok());
        assert_matches!(receiver.receive_packet().await, Err(BrokerError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn receiver_rejects_mqtt5() {
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new(server, MAXIMUM_PACKET_SIZE);

        // CONNECT, protocol name "MQTT", level 5, connect flags, keep alive, property length, empty client id
        client.write_all(&[0x10, 13, 0, 4, b'M', b'Q', b'T', b'T', 5, 2, 0, 60, 0, 0, 0]).await.unwrap();

        assert_matches!(receiver.receive_packet().await, Err(BrokerError::Unimplemented(_)));
    }

    #[tokio::test]
    async fn receiver_rejects_oversized_packets() {
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new(server, 16);

        client.write_all(&encode_packet_for_test(&connect_packet("a-client-id-that-is-too-long"), ProtocolVersion::V311)).await.unwrap();

        assert_matches!(receiver.receive_packet().await, Err(BrokerError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn receiver_enforces_configured_maximum_packet_size() {
        let options = ServerOptionsBuilder::new().with_maximum_packet_size(16).build();
        let (mut client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new_from_options(server, &options);

        client.write_all(&encode_packet_for_test(&connect_packet("a-client-id-that-is-too-long"), ProtocolVersion::V311)).await.unwrap();

        assert_matches!(receiver.receive_packet().await, Err(BrokerError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn receiver_reports_closed_transport() {
        let (client, server) = duplex(1024);
        let mut receiver = PacketReceiver::new_with_protocol_version(server, MAXIMUM_PACKET_SIZE, ProtocolVersion::V311).unwrap();
        drop(client);

        assert_matches!(receiver.receive_packet().await, Err(BrokerError::CommunicationFailure(_)));
    }

    #[tokio::test]
    async fn sender_writes_framed_packets() {
        let (mut client, server) = duplex(1024);
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut sender = PacketSender::new(server, PacketFormatter::new(ProtocolVersion::V311).unwrap(), &pool);

        let suback = MqttPacket::Suback(SubackPacket { packet_id: 3, return_codes: vec![ SubscribeReturnCode::GrantedQos1 ] });
        sender.send_packet(&suback).await.unwrap();

        let expected = encode_packet_for_test(&suback, ProtocolVersion::V311);
        let mut received = vec![0u8; expected.len()];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(expected, received);
    }

    #[tokio::test]
    async fn sender_loop_drains_session_until_cancelled() {
        let (mut client, server) = duplex(1024);
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut sender = PacketSender::new(server, PacketFormatter::new(ProtocolVersion::V311).unwrap(), &pool);

        let session = Arc::new(Session::new(ConnectPacket { client_id: "drain".to_string(), ..Default::default() }, Arc::new(ServerOptions::default())));
        let publish = MqttPacket::Publish(PublishPacket {
            topic: "a/b".to_string(),
            payload: b"payload".to_vec(),
            ..Default::default()
        });
        session.enqueue_packet(publish.clone()).unwrap();
        session.enqueue_packet(MqttPacket::Pingresp(PingrespPacket {})).unwrap();

        let (cancel_sender, cancel_receiver) = tokio::sync::oneshot::channel::<()>();
        let loop_session = session.clone();
        let sender_task = tokio::spawn(async move {
            run_sender_loop(loop_session, &mut sender, async move { let _ = cancel_receiver.await; }).await
        });

        // the health partition drains first
        let mut expected = encode_packet_for_test(&MqttPacket::Pingresp(PingrespPacket {}), ProtocolVersion::V311);
        expected.extend(encode_packet_for_test(&publish, ProtocolVersion::V311));
        let mut received = vec![0u8; expected.len()];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(expected, received);

        cancel_sender.send(()).unwrap();
        assert_matches!(sender_task.await.unwrap(), Ok(()));
        assert_eq!(0, session.pending_packets_count());
    }

    #[tokio::test]
    async fn sender_loop_reports_transport_failure() {
        let (client, server) = duplex(1024);
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut sender = PacketSender::new(server, PacketFormatter::new(ProtocolVersion::V311).unwrap(), &pool);
        drop(client);

        let session = Arc::new(Session::new(ConnectPacket { client_id: "broken".to_string(), ..Default::default() }, Arc::new(ServerOptions::default())));
        session.enqueue_packet(MqttPacket::Pingresp(PingrespPacket {})).unwrap();

        let result = run_sender_loop(session, &mut sender, std::future::pending::<()>()).await;
        assert_matches!(result, Err(BrokerError::CommunicationFailure(_)));
    }

    #[test]
    fn accept_connect_builds_connack() {
        let manager = SessionManager::new(ServerOptions::default());

        let (creation, connack) = accept_connect(&manager, &ConnectPacket { client_id: "accepted".to_string(), clean_session: false, ..Default::default() });
        assert!(creation.is_some());
        assert_eq!(ConnectReturnCode::Accepted, connack.return_code);
        assert!(!connack.session_present);

        let (_, connack) = accept_connect(&manager, &ConnectPacket { client_id: "accepted".to_string(), clean_session: false, ..Default::default() });
        assert!(connack.session_present);

        let (creation, connack) = accept_connect(&manager, &ConnectPacket { clean_session: false, ..Default::default() });
        assert!(creation.is_none());
        assert_eq!(ConnectReturnCode::IdentifierRejected, connack.return_code);
    }

    #[test]
    fn client_publish_is_routed_and_acknowledged() {
        let manager = SessionManager::new(ServerOptions::default());
        let publisher = manager.create_session(&ConnectPacket { client_id: "publisher".to_string(), clean_session: true, ..Default::default() }).unwrap().session;
        let subscriber = manager.create_session(&ConnectPacket { client_id: "subscriber".to_string(), clean_session: true, ..Default::default() }).unwrap().session;
        subscriber.subscriptions().subscribe("a/#", QualityOfService::ExactlyOnce).unwrap();

        let qos1 = MqttPacket::Publish(PublishPacket { packet_id: 7, topic: "a/b".to_string(), qos: QualityOfService::AtLeastOnce, ..Default::default() });
        let qos2 = MqttPacket::Publish(PublishPacket { packet_id: 8, topic: "a/c".to_string(), qos: QualityOfService::ExactlyOnce, ..Default::default() });

        assert_eq!(ClientPacketOutcome::Continue, process_client_packet(&manager, &publisher, qos1).unwrap());
        assert_eq!(ClientPacketOutcome::Continue, process_client_packet(&manager, &publisher, qos2).unwrap());
        assert_eq!(ClientPacketOutcome::Continue, process_client_packet(&manager, &publisher, MqttPacket::Pubrel(PubrelPacket { packet_id: 8 })).unwrap());

        assert_eq!(vec![
            MqttPacket::Puback(PubackPacket { packet_id: 7 }),
            MqttPacket::Pubrec(PubrecPacket { packet_id: 8 }),
            MqttPacket::Pubcomp(PubcompPacket { packet_id: 8 }),
        ], publisher.packet_bus().queued_packets());

        assert_eq!(2, subscriber.pending_data_packets_count());
        assert_eq!(vec![1, 2], subscriber.unacknowledged_packet_ids());
    }

    #[test]
    fn client_publish_acknowledged_despite_saturated_subscriber() {
        let options = ServerOptionsBuilder::new()
            .with_max_pending_messages_per_client(1)
            .with_pending_messages_overflow_strategy(PendingMessagesOverflowStrategy::DropOldestQueuedMessage)
            .build();
        let manager = SessionManager::new(options);
        let publisher = manager.create_session(&ConnectPacket { client_id: "publisher".to_string(), clean_session: true, ..Default::default() }).unwrap().session;
        let stalled = manager.create_session(&ConnectPacket { client_id: "stalled".to_string(), clean_session: true, ..Default::default() }).unwrap().session;
        let healthy = manager.create_session(&ConnectPacket { client_id: "healthy".to_string(), clean_session: true, ..Default::default() }).unwrap().session;
        stalled.subscriptions().subscribe("t", QualityOfService::AtLeastOnce).unwrap();
        healthy.subscriptions().subscribe("t", QualityOfService::AtLeastOnce).unwrap();

        let backlog = ApplicationMessage { topic: "backlog".to_string(), payload: vec![], qos: QualityOfService::AtLeastOnce, retain: false };
        for _ in 0..u16::MAX {
            stalled.enqueue_application_message(&backlog, QualityOfService::AtLeastOnce).unwrap();
        }
        let stalled_drops = stalled.dropped_packets_count();

        let publish = MqttPacket::Publish(PublishPacket { packet_id: 11, topic: "t".to_string(), qos: QualityOfService::AtLeastOnce, ..Default::default() });
        assert_eq!(ClientPacketOutcome::Continue, process_client_packet(&manager, &publisher, publish).unwrap());

        assert_eq!(vec![MqttPacket::Puback(PubackPacket { packet_id: 11 })], publisher.packet_bus().queued_packets());
        assert_eq!(1, healthy.pending_data_packets_count());
        assert_eq!(stalled_drops + 1, stalled.dropped_packets_count());
    }

    #[test]
    fn client_control_packets() {
        let manager = SessionManager::new(ServerOptions::default());
        let connect = ConnectPacket {
            client_id: "controller".to_string(),
            clean_session: true,
            will: Some(PublishPacket { topic: "wills".to_string(), ..Default::default() }),
            ..Default::default()
        };
        let session = manager.create_session(&connect).unwrap().session;

        process_client_packet(&manager, &session, MqttPacket::Pingreq(PingreqPacket {})).unwrap();
        process_client_packet(&manager, &session, subscribe_packet()).unwrap();
        process_client_packet(&manager, &session, MqttPacket::Unsubscribe(UnsubscribePacket { packet_id: 4, topic_filters: vec![ "a/#".to_string() ] })).unwrap();

        assert_eq!(vec![
            MqttPacket::Pingresp(PingrespPacket {}),
            MqttPacket::Suback(SubackPacket { packet_id: 3, return_codes: vec![ SubscribeReturnCode::GrantedQos1 ] }),
            MqttPacket::Unsuback(UnsubackPacket { packet_id: 4 }),
        ], session.packet_bus().queued_packets());

        assert_matches!(process_client_packet(&manager, &session, MqttPacket::Connack(ConnackPacket::default())), Err(BrokerError::ProtocolViolation(_)));

        assert_eq!(ClientPacketOutcome::Disconnect, process_client_packet(&manager, &session, MqttPacket::Disconnect(DisconnectPacket {})).unwrap());
        assert!(session.take_will_message().is_none());
    }
}
