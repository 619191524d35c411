/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Per-client session state: the outbound packet bus, the client's subscriptions, and the table of
QoS 1 and QoS 2 publishes the client has not yet acknowledged.

Enqueue, acknowledge, and recover all run under the session's state lock, so the
unacknowledged table and the Data partition of the bus are always updated together.  Lock order
is session state first, packet bus second.
 */

use crate::bus::*;
use crate::config::*;
use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;
use crate::retained::RetainedMessageStore;
use crate::subscription::SubscriptionMatcher;

use log::*;

use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

/// Outcome of enqueueing a packet on a session
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacketEnqueueResult {

    /// The packet was added to the bus
    Enqueued,

    /// The bus was full and the packet was discarded
    DroppedNewMessage,

    /// The bus was full; the oldest queued application message was discarded and the packet
    /// was added
    DroppedOldestMessage,
}

#[derive(Debug)]
struct UnacknowledgedPublish {

    // position in original enqueue order, kept across re-registration
    sequence: u64,

    packet: PublishPacket,
}

struct SessionState {
    unacknowledged_publishes: HashMap<u16, UnacknowledgedPublish>,
    next_sequence: u64,
    next_packet_id: u16,
    latest_connect: ConnectPacket,
}

impl SessionState {

    fn new(connect: ConnectPacket) -> SessionState {
        SessionState {
            unacknowledged_publishes: HashMap::new(),
            next_sequence: 0,
            next_packet_id: 1,
            latest_connect: connect,
        }
    }

    // cycles through 1..=65535, skipping ids still awaiting acknowledgement
    fn acquire_free_packet_id(&mut self) -> BrokerResult<u16> {
        let start_id = self.next_packet_id;
        let mut check_id = start_id;

        loop {
            if self.next_packet_id == u16::MAX {
                self.next_packet_id = 1;
            } else {
                self.next_packet_id += 1;
            }

            if !self.unacknowledged_publishes.contains_key(&check_id) {
                return Ok(check_id);
            }

            if self.next_packet_id == start_id {
                let message = "acquire_free_packet_id - packet id space exhausted";
                warn!("{}", message);
                return Err(BrokerError::new_internal_state_error(message));
            }

            check_id = self.next_packet_id;
        }
    }

    fn register_unacknowledged_publish(&mut self, publish: PublishPacket) {
        match self.unacknowledged_publishes.entry(publish.packet_id) {
            hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().packet = publish;
            }
            hash_map::Entry::Vacant(entry) => {
                entry.insert(UnacknowledgedPublish {
                    sequence: self.next_sequence,
                    packet: publish,
                });
                self.next_sequence += 1;
            }
        }
    }

    fn unacknowledged_ids_in_enqueue_order(&self) -> Vec<u16> {
        let mut pending : Vec<(u64, u16)> = self.unacknowledged_publishes.iter()
            .map(|(packet_id, unacked)| (unacked.sequence, *packet_id))
            .collect();
        pending.sort_unstable();

        pending.into_iter().map(|(_, packet_id)| packet_id).collect()
    }
}

/// One client's durable (or clean) session
pub struct Session {
    client_id: String,
    is_persistent: AtomicBool,
    created: SystemTime,
    state: Mutex<SessionState>,
    packet_bus: PacketBus,
    subscriptions: SubscriptionMatcher,
    options: Arc<ServerOptions>,
    dropped_packets: AtomicU64,
    will_message_sent: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("is_persistent", &self.is_persistent())
            .field("pending_packets", &self.pending_packets_count())
            .field("dropped_packets", &self.dropped_packets_count())
            .finish_non_exhaustive()
    }
}

impl Session {

    /// Creates a session for the client described by a CONNECT packet.  The session is
    /// persistent if the client did not ask for a clean session.
    pub fn new(connect: ConnectPacket, options: Arc<ServerOptions>) -> Session {
        Session {
            client_id: connect.client_id.clone(),
            is_persistent: AtomicBool::new(!connect.clean_session),
            created: SystemTime::now(),
            state: Mutex::new(SessionState::new(connect)),
            packet_bus: PacketBus::new(),
            subscriptions: SubscriptionMatcher::new(),
            options,
            dropped_packets: AtomicU64::new(0),
            will_message_sent: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the session outlives the connection that created it
    pub fn is_persistent(&self) -> bool {
        self.is_persistent.load(Ordering::Acquire)
    }

    pub fn set_persistent(&self, is_persistent: bool) {
        self.is_persistent.store(is_persistent, Ordering::Release);
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// The CONNECT packet of the most recent connection bound to this session
    pub fn latest_connect(&self) -> ConnectPacket {
        self.lock_state().latest_connect.clone()
    }

    /// Rebinds the session to a new connection's CONNECT packet.  The will message becomes
    /// eligible to be sent again.
    pub fn set_latest_connect(&self, connect: ConnectPacket) {
        let mut state = self.lock_state();
        self.set_persistent(!connect.clean_session);
        self.will_message_sent.store(false, Ordering::Release);
        state.latest_connect = connect;
    }

    pub fn subscriptions(&self) -> &SubscriptionMatcher {
        &self.subscriptions
    }

    pub fn packet_bus(&self) -> &PacketBus {
        &self.packet_bus
    }

    /// Number of packets discarded by the overflow strategy over the session's lifetime
    pub fn dropped_packets_count(&self) -> u64 {
        self.dropped_packets.load(Ordering::Acquire)
    }

    /// Application messages waiting on the bus
    pub fn pending_data_packets_count(&self) -> usize {
        self.packet_bus.partition_item_count(PacketBusPartition::Data)
    }

    /// Packets of any kind waiting on the bus
    pub fn pending_packets_count(&self) -> usize {
        self.packet_bus.item_count()
    }

    /// Packet ids of the publishes awaiting acknowledgement, in the order they were first enqueued
    pub fn unacknowledged_packet_ids(&self) -> Vec<u16> {
        self.lock_state().unacknowledged_ids_in_enqueue_order()
    }

    pub fn unacknowledged_publish(&self, packet_id: u16) -> Option<PublishPacket> {
        self.lock_state().unacknowledged_publishes.get(&packet_id).map(|unacked| unacked.packet.clone())
    }

    /// Enqueues a packet for transmission to the client.
    ///
    /// PINGREQ and PINGRESP travel in the Health partition, PUBLISH in Data, and everything else
    /// in Control.  A QoS 1 or 2 publish with a zero packet id is assigned a free id, and is
    /// recorded as unacknowledged before it becomes visible on the bus.  Publishes are subject
    /// to the configured overflow strategy; dropping one is not an error.  When every packet id
    /// is held by an unacknowledged publish, a new QoS 1 or 2 publish is dropped the same way.
    pub fn enqueue_packet(&self, mut packet: MqttPacket) -> BrokerResult<PacketEnqueueResult> {
        let partition = PacketBusPartition::for_packet(&packet);
        let mut state = self.lock_state();

        if let MqttPacket::Publish(publish) = &mut packet {
            if publish.qos != QualityOfService::AtMostOnce && publish.packet_id == 0 {
                match state.acquire_free_packet_id() {
                    Ok(packet_id) => { publish.packet_id = packet_id; }
                    Err(_) => {
                        self.dropped_packets.fetch_add(1, Ordering::AcqRel);
                        warn!("Session {} - no free packet id, dropping new {}", self.client_id, packet);
                        return Ok(PacketEnqueueResult::DroppedNewMessage);
                    }
                }
            }
        }

        Ok(self.enqueue_packet_locked(&mut state, packet, partition))
    }

    fn enqueue_packet_locked(&self, state: &mut SessionState, packet: MqttPacket, partition: PacketBusPartition) -> PacketEnqueueResult {
        let mut result = PacketEnqueueResult::Enqueued;

        if partition == PacketBusPartition::Data && self.packet_bus.item_count() >= self.options.max_pending_messages_per_client {
            match self.options.pending_messages_overflow_strategy {
                PendingMessagesOverflowStrategy::DropNewMessage => {
                    self.dropped_packets.fetch_add(1, Ordering::AcqRel);
                    warn!("Session {} - pending message limit reached, dropping new {}", self.client_id, packet);
                    return PacketEnqueueResult::DroppedNewMessage;
                }
                PendingMessagesOverflowStrategy::DropOldestQueuedMessage => {
                    if let Some(evicted) = self.packet_bus.drop_first_item(PacketBusPartition::Data) {
                        self.dropped_packets.fetch_add(1, Ordering::AcqRel);
                        warn!("Session {} - pending message limit reached, dropping oldest {}", self.client_id, evicted.packet);
                        result = PacketEnqueueResult::DroppedOldestMessage;
                    } else {
                        self.dropped_packets.fetch_add(1, Ordering::AcqRel);
                        warn!("Session {} - pending message limit reached with no queued messages, dropping new {}", self.client_id, packet);
                        return PacketEnqueueResult::DroppedNewMessage;
                    }
                }
            }
        }

        if let MqttPacket::Publish(publish) = &packet {
            if publish.qos != QualityOfService::AtMostOnce {
                state.register_unacknowledged_publish(publish.clone());
            }
        }

        self.packet_bus.enqueue(packet, partition);

        result
    }

    /// Enqueues an application message as a PUBLISH at `min(message qos, granted qos)`
    pub fn enqueue_application_message(&self, message: &ApplicationMessage, granted_qos: QualityOfService) -> BrokerResult<PacketEnqueueResult> {
        let publish = PublishPacket {
            packet_id: 0,
            topic: message.topic.clone(),
            qos: message.qos.min(granted_qos),
            duplicate: false,
            retain: message.retain,
            payload: message.payload.clone(),
        };

        self.enqueue_packet(MqttPacket::Publish(publish))
    }

    /// Marks a publish as delivered.  Unknown or already-acknowledged ids are ignored; returns
    /// whether anything was removed.
    pub fn acknowledge(&self, packet_id: u16) -> bool {
        let mut state = self.lock_state();
        if state.unacknowledged_publishes.remove(&packet_id).is_some() {
            debug!("Session {} - packet id {} acknowledged", self.client_id, packet_id);
            true
        } else {
            debug!("Session {} - ignoring acknowledgement of unknown packet id {}", self.client_id, packet_id);
            false
        }
    }

    /// Prepares the session for a new connection: discards everything queued for the previous
    /// connection and re-enqueues every unacknowledged publish, in original enqueue order, with
    /// the duplicate flag set and its packet id unchanged.  Returns how many publishes were
    /// re-enqueued.
    ///
    /// A QoS 2 publish the client already answered with PUBREC is resent as a duplicate PUBLISH,
    /// not as a PUBREL; the client replies with PUBREC again and the exchange continues from
    /// there.
    pub fn recover(&self) -> usize {
        let mut state = self.lock_state();

        let cleared = self.packet_bus.clear();
        let mut recovered = 0;
        for packet_id in state.unacknowledged_ids_in_enqueue_order() {
            let publish =
                match state.unacknowledged_publishes.get_mut(&packet_id) {
                    Some(unacked) => {
                        unacked.packet.duplicate = true;
                        unacked.packet.clone()
                    }
                    None => { continue; }
                };

            if self.enqueue_packet_locked(&mut state, MqttPacket::Publish(publish), PacketBusPartition::Data) != PacketEnqueueResult::DroppedNewMessage {
                recovered += 1;
            }
        }

        info!("Session {} - recovered {} unacknowledged publishes, discarded {} queued packets", self.client_id, recovered, cleared);

        recovered
    }

    /// Waits for the next packet to transmit
    pub async fn dequeue_packet(&self) -> PacketBusItem {
        self.packet_bus.dequeue().await
    }

    /// Waits for the next packet to transmit, or fails with
    /// [`BrokerError::OperationCancelled`] once `cancel` completes
    pub async fn dequeue_packet_or_cancel<F>(&self, cancel: F) -> BrokerResult<PacketBusItem> where F : Future<Output = ()> {
        self.packet_bus.dequeue_or_cancel(cancel).await
    }

    /// Applies an acknowledgement received from the client.  PUBACK and PUBCOMP complete a
    /// publish; PUBREC is answered with a PUBREL and leaves the publish pending until PUBCOMP.
    /// Returns whether the packet id referred to a pending publish.
    pub fn handle_acknowledgement(&self, packet: &MqttPacket) -> BrokerResult<bool> {
        match packet {
            MqttPacket::Puback(puback) => {
                Ok(self.acknowledge(puback.packet_id))
            }
            MqttPacket::Pubcomp(pubcomp) => {
                Ok(self.acknowledge(pubcomp.packet_id))
            }
            MqttPacket::Pubrec(pubrec) => {
                let is_pending = self.lock_state().unacknowledged_publishes.contains_key(&pubrec.packet_id);
                self.enqueue_packet(MqttPacket::Pubrel(PubrelPacket { packet_id: pubrec.packet_id }))?;
                Ok(is_pending)
            }
            _ => {
                let message = format!("Session::handle_acknowledgement - {} is not an acknowledgement", packet.packet_type());
                error!("{}", message);
                Err(BrokerError::new_protocol_violation(message))
            }
        }
    }

    /// Applies a SUBSCRIBE from the client.
    ///
    /// Each valid filter is granted its requested QoS; invalid filters get the failure return
    /// code.  The SUBACK is enqueued first, followed by every retained message matching a newly
    /// granted filter, delivered with the retain flag set.
    pub fn subscribe(&self, subscribe: &SubscribePacket, retained_messages: &dyn RetainedMessageStore) -> BrokerResult<SubackPacket> {
        let mut suback = SubackPacket {
            packet_id: subscribe.packet_id,
            return_codes: Vec::with_capacity(subscribe.subscriptions.len()),
        };

        let mut granted = Vec::new();
        for subscription in &subscribe.subscriptions {
            match self.subscriptions.subscribe(&subscription.topic_filter, subscription.qos) {
                Ok(()) => {
                    suback.return_codes.push(SubscribeReturnCode::granted(subscription.qos));
                    granted.push(subscription);
                }
                Err(_) => {
                    suback.return_codes.push(SubscribeReturnCode::Failure);
                }
            }
        }

        self.enqueue_packet(MqttPacket::Suback(suback.clone()))?;

        for subscription in granted {
            for message in retained_messages.matching_messages(&subscription.topic_filter) {
                let retained = ApplicationMessage {
                    retain: true,
                    ..message
                };

                self.enqueue_application_message(&retained, subscription.qos)?;
            }
        }

        Ok(suback)
    }

    /// Applies an UNSUBSCRIBE from the client and enqueues the UNSUBACK.  Unknown filters are
    /// ignored.
    pub fn unsubscribe(&self, unsubscribe: &UnsubscribePacket) -> BrokerResult<UnsubackPacket> {
        for topic_filter in &unsubscribe.topic_filters {
            if !self.subscriptions.unsubscribe(topic_filter) {
                debug!("Session {} - unsubscribe from unknown filter \"{}\"", self.client_id, topic_filter);
            }
        }

        let unsuback = UnsubackPacket {
            packet_id: unsubscribe.packet_id,
        };

        self.enqueue_packet(MqttPacket::Unsuback(unsuback.clone()))?;

        Ok(unsuback)
    }

    /// The will message of the current connection, at most once per connection.  Returns None
    /// if there is no will or it was already taken (or cleared by a normal disconnect).
    pub fn take_will_message(&self) -> Option<ApplicationMessage> {
        let state = self.lock_state();
        let will = state.latest_connect.will.as_ref()?;
        if self.will_message_sent.swap(true, Ordering::AcqRel) {
            return None;
        }

        Some(ApplicationMessage::from(will))
    }

    /// Suppresses the will message of the current connection, as on a normal DISCONNECT
    pub fn clear_will_message(&self) {
        self.will_message_sent.store(true, Ordering::Release);
    }
}
