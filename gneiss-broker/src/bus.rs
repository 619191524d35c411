/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Per-session outbound packet bus.

Producers (publish fan-out, acknowledgement replies, keep-alive handling) enqueue packets from
any task without blocking; a single sender task dequeues them.  Packets are held in three
partitions that are drained in strict priority order, Health before Control before Data, and
in FIFO order within a partition.
 */

use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;

use log::*;
use tokio::sync::Notify;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

const PARTITION_COUNT : usize = 3;

/// Transmission priority class of a queued packet
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PacketBusPartition {

    /// Keep-alive traffic (PINGREQ, PINGRESP)
    Health,

    /// Protocol control flow: acknowledgements, subscription responses, connection management
    Control,

    /// Application messages (PUBLISH)
    Data,
}

impl PacketBusPartition {

    /// Partition a packet travels in
    pub fn for_packet(packet: &MqttPacket) -> PacketBusPartition {
        match packet {
            MqttPacket::Pingreq(_) | MqttPacket::Pingresp(_) => { PacketBusPartition::Health }
            MqttPacket::Publish(_) => { PacketBusPartition::Data }
            _ => { PacketBusPartition::Control }
        }
    }

    fn index(&self) -> usize {
        match self {
            PacketBusPartition::Health => { 0 }
            PacketBusPartition::Control => { 1 }
            PacketBusPartition::Data => { 2 }
        }
    }
}

/// A packet waiting on the bus, with its send metadata
#[derive(Clone, Debug)]
pub struct PacketBusItem {

    /// The packet to transmit
    pub packet: MqttPacket,

    /// Partition the packet was enqueued in; never changes
    pub partition: PacketBusPartition,

    /// When the packet was enqueued
    pub enqueued: Instant,
}

impl PacketBusItem {

    pub fn new(packet: MqttPacket, partition: PacketBusPartition) -> PacketBusItem {
        PacketBusItem {
            packet,
            partition,
            enqueued: Instant::now(),
        }
    }
}

/// Partitioned queue with a suspending, cancellable dequeue.
///
/// Every enqueue stores a wakeup permit on the internal [`Notify`], so an enqueue racing with a
/// dequeuer that has just found the bus empty is never lost.
pub struct PacketBus {
    partitions: Mutex<[VecDeque<PacketBusItem>; PARTITION_COUNT]>,
    item_available: Notify,
}

impl Default for PacketBus {
    fn default() -> Self {
        PacketBus::new()
    }
}

impl PacketBus {

    pub fn new() -> PacketBus {
        PacketBus {
            partitions: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            item_available: Notify::new(),
        }
    }

    fn lock_partitions(&self) -> MutexGuard<'_, [VecDeque<PacketBusItem>; PARTITION_COUNT]> {
        self.partitions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a packet to the end of a partition.  Never blocks.
    pub fn enqueue(&self, packet: MqttPacket, partition: PacketBusPartition) {
        self.enqueue_item(PacketBusItem::new(packet, partition));
    }

    /// Appends an item to the end of its partition.  Never blocks.
    pub fn enqueue_item(&self, item: PacketBusItem) {
        {
            let mut partitions = self.lock_partitions();
            trace!("PacketBus - enqueueing {} into {:?}", crate::mqtt::utils::mqtt_packet_to_str(&item.packet), item.partition);
            partitions[item.partition.index()].push_back(item);
        }

        self.item_available.notify_one();
    }

    /// Removes and returns the oldest item of the highest-priority non-empty partition, if any
    pub fn try_dequeue(&self) -> Option<PacketBusItem> {
        let mut partitions = self.lock_partitions();
        partitions.iter_mut().find_map(|partition| partition.pop_front())
    }

    /// Waits until an item is available and returns it
    pub async fn dequeue(&self) -> PacketBusItem {
        loop {
            if let Some(item) = self.try_dequeue() {
                return item;
            }

            self.item_available.notified().await;
        }
    }

    /// Like [`dequeue`](PacketBus::dequeue), but gives up with
    /// [`BrokerError::OperationCancelled`] as soon as `cancel` completes.  A cancelled dequeue
    /// removes nothing from the bus.
    pub async fn dequeue_or_cancel<F>(&self, cancel: F) -> BrokerResult<PacketBusItem> where F : Future<Output = ()> {
        tokio::select! {
            biased;

            _ = cancel => {
                debug!("PacketBus - dequeue cancelled");
                Err(BrokerError::new_operation_cancelled())
            }
            item = self.dequeue() => {
                Ok(item)
            }
        }
    }

    /// Removes the oldest item of a partition without transmitting it
    pub fn drop_first_item(&self, partition: PacketBusPartition) -> Option<PacketBusItem> {
        let mut partitions = self.lock_partitions();
        partitions[partition.index()].pop_front()
    }

    /// Total number of queued items across all partitions
    pub fn item_count(&self) -> usize {
        self.lock_partitions().iter().map(|partition| partition.len()).sum()
    }

    pub fn partition_item_count(&self, partition: PacketBusPartition) -> usize {
        self.lock_partitions()[partition.index()].len()
    }

    /// Empties every partition, returning how many items were discarded
    pub fn clear(&self) -> usize {
        let mut partitions = self.lock_partitions();
        let mut cleared = 0;
        for partition in partitions.iter_mut() {
            cleared += partition.len();
            partition.clear();
        }

        cleared
    }

    /// Copies of the queued packets, in the order they would be dequeued
    pub fn queued_packets(&self) -> Vec<MqttPacket> {
        self.lock_partitions().iter()
            .flat_map(|partition| partition.iter().map(|item| item.packet.clone()))
            .collect()
    }
}
