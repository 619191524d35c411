/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Outbound half of the wire codec: a pool of reusable byte buffers and the cursor-based
`PacketWriter` that every packet encoder writes through.
 */

pub(crate) mod utils;

use crate::config::ServerOptions;
use crate::encode::utils::*;
use crate::error::BrokerResult;

use log::*;

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Initial size of buffers handed out by a pool, unless configured otherwise.  Large enough to
/// hold a typical Ethernet MTU worth of packet.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 1500;

const DEFAULT_MAXIMUM_IDLE_BUFFERS: usize = 64;

/// Shared source of reusable byte buffers.
///
/// Buffers are rented as [`PooledBuffer`] guards.  A guard hands its storage back to the pool
/// when it is dropped, so a buffer is returned exactly once on every exit path, including
/// encode failures.  The pool keeps a bounded number of idle buffers and lets the rest go.
pub struct BufferPool {
    idle_buffers: Mutex<Vec<Vec<u8>>>,
    default_buffer_size: usize,
    maximum_idle_buffers: usize,
}

impl BufferPool {

    /// Creates a new pool whose buffers start at `default_buffer_size` bytes
    pub fn new(default_buffer_size: usize) -> Arc<BufferPool> {
        Arc::new(BufferPool {
            idle_buffers: Mutex::new(Vec::new()),
            default_buffer_size: default_buffer_size.max(1),
            maximum_idle_buffers: DEFAULT_MAXIMUM_IDLE_BUFFERS,
        })
    }

    /// Creates a new pool sized by the server's configured write buffer size
    pub fn new_from_options(options: &ServerOptions) -> Arc<BufferPool> {
        BufferPool::new(options.write_buffer_size())
    }

    /// Size of a freshly rented buffer when no minimum is requested
    pub fn default_buffer_size(&self) -> usize {
        self.default_buffer_size
    }

    /// Number of buffers currently sitting in the pool, waiting to be rented
    pub fn idle_buffer_count(&self) -> usize {
        self.idle_buffers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Rents a buffer of at least `minimum_size` bytes (and at least the pool default).
    pub fn rent(self: &Arc<Self>, minimum_size: usize) -> PooledBuffer {
        let size = usize::max(minimum_size, self.default_buffer_size);

        let recycled = {
            let mut idle_buffers = self.idle_buffers.lock().unwrap_or_else(PoisonError::into_inner);
            idle_buffers.iter().position(|buffer| buffer.len() >= size).map(|index| idle_buffers.swap_remove(index))
        };

        let bytes = recycled.unwrap_or_else(|| vec![0u8; size]);

        PooledBuffer {
            bytes,
            pool: self.clone(),
        }
    }

    fn give_back(&self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }

        let mut idle_buffers = self.idle_buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if idle_buffers.len() < self.maximum_idle_buffers {
            idle_buffers.push(bytes);
        }
    }
}

/// A rented byte buffer.  Dereferences to its full (fixed) size slice and returns itself to
/// its pool when dropped.
pub struct PooledBuffer {
    bytes: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.bytes.as_slice()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.bytes.as_mut_slice()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let bytes = std::mem::take(&mut self.bytes);
        self.pool.give_back(bytes);
    }
}

/// Cursor-based MQTT primitive writer over a pooled, growable buffer.
///
/// The writer tracks a cursor (`position`) and a logical `length`.  A write only advances
/// `length` when it happens at the current end of the written data; writes that land earlier
/// (after a [`seek`](PacketWriter::seek)) overwrite in place.  This is what allows a fixed
/// header to be back-patched once the body size is known.
pub struct PacketWriter {
    pool: Arc<BufferPool>,
    buffer: PooledBuffer,
    position: usize,
    length: usize,
}

impl PacketWriter {

    /// Creates a writer holding a buffer rented from `pool`
    pub fn new(pool: &Arc<BufferPool>) -> PacketWriter {
        PacketWriter {
            pool: pool.clone(),
            buffer: pool.rent(0),
            position: 0,
            length: 0,
        }
    }

    /// Logical length of the written data
    pub fn length(&self) -> usize {
        self.length
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total bytes the writer can hold before it has to grow
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The written data, `[0, length)`
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    /// Moves the cursor.  Subsequent writes before the logical end overwrite existing bytes.
    pub fn seek(&mut self, position: usize) {
        self.position = position;
        self.grow_if_needed(0);
    }

    /// Resets cursor and length to `length` without shrinking the buffer.  Bytes below
    /// `length` are reserved, typically as space for a fixed header.
    pub fn reset(&mut self, length: usize) {
        self.position = length;
        self.length = length;
        self.grow_if_needed(0);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.grow_if_needed(1);
        self.buffer[self.position] = value;
        self.commit(1);
    }

    /// Writes a 2-byte big-endian integer
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        self.grow_if_needed(bytes.len());
        let end = self.position + bytes.len();
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.commit(bytes.len());
    }

    pub fn write_variable_length_integer(&mut self, value: u32) -> BrokerResult<()> {
        let mut encoding = [0u8; MAXIMUM_VARIABLE_LENGTH_INTEGER_ENCODE_SIZE];
        let encoded_length = encode_vli(value, &mut encoding)?;
        self.write_bytes(&encoding[..encoded_length]);

        Ok(())
    }

    /// Writes a 2-byte length prefix followed by the raw bytes
    pub fn write_length_prefixed_bytes(&mut self, bytes: &[u8]) -> BrokerResult<()> {
        let length = validate_length_prefixed_field_size(bytes.len(), "write_length_prefixed_bytes")?;
        self.write_u16(length);
        self.write_bytes(bytes);

        Ok(())
    }

    /// Writes a 2-byte length prefix followed by the utf-8 bytes of the string
    pub fn write_length_prefixed_string(&mut self, value: &str) -> BrokerResult<()> {
        self.write_length_prefixed_bytes(value.as_bytes())
    }

    /// Absent strings encode as a zero-length string
    pub fn write_length_prefixed_optional_string(&mut self, value: Option<&str>) -> BrokerResult<()> {
        self.write_length_prefixed_string(value.unwrap_or_default())
    }

    fn commit(&mut self, count: usize) {
        if self.position == self.length {
            self.length += count;
        }

        self.position += count;
    }

    fn grow_if_needed(&mut self, additional: usize) {
        let needed = self.position + additional;
        let current_size = self.buffer.len();
        if needed <= current_size {
            return;
        }

        let mut new_size = current_size.max(1);
        while new_size < needed {
            new_size *= 2;
        }

        debug!("PacketWriter - growing buffer from {} to {} bytes", current_size, new_size);

        let mut grown = self.pool.rent(new_size);
        let preserved = usize::min(current_size, usize::max(self.length, self.position));
        grown[..preserved].copy_from_slice(&self.buffer[..preserved]);

        // the replaced buffer goes back to the pool as it drops
        self.buffer = grown;
    }
}
