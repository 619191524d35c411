/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::{BrokerError, BrokerResult};

use log::*;

#[derive(Eq, PartialEq, Debug)]
pub(crate) enum DecodeVliResult<'a> {
    InsufficientData,
    Value(u32, &'a[u8]), /* (decoded value, remaining bytes) */
}

pub(crate) fn decode_vli(buffer: &[u8]) -> BrokerResult<DecodeVliResult> {
    let mut value: u32 = 0;
    let mut needs_data: bool;
    let mut shift: u32 = 0;
    let data_len = buffer.len();

    for i in 0..4 {
        if i >= data_len {
            return Ok(DecodeVliResult::InsufficientData);
        }

        let byte = buffer[i];
        value |= ((byte & 0x7F) as u32) << shift;
        shift += 7;

        needs_data = (byte & 0x80) != 0;
        if !needs_data {
            return Ok(DecodeVliResult::Value(value, &buffer[(i + 1)..]));
        }
    }

    let message = "decode_vli - continuation bit still set after four bytes";
    error!("{}", message);
    Err(BrokerError::new_malformed_variable_length_integer(message))
}

/// Sequential, read-only cursor over a single packet body.
///
/// Every read either consumes exactly the bytes of one field or fails with
/// `UnexpectedEndOfPacket` and leaves the cursor where it was.
pub struct PacketBodyReader<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> PacketBodyReader<'a> {

    pub fn new(body: &'a [u8]) -> PacketBodyReader<'a> {
        PacketBodyReader {
            body,
            offset: 0,
        }
    }

    pub fn bytes_remaining(&self) -> usize {
        self.body.len() - self.offset
    }

    pub fn end_of_body(&self) -> bool {
        self.offset >= self.body.len()
    }

    fn take(&mut self, count: usize, function_name: &str) -> BrokerResult<&'a [u8]> {
        if count > self.bytes_remaining() {
            let message = format!("{} - needed {} bytes but only {} remain", function_name, count, self.bytes_remaining());
            error!("{}", message);
            return Err(BrokerError::new_unexpected_end_of_packet(message));
        }

        let start = self.offset;
        self.offset += count;
        Ok(&self.body[start..self.offset])
    }

    pub fn read_u8(&mut self) -> BrokerResult<u8> {
        let bytes = self.take(1, "read_u8")?;
        Ok(bytes[0])
    }

    /// Reads a 2-byte big-endian integer
    pub fn read_u16(&mut self) -> BrokerResult<u16> {
        let bytes = self.take(2, "read_u16")?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_variable_length_integer(&mut self) -> BrokerResult<u32> {
        let remaining = &self.body[self.offset..];
        match decode_vli(remaining)? {
            DecodeVliResult::InsufficientData => {
                let message = "read_variable_length_integer - body ended inside a variable length integer";
                error!("{}", message);
                Err(BrokerError::new_unexpected_end_of_packet(message))
            }
            DecodeVliResult::Value(value, rest) => {
                self.offset += remaining.len() - rest.len();
                Ok(value)
            }
        }
    }

    /// Reads a 2-byte length prefix followed by that many raw bytes
    pub fn read_length_prefixed_bytes(&mut self) -> BrokerResult<&'a [u8]> {
        let start = self.offset;
        let length = self.read_u16()? as usize;
        match self.take(length, "read_length_prefixed_bytes") {
            Ok(bytes) => { Ok(bytes) }
            Err(error) => {
                self.offset = start;
                Err(error)
            }
        }
    }

    /// Reads a 2-byte length prefix followed by that many bytes of utf-8 text
    pub fn read_length_prefixed_string(&mut self) -> BrokerResult<String> {
        let start = self.offset;
        let bytes = self.read_length_prefixed_bytes()?;
        match std::str::from_utf8(bytes) {
            Ok(value) => { Ok(value.to_string()) }
            Err(utf8_error) => {
                self.offset = start;
                error!("read_length_prefixed_string - invalid utf-8");
                Err(utf8_error.into())
            }
        }
    }

    /// Consumes and returns everything left in the body
    pub fn read_remaining_bytes(&mut self) -> &'a [u8] {
        let start = self.offset;
        self.offset = self.body.len();
        &self.body[start..]
    }
}
