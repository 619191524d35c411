/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Inbound half of the wire codec.  The stream decoder cuts an arbitrarily fragmented byte stream
into framed packets (fixed header byte plus body); turning a body into a typed packet is the
job of a version-specific [`PacketFormatter`](crate::formatter::PacketFormatter).
 */

pub(crate) mod utils;

use crate::decode::utils::*;
use crate::encode::utils::MAXIMUM_VARIABLE_LENGTH_INTEGER;
use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::PacketType;

use log::*;

use std::collections::VecDeque;

const DECODE_BUFFER_DEFAULT_SIZE : usize = 16 * 1024;

/// Largest possible framed packet: a type byte, four length bytes, and a maximal body
pub const MAXIMUM_PACKET_SIZE : u32 = (MAXIMUM_VARIABLE_LENGTH_INTEGER + 5) as u32;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum DecoderState {
    ReadPacketType,
    ReadTotalRemainingLength,
    ReadPacketBody,
    TerminalError
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum DecoderDirective {
    OutOfData,
    Continue,
}

/// A single framed packet as it came off the wire: the fixed header byte and the body the
/// remaining-length field announced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawPacket {

    /// Packet type in the high nibble, type-specific flags in the low nibble
    pub fixed_header: u8,

    /// Everything after the remaining-length field
    pub body: Vec<u8>,
}

impl RawPacket {

    /// Kind of packet announced by the fixed header
    pub fn packet_type(&self) -> BrokerResult<PacketType> {
        PacketType::from_control_code(self.fixed_header >> 4)
    }
}

/// Incremental framing decoder.  Feed it bytes in whatever fragments the transport produces;
/// complete packets are appended to the caller's queue.  Once it reports an error it stays in
/// a terminal state, since the stream can no longer be trusted.
pub struct PacketDecoder {
    state: DecoderState,
    scratch: Vec<u8>,
    first_byte: Option<u8>,
    remaining_length: Option<usize>,
    maximum_packet_size: u32,
}

impl PacketDecoder {

    /// Creates a decoder that rejects any packet larger than `maximum_packet_size` bytes
    pub fn new(maximum_packet_size: u32) -> PacketDecoder {
        PacketDecoder {
            state: DecoderState::ReadPacketType,
            scratch: Vec::<u8>::with_capacity(DECODE_BUFFER_DEFAULT_SIZE),
            first_byte: None,
            remaining_length: None,
            maximum_packet_size,
        }
    }

    pub fn reset_for_new_connection(&mut self) {
        self.reset();
    }

    /// True once the decoder has hit malformed input
    pub fn is_terminal(&self) -> bool {
        self.state == DecoderState::TerminalError
    }

    fn process_read_packet_type<'a>(&mut self, bytes: &'a [u8]) -> (DecoderDirective, &'a[u8]) {
        if bytes.is_empty() {
            return (DecoderDirective::OutOfData, bytes);
        }

        self.first_byte = Some(bytes[0]);
        self.state = DecoderState::ReadTotalRemainingLength;
        (DecoderDirective::Continue, &bytes[1..])
    }

    fn process_read_total_remaining_length<'a>(&mut self, bytes: &'a[u8]) -> BrokerResult<(DecoderDirective, &'a[u8])> {
        if bytes.is_empty() {
            return Ok((DecoderDirective::OutOfData, bytes));
        }

        self.scratch.push(bytes[0]);
        let remaining_bytes = &bytes[1..];

        let decoded_length = match decode_vli(&self.scratch)? {
            DecodeVliResult::Value(remaining_length, _) => { Some(remaining_length as usize) }
            DecodeVliResult::InsufficientData => { None }
        };

        let Some(remaining_length) = decoded_length else {
            if remaining_bytes.is_empty() {
                return Ok((DecoderDirective::OutOfData, remaining_bytes));
            }

            return Ok((DecoderDirective::Continue, remaining_bytes));
        };

        let total_packet_length = 1 + self.scratch.len() + remaining_length;
        if total_packet_length > self.maximum_packet_size as usize {
            let message = format!("decode_bytes - incoming packet length ({}) exceeds maximum packet size ({})", total_packet_length, self.maximum_packet_size);
            error!("{}", message);
            return Err(BrokerError::new_protocol_violation(message));
        }

        self.remaining_length = Some(remaining_length);
        self.state = DecoderState::ReadPacketBody;
        self.scratch.clear();
        Ok((DecoderDirective::Continue, remaining_bytes))
    }

    fn process_read_packet_body<'a>(&mut self, bytes: &'a[u8], decoded_packets: &mut VecDeque<RawPacket>) -> BrokerResult<(DecoderDirective, &'a[u8])> {
        let (Some(first_byte), Some(remaining_length)) = (self.first_byte, self.remaining_length) else {
            let message = "decode_bytes - reading packet body without a fixed header";
            error!("{}", message);
            return Err(BrokerError::new_internal_state_error(message));
        };

        let read_so_far = self.scratch.len();
        let bytes_needed = remaining_length - read_so_far;
        if bytes_needed > bytes.len() {
            self.scratch.extend_from_slice(bytes);
            return Ok((DecoderDirective::OutOfData, &[]));
        }

        let body =
            if !self.scratch.is_empty() {
                self.scratch.extend_from_slice(&bytes[..bytes_needed]);
                self.scratch.clone()
            } else {
                bytes[..bytes_needed].to_vec()
            };

        debug!("decode_bytes - framed packet with first byte {:#04x} and {} body bytes", first_byte, body.len());
        decoded_packets.push_back(RawPacket {
            fixed_header: first_byte,
            body,
        });

        self.reset();
        Ok((DecoderDirective::Continue, &bytes[bytes_needed..]))
    }

    /// Consumes `bytes`, appending every packet completed by them to `decoded_packets`.
    pub fn decode_bytes(&mut self, bytes: &[u8], decoded_packets: &mut VecDeque<RawPacket>) -> BrokerResult<()> {
        let mut current_slice = bytes;

        let mut directive = DecoderDirective::Continue;
        while directive == DecoderDirective::Continue {
            let step_result = match self.state {
                DecoderState::ReadPacketType => {
                    Ok(self.process_read_packet_type(current_slice))
                }

                DecoderState::ReadTotalRemainingLength => {
                    self.process_read_total_remaining_length(current_slice)
                }

                DecoderState::ReadPacketBody => {
                    self.process_read_packet_body(current_slice, decoded_packets)
                }

                DecoderState::TerminalError => {
                    let message = "decode_bytes - decoder previously failed and is in a terminal state";
                    error!("{}", message);
                    Err(BrokerError::new_malformed_packet(message))
                }
            };

            match step_result {
                Ok((next_directive, next_slice)) => {
                    directive = next_directive;
                    current_slice = next_slice;
                }
                Err(error) => {
                    self.state = DecoderState::TerminalError;
                    return Err(error);
                }
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.state = DecoderState::ReadPacketType;
        self.scratch.clear();
        self.first_byte = None;
        self.remaining_length = None;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::encode::*;
    use crate::formatter::*;
    use crate::mqtt::*;

    pub(crate) fn encode_packet_for_test(packet: &MqttPacket, protocol_version: ProtocolVersion) -> Vec<u8> {
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut writer = PacketWriter::new(&pool);
        let formatter = PacketFormatter::new(protocol_version).unwrap();

        formatter.encode(packet, &mut writer).unwrap().to_vec()
    }

    pub(crate) fn decode_packet_for_test(bytes: &[u8], protocol_version: ProtocolVersion) -> BrokerResult<MqttPacket> {
        let formatter = PacketFormatter::new(protocol_version).unwrap();
        let mut decoder = PacketDecoder::new(MAXIMUM_PACKET_SIZE);
        let mut decoded_packets = VecDeque::new();

        decoder.decode_bytes(bytes, &mut decoded_packets)?;
        assert_eq!(1, decoded_packets.len());

        formatter.decode_raw(&decoded_packets[0])
    }

    pub(crate) fn do_single_encode_decode_test(packet : &MqttPacket, protocol_version: ProtocolVersion, decode_size : usize, encode_repetitions : u32) -> bool {
        let formatter = PacketFormatter::new(protocol_version).unwrap();
        let pool = BufferPool::new(16);
        let mut writer = PacketWriter::new(&pool);

        let mut full_encoded_stream = Vec::with_capacity( 128 * 1024);
        for _ in 0..encode_repetitions {
            let encoding = formatter.encode(packet, &mut writer).unwrap();
            full_encoded_stream.extend_from_slice(encoding);
        }

        let mut decoder = PacketDecoder::new(MAXIMUM_PACKET_SIZE);
        let mut decoded_packets : VecDeque<RawPacket> = VecDeque::new();

        let mut decode_stream_slice = full_encoded_stream.as_slice();
        while !decode_stream_slice.is_empty() {
            let fragment_size : usize = usize::min(decode_size, decode_stream_slice.len());
            let decode_slice = &decode_stream_slice[..fragment_size];
            decode_stream_slice = &decode_stream_slice[fragment_size..];

            assert!(decoder.decode_bytes(decode_slice, &mut decoded_packets).is_ok());
        }

        let mut matching_packets : u32 = 0;
        for raw_packet in decoded_packets {
            let received_packet = formatter.decode_raw(&raw_packet).unwrap();
            assert_eq!(*packet, received_packet);
            matching_packets += 1;
        }

        assert_eq!(encode_repetitions, matching_packets);

        true
    }

    pub(crate) fn do_round_trip_encode_decode_test(packet : &MqttPacket, protocol_version: ProtocolVersion) -> bool {
        let decode_fragment_sizes : Vec<usize> = vec!(1, 2, 3, 5, 7, 11, 17, 31, 47, 71, 131, 1023);

        for decode_size in decode_fragment_sizes.iter() {
            assert!(do_single_encode_decode_test(packet, protocol_version, *decode_size, 3));
        }

        true
    }

    /*
     * verifies that the packet encodes/decodes correctly, but applying the supplied mutator
     * to the encoding leads to a decode failure, which is returned for inspection.
     */
    pub(crate) fn do_mutated_decode_failure_test<F>(packet: &MqttPacket, protocol_version: ProtocolVersion, mutator: F) -> BrokerError where F : Fn(&[u8]) -> Vec<u8> {
        let good_encoded_bytes = encode_packet_for_test(packet, protocol_version);
        assert_eq!(*packet, decode_packet_for_test(&good_encoded_bytes, protocol_version).unwrap());

        let bad_encoded_bytes = mutator(good_encoded_bytes.as_slice());
        assert_ne!(good_encoded_bytes.as_slice(), bad_encoded_bytes.as_slice());

        match decode_packet_for_test(&bad_encoded_bytes, protocol_version) {
            Ok(decoded) => { panic!("mutated packet unexpectedly decoded: {:?}", decoded) }
            Err(error) => { error }
        }
    }

    pub(crate) fn do_fixed_header_flag_decode_failure_test(packet: &MqttPacket, protocol_version: ProtocolVersion, flags_mask: u8) {
        let reserved_mutator = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[0] |= flags_mask;
            clone
        };

        let error = do_mutated_decode_failure_test(packet, protocol_version, reserved_mutator);
        assert!(matches!(error, BrokerError::MalformedPacket(_)));
    }

    /*
     * appends garbage to the body and bumps the single-byte remaining length to match
     */
    pub(crate) fn do_trailing_bytes_decode_failure_test(packet: &MqttPacket, protocol_version: ProtocolVersion) {
        let extend_length = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[1] += 2;
            clone.push(0x01);
            clone.push(0x02);
            clone
        };

        let error = do_mutated_decode_failure_test(packet, protocol_version, extend_length);
        assert!(matches!(error, BrokerError::MalformedPacket(_)));
    }
}
