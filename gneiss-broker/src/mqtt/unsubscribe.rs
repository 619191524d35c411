/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::encode::*;
use crate::error::{BrokerError, BrokerResult};
use crate::logging::*;
use crate::mqtt::*;
use crate::mqtt::utils::*;

use log::*;

use std::fmt;

pub(crate) fn encode_unsubscribe_packet3(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let unsubscribe = get_packet_variant!(packet, Unsubscribe, "encode_unsubscribe_packet3");

    if unsubscribe.topic_filters.is_empty() {
        let message = "encode_unsubscribe_packet3 - unsubscribe packet with no topic filters";
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    writer.write_u16(unsubscribe.packet_id);
    for topic_filter in &unsubscribe.topic_filters {
        writer.write_length_prefixed_string(topic_filter)?;
    }

    Ok(UNSUBSCRIBE_FIRST_BYTE)
}

pub(crate) fn decode_unsubscribe_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_unsubscribe_packet3";
    validate_first_byte(first_byte, UNSUBSCRIBE_FIRST_BYTE, function_name)?;
    validate_body_present(reader, function_name)?;

    let mut packet = UnsubscribePacket {
        packet_id: reader.read_u16()?,
        ..Default::default()
    };

    while !reader.end_of_body() {
        packet.topic_filters.push(reader.read_length_prefixed_string()?);
    }

    if packet.topic_filters.is_empty() {
        let message = format!("{} - unsubscribe packet with no topic filters", function_name);
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    Ok(MqttPacket::Unsubscribe(packet))
}

impl fmt::Display for UnsubscribePacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UnsubscribePacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        write!(f, " topic_filters: [")?;
        for (i, topic_filter) in self.topic_filters.iter().enumerate() {
            write!(f, " {}:\"{}\"", i, topic_filter)?;
        }
        write!(f, " ]")?;
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use assert_matches::assert_matches;

    #[test]
    fn unsubscribe_round_trip_encode_decode() {
        let packet = UnsubscribePacket {
            packet_id: 123,
            topic_filters: vec![ "hello/world".to_string(), "a/+/#".to_string() ],
        };

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Unsubscribe(packet.clone()), ProtocolVersion::V311));
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Unsubscribe(packet), ProtocolVersion::V310));
    }

    #[test]
    fn unsubscribe_encode_layout() {
        let packet = MqttPacket::Unsubscribe(UnsubscribePacket {
            packet_id: 2,
            topic_filters: vec![ "x".to_string() ],
        });

        assert_eq!(vec![0xA2u8, 5, 0, 2, 0, 1, b'x'], encode_packet_for_test(&packet, ProtocolVersion::V311));
    }

    #[test]
    fn unsubscribe_encode_failure_no_topic_filters() {
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut writer = PacketWriter::new(&pool);

        let packet = MqttPacket::Unsubscribe(UnsubscribePacket {
            packet_id: 2,
            ..Default::default()
        });

        assert_matches!(encode_unsubscribe_packet3(&packet, &mut writer), Err(BrokerError::ProtocolViolation(_)));
    }

    #[test]
    fn unsubscribe_decode_failure_no_topic_filters() {
        let body = [0u8, 2];
        let mut reader = PacketBodyReader::new(&body);
        assert_matches!(decode_unsubscribe_packet3(UNSUBSCRIBE_FIRST_BYTE, &mut reader), Err(BrokerError::ProtocolViolation(_)));
    }

    #[test]
    fn unsubscribe_decode_failure_truncated_topic_filter() {
        let body = [0u8, 2, 0, 5, b'a'];
        let mut reader = PacketBodyReader::new(&body);
        assert_matches!(decode_unsubscribe_packet3(UNSUBSCRIBE_FIRST_BYTE, &mut reader), Err(BrokerError::UnexpectedEndOfPacket(_)));
    }

    #[test]
    fn unsubscribe_decode_failure_bad_fixed_header() {
        let packet = UnsubscribePacket {
            packet_id: 2,
            topic_filters: vec![ "x".to_string() ],
        };

        do_fixed_header_flag_decode_failure_test(&MqttPacket::Unsubscribe(packet), ProtocolVersion::V311, 1);
    }
}
