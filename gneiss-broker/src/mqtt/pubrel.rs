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

pub(crate) fn encode_pubrel_packet3(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let pubrel = get_packet_variant!(packet, Pubrel, "encode_pubrel_packet3");

    writer.write_u16(pubrel.packet_id);

    Ok(PUBREL_FIRST_BYTE)
}

pub(crate) fn decode_pubrel_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let packet_id = decode_packet_id_body(first_byte, PUBREL_FIRST_BYTE, reader, "decode_pubrel_packet3")?;

    Ok(MqttPacket::Pubrel(PubrelPacket {
        packet_id,
    }))
}

define_ack_packet_display_trait!(PubrelPacket, "PubrelPacket");

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use assert_matches::assert_matches;

    #[test]
    fn pubrel_round_trip_encode_decode() {
        let packet = PubrelPacket {
            packet_id: 123,
        };

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pubrel(packet.clone()), ProtocolVersion::V311));
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pubrel(packet), ProtocolVersion::V310));
    }

    #[test]
    fn pubrel_encode_layout() {
        let packet = MqttPacket::Pubrel(PubrelPacket {
            packet_id: 0x1234,
        });

        assert_eq!(vec![0x62u8, 2, 0x12, 0x34], encode_packet_for_test(&packet, ProtocolVersion::V311));
    }

    #[test]
    fn pubrel_decode_failure_empty_body() {
        let empty : [u8; 0] = [];
        let mut reader = PacketBodyReader::new(&empty);
        assert_matches!(decode_pubrel_packet3(PUBREL_FIRST_BYTE, &mut reader), Err(BrokerError::ProtocolViolation(_)));
    }

    #[test]
    fn pubrel_decode_failure_truncated_body() {
        let body = [7u8];
        let mut reader = PacketBodyReader::new(&body);
        assert_matches!(decode_pubrel_packet3(PUBREL_FIRST_BYTE, &mut reader), Err(BrokerError::UnexpectedEndOfPacket(_)));
    }

    #[test]
    fn pubrel_decode_failure_bad_fixed_header() {
        let packet = PubrelPacket {
            packet_id: 5,
        };

        do_fixed_header_flag_decode_failure_test(&MqttPacket::Pubrel(packet), ProtocolVersion::V311, 1);
    }

    #[test]
    fn pubrel_decode_failure_trailing_bytes() {
        let packet = PubrelPacket {
            packet_id: 5,
        };

        do_trailing_bytes_decode_failure_test(&MqttPacket::Pubrel(packet), ProtocolVersion::V311);
    }
}
