/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::encode::*;
use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;
use crate::mqtt::utils::*;

use log::*;

use std::fmt;

pub(crate) fn encode_pingreq_packet3(packet: &MqttPacket, _: &mut PacketWriter) -> BrokerResult<u8> {
    get_packet_variant!(packet, Pingreq, "encode_pingreq_packet3");

    Ok(PINGREQ_FIRST_BYTE)
}

pub(crate) fn decode_pingreq_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_pingreq_packet3";
    validate_first_byte(first_byte, PINGREQ_FIRST_BYTE, function_name)?;
    validate_body_consumed(reader, function_name)?;

    Ok(MqttPacket::Pingreq(PingreqPacket {}))
}

impl fmt::Display for PingreqPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PingreqPacket {{}}")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use assert_matches::assert_matches;

    #[test]
    fn pingreq_round_trip_encode_decode() {
        let packet = PingreqPacket {};
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pingreq(packet.clone()), ProtocolVersion::V311));
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pingreq(packet), ProtocolVersion::V310));
    }

    #[test]
    fn pingreq_encode_layout() {
        let packet = MqttPacket::Pingreq(PingreqPacket {});
        assert_eq!(vec![0xc0u8, 0], encode_packet_for_test(&packet, ProtocolVersion::V311));
    }

    #[test]
    fn pingreq_decode_failure_non_empty_body() {
        let body = [0u8];
        let mut reader = PacketBodyReader::new(&body);
        assert_matches!(decode_pingreq_packet3(PINGREQ_FIRST_BYTE, &mut reader), Err(BrokerError::MalformedPacket(_)));
    }

    #[test]
    fn pingreq_decode_failure_bad_fixed_header() {
        let packet = PingreqPacket {};
        do_fixed_header_flag_decode_failure_test(&MqttPacket::Pingreq(packet), ProtocolVersion::V311, 2);
    }
}
