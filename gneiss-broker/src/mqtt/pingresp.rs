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

pub(crate) fn encode_pingresp_packet3(packet: &MqttPacket, _: &mut PacketWriter) -> BrokerResult<u8> {
    get_packet_variant!(packet, Pingresp, "encode_pingresp_packet3");

    Ok(PINGRESP_FIRST_BYTE)
}

pub(crate) fn decode_pingresp_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_pingresp_packet3";
    validate_first_byte(first_byte, PINGRESP_FIRST_BYTE, function_name)?;
    validate_body_consumed(reader, function_name)?;

    Ok(MqttPacket::Pingresp(PingrespPacket {}))
}

impl fmt::Display for PingrespPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PingrespPacket {{}}")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use assert_matches::assert_matches;

    #[test]
    fn pingresp_round_trip_encode_decode() {
        let packet = PingrespPacket {};
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pingresp(packet.clone()), ProtocolVersion::V311));
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Pingresp(packet), ProtocolVersion::V310));
    }

    #[test]
    fn pingresp_encode_layout() {
        let packet = MqttPacket::Pingresp(PingrespPacket {});
        assert_eq!(vec![0xd0u8, 0], encode_packet_for_test(&packet, ProtocolVersion::V311));
    }

    #[test]
    fn pingresp_decode_failure_non_empty_body() {
        let body = [0u8];
        let mut reader = PacketBodyReader::new(&body);
        assert_matches!(decode_pingresp_packet3(PINGRESP_FIRST_BYTE, &mut reader), Err(BrokerError::MalformedPacket(_)));
    }

    #[test]
    fn pingresp_decode_failure_bad_fixed_header() {
        let packet = PingrespPacket {};
        do_fixed_header_flag_decode_failure_test(&MqttPacket::Pingresp(packet), ProtocolVersion::V311, 2);
    }
}
