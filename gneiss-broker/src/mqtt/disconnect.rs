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

pub(crate) fn encode_disconnect_packet3(packet: &MqttPacket, _: &mut PacketWriter) -> BrokerResult<u8> {
    get_packet_variant!(packet, Disconnect, "encode_disconnect_packet3");

    Ok(DISCONNECT_FIRST_BYTE)
}

pub(crate) fn decode_disconnect_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_disconnect_packet3";
    validate_first_byte(first_byte, DISCONNECT_FIRST_BYTE, function_name)?;
    validate_body_consumed(reader, function_name)?;

    Ok(MqttPacket::Disconnect(DisconnectPacket {}))
}

impl fmt::Display for DisconnectPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DisconnectPacket {{}}")
    }
}
