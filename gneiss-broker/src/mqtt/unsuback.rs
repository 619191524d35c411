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

pub(crate) fn encode_unsuback_packet3(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let unsuback = get_packet_variant!(packet, Unsuback, "encode_unsuback_packet3");

    writer.write_u16(unsuback.packet_id);

    Ok(UNSUBACK_FIRST_BYTE)
}

pub(crate) fn decode_unsuback_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let packet_id = decode_packet_id_body(first_byte, UNSUBACK_FIRST_BYTE, reader, "decode_unsuback_packet3")?;

    Ok(MqttPacket::Unsuback(UnsubackPacket {
        packet_id,
    }))
}

define_ack_packet_display_trait!(UnsubackPacket, "UnsubackPacket");
