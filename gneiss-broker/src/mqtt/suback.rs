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

pub(crate) fn encode_suback_packet3(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let suback = get_packet_variant!(packet, Suback, "encode_suback_packet3");

    writer.write_u16(suback.packet_id);
    for return_code in &suback.return_codes {
        writer.write_u8(*return_code as u8);
    }

    Ok(SUBACK_FIRST_BYTE)
}

pub(crate) fn decode_suback_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_suback_packet3";
    validate_first_byte(first_byte, SUBACK_FIRST_BYTE, function_name)?;
    validate_body_present(reader, function_name)?;

    let mut packet = SubackPacket {
        packet_id: reader.read_u16()?,
        ..Default::default()
    };

    while !reader.end_of_body() {
        packet.return_codes.push(SubscribeReturnCode::try_from(reader.read_u8()?)?);
    }

    Ok(MqttPacket::Suback(packet))
}

impl fmt::Display for SubackPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SubackPacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        write!(f, " return_codes: [")?;
        for (i, return_code) in self.return_codes.iter().enumerate() {
            write!(f, " {}:{:?}", i, return_code)?;
        }
        write!(f, " ]")?;
        write!(f, " }}")
    }
}
