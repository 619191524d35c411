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

// MQTT 3.1 has no session present flag; the first body byte is reserved
pub(crate) fn encode_connack_packet310(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let connack = get_packet_variant!(packet, Connack, "encode_connack_packet310");

    writer.write_u8(0);
    writer.write_u8(connack.return_code as u8);

    Ok(CONNACK_FIRST_BYTE)
}

pub(crate) fn encode_connack_packet311(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let connack = get_packet_variant!(packet, Connack, "encode_connack_packet311");

    writer.write_u8(if connack.session_present { CONNACK_SESSION_PRESENT_FLAG_MASK } else { 0 });
    writer.write_u8(connack.return_code as u8);

    Ok(CONNACK_FIRST_BYTE)
}

fn validate_connack_body_present(reader: &PacketBodyReader, function_name: &str) -> BrokerResult<()> {
    if reader.end_of_body() {
        let message = format!("{} - empty body", function_name);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    Ok(())
}

pub(crate) fn decode_connack_packet310(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_connack_packet310";
    validate_first_byte(first_byte, CONNACK_FIRST_BYTE, function_name)?;
    validate_connack_body_present(reader, function_name)?;

    reader.read_u8()?;
    let return_code = ConnectReturnCode::try_from(reader.read_u8()?)?;
    validate_body_consumed(reader, function_name)?;

    Ok(MqttPacket::Connack(ConnackPacket {
        session_present: false,
        return_code,
    }))
}

pub(crate) fn decode_connack_packet311(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_connack_packet311";
    validate_first_byte(first_byte, CONNACK_FIRST_BYTE, function_name)?;
    validate_connack_body_present(reader, function_name)?;

    let flags = reader.read_u8()?;
    if (flags & !CONNACK_SESSION_PRESENT_FLAG_MASK) != 0 {
        let message = format!("{} - reserved acknowledge flags set", function_name);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    let return_code = ConnectReturnCode::try_from(reader.read_u8()?)?;
    validate_body_consumed(reader, function_name)?;

    Ok(MqttPacket::Connack(ConnackPacket {
        session_present: (flags & CONNACK_SESSION_PRESENT_FLAG_MASK) != 0,
        return_code,
    }))
}

impl fmt::Display for ConnackPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConnackPacket {{")?;
        log_primitive_value!(self.session_present, f, "session_present");
        log_enum!(self.return_code, f, "return_code");
        write!(f, " }}")
    }
}
