/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing miscellaneous constants and conversion functions related to the MQTT specification.
 */

use crate::decode::utils::PacketBodyReader;
use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;

use log::*;

pub(crate) const PACKET_TYPE_CONNECT: u8 = 1;
pub(crate) const PACKET_TYPE_CONNACK: u8 = 2;
pub(crate) const PACKET_TYPE_PUBLISH: u8 = 3;
pub(crate) const PACKET_TYPE_PUBACK: u8 = 4;
pub(crate) const PACKET_TYPE_PUBREC: u8 = 5;
pub(crate) const PACKET_TYPE_PUBREL: u8 = 6;
pub(crate) const PACKET_TYPE_PUBCOMP: u8 = 7;
pub(crate) const PACKET_TYPE_SUBSCRIBE: u8 = 8;
pub(crate) const PACKET_TYPE_SUBACK: u8 = 9;
pub(crate) const PACKET_TYPE_UNSUBSCRIBE: u8 = 10;
pub(crate) const PACKET_TYPE_UNSUBACK: u8 = 11;
pub(crate) const PACKET_TYPE_PINGREQ: u8 = 12;
pub(crate) const PACKET_TYPE_PINGRESP: u8 = 13;
pub(crate) const PACKET_TYPE_DISCONNECT: u8 = 14;
pub(crate) const PACKET_TYPE_AUTH: u8 = 15;

pub(crate) const PACKET_TYPE_COUNT: usize = 15;

pub(crate) const PUBLISH_PACKET_FIXED_HEADER_DUPLICATE_FLAG : u8 = 8;
pub(crate) const PUBLISH_PACKET_FIXED_HEADER_RETAIN_FLAG : u8 = 1;
pub(crate) const QOS_MASK : u8 = 3;

pub(crate) const CONNECT_PACKET_CLEAN_SESSION_FLAG_MASK : u8 = 1 << 1;
pub(crate) const CONNECT_PACKET_HAS_WILL_FLAG_MASK : u8 = 1 << 2;
pub(crate) const CONNECT_PACKET_WILL_QOS_FLAG_SHIFT : u8 = 3;
pub(crate) const CONNECT_PACKET_WILL_RETAIN_FLAG_MASK : u8 = 1 << 5;
pub(crate) const CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK : u8 = 1 << 6;
pub(crate) const CONNECT_PACKET_HAS_USERNAME_FLAG_MASK : u8 = 1 << 7;
pub(crate) const CONNECT_PACKET_RESERVED_FLAG_MASK : u8 = 1;

pub(crate) const CONNACK_SESSION_PRESENT_FLAG_MASK : u8 = 1;

pub(crate) const MQTT310_PROTOCOL_NAME : &str = "MQIsdp";
pub(crate) const MQTT311_PROTOCOL_NAME : &str = "MQTT";
pub(crate) const MQTT310_PROTOCOL_LEVEL : u8 = 3;
pub(crate) const MQTT311_PROTOCOL_LEVEL : u8 = 4;
pub(crate) const MQTT5_PROTOCOL_LEVEL : u8 = 5;

pub(crate) const CONNECT_FIRST_BYTE : u8 = PACKET_TYPE_CONNECT << 4;
pub(crate) const CONNACK_FIRST_BYTE : u8 = PACKET_TYPE_CONNACK << 4;
pub(crate) const PUBACK_FIRST_BYTE : u8 = PACKET_TYPE_PUBACK << 4;
pub(crate) const PUBREC_FIRST_BYTE : u8 = PACKET_TYPE_PUBREC << 4;
pub(crate) const PUBREL_FIRST_BYTE : u8 = (PACKET_TYPE_PUBREL << 4) | (0x02u8);
pub(crate) const PUBCOMP_FIRST_BYTE : u8 = PACKET_TYPE_PUBCOMP << 4;
pub(crate) const SUBSCRIBE_FIRST_BYTE : u8 = (PACKET_TYPE_SUBSCRIBE << 4) | (0x02u8);
pub(crate) const SUBACK_FIRST_BYTE : u8 = PACKET_TYPE_SUBACK << 4;
pub(crate) const UNSUBSCRIBE_FIRST_BYTE : u8 = (PACKET_TYPE_UNSUBSCRIBE << 4) | (0x02u8);
pub(crate) const UNSUBACK_FIRST_BYTE : u8 = PACKET_TYPE_UNSUBACK << 4;
pub(crate) const PINGREQ_FIRST_BYTE : u8 = PACKET_TYPE_PINGREQ << 4;
pub(crate) const PINGRESP_FIRST_BYTE : u8 = PACKET_TYPE_PINGRESP << 4;
pub(crate) const DISCONNECT_FIRST_BYTE : u8 = PACKET_TYPE_DISCONNECT << 4;

/// Converts an integer to an MQTT quality of service value.
pub fn convert_u8_to_quality_of_service(value: u8) -> BrokerResult<QualityOfService> {
    match value {
        0 => { Ok(QualityOfService::AtMostOnce) }
        1 => { Ok(QualityOfService::AtLeastOnce) }
        2 => { Ok(QualityOfService::ExactlyOnce) }
        _ => {
            let message = format!("convert_u8_to_quality_of_service - invalid quality of service value ({})", value);
            error!("{}", message);
            Err(BrokerError::new_malformed_packet(message))
        }
    }
}

/// Converts an integer to a CONNACK return code.
pub fn convert_u8_to_connect_return_code(value: u8) -> BrokerResult<ConnectReturnCode> {
    match value {
        0 => { Ok(ConnectReturnCode::Accepted) }
        1 => { Ok(ConnectReturnCode::UnacceptableProtocolVersion) }
        2 => { Ok(ConnectReturnCode::IdentifierRejected) }
        3 => { Ok(ConnectReturnCode::ServerUnavailable) }
        4 => { Ok(ConnectReturnCode::BadUserNameOrPassword) }
        5 => { Ok(ConnectReturnCode::NotAuthorized) }
        _ => {
            let message = format!("convert_u8_to_connect_return_code - invalid return code ({})", value);
            error!("{}", message);
            Err(BrokerError::new_malformed_packet(message))
        }
    }
}

/// Converts an integer to a SUBACK return code.
pub fn convert_u8_to_subscribe_return_code(value: u8) -> BrokerResult<SubscribeReturnCode> {
    match value {
        0 => { Ok(SubscribeReturnCode::GrantedQos0) }
        1 => { Ok(SubscribeReturnCode::GrantedQos1) }
        2 => { Ok(SubscribeReturnCode::GrantedQos2) }
        0x80 => { Ok(SubscribeReturnCode::Failure) }
        _ => {
            let message = format!("convert_u8_to_subscribe_return_code - invalid return code ({})", value);
            error!("{}", message);
            Err(BrokerError::new_malformed_packet(message))
        }
    }
}

/// Converts an integer to an AUTH reason code.
pub fn convert_u8_to_authenticate_reason_code(value: u8) -> BrokerResult<AuthenticateReasonCode> {
    match value {
        0 => { Ok(AuthenticateReasonCode::Success) }
        24 => { Ok(AuthenticateReasonCode::ContinueAuthentication) }
        25 => { Ok(AuthenticateReasonCode::ReAuthenticate) }
        _ => {
            let message = format!("convert_u8_to_authenticate_reason_code - invalid reason code ({})", value);
            error!("{}", message);
            Err(BrokerError::new_malformed_packet(message))
        }
    }
}

pub(crate) fn mqtt_packet_to_packet_type(packet: &MqttPacket) -> PacketType {
    match packet {
        MqttPacket::Connect(_) => { PacketType::Connect }
        MqttPacket::Connack(_) => { PacketType::Connack }
        MqttPacket::Publish(_) => { PacketType::Publish}
        MqttPacket::Puback(_) => { PacketType::Puback }
        MqttPacket::Pubrec(_) => { PacketType::Pubrec }
        MqttPacket::Pubrel(_) => { PacketType::Pubrel }
        MqttPacket::Pubcomp(_) => { PacketType::Pubcomp }
        MqttPacket::Subscribe(_) => { PacketType::Subscribe }
        MqttPacket::Suback(_) => { PacketType::Suback }
        MqttPacket::Unsubscribe(_) => { PacketType::Unsubscribe }
        MqttPacket::Unsuback(_) => { PacketType::Unsuback }
        MqttPacket::Pingreq(_) => { PacketType::Pingreq }
        MqttPacket::Pingresp(_) => { PacketType::Pingresp }
        MqttPacket::Disconnect(_) => { PacketType::Disconnect }
        MqttPacket::Auth(_) => { PacketType::Auth }
    }
}

pub(crate) fn packet_type_to_control_code(packet_type: PacketType) -> u8 {
    match packet_type {
        PacketType::Connect => { PACKET_TYPE_CONNECT }
        PacketType::Connack => { PACKET_TYPE_CONNACK }
        PacketType::Publish => { PACKET_TYPE_PUBLISH }
        PacketType::Puback => { PACKET_TYPE_PUBACK }
        PacketType::Pubrec => { PACKET_TYPE_PUBREC }
        PacketType::Pubrel => { PACKET_TYPE_PUBREL }
        PacketType::Pubcomp => { PACKET_TYPE_PUBCOMP }
        PacketType::Subscribe => { PACKET_TYPE_SUBSCRIBE }
        PacketType::Suback => { PACKET_TYPE_SUBACK }
        PacketType::Unsubscribe => { PACKET_TYPE_UNSUBSCRIBE }
        PacketType::Unsuback => { PACKET_TYPE_UNSUBACK }
        PacketType::Pingreq => { PACKET_TYPE_PINGREQ }
        PacketType::Pingresp => { PACKET_TYPE_PINGRESP }
        PacketType::Disconnect => { PACKET_TYPE_DISCONNECT }
        PacketType::Auth => { PACKET_TYPE_AUTH }
    }
}

pub(crate) fn control_code_to_packet_type(code: u8) -> BrokerResult<PacketType> {
    match code {
        PACKET_TYPE_CONNECT => { Ok(PacketType::Connect) }
        PACKET_TYPE_CONNACK => { Ok(PacketType::Connack) }
        PACKET_TYPE_PUBLISH => { Ok(PacketType::Publish) }
        PACKET_TYPE_PUBACK => { Ok(PacketType::Puback) }
        PACKET_TYPE_PUBREC => { Ok(PacketType::Pubrec) }
        PACKET_TYPE_PUBREL => { Ok(PacketType::Pubrel) }
        PACKET_TYPE_PUBCOMP => { Ok(PacketType::Pubcomp) }
        PACKET_TYPE_SUBSCRIBE => { Ok(PacketType::Subscribe) }
        PACKET_TYPE_SUBACK => { Ok(PacketType::Suback) }
        PACKET_TYPE_UNSUBSCRIBE => { Ok(PacketType::Unsubscribe) }
        PACKET_TYPE_UNSUBACK => { Ok(PacketType::Unsuback) }
        PACKET_TYPE_PINGREQ => { Ok(PacketType::Pingreq) }
        PACKET_TYPE_PINGRESP => { Ok(PacketType::Pingresp) }
        PACKET_TYPE_DISCONNECT => { Ok(PacketType::Disconnect) }
        PACKET_TYPE_AUTH => { Ok(PacketType::Auth) }
        _ => {
            let message = format!("control_code_to_packet_type - reserved or invalid control code ({})", code);
            error!("{}", message);
            Err(BrokerError::new_malformed_packet(message))
        }
    }
}

pub(crate) fn mqtt_packet_to_str(packet: &MqttPacket) -> &'static str {
    match packet {
        MqttPacket::Connect(_) => { "CONNECT" }
        MqttPacket::Connack(_) => { "CONNACK" }
        MqttPacket::Publish(_) => { "PUBLISH" }
        MqttPacket::Puback(_) => { "PUBACK" }
        MqttPacket::Pubrec(_) => { "PUBREC" }
        MqttPacket::Pubrel(_) => { "PUBREL" }
        MqttPacket::Pubcomp(_) => { "PUBCOMP" }
        MqttPacket::Subscribe(_) => { "SUBSCRIBE" }
        MqttPacket::Suback(_) => { "SUBACK" }
        MqttPacket::Unsubscribe(_) => { "UNSUBSCRIBE" }
        MqttPacket::Unsuback(_) => { "UNSUBACK" }
        MqttPacket::Pingreq(_) => { "PINGREQ" }
        MqttPacket::Pingresp(_) => { "PINGRESP" }
        MqttPacket::Disconnect(_) => { "DISCONNECT" }
        MqttPacket::Auth(_) => { "AUTH" }
    }
}

// Extracts a packet variant inside an encode function, failing with an internal state error if
// the formatter table dispatched the wrong packet type.
macro_rules! get_packet_variant {
    ($target: expr, $enum_variant: ident, $function_name: expr) => {
        match $target {
            MqttPacket::$enum_variant(packet) => { packet }
            _ => {
                let message = format!("{} - dispatched with wrong packet type", $function_name);
                error!("{}", message);
                return Err(BrokerError::new_internal_state_error(message));
            }
        }
    };
}

pub(crate) use get_packet_variant;

pub(crate) fn validate_first_byte(first_byte: u8, expected: u8, function_name: &str) -> BrokerResult<()> {
    if first_byte != expected {
        let message = format!("{} - invalid first byte ({:#04x})", function_name, first_byte);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    Ok(())
}

pub(crate) fn validate_body_consumed(reader: &PacketBodyReader, function_name: &str) -> BrokerResult<()> {
    if !reader.end_of_body() {
        let message = format!("{} - {} unexpected trailing bytes", function_name, reader.bytes_remaining());
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    Ok(())
}

pub(crate) fn validate_body_present(reader: &PacketBodyReader, function_name: &str) -> BrokerResult<()> {
    if reader.end_of_body() {
        let message = format!("{} - empty body where fields are mandatory", function_name);
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    Ok(())
}

// Shared body layout of the acknowledgement packets: a fixed first byte and a lone packet id
pub(crate) fn decode_packet_id_body(first_byte: u8, expected: u8, reader: &mut PacketBodyReader, function_name: &str) -> BrokerResult<u16> {
    validate_first_byte(first_byte, expected, function_name)?;
    validate_body_present(reader, function_name)?;

    let packet_id = reader.read_u16()?;
    validate_body_consumed(reader, function_name)?;

    Ok(packet_id)
}
