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

fn compute_connect_flags(packet: &ConnectPacket) -> BrokerResult<u8> {
    if packet.password.is_some() && packet.username.is_none() {
        let message = "compute_connect_flags - password set without a username";
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    let mut flags: u8 = 0;
    if packet.clean_session {
        flags |= CONNECT_PACKET_CLEAN_SESSION_FLAG_MASK;
    }

    if let Some(will) = &packet.will {
        flags |= CONNECT_PACKET_HAS_WILL_FLAG_MASK;
        flags |= (will.qos as u8) << CONNECT_PACKET_WILL_QOS_FLAG_SHIFT;
        if will.retain {
            flags |= CONNECT_PACKET_WILL_RETAIN_FLAG_MASK;
        }
    }

    if packet.password.is_some() {
        flags |= CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK;
    }

    if packet.username.is_some() {
        flags |= CONNECT_PACKET_HAS_USERNAME_FLAG_MASK;
    }

    Ok(flags)
}

fn write_connect_body(packet: &ConnectPacket, writer: &mut PacketWriter, protocol_name: &str, protocol_level: u8) -> BrokerResult<u8> {
    let flags = compute_connect_flags(packet)?;

    writer.write_length_prefixed_string(protocol_name)?;
    writer.write_u8(protocol_level);
    writer.write_u8(flags);
    writer.write_u16(packet.keep_alive_interval_seconds);
    writer.write_length_prefixed_string(&packet.client_id)?;

    if let Some(will) = &packet.will {
        writer.write_length_prefixed_string(&will.topic)?;
        writer.write_length_prefixed_bytes(&will.payload)?;
    }

    if let Some(username) = &packet.username {
        writer.write_length_prefixed_string(username)?;
    }

    if let Some(password) = &packet.password {
        writer.write_length_prefixed_bytes(password)?;
    }

    Ok(CONNECT_FIRST_BYTE)
}

pub(crate) fn encode_connect_packet310(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let connect = get_packet_variant!(packet, Connect, "encode_connect_packet310");
    write_connect_body(connect, writer, MQTT310_PROTOCOL_NAME, MQTT310_PROTOCOL_LEVEL)
}

pub(crate) fn encode_connect_packet311(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let connect = get_packet_variant!(packet, Connect, "encode_connect_packet311");
    write_connect_body(connect, writer, MQTT311_PROTOCOL_NAME, MQTT311_PROTOCOL_LEVEL)
}

fn read_connect_body(first_byte: u8, reader: &mut PacketBodyReader, protocol_name: &str, protocol_level: u8, function_name: &str) -> BrokerResult<MqttPacket> {
    validate_first_byte(first_byte, CONNECT_FIRST_BYTE, function_name)?;
    validate_body_present(reader, function_name)?;

    let name = reader.read_length_prefixed_string()?;
    let level = reader.read_u8()?;
    if name != protocol_name || level != protocol_level {
        let message = format!("{} - unexpected protocol name/level ({}, {})", function_name, name, level);
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    let flags = reader.read_u8()?;
    if (flags & CONNECT_PACKET_RESERVED_FLAG_MASK) != 0 {
        let message = format!("{} - reserved connect flag set", function_name);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    let has_will = (flags & CONNECT_PACKET_HAS_WILL_FLAG_MASK) != 0;
    let will_qos = QualityOfService::try_from((flags >> CONNECT_PACKET_WILL_QOS_FLAG_SHIFT) & QOS_MASK)?;
    let will_retain = (flags & CONNECT_PACKET_WILL_RETAIN_FLAG_MASK) != 0;
    if !has_will && (will_qos != QualityOfService::AtMostOnce || will_retain) {
        let message = format!("{} - will qos/retain set without a will", function_name);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    let has_username = (flags & CONNECT_PACKET_HAS_USERNAME_FLAG_MASK) != 0;
    let has_password = (flags & CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK) != 0;
    if has_password && !has_username {
        let message = format!("{} - password flag set without username flag", function_name);
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    let mut packet = ConnectPacket {
        clean_session: (flags & CONNECT_PACKET_CLEAN_SESSION_FLAG_MASK) != 0,
        keep_alive_interval_seconds: reader.read_u16()?,
        client_id: reader.read_length_prefixed_string()?,
        ..Default::default()
    };

    if has_will {
        let topic = reader.read_length_prefixed_string()?;
        let payload = reader.read_length_prefixed_bytes()?.to_vec();
        packet.will = Some(PublishPacket {
            topic,
            payload,
            qos: will_qos,
            retain: will_retain,
            ..Default::default()
        });
    }

    if has_username {
        packet.username = Some(reader.read_length_prefixed_string()?);
    }

    if has_password {
        packet.password = Some(reader.read_length_prefixed_bytes()?.to_vec());
    }

    validate_body_consumed(reader, function_name)?;

    Ok(MqttPacket::Connect(packet))
}

pub(crate) fn decode_connect_packet310(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    read_connect_body(first_byte, reader, MQTT310_PROTOCOL_NAME, MQTT310_PROTOCOL_LEVEL, "decode_connect_packet310")
}

pub(crate) fn decode_connect_packet311(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    read_connect_body(first_byte, reader, MQTT311_PROTOCOL_NAME, MQTT311_PROTOCOL_LEVEL, "decode_connect_packet311")
}

/// Determines which protocol revision a client speaks from the protocol name and level at the
/// front of its CONNECT body.
pub fn detect_protocol_version(connect_body: &[u8]) -> BrokerResult<ProtocolVersion> {
    let mut reader = PacketBodyReader::new(connect_body);
    validate_body_present(&reader, "detect_protocol_version")?;

    let name = reader.read_length_prefixed_string()?;
    let level = reader.read_u8()?;

    match (name.as_str(), level) {
        (MQTT310_PROTOCOL_NAME, MQTT310_PROTOCOL_LEVEL) => { Ok(ProtocolVersion::V310) }
        (MQTT311_PROTOCOL_NAME, MQTT311_PROTOCOL_LEVEL) => { Ok(ProtocolVersion::V311) }
        (MQTT311_PROTOCOL_NAME, MQTT5_PROTOCOL_LEVEL) => { Ok(ProtocolVersion::V500) }
        _ => {
            let message = format!("detect_protocol_version - unsupported protocol name/level ({}, {})", name, level);
            error!("{}", message);
            Err(BrokerError::new_protocol_violation(message))
        }
    }
}

impl fmt::Display for ConnectPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConnectPacket {{")?;
        log_primitive_value!(self.keep_alive_interval_seconds, f, "keep_alive_interval_seconds");
        log_primitive_value!(self.clean_session, f, "clean_session");
        log_string!(self.client_id, f, "client_id");
        log_optional_string_sensitive!(self.username, f, "username");
        log_optional_binary_data_sensitive!(self.password, f, "password");

        if let Some(will) = &self.will {
            write!(f, " will: {{")?;
            log_string!(will.topic, f, "topic");
            log_enum!(will.qos, f, "qos");
            log_primitive_value!(will.retain, f, "retain");
            log_binary_data!(will.payload, f, "payload");
            write!(f, " }}")?;
        }

        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::testing::*;
    use assert_matches::assert_matches;

    fn create_connect_packet_all_fields() -> ConnectPacket {
        ConnectPacket {
            keep_alive_interval_seconds: 1200,
            clean_session: true,
            client_id: "AClientId".to_string(),
            username: Some("AUsername".to_string()),
            password: Some("Unsecure".as_bytes().to_vec()),
            will: Some(PublishPacket {
                topic: "in/rememberance".to_string(),
                qos: QualityOfService::ExactlyOnce,
                retain: true,
                payload: "I'llbealright".as_bytes().to_vec(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn connect_round_trip_encode_decode_default311() {
        let packet = ConnectPacket {
            ..Default::default()
        };

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::V311));
    }

    #[test]
    fn connect_round_trip_encode_decode_default310() {
        let packet = ConnectPacket {
            client_id: "old".to_string(),
            ..Default::default()
        };

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::V310));
    }

    #[test]
    fn connect_round_trip_encode_decode_all_fields311() {
        let packet = create_connect_packet_all_fields();
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::V311));
    }

    #[test]
    fn connect_round_trip_encode_decode_all_fields310() {
        let packet = create_connect_packet_all_fields();
        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::V310));
    }

    #[test]
    fn connect_round_trip_encode_decode_username_only() {
        let packet = ConnectPacket {
            client_id: "me".to_string(),
            username: Some("only-me".to_string()),
            ..Default::default()
        };

        assert!(do_round_trip_encode_decode_test(&MqttPacket::Connect(packet), ProtocolVersion::V311));
    }

    #[test]
    fn connect_encode_layout311() {
        let packet = ConnectPacket {
            keep_alive_interval_seconds: 60,
            clean_session: true,
            client_id: "c".to_string(),
            ..Default::default()
        };

        let encoded = encode_packet_for_test(&MqttPacket::Connect(packet), ProtocolVersion::V311);
        assert_eq!(vec![0x10u8, 13, 0, 4, b'M', b'Q', b'T', b'T', 4, 0x02, 0, 60, 0, 1, b'c'], encoded);
    }

    #[test]
    fn connect_encode_layout310() {
        let packet = ConnectPacket {
            client_id: "c".to_string(),
            ..Default::default()
        };

        let encoded = encode_packet_for_test(&MqttPacket::Connect(packet), ProtocolVersion::V310);
        assert_eq!(vec![0x10u8, 15, 0, 6, b'M', b'Q', b'I', b's', b'd', b'p', 3, 0, 0, 0, 0, 1, b'c'], encoded);
    }

    #[test]
    fn connect_encode_failure_password_without_username() {
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut writer = PacketWriter::new(&pool);
        let packet = MqttPacket::Connect(ConnectPacket {
            client_id: "thing".to_string(),
            password: Some(b"secret".to_vec()),
            ..Default::default()
        });

        assert_matches!(encode_connect_packet311(&packet, &mut writer), Err(BrokerError::ProtocolViolation(_)));
        assert_matches!(encode_connect_packet310(&packet, &mut writer), Err(BrokerError::ProtocolViolation(_)));
    }

    #[test]
    fn connect_encode_failure_wrong_variant() {
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut writer = PacketWriter::new(&pool);

        assert_matches!(encode_connect_packet311(&MqttPacket::Pingreq(PingreqPacket{}), &mut writer), Err(BrokerError::InternalStateError(_)));
    }

    #[test]
    fn connect_decode_failure_bad_fixed_header() {
        let packet = create_connect_packet_all_fields();
        do_fixed_header_flag_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, 1);
    }

    #[test]
    fn connect_decode_failure_reserved_flag() {
        let packet = ConnectPacket::default();

        let set_reserved = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[9] |= CONNECT_PACKET_RESERVED_FLAG_MASK;
            clone
        };

        let error = do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, set_reserved);
        assert_matches!(error, BrokerError::MalformedPacket(_));
    }

    #[test]
    fn connect_decode_failure_wrong_protocol_name() {
        let packet = ConnectPacket::default();

        let corrupt_name = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[7] = b'X';
            clone
        };

        let error = do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, corrupt_name);
        assert_matches!(error, BrokerError::ProtocolViolation(_));
    }

    #[test]
    fn connect_decode_failure_wrong_protocol_level() {
        let packet = ConnectPacket::default();

        let corrupt_level = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[8] = MQTT5_PROTOCOL_LEVEL;
            clone
        };

        let error = do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, corrupt_level);
        assert_matches!(error, BrokerError::ProtocolViolation(_));
    }

    #[test]
    fn connect_decode_failure_password_flag_without_username() {
        let packet = ConnectPacket::default();

        let set_password_flag = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[9] |= CONNECT_PACKET_HAS_PASSWORD_FLAG_MASK;
            clone[1] += 2;
            clone.push(0);
            clone.push(0);
            clone
        };

        let error = do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, set_password_flag);
        assert_matches!(error, BrokerError::ProtocolViolation(_));
    }

    #[test]
    fn connect_decode_failure_will_qos_without_will() {
        let packet = ConnectPacket::default();

        let set_will_qos = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone[9] |= 1 << CONNECT_PACKET_WILL_QOS_FLAG_SHIFT;
            clone
        };

        let error = do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, set_will_qos);
        assert_matches!(error, BrokerError::MalformedPacket(_));
    }

    #[test]
    fn connect_decode_failure_truncated() {
        let packet = create_connect_packet_all_fields();

        let truncate = | bytes: &[u8] | -> Vec<u8> {
            let mut clone = bytes.to_vec();
            clone.pop();
            clone[1] -= 1;
            clone
        };

        let error = do_mutated_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311, truncate);
        assert_matches!(error, BrokerError::UnexpectedEndOfPacket(_));
    }

    #[test]
    fn connect_decode_failure_trailing_bytes() {
        let packet = ConnectPacket::default();
        do_trailing_bytes_decode_failure_test(&MqttPacket::Connect(packet), ProtocolVersion::V311);
    }

    #[test]
    fn connect_decode_failure_empty_body() {
        let empty : [u8; 0] = [];
        let mut reader = PacketBodyReader::new(&empty);
        assert_matches!(decode_connect_packet311(CONNECT_FIRST_BYTE, &mut reader), Err(BrokerError::ProtocolViolation(_)));
    }

    #[test]
    fn detect_protocol_versions() {
        let v311 = [0u8, 4, b'M', b'Q', b'T', b'T', 4, 0];
        let v5 = [0u8, 4, b'M', b'Q', b'T', b'T', 5, 0];
        let v310 = [0u8, 6, b'M', b'Q', b'I', b's', b'd', b'p', 3];
        let bad = [0u8, 4, b'M', b'Q', b'T', b'T', 3];

        assert_matches!(detect_protocol_version(&v311), Ok(ProtocolVersion::V311));
        assert_matches!(detect_protocol_version(&v5), Ok(ProtocolVersion::V500));
        assert_matches!(detect_protocol_version(&v310), Ok(ProtocolVersion::V310));
        assert_matches!(detect_protocol_version(&bad), Err(BrokerError::ProtocolViolation(_)));
        assert_matches!(detect_protocol_version(&[]), Err(BrokerError::ProtocolViolation(_)));
        assert_matches!(detect_protocol_version(&[0, 4, b'M']), Err(BrokerError::UnexpectedEndOfPacket(_)));
    }
}
