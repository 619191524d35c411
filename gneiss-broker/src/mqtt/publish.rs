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
use crate::validate::*;

use log::*;

use std::fmt;

fn compute_publish_fixed_header_first_byte(packet: &PublishPacket) -> u8 {
    let mut first_byte: u8 = PACKET_TYPE_PUBLISH << 4;

    if packet.duplicate {
        first_byte |= PUBLISH_PACKET_FIXED_HEADER_DUPLICATE_FLAG;
    }

    first_byte |= (packet.qos as u8) << 1;

    if packet.retain {
        first_byte |= PUBLISH_PACKET_FIXED_HEADER_RETAIN_FLAG;
    }

    first_byte
}

fn validate_publish_packet_outbound(packet: &PublishPacket) -> BrokerResult<()> {
    if !is_valid_topic(&packet.topic) {
        let message = "validate_publish_packet_outbound - invalid topic";
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    if packet.qos == QualityOfService::AtMostOnce {
        if packet.packet_id != 0 {
            let message = "validate_publish_packet_outbound - QoS 0 publish with non-zero packet id";
            error!("{}", message);
            return Err(BrokerError::new_protocol_violation(message));
        }

        if packet.duplicate {
            let message = "validate_publish_packet_outbound - QoS 0 publish with duplicate flag set";
            error!("{}", message);
            return Err(BrokerError::new_protocol_violation(message));
        }
    } else if packet.packet_id == 0 {
        let message = "validate_publish_packet_outbound - QoS 1+ publish with zero packet id";
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    Ok(())
}

pub(crate) fn encode_publish_packet3(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let publish = get_packet_variant!(packet, Publish, "encode_publish_packet3");
    validate_publish_packet_outbound(publish)?;

    writer.write_length_prefixed_string(&publish.topic)?;
    if publish.qos != QualityOfService::AtMostOnce {
        writer.write_u16(publish.packet_id);
    }

    writer.write_bytes(&publish.payload);

    Ok(compute_publish_fixed_header_first_byte(publish))
}

pub(crate) fn decode_publish_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_publish_packet3";
    if (first_byte >> 4) != PACKET_TYPE_PUBLISH {
        let message = format!("{} - invalid first byte ({:#04x})", function_name, first_byte);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    validate_body_present(reader, function_name)?;

    let mut packet = PublishPacket {
        qos: QualityOfService::try_from((first_byte >> 1) & QOS_MASK)?,
        duplicate: (first_byte & PUBLISH_PACKET_FIXED_HEADER_DUPLICATE_FLAG) != 0,
        retain: (first_byte & PUBLISH_PACKET_FIXED_HEADER_RETAIN_FLAG) != 0,
        ..Default::default()
    };

    if packet.duplicate && packet.qos == QualityOfService::AtMostOnce {
        let message = format!("{} - duplicate flag set on a QoS 0 publish", function_name);
        error!("{}", message);
        return Err(BrokerError::new_malformed_packet(message));
    }

    packet.topic = reader.read_length_prefixed_string()?;
    if !is_valid_topic(&packet.topic) {
        let message = format!("{} - invalid topic", function_name);
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    if packet.qos != QualityOfService::AtMostOnce {
        packet.packet_id = reader.read_u16()?;
        if packet.packet_id == 0 {
            let message = format!("{} - zero packet id on a QoS 1+ publish", function_name);
            error!("{}", message);
            return Err(BrokerError::new_protocol_violation(message));
        }
    }

    packet.payload = reader.read_remaining_bytes().to_vec();

    Ok(MqttPacket::Publish(packet))
}

impl fmt::Display for PublishPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublishPacket {{")?;
        if self.packet_id != 0 {
            log_primitive_value!(self.packet_id, f, "packet_id");
        }

        log_string!(self.topic, f, "topic");
        log_enum!(self.qos, f, "qos");
        log_primitive_value!(self.duplicate, f, "duplicate");
        log_primitive_value!(self.retain, f, "retain");
        log_binary_data!(self.payload, f, "payload");
        write!(f, " }}")
    }
}
