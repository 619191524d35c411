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

const SUBSCRIPTION_REQUESTED_QOS_RESERVED_MASK : u8 = !QOS_MASK;

pub(crate) fn encode_subscribe_packet3(packet: &MqttPacket, writer: &mut PacketWriter) -> BrokerResult<u8> {
    let subscribe = get_packet_variant!(packet, Subscribe, "encode_subscribe_packet3");

    if subscribe.subscriptions.is_empty() {
        let message = "encode_subscribe_packet3 - subscribe packet with no subscriptions";
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    writer.write_u16(subscribe.packet_id);
    for subscription in &subscribe.subscriptions {
        writer.write_length_prefixed_string(&subscription.topic_filter)?;
        writer.write_u8(subscription.qos as u8);
    }

    Ok(SUBSCRIBE_FIRST_BYTE)
}

/*
 * Topic filters are not validated here.  An invalid filter is a per-subscription failure that
 * is reported in the SUBACK rather than a reason to drop the connection.
 */
pub(crate) fn decode_subscribe_packet3(first_byte: u8, reader: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let function_name = "decode_subscribe_packet3";
    validate_first_byte(first_byte, SUBSCRIBE_FIRST_BYTE, function_name)?;
    validate_body_present(reader, function_name)?;

    let mut packet = SubscribePacket {
        packet_id: reader.read_u16()?,
        ..Default::default()
    };

    while !reader.end_of_body() {
        let topic_filter = reader.read_length_prefixed_string()?;
        let requested_qos = reader.read_u8()?;
        if (requested_qos & SUBSCRIPTION_REQUESTED_QOS_RESERVED_MASK) != 0 {
            let message = format!("{} - reserved bits set in requested qos ({:#04x})", function_name, requested_qos);
            error!("{}", message);
            return Err(BrokerError::new_malformed_packet(message));
        }

        packet.subscriptions.push(Subscription {
            topic_filter,
            qos: QualityOfService::try_from(requested_qos)?,
        });
    }

    if packet.subscriptions.is_empty() {
        let message = format!("{} - subscribe packet with no subscriptions", function_name);
        error!("{}", message);
        return Err(BrokerError::new_protocol_violation(message));
    }

    Ok(MqttPacket::Subscribe(packet))
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        log_string!(self.topic_filter, f, "topic_filter");
        log_enum!(self.qos, f, "qos");
        write!(f, " )")
    }
}

impl fmt::Display for SubscribePacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SubscribePacket {{")?;
        log_primitive_value!(self.packet_id, f, "packet_id");
        write!(f, " subscriptions: [")?;
        for (i, subscription) in self.subscriptions.iter().enumerate() {
            write!(f, " {}:{}", i, subscription)?;
        }
        write!(f, " ]")?;
        write!(f, " }}")
    }
}
