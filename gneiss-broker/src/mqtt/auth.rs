/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::decode::utils::*;
use crate::encode::*;
use crate::error::{BrokerError, BrokerResult};
use crate::logging::*;
use crate::mqtt::*;

use log::*;

use std::fmt;

// AUTH is an MQTT5 packet; an MQTT 3 connection neither sends nor accepts it
pub(crate) fn encode_auth_packet3(_: &MqttPacket, _: &mut PacketWriter) -> BrokerResult<u8> {
    let message = "encode_auth_packet3 - AUTH packets are not part of MQTT 3";
    error!("{}", message);
    Err(BrokerError::new_protocol_violation(message))
}

pub(crate) fn decode_auth_packet3(first_byte: u8, _: &mut PacketBodyReader) -> BrokerResult<MqttPacket> {
    let message = format!("decode_auth_packet3 - AUTH packet ({:#04x}) received on an MQTT 3 connection", first_byte);
    error!("{}", message);
    Err(BrokerError::new_protocol_violation(message))
}

impl fmt::Display for AuthPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AuthPacket {{")?;
        log_enum!(self.reason_code, f, "reason_code");
        write!(f, " }}")
    }
}
