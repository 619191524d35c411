/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Version-specific packet formatters.

Each supported protocol version is described by a table of encode/decode function pairs,
indexed by packet control code.  MQTT 3.1.1 starts from the MQTT 3.1 table and replaces only
the entries whose wire format changed (CONNECT and CONNACK); every other packet type shares
the same codec functions.
 */

use crate::decode::RawPacket;
use crate::decode::utils::PacketBodyReader;
use crate::encode::PacketWriter;
use crate::encode::utils::*;
use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;
use crate::mqtt::auth::*;
use crate::mqtt::connack::*;
use crate::mqtt::connect::*;
use crate::mqtt::disconnect::*;
use crate::mqtt::pingreq::*;
use crate::mqtt::pingresp::*;
use crate::mqtt::puback::*;
use crate::mqtt::pubcomp::*;
use crate::mqtt::publish::*;
use crate::mqtt::pubrec::*;
use crate::mqtt::pubrel::*;
use crate::mqtt::suback::*;
use crate::mqtt::subscribe::*;
use crate::mqtt::unsuback::*;
use crate::mqtt::unsubscribe::*;
use crate::mqtt::utils::*;

use log::*;

use std::fmt;

// Space reserved in front of the body for the fixed header: one type byte and a maximal
// remaining-length field
const FIXED_HEADER_RESERVATION : usize = 1 + MAXIMUM_VARIABLE_LENGTH_INTEGER_ENCODE_SIZE;

/// Serializes the body of a packet into the writer and returns the fixed header first byte
pub(crate) type EncodeFn = fn(&MqttPacket, &mut PacketWriter) -> BrokerResult<u8>;

/// Builds a packet from its fixed header first byte and a reader over its body
pub(crate) type DecodeFn = fn(u8, &mut PacketBodyReader) -> BrokerResult<MqttPacket>;

#[derive(Copy, Clone)]
pub(crate) struct PacketCodec {
    pub(crate) encode: EncodeFn,
    pub(crate) decode: DecodeFn,
}

type PacketCodecTable = [PacketCodec; PACKET_TYPE_COUNT];

// indexed by control code - 1
const MQTT310_CODECS : PacketCodecTable = [
    PacketCodec { encode: encode_connect_packet310, decode: decode_connect_packet310 },
    PacketCodec { encode: encode_connack_packet310, decode: decode_connack_packet310 },
    PacketCodec { encode: encode_publish_packet3, decode: decode_publish_packet3 },
    PacketCodec { encode: encode_puback_packet3, decode: decode_puback_packet3 },
    PacketCodec { encode: encode_pubrec_packet3, decode: decode_pubrec_packet3 },
    PacketCodec { encode: encode_pubrel_packet3, decode: decode_pubrel_packet3 },
    PacketCodec { encode: encode_pubcomp_packet3, decode: decode_pubcomp_packet3 },
    PacketCodec { encode: encode_subscribe_packet3, decode: decode_subscribe_packet3 },
    PacketCodec { encode: encode_suback_packet3, decode: decode_suback_packet3 },
    PacketCodec { encode: encode_unsubscribe_packet3, decode: decode_unsubscribe_packet3 },
    PacketCodec { encode: encode_unsuback_packet3, decode: decode_unsuback_packet3 },
    PacketCodec { encode: encode_pingreq_packet3, decode: decode_pingreq_packet3 },
    PacketCodec { encode: encode_pingresp_packet3, decode: decode_pingresp_packet3 },
    PacketCodec { encode: encode_disconnect_packet3, decode: decode_disconnect_packet3 },
    PacketCodec { encode: encode_auth_packet3, decode: decode_auth_packet3 },
];

const MQTT311_OVERRIDES : [(PacketType, PacketCodec); 2] = [
    (PacketType::Connect, PacketCodec { encode: encode_connect_packet311, decode: decode_connect_packet311 }),
    (PacketType::Connack, PacketCodec { encode: encode_connack_packet311, decode: decode_connack_packet311 }),
];

fn apply_overrides(base: &PacketCodecTable, overrides: &[(PacketType, PacketCodec)]) -> PacketCodecTable {
    let mut table = *base;
    for (packet_type, codec) in overrides {
        table[codec_index(*packet_type)] = *codec;
    }

    table
}

fn codec_index(packet_type: PacketType) -> usize {
    (packet_type.control_code() - 1) as usize
}

fn build_codec_table(protocol_version: ProtocolVersion) -> BrokerResult<PacketCodecTable> {
    match protocol_version {
        ProtocolVersion::V310 => {
            Ok(MQTT310_CODECS)
        }
        ProtocolVersion::V311 => {
            Ok(apply_overrides(&MQTT310_CODECS, &MQTT311_OVERRIDES))
        }
        ProtocolVersion::V500 => {
            let message = "build_codec_table - MQTT5 is not supported";
            error!("{}", message);
            Err(BrokerError::new_unimplemented(message))
        }
    }
}

/// Encodes and decodes packets for a single protocol version.  Selected once per connection,
/// typically from the version announced by the client's CONNECT.
#[derive(Clone)]
pub struct PacketFormatter {
    protocol_version: ProtocolVersion,
    codecs: PacketCodecTable,
}

impl fmt::Debug for PacketFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketFormatter")
            .field("protocol_version", &self.protocol_version)
            .finish_non_exhaustive()
    }
}

impl PacketFormatter {

    /// Creates a formatter for the given protocol version.  Fails with
    /// [`BrokerError::Unimplemented`] for MQTT5.
    pub fn new(protocol_version: ProtocolVersion) -> BrokerResult<PacketFormatter> {
        Ok(PacketFormatter {
            protocol_version,
            codecs: build_codec_table(protocol_version)?,
        })
    }

    /// Protocol version this formatter speaks
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Encodes a complete framed packet (fixed header, remaining length, body) into the
    /// writer and returns a slice over the framed bytes.
    ///
    /// The body is written first, behind a reserved prefix; the fixed header is then
    /// back-patched directly in front of the body once its length is known.
    pub fn encode<'w>(&self, packet: &MqttPacket, writer: &'w mut PacketWriter) -> BrokerResult<&'w [u8]> {
        let codec = self.codecs[codec_index(packet.packet_type())];

        writer.reset(FIXED_HEADER_RESERVATION);
        let first_byte = (codec.encode)(packet, writer)?;

        let body_length = writer.length() - FIXED_HEADER_RESERVATION;
        let header_length = 1 + compute_variable_length_integer_encode_size(body_length)?;
        let packet_start = FIXED_HEADER_RESERVATION - header_length;

        writer.seek(packet_start);
        writer.write_u8(first_byte);
        writer.write_variable_length_integer(body_length as u32)?;

        Ok(&writer.buffer()[packet_start..])
    }

    /// Decodes the body of a framed packet
    pub fn decode(&self, fixed_header: u8, body: &[u8]) -> BrokerResult<MqttPacket> {
        let packet_type = control_code_to_packet_type(fixed_header >> 4)?;
        let codec = self.codecs[codec_index(packet_type)];

        let mut reader = PacketBodyReader::new(body);
        (codec.decode)(fixed_header, &mut reader)
    }

    /// Decodes a packet produced by the stream decoder
    pub fn decode_raw(&self, raw_packet: &RawPacket) -> BrokerResult<MqttPacket> {
        self.decode(raw_packet.fixed_header, &raw_packet.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testing::*;
    use crate::encode::*;
    use assert_matches::assert_matches;

    #[test]
    fn mqtt5_formatter_unimplemented() {
        assert_matches!(PacketFormatter::new(ProtocolVersion::V500), Err(BrokerError::Unimplemented(_)));
    }

    #[test]
    fn formatter_debug_shows_protocol_version() {
        let formatter = PacketFormatter::new(ProtocolVersion::V310);
        assert_matches!(&formatter, Ok(_));
        assert!(format!("{:?}", formatter.unwrap()).contains("V310"));
    }

    #[test]
    fn formatter_reports_protocol_version() {
        assert_eq!(ProtocolVersion::V310, PacketFormatter::new(ProtocolVersion::V310).unwrap().protocol_version());
        assert_eq!(ProtocolVersion::V311, PacketFormatter::new(ProtocolVersion::V311).unwrap().protocol_version());
    }

    #[test]
    fn mqtt311_shares_unchanged_codecs() {
        let packet = MqttPacket::Subscribe(SubscribePacket {
            packet_id: 5,
            subscriptions: vec![ Subscription::new("a/+", QualityOfService::AtLeastOnce) ],
        });

        let mqtt310 = encode_packet_for_test(&packet, ProtocolVersion::V310);
        assert_eq!(mqtt310, encode_packet_for_test(&packet, ProtocolVersion::V311));
        assert_eq!(packet, decode_packet_for_test(&mqtt310, ProtocolVersion::V311).unwrap());
    }

    #[test]
    fn encode_frames_multi_byte_remaining_length() {
        let packet = MqttPacket::Publish(PublishPacket {
            topic: "a".to_string(),
            payload: vec![7u8; 200],
            ..Default::default()
        });

        let encoded = encode_packet_for_test(&packet, ProtocolVersion::V311);

        // topic (3 bytes) + payload (200 bytes) = 203 = 0xCB 0x01
        assert_eq!(206, encoded.len());
        assert_eq!(&[0x30u8, 0xCB, 0x01, 0, 1, b'a'], &encoded[..6]);
    }

    #[test]
    fn encode_reuses_writer_across_packets() {
        let pool = BufferPool::new(4);
        let mut writer = PacketWriter::new(&pool);
        let formatter = PacketFormatter::new(ProtocolVersion::V311).unwrap();

        let large = MqttPacket::Publish(PublishPacket {
            topic: "a".to_string(),
            payload: vec![1u8; 300],
            ..Default::default()
        });
        assert_eq!(306, formatter.encode(&large, &mut writer).unwrap().len());

        let small = MqttPacket::Puback(PubackPacket { packet_id: 9 });
        assert_eq!(&[0x40u8, 2, 0, 9], formatter.encode(&small, &mut writer).unwrap());
    }

    #[test]
    fn failed_encode_leaves_writer_usable() {
        let pool = BufferPool::new(DEFAULT_WRITE_BUFFER_SIZE);
        let mut writer = PacketWriter::new(&pool);
        let formatter = PacketFormatter::new(ProtocolVersion::V311).unwrap();

        let auth = MqttPacket::Auth(AuthPacket::default());
        assert_matches!(formatter.encode(&auth, &mut writer), Err(BrokerError::ProtocolViolation(_)));

        let pingreq = MqttPacket::Pingreq(PingreqPacket {});
        assert_eq!(&[0xC0u8, 0], formatter.encode(&pingreq, &mut writer).unwrap());
    }

    #[test]
    fn decode_dispatches_by_control_code() {
        let formatter = PacketFormatter::new(ProtocolVersion::V311).unwrap();

        assert_eq!(MqttPacket::Pubcomp(PubcompPacket { packet_id: 258 }), formatter.decode(0x70, &[1, 2]).unwrap());
        assert_matches!(formatter.decode(0xF0, &[]), Err(BrokerError::ProtocolViolation(_)));
    }

    #[test]
    fn decode_rejects_reserved_control_code() {
        let formatter = PacketFormatter::new(ProtocolVersion::V311).unwrap();

        assert_matches!(formatter.decode(0x00, &[]), Err(BrokerError::MalformedPacket(_)));
    }

    #[test]
    fn connect_layout_differs_by_version() {
        let packet = MqttPacket::Connect(ConnectPacket {
            client_id: "c".to_string(),
            clean_session: true,
            keep_alive_interval_seconds: 60,
            ..Default::default()
        });

        let mqtt310 = encode_packet_for_test(&packet, ProtocolVersion::V310);
        let mqtt311 = encode_packet_for_test(&packet, ProtocolVersion::V311);
        assert_ne!(mqtt310, mqtt311);

        assert_eq!(packet, decode_packet_for_test(&mqtt310, ProtocolVersion::V310).unwrap());
        assert_eq!(packet, decode_packet_for_test(&mqtt311, ProtocolVersion::V311).unwrap());
        assert_matches!(decode_packet_for_test(&mqtt310, ProtocolVersion::V311), Err(BrokerError::ProtocolViolation(_)));
    }
}
