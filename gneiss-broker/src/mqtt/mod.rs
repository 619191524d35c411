/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Module containing a set of structured data types that model the MQTT 3.1 and 3.1.1 control
packets, along with the per-packet wire codec functions used by the protocol formatters.
 */

use std::fmt;
use crate::error::{BrokerError, BrokerResult};

pub(crate) mod auth;
pub(crate) mod connack;
pub(crate) mod connect;
pub(crate) mod disconnect;
pub(crate) mod pingreq;
pub(crate) mod pingresp;
pub(crate) mod puback;
pub(crate) mod pubcomp;
pub(crate) mod publish;
pub(crate) mod pubrec;
pub(crate) mod pubrel;
pub(crate) mod suback;
pub(crate) mod subscribe;
pub(crate) mod unsuback;
pub(crate) mod unsubscribe;
pub mod utils;

/// MQTT message delivery quality of service.
///
/// Enum values match [MQTT 3.1.1 spec](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718099) encoding values.
/// Variants are ordered by the strength of their delivery guarantee.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QualityOfService {

    /// The message is delivered according to the capabilities of the underlying network. No response is sent by the
    /// receiver and no retry is performed by the sender. The message arrives at the receiver either once or not at all.
    #[default]
    AtMostOnce = 0,

    /// A level of service that ensures that the message arrives at the receiver at least once.
    AtLeastOnce = 1,

    /// A level of service that ensures that the message arrives at the receiver exactly once.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QualityOfService {
    type Error = BrokerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        utils::convert_u8_to_quality_of_service(value)
    }
}

/// MQTT protocol revision spoken on a connection.  Detected from the protocol name and level
/// fields of the first CONNECT packet.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ProtocolVersion {

    /// MQTT 3.1, protocol name "MQIsdp", protocol level 3
    V310,

    /// MQTT 3.1.1, protocol name "MQTT", protocol level 4
    #[default]
    V311,

    /// MQTT 5, protocol name "MQTT", protocol level 5.  Recognized, but no formatter exists.
    V500,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V310 => { write!(f, "3.1") }
            ProtocolVersion::V311 => { write!(f, "3.1.1") }
            ProtocolVersion::V500 => { write!(f, "5.0") }
        }
    }
}

/// Server response to a connection attempt, carried by the CONNACK packet.
///
/// Enum values match [MQTT 3.1.1 spec](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718035) encoding values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ConnectReturnCode {

    /// Connection accepted
    #[default]
    Accepted = 0,

    /// The server does not support the level of the MQTT protocol requested by the client
    UnacceptableProtocolVersion = 1,

    /// The client identifier is correct UTF-8 but not allowed by the server
    IdentifierRejected = 2,

    /// The network connection has been made but the MQTT service is unavailable
    ServerUnavailable = 3,

    /// The data in the user name or password is malformed
    BadUserNameOrPassword = 4,

    /// The client is not authorized to connect
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = BrokerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        utils::convert_u8_to_connect_return_code(value)
    }
}

/// Per-subscription result carried by the SUBACK packet.
///
/// Enum values match [MQTT 3.1.1 spec](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718071) encoding values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum SubscribeReturnCode {

    /// Success with maximum QoS 0
    #[default]
    GrantedQos0 = 0,

    /// Success with maximum QoS 1
    GrantedQos1 = 1,

    /// Success with maximum QoS 2
    GrantedQos2 = 2,

    /// The subscription was rejected
    Failure = 0x80,
}

impl SubscribeReturnCode {

    /// Return code granting a subscription at the supplied quality of service
    pub fn granted(qos: QualityOfService) -> Self {
        match qos {
            QualityOfService::AtMostOnce => { SubscribeReturnCode::GrantedQos0 }
            QualityOfService::AtLeastOnce => { SubscribeReturnCode::GrantedQos1 }
            QualityOfService::ExactlyOnce => { SubscribeReturnCode::GrantedQos2 }
        }
    }
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = BrokerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        utils::convert_u8_to_subscribe_return_code(value)
    }
}

/// Reason code inside AUTH packets.  AUTH only exists in MQTT5.
///
/// Enum values match [MQTT5 spec](https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901220) encoding values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum AuthenticateReasonCode {

    /// Authentication is successful
    #[default]
    Success = 0,

    /// Continue the authentication with another step
    ContinueAuthentication = 24,

    /// Initiate a re-authentication
    ReAuthenticate = 25,
}

impl TryFrom<u8> for AuthenticateReasonCode {
    type Error = BrokerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        utils::convert_u8_to_authenticate_reason_code(value)
    }
}

/// Data model of an [MQTT 3.1.1 CONNECT](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718028) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectPacket {

    /// Maximum time interval, in seconds, that is permitted to elapse between the point at which the client
    /// finishes transmitting one MQTT packet and the point it starts sending the next.
    pub keep_alive_interval_seconds: u16,

    /// Whether or not the server should discard any existing session state for this client.
    pub clean_session: bool,

    /// Unique client identifier.  May be empty, in which case the server assigns one, provided
    /// the client requested a clean session.
    pub client_id: String,

    /// Username used in authentication.
    pub username: Option<String>,

    /// Password used in authentication.  May not be set without a username.
    pub password: Option<Vec<u8>>,

    /// Message the server publishes on the client's behalf if the connection ends abnormally.
    pub will: Option<PublishPacket>,
}

/// Data model of an [MQTT 3.1.1 CONNACK](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718033) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnackPacket {

    /// True if the server resumed an existing session.  Always false under MQTT 3.1.
    pub session_present: bool,

    /// Outcome of the connection attempt.
    pub return_code: ConnectReturnCode,
}

/// Data model of an [MQTT 3.1.1 PUBLISH](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718037) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishPacket {

    /// Packet id of the publish.  Only present (non-zero) when qos is greater than zero.
    pub packet_id: u16,

    /// Topic the message is being published to.
    pub topic: String,

    /// Delivery guarantee requested for the message.
    pub qos: QualityOfService,

    /// Set when this is a redelivery of a message previously sent on another connection.
    pub duplicate: bool,

    /// Whether the server should store this message as the topic's retained message.
    pub retain: bool,

    /// Application payload.
    pub payload: Vec<u8>,
}

/// Data model of an [MQTT 3.1.1 PUBACK](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718043) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubackPacket {

    /// Id of the QoS 1 publish this packet is acknowledging
    pub packet_id: u16,
}

/// Data model of an [MQTT 3.1.1 PUBREC](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718048) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubrecPacket {

    /// Id of the QoS 2 publish this packet is acknowledging
    pub packet_id: u16,
}

/// Data model of an [MQTT 3.1.1 PUBREL](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718053) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubrelPacket {

    /// Id of the QoS 2 publish this packet corresponds to
    pub packet_id: u16,
}

/// Data model of an [MQTT 3.1.1 PUBCOMP](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718058) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubcompPacket {

    /// Id of the QoS 2 publish this packet corresponds to
    pub packet_id: u16,
}

/// A single (topic filter, requested qos) pair inside a SUBSCRIBE packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscription {

    /// Topic filter to subscribe to
    pub topic_filter: String,

    /// Maximum QoS on which the subscriber will accept publish messages
    pub qos: QualityOfService,
}

impl Subscription {

    /// Creates a new subscription
    pub fn new(topic_filter: &str, qos: QualityOfService) -> Self {
        Subscription {
            topic_filter: topic_filter.to_string(),
            qos
        }
    }
}

/// Data model of an [MQTT 3.1.1 SUBSCRIBE](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718063) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribePacket {

    /// Packet id of the subscribe
    pub packet_id: u16,

    /// List of topic filter subscriptions that the client wishes to listen to
    pub subscriptions: Vec<Subscription>,
}

/// Data model of an [MQTT 3.1.1 SUBACK](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718068) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubackPacket {

    /// Id of the SUBSCRIBE this packet is acknowledging
    pub packet_id: u16,

    /// One return code per subscription, in the order of the SUBSCRIBE packet
    pub return_codes: Vec<SubscribeReturnCode>,
}

/// Data model of an [MQTT 3.1.1 UNSUBSCRIBE](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718072) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribePacket {

    /// Packet id of the unsubscribe
    pub packet_id: u16,

    /// List of topic filters that the client wishes to unsubscribe from.
    pub topic_filters: Vec<String>,
}

/// Data model of an [MQTT 3.1.1 UNSUBACK](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718077) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubackPacket {

    /// Id of the UNSUBSCRIBE this packet is acknowledging
    pub packet_id: u16,
}

/// Data model of an [MQTT 3.1.1 PINGREQ](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718081) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PingreqPacket {}

/// Data model of an [MQTT 3.1.1 PINGRESP](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718086) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PingrespPacket {}

/// Data model of an [MQTT 3.1.1 DISCONNECT](http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718090) packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisconnectPacket {}

/// Data model of an [MQTT5 AUTH](https://docs.oasis-open.org/mqtt/mqtt/v5.0/os/mqtt-v5.0-os.html#_Toc3901217) packet.
/// Present so the packet enumeration is closed over every control packet kind; no MQTT 3
/// formatter can encode or decode it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthPacket {

    /// Specifies an endpoint's response to a previously-received AUTH packet as part of an authentication exchange.
    pub reason_code: AuthenticateReasonCode,
}

/// Algebraic union of all MQTT packet types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MqttPacket {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Puback(PubackPacket),
    Pubrec(PubrecPacket),
    Pubrel(PubrelPacket),
    Pubcomp(PubcompPacket),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(UnsubackPacket),
    Pingreq(PingreqPacket),
    Pingresp(PingrespPacket),
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl MqttPacket {

    /// Kind of this packet
    pub fn packet_type(&self) -> PacketType {
        utils::mqtt_packet_to_packet_type(self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// An enum indicating the kind of MQTT packet
pub enum PacketType {
    /// A Connect packet
    Connect,

    /// A Connack packet
    Connack,

    /// A Publish packet
    Publish,

    /// A Puback packet
    Puback,

    /// A Pubrec packet
    Pubrec,

    /// A Pubrel packet
    Pubrel,

    /// A Pubcomp packet
    Pubcomp,

    /// A Subscribe packet
    Subscribe,

    /// A Suback packet
    Suback,

    /// An Unsubscribe packet
    Unsubscribe,

    /// An Unsuback packet
    Unsuback,

    /// A Pingreq packet
    Pingreq,

    /// A Pingresp packet
    Pingresp,

    /// A Disconnect packet
    Disconnect,

    /// An Auth packet
    Auth,
}

impl PacketType {

    /// The 4-bit control code that occupies the high nibble of this packet type's fixed header
    pub fn control_code(&self) -> u8 {
        utils::packet_type_to_control_code(*self)
    }

    /// Maps a 4-bit control code back to its packet type.  Zero is reserved and yields an error.
    pub fn from_control_code(code: u8) -> BrokerResult<PacketType> {
        utils::control_code_to_packet_type(code)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Connect => { write!(f, "ConnectPacket") }
            PacketType::Connack => { write!(f, "ConnackPacket") }
            PacketType::Publish => { write!(f, "PublishPacket") }
            PacketType::Puback => { write!(f, "PubackPacket") }
            PacketType::Pubrec => { write!(f, "PubrecPacket") }
            PacketType::Pubrel => { write!(f, "PubrelPacket") }
            PacketType::Pubcomp => { write!(f, "PubcompPacket") }
            PacketType::Subscribe => { write!(f, "SubscribePacket") }
            PacketType::Suback => { write!(f, "SubackPacket") }
            PacketType::Unsubscribe => { write!(f, "UnsubscribePacket") }
            PacketType::Unsuback => { write!(f, "UnsubackPacket") }
            PacketType::Pingreq => { write!(f, "PingreqPacket") }
            PacketType::Pingresp => { write!(f, "PingrespPacket") }
            PacketType::Disconnect => { write!(f, "DisconnectPacket") }
            PacketType::Auth => { write!(f, "AuthPacket") }
        }
    }
}

/// A message as it travels through the broker, independent of any one connection's packet id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicationMessage {

    /// Topic the message was published to
    pub topic: String,

    /// Application payload
    pub payload: Vec<u8>,

    /// Quality of service the message was published with
    pub qos: QualityOfService,

    /// Whether the message was published (or is being delivered) as a retained message
    pub retain: bool,
}

impl From<&PublishPacket> for ApplicationMessage {
    fn from(publish: &PublishPacket) -> Self {
        ApplicationMessage {
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
            qos: publish.qos,
            retain: publish.retain,
        }
    }
}
