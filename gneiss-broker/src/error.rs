/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
A module containing the core crate error enumeration, context structures, and conversion
definitions.
 */

use std::error::Error;
use std::fmt;

/// Additional details about an Unimplemented error variant
#[derive(Debug)]
pub struct UnimplementedContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about a MalformedPacket error variant
#[derive(Debug)]
pub struct MalformedPacketContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about an UnexpectedEndOfPacket error variant
#[derive(Debug)]
pub struct UnexpectedEndOfPacketContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about a MalformedVariableLengthInteger error variant
#[derive(Debug)]
pub struct MalformedVariableLengthIntegerContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about a ProtocolViolation error variant
#[derive(Debug)]
pub struct ProtocolViolationContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about an EncodingFailure error variant
#[derive(Debug)]
pub struct EncodingFailureContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about a CommunicationFailure error variant
#[derive(Debug)]
pub struct CommunicationFailureContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about an OperationCancelled error variant
#[derive(Debug)]
pub struct OperationCancelledContext {
}

/// Additional details about an InternalStateError error variant
#[derive(Debug)]
pub struct InternalStateErrorContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Additional details about a StdIoError error variant
#[derive(Debug)]
pub struct StdIoErrorContext {
    source: Box<dyn Error + Send + Sync + 'static>
}

/// Basic error type for the entire gneiss-broker crate.
#[derive(Debug)]
#[non_exhaustive]
pub enum BrokerError {

    /// Functionality was invoked that has not been implemented.  Currently this covers the
    /// MQTT5 packet formatter.
    Unimplemented(UnimplementedContext),

    /// A packet body was structurally invalid: bad fixed header flags, an empty body where the
    /// packet requires one, trailing bytes after the final field, invalid utf-8, etc...
    MalformedPacket(MalformedPacketContext),

    /// A read ran past the end of the packet body before a field was complete.
    UnexpectedEndOfPacket(UnexpectedEndOfPacketContext),

    /// A variable length integer did not terminate within four bytes.
    MalformedVariableLengthInteger(MalformedVariableLengthIntegerContext),

    /// A packet or operation was well-formed but is not permitted by the MQTT specification.
    /// Examples include a password without a user name or an invalid topic filter.
    ProtocolViolation(ProtocolViolationContext),

    /// Error encountered while attempting to encode an MQTT packet, for example a variable length
    /// integer outside of the representable range.
    EncodingFailure(EncodingFailureContext),

    /// The transport underneath a connection failed or was closed.  Surfaced, never recovered.
    CommunicationFailure(CommunicationFailureContext),

    /// A cancellable wait was cancelled before it produced a result.
    OperationCancelled(OperationCancelledContext),

    /// Error emitted when something happens that should never happen, or when a bounded
    /// internal resource (the packet identifier space) is exhausted.
    InternalStateError(InternalStateErrorContext),

    /// Generic error wrapping std::io::Error
    StdIoError(StdIoErrorContext),
}

impl BrokerError {

    pub(crate) fn new_unimplemented(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::Unimplemented(
            UnimplementedContext {
                source : source.into()
            }
        )
    }

    pub(crate) fn new_malformed_packet(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::MalformedPacket(
            MalformedPacketContext {
                source : source.into()
            }
        )
    }

    pub(crate) fn new_unexpected_end_of_packet(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::UnexpectedEndOfPacket(
            UnexpectedEndOfPacketContext {
                source : source.into()
            }
        )
    }

    pub(crate) fn new_malformed_variable_length_integer(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::MalformedVariableLengthInteger(
            MalformedVariableLengthIntegerContext {
                source : source.into()
            }
        )
    }

    pub(crate) fn new_protocol_violation(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::ProtocolViolation(
            ProtocolViolationContext {
                source : source.into()
            }
        )
    }

    pub(crate) fn new_encoding_failure(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::EncodingFailure(
            EncodingFailureContext {
                source : source.into()
            }
        )
    }

    /// Constructs a CommunicationFailure variant from an existing error.  Transport
    /// implementations outside this crate should use this to report failures.
    pub fn new_communication_failure(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::CommunicationFailure(
            CommunicationFailureContext {
                source : source.into()
            }
        )
    }

    pub(crate) fn new_operation_cancelled() -> Self {
        BrokerError::OperationCancelled(
            OperationCancelledContext {
            }
        )
    }

    pub(crate) fn new_internal_state_error(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::InternalStateError(
            InternalStateErrorContext {
                source : source.into()
            }
        )
    }

    /// Constructs a StdIoError variant from an existing error.  Typically this should be a
    /// std::io::Error
    #[doc(hidden)]
    pub fn new_std_io_error(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        BrokerError::StdIoError(
            StdIoErrorContext {
                source : source.into()
            }
        )
    }

    /// Returns true if this error originated from decoding untrusted inbound bytes.  A connection
    /// that hits one of these can no longer trust its byte stream and must be closed.
    pub fn is_decode_error(&self) -> bool {
        matches!(self,
            BrokerError::MalformedPacket(_) |
            BrokerError::UnexpectedEndOfPacket(_) |
            BrokerError::MalformedVariableLengthInteger(_) |
            BrokerError::ProtocolViolation(_))
    }
}

impl Error for BrokerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BrokerError::Unimplemented(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::MalformedPacket(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::UnexpectedEndOfPacket(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::MalformedVariableLengthInteger(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::ProtocolViolation(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::EncodingFailure(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::CommunicationFailure(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::InternalStateError(context) => {
                Some(context.source.as_ref())
            }
            BrokerError::StdIoError(context) => {
                Some(context.source.as_ref())
            }
            _ => { None }
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Unimplemented(_) => {
                write!(f, "attempt to invoke functionality that has not been implemented")
            }
            BrokerError::MalformedPacket(_) => {
                write!(f, "mqtt packet is structurally invalid")
            }
            BrokerError::UnexpectedEndOfPacket(_) => {
                write!(f, "mqtt packet body ended before a field was complete")
            }
            BrokerError::MalformedVariableLengthInteger(_) => {
                write!(f, "variable length integer did not terminate within four bytes")
            }
            BrokerError::ProtocolViolation(_) => {
                write!(f, "behavior disallowed by the mqtt spec")
            }
            BrokerError::EncodingFailure(_) => {
                write!(f, "failure encountered while encoding an outbound MQTT packet")
            }
            BrokerError::CommunicationFailure(_) => {
                write!(f, "transport failure; source contains further details")
            }
            BrokerError::OperationCancelled(_) => {
                write!(f, "the operation was cancelled before it completed")
            }
            BrokerError::InternalStateError(_) => {
                write!(f, "broker reached an invalid internal state")
            }
            BrokerError::StdIoError(_) => {
                write!(f, "generic error wrapper for std::io::Error when no more specialized error is appropriate; source contains further details")
            }
        }
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(error: std::io::Error) -> Self {
        BrokerError::new_std_io_error(error)
    }
}

impl From<core::str::Utf8Error> for BrokerError {
    fn from(err: core::str::Utf8Error) -> Self {
        BrokerError::new_malformed_packet(err)
    }
}

/// Crate-wide result type for functions that can fail
pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decode_error_classification() {
        assert!(BrokerError::new_malformed_packet("x").is_decode_error());
        assert!(BrokerError::new_unexpected_end_of_packet("x").is_decode_error());
        assert!(BrokerError::new_malformed_variable_length_integer("x").is_decode_error());
        assert!(BrokerError::new_protocol_violation("x").is_decode_error());
        assert!(!BrokerError::new_communication_failure("x").is_decode_error());
        assert!(!BrokerError::new_operation_cancelled().is_decode_error());
    }

    #[test]
    fn utf8_error_converts_to_malformed_packet() {
        let bytes = vec![0xC3u8, 0x28];
        let error : BrokerError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert_matches!(error, BrokerError::MalformedPacket(_));
        assert!(error.source().is_some());
    }
}
