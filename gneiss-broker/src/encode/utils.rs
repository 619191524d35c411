/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::{BrokerError, BrokerResult};

use log::*;

/// Largest value representable by an MQTT variable length integer (four encoded bytes)
pub const MAXIMUM_VARIABLE_LENGTH_INTEGER: usize = (1 << 28) - 1;

pub(crate) const MAXIMUM_VARIABLE_LENGTH_INTEGER_ENCODE_SIZE: usize = 4;

/// Largest byte count a 2-byte length prefix can describe
pub(crate) const MAXIMUM_LENGTH_PREFIXED_FIELD_SIZE: usize = u16::MAX as usize;

pub fn compute_variable_length_integer_encode_size(value: usize) -> BrokerResult<usize> {
    if value < 1usize << 7 {
        Ok(1)
    } else if value < 1usize << 14 {
        Ok(2)
    } else if value < 1usize << 21 {
        Ok(3)
    } else if value < 1usize << 28 {
        Ok(4)
    } else {
        let message = format!("compute_variable_length_integer_encode_size - value ({}) exceeds protocol maximum", value);
        error!("{}", message);
        Err(BrokerError::new_encoding_failure(message))
    }
}

// Writes the base-128 encoding of value into dest, returning the number of encoded bytes.
pub(crate) fn encode_vli(value: u32, dest: &mut [u8; MAXIMUM_VARIABLE_LENGTH_INTEGER_ENCODE_SIZE]) -> BrokerResult<usize> {
    if value as usize > MAXIMUM_VARIABLE_LENGTH_INTEGER {
        let message = format!("encode_vli - value ({}) exceeds protocol maximum", value);
        error!("{}", message);
        return Err(BrokerError::new_encoding_failure(message));
    }

    let mut encoded_length = 0;
    let mut done = false;
    let mut val = value;
    while !done {
        let mut byte: u8 = (val & 0x7F) as u8;
        val /= 128;

        if val != 0 {
            byte |= 128;
        }

        dest[encoded_length] = byte;
        encoded_length += 1;

        done = val == 0;
    }

    Ok(encoded_length)
}

pub(crate) fn validate_length_prefixed_field_size(length: usize, function_name: &str) -> BrokerResult<u16> {
    if length > MAXIMUM_LENGTH_PREFIXED_FIELD_SIZE {
        let message = format!("{} - field length ({}) exceeds the 2-byte length prefix", function_name, length);
        error!("{}", message);
        return Err(BrokerError::new_encoding_failure(message));
    }

    Ok(length as u16)
}
