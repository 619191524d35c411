/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Topic name and topic filter validation, and the level-by-level matching of a concrete topic
against a (possibly wildcarded) topic filter.
 */

use crate::encode::utils::MAXIMUM_LENGTH_PREFIXED_FIELD_SIZE;

const TOPIC_LEVEL_SEPARATOR : char = '/';
const SINGLE_LEVEL_WILDCARD : &str = "+";
const MULTI_LEVEL_WILDCARD : &str = "#";
const SYSTEM_TOPIC_PREFIX : char = '$';

/// Checks that a publish topic is non-empty, fits in a length-prefixed field, and has no
/// wildcard characters.
pub(crate) fn is_valid_topic(topic: &str) -> bool {
    if topic.is_empty() || topic.len() > MAXIMUM_LENGTH_PREFIXED_FIELD_SIZE {
        return false;
    }

    if topic.contains(['#', '+']) {
        return false;
    }

    true
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct TopicFilterProperties {
    pub is_valid: bool,
    pub has_wildcard: bool
}

pub(crate) fn compute_topic_filter_properties(topic_filter: &str) -> TopicFilterProperties {
    let mut properties = TopicFilterProperties {
        is_valid: true,
        has_wildcard: false
    };

    if topic_filter.is_empty() || topic_filter.len() > MAXIMUM_LENGTH_PREFIXED_FIELD_SIZE {
        properties.is_valid = false;
        return properties;
    }

    let mut seen_mlw = false;
    for segment in topic_filter.split(TOPIC_LEVEL_SEPARATOR) {
        if seen_mlw {
            properties.is_valid = false;
            break;
        }

        let has_wildcard = segment.contains(['#', '+']);
        properties.has_wildcard |= has_wildcard;

        if segment.len() == 1 {
            if segment == MULTI_LEVEL_WILDCARD {
                seen_mlw = true;
            }
        } else if has_wildcard {
            properties.is_valid = false;
            break;
        }
    }

    properties
}

/// A filter is valid when it is non-empty, fits in a length-prefixed field, every wildcard
/// occupies a whole level, and a multi-level wildcard only appears as the final level.
pub(crate) fn is_valid_topic_filter(topic_filter: &str) -> bool {
    compute_topic_filter_properties(topic_filter).is_valid
}

/// Level-by-level comparison of a concrete topic against a valid topic filter.
///
/// `+` consumes exactly one level, `#` consumes the remaining levels (including none, so
/// `sport/#` matches `sport`), and literal levels compare exactly.  Topics beginning with `$`
/// never match a filter whose first level is a wildcard.
pub(crate) fn does_topic_match_filter(topic: &str, topic_filter: &str) -> bool {
    if topic.starts_with(SYSTEM_TOPIC_PREFIX) && (topic_filter.starts_with(SINGLE_LEVEL_WILDCARD) || topic_filter.starts_with(MULTI_LEVEL_WILDCARD)) {
        return false;
    }

    let mut topic_levels = topic.split(TOPIC_LEVEL_SEPARATOR);
    let mut filter_levels = topic_filter.split(TOPIC_LEVEL_SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (None, None) => { return true; }
            (Some(MULTI_LEVEL_WILDCARD), _) => { return true; }
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(filter_level), Some(topic_level)) => {
                if filter_level != topic_level {
                    return false;
                }
            }
            _ => { return false; }
        }
    }
}
