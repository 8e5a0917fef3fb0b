// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tagged date scalars.
//!
//! Dates travel as `{"__type__": "datetime", "value": "YYYY-MM-DDTHH:mm:ss"}`.
//! The wire text carries no offset: servers with timezone support send UTC
//! wall time, older servers send their local wall time.

use chrono::{DateTime, Local, NaiveDateTime, ParseError, TimeZone, Utc};
use serde_json::{json, Value};
use std::fmt;

use crate::{DATETIME_TAG, TYPE_TAG_KEY};

/// `strftime` pattern of the wire timestamp text.
pub const WIRE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A decoded or outgoing date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timestamp {
    /// Instant normalized to UTC.
    Utc(DateTime<Utc>),
    /// Server-local wall time with no known offset.
    Local(NaiveDateTime),
}

impl Timestamp {
    /// Parse wire text. With `timezone_support` the text is read as UTC.
    pub fn parse_wire(text: &str, timezone_support: bool) -> Result<Self, ParseError> {
        let naive = NaiveDateTime::parse_from_str(text, WIRE_DATETIME_FORMAT)?;
        Ok(if timezone_support {
            Timestamp::Utc(naive.and_utc())
        } else {
            Timestamp::Local(naive)
        })
    }

    /// Wall-clock reading (UTC wall time for [`Timestamp::Utc`]).
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            Timestamp::Utc(dt) => dt.naive_utc(),
            Timestamp::Local(naive) => *naive,
        }
    }

    /// The UTC instant, when known.
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Utc(dt) => Some(*dt),
            Timestamp::Local(_) => None,
        }
    }

    /// Wall-clock reading for a server with or without timezone support.
    ///
    /// A server without timezone support reads wire text as its own local
    /// time, so UTC instants are shifted into this process's local zone.
    /// [`Timestamp::Local`] values pass through unchanged either way.
    pub fn naive_for(&self, timezone_support: bool) -> NaiveDateTime {
        match self {
            Timestamp::Utc(dt) if !timezone_support => dt.with_timezone(&Local).naive_local(),
            _ => self.naive(),
        }
    }

    /// Wire text, second precision.
    pub fn to_wire(&self) -> String {
        format_wire(self.naive())
    }

    /// Tagged wire mapping.
    pub fn tagged(&self) -> Value {
        tagged(self.naive())
    }

    /// Tagged wire mapping for a server with or without timezone support.
    pub fn tagged_for(&self, timezone_support: bool) -> Value {
        tagged(self.naive_for(timezone_support))
    }
}

fn format_wire(naive: NaiveDateTime) -> String {
    naive.format(WIRE_DATETIME_FORMAT).to_string()
}

fn tagged(naive: NaiveDateTime) -> Value {
    json!({ TYPE_TAG_KEY: DATETIME_TAG, "value": format_wire(naive) })
}

/// Offset-aware values become UTC instants; see [`Timestamp::naive_for`]
/// for how they are sent to servers without timezone support.
impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(value: DateTime<Tz>) -> Self {
        Timestamp::Utc(value.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Timestamp::Local(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Utc(_) => write!(f, "{}Z", self.to_wire()),
            Timestamp::Local(_) => f.write_str(&self.to_wire()),
        }
    }
}
