//! In-memory representation of a single Syslog message.

use std::fmt::{self, Display, Write};

use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crate::facility::Facility;
use crate::severity::Severity;
use crate::timestamp::format_timestamp;
use crate::Error;

/// Longest message that is put on the wire, in bytes.
pub const MAX_PACKET_LENGTH: usize = 1024;

/// A RFC3164-protocol syslog message.
///
/// Messages are immutable once built. Directly constructed messages have
/// their hostname and text validated; messages decoded by
/// [`parse_message`](crate::rfc3164::parse_message) never fail validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    facility: Facility,
    severity: Severity,
    received_at: DateTime<Utc>,
    device_time: NaiveDateTime,
    hostname: String,
    text: String,
}

impl Message {
    /// Create a message with the default facility and severity, stamped
    /// with the current local time.
    pub fn new(hostname: impl Into<String>, text: impl Into<String>) -> Result<Self, Error> {
        Self::with_fields(
            hostname,
            text,
            Facility::default(),
            Severity::default(),
            Local::now().naive_local(),
        )
    }

    pub fn with_fields(
        hostname: impl Into<String>,
        text: impl Into<String>,
        facility: Facility,
        severity: Severity,
        device_time: NaiveDateTime,
    ) -> Result<Self, Error> {
        let hostname = hostname.into();
        let text = text.into();

        validate_hostname(&hostname)?;
        if text.chars().any(is_control) {
            return Err(Error::InvalidText);
        }

        Ok(Self::from_parts(hostname, text, facility, severity, device_time))
    }

    /// Build without validation. Only the parser uses this, it supplies an
    /// IP address as hostname and text that has been stripped already.
    pub(crate) fn from_parts(
        hostname: String,
        text: String,
        facility: Facility,
        severity: Severity,
        device_time: NaiveDateTime,
    ) -> Self {
        Message {
            facility,
            severity,
            received_at: Utc::now(),
            device_time,
            hostname,
            text,
        }
    }

    pub fn facility(&self) -> Facility {
        self.facility
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// `facility * 8 + severity`, as used in the `<PRI>` header.
    pub fn priority(&self) -> i32 {
        (self.facility as i32) * 8 + self.severity as i32
    }

    /// When this value was built, which for received messages is the
    /// arrival time.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// The sender's local clock as reported in the message header, or the
    /// local time at construction when the header had none.
    pub fn device_time(&self) -> NaiveDateTime {
        self.device_time
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render as `<PRI>Mmm dd hh:mm:ss host text`, cut at
    /// [`MAX_PACKET_LENGTH`] bytes.
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(32 + self.hostname.len() + self.text.len());
        // writing into a String can't fail
        let _ = write!(
            out,
            "<{}>{} {} {}",
            self.priority(),
            format_timestamp(&self.device_time),
            self.hostname,
            self.text
        );

        if out.len() > MAX_PACKET_LENGTH {
            let mut end = MAX_PACKET_LENGTH;
            while !out.is_char_boundary(end) {
                end -= 1;
            }
            out.truncate(end);
        }

        out
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

#[inline]
pub(crate) fn is_control(c: char) -> bool {
    (c as u32) < 0x20
}

fn validate_hostname(hostname: &str) -> Result<(), Error> {
    let valid = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidHostname(hostname.to_string()))
    }
}
