//! Decoder for BSD syslog datagrams ([RFC 3164](https://tools.ietf.org/html/rfc3164)).
//!
//! Very few devices actually conform to the RFC, so decoding never fails.
//! Input is tried against three progressively looser shapes:
//!
//! 1. `<PRI>Mmm dd hh:mm:ss text`
//! 2. `<PRI>text`
//! 3. `text`
//!
//! and the first one that fits wins. The hostname field is not parsed, it
//! stays part of the text, and the message hostname is set to the address
//! the datagram came from.

use std::borrow::Cow;
use std::net::IpAddr;

use chrono::{Datelike, Local, NaiveDateTime};

use crate::message::is_control;
use crate::timestamp::{parse_timestamp, TIMESTAMP_LEN};
use crate::{Error, Facility, Message, Severity};

/// Replace control characters with spaces, borrowing when there are none.
fn strip_control(input: &str) -> Cow<'_, str> {
    if input.chars().any(is_control) {
        Cow::Owned(
            input
                .chars()
                .map(|c| if is_control(c) { ' ' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(input)
    }
}

fn parse_pri_val(pri: i32) -> Result<(Facility, Severity), Error> {
    let facility = Facility::try_from(pri / 8)?;
    let severity = Severity::try_from(pri % 8)?;
    Ok((facility, severity))
}

/// Parse `<1-3 digits>` at the start of `buf`, leaving `offset` just past
/// the closing bracket.
fn parse_pri(buf: &[u8], offset: &mut usize) -> Result<(Facility, Severity), Error> {
    if buf.first() != Some(&b'<') {
        return Err(Error::ExpectedChar('<'));
    }
    *offset = 1;

    let mut pri = 0i32;
    let mut digits = 0;
    while let Some(c) = buf.get(*offset).filter(|c| c.is_ascii_digit()) {
        digits += 1;
        if digits > 3 {
            return Err(Error::TooManyDigits);
        }
        pri = pri * 10 + (c - b'0') as i32;
        *offset += 1;
    }
    if digits == 0 {
        return Err(Error::TooFewDigits);
    }

    match buf.get(*offset) {
        Some(b'>') => *offset += 1,
        Some(_) => return Err(Error::ExpectedChar('>')),
        None => return Err(Error::UnexpectedEndOfInput),
    }

    parse_pri_val(pri)
}

type Header = (Facility, Severity, Option<NaiveDateTime>);

/// `<PRI>Mmm dd hh:mm:ss ` followed by anything.
fn parse_full(input: &str, year: i32) -> Result<(Header, &str), Error> {
    let buf = input.as_bytes();
    let mut offset = 0;
    let (facility, severity) = parse_pri(buf, &mut offset)?;

    if buf.len() < offset + TIMESTAMP_LEN + 1 {
        return Err(Error::UnexpectedEndOfInput);
    }
    let timestamp = parse_timestamp(&buf[offset..offset + TIMESTAMP_LEN], year)?;
    offset += TIMESTAMP_LEN;

    if buf[offset] != b' ' {
        return Err(Error::ExpectedChar(' '));
    }

    Ok(((facility, severity, Some(timestamp)), &input[offset + 1..]))
}

/// `<PRI>` followed by anything.
fn parse_pri_only(input: &str) -> Result<(Header, &str), Error> {
    let mut offset = 0;
    let (facility, severity) = parse_pri(input.as_bytes(), &mut offset)?;

    Ok(((facility, severity, None), &input[offset..]))
}

/// Decode a received datagram. Never fails: anything that doesn't have a
/// usable header becomes the text of a message with default facility and
/// severity.
///
/// # Arguments
///
///  * `source`: address the datagram came from, used as the hostname
///  * `input`: the datagram payload
///
/// # Example
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use syslogd::{rfc3164::parse_message, Facility, Severity};
///
/// let source = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// let msg = parse_message(source, "<34>Oct 11 22:14:15 mymachine su: 'su root' failed");
///
/// assert_eq!(msg.facility(), Facility::Security1);
/// assert_eq!(msg.severity(), Severity::Critical);
/// assert_eq!(msg.hostname(), "127.0.0.1");
/// assert_eq!(msg.text(), "mymachine su: 'su root' failed");
/// ```
pub fn parse_message(source: IpAddr, input: &str) -> Message {
    let stripped = strip_control(input);
    let year = Local::now().year();

    let ((facility, severity, timestamp), text) = parse_full(&stripped, year)
        .or_else(|_| parse_pri_only(&stripped))
        .unwrap_or(((Facility::default(), Severity::default(), None), &*stripped));

    let device_time = timestamp.unwrap_or_else(|| Local::now().naive_local());

    Message::from_parts(
        source.to_string(),
        text.to_string(),
        facility,
        severity,
        device_time,
    )
}
