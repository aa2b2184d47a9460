//! BSD syslog timestamps, e.g. `Oct 11 22:14:15` or `Dec  1 16:12:15`.
//!
//! The format has no year and no timezone, so parsed values are naive
//! local times and the caller supplies the year.

use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};

use crate::Error;

/// Length of `Mmm dd hh:mm:ss`, for both day paddings.
pub const TIMESTAMP_LEN: usize = 15;

const MONTHS: [&[u8; 3]; 12] = [
    b"jan", b"feb", b"mar", b"apr", b"may", b"jun", b"jul", b"aug", b"sep", b"oct", b"nov", b"dec",
];

// get a character from the bytes as as a decimal
macro_rules! get_digit {
    ($bytes:ident, $index:expr) => {
        match $bytes.get($index) {
            Some(c) if c.is_ascii_digit() => (c - b'0') as u32,
            _ => return Err(Error::InvalidTimestamp),
        }
    };
}

macro_rules! expect_byte {
    ($bytes:ident, $index:expr, $want:expr) => {
        if $bytes.get($index) != Some(&$want) {
            return Err(Error::InvalidTimestamp);
        }
    };
}

#[inline]
fn parse_month(buf: &[u8]) -> Result<u32, Error> {
    let name = [
        buf[0].to_ascii_lowercase(),
        buf[1].to_ascii_lowercase(),
        buf[2].to_ascii_lowercase(),
    ];

    MONTHS
        .iter()
        .position(|m| **m == name)
        .map(|idx| idx as u32 + 1)
        .ok_or(Error::InvalidTimestamp)
}

/// Parse a BSD timestamp. `buf` must be exactly [`TIMESTAMP_LEN`] bytes.
///
/// The day of month is accepted either space padded (`Dec  1`) or as two
/// digits (`Dec 25`, `Dec 01`). Month names are English and matched case
/// insensitively. Dates that don't exist in `year` are rejected.
pub fn parse_timestamp(buf: &[u8], year: i32) -> Result<NaiveDateTime, Error> {
    if buf.len() != TIMESTAMP_LEN {
        return Err(Error::InvalidTimestamp);
    }

    let month = parse_month(&buf[..3])?;
    expect_byte!(buf, 3, b' ');

    let day = match buf[4] {
        b' ' => get_digit!(buf, 5),
        _ => get_digit!(buf, 4) * 10 + get_digit!(buf, 5),
    };
    expect_byte!(buf, 6, b' ');

    let hour = get_digit!(buf, 7) * 10 + get_digit!(buf, 8);
    expect_byte!(buf, 9, b':');
    let minute = get_digit!(buf, 10) * 10 + get_digit!(buf, 11);
    expect_byte!(buf, 12, b':');
    let second = get_digit!(buf, 13) * 10 + get_digit!(buf, 14);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or(Error::InvalidTimestamp)
}

/// Format a timestamp the way it goes on the wire. Single digit days are
/// padded with a space so the field is always [`TIMESTAMP_LEN`] long.
pub fn format_timestamp(ts: &NaiveDateTime) -> impl Display + '_ {
    ts.format("%b %e %H:%M:%S")
}
