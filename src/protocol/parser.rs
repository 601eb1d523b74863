//! Reply payload parsers
//!
//! Extracts structured values (data addresses, sizes, timestamps, paths) from
//! the text of server replies.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::error::{FtpClientError, Result};
use crate::protocol::Response;

static PASV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\((\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3})\)",
    )
    .expect("valid PASV regex")
});

static PASV_BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3})\b",
    )
    .expect("valid bare PASV regex")
});

static EPSV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\|\|\|(\d{1,5})\|\)").expect("valid EPSV regex"));

static MDTM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})(?:\.(\d{1,3}))?$")
        .expect("valid MDTM regex")
});

fn malformed(response: &Response) -> FtpClientError {
    FtpClientError::MalformedResponse(response.to_string())
}

/// Parses the `h1,h2,h3,h4,p1,p2` sextet of a 227 reply.
///
/// The first parenthesized sextet wins, as in
/// `227 Entering Passive Mode (10,0,0,1,4,1)`; servers that omit the
/// parentheses are accepted when the numbers stand alone. `port = p1 * 256 + p2`.
pub fn parse_pasv(response: &Response) -> Result<SocketAddrV4> {
    let text = response.message();
    let caps = PASV_RE
        .captures(text)
        .or_else(|| PASV_BARE_RE.captures(text))
        .ok_or_else(|| malformed(response))?;

    let mut values = [0u8; 6];
    for (i, value) in values.iter_mut().enumerate() {
        *value = caps[i + 1]
            .parse::<u8>()
            .map_err(|_| malformed(response))?;
    }

    let ip = Ipv4Addr::new(values[0], values[1], values[2], values[3]);
    let port = u16::from(values[4]) * 256 + u16::from(values[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Parses the port of a 229 reply: `229 Entering Extended Passive Mode (|||6446|)`
pub fn parse_epsv(response: &Response) -> Result<u16> {
    let caps = EPSV_RE
        .captures(response.message())
        .ok_or_else(|| malformed(response))?;
    caps[1].parse::<u16>().map_err(|_| malformed(response))
}

/// Parses the byte count of a 213 reply to SIZE
pub fn parse_size(response: &Response) -> Result<u64> {
    response
        .message()
        .trim()
        .parse::<u64>()
        .map_err(|_| malformed(response))
}

/// Parses a `YYYYMMDDHHMMSS[.sss]` timestamp.
///
/// The protocol carries no time zone; the value is taken as UTC.
pub fn parse_mdtm_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let caps = MDTM_RE.captures(text.trim())?;
    let field = |i: usize| caps[i].parse::<u32>().ok();

    let year = caps[1].parse::<i32>().ok()?;
    let millis = match caps.get(7) {
        Some(fraction) => {
            let digits = fraction.as_str();
            let value: u32 = digits.parse().ok()?;
            value * 10u32.pow(3 - digits.len() as u32)
        }
        None => 0,
    };

    let naive = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?.and_hms_milli_opt(
        field(4)?,
        field(5)?,
        field(6)?,
        millis,
    )?;
    Some(naive.and_utc())
}

/// Parses the timestamp of a 213 reply to MDTM
pub fn parse_mdtm(response: &Response) -> Result<DateTime<Utc>> {
    parse_mdtm_timestamp(response.message()).ok_or_else(|| malformed(response))
}

/// Extracts the quoted directory name of a 257 reply.
///
/// Embedded quotes are doubled on the wire (`"a""b"` is `a"b`).
pub fn parse_quoted_path(response: &Response) -> Result<String> {
    let text = response.message();
    let Some(start) = text.find('"') else {
        return text
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| malformed(response));
    };

    let mut path = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
            } else {
                return Ok(path);
            }
        } else {
            path.push(c);
        }
    }
    Err(malformed(response))
}
