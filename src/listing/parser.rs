//! LIST and NLST reply parsers
//!
//! Each line of a LIST reply is recognized on its own as either UNIX
//! `ls -l` style or MS-DOS style. Lines in neither format are skipped and
//! counted; the listing only fails when no line could be parsed at all.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use log::debug;
use regex::Regex;

use crate::error::{FtpClientError, Result};
use crate::listing::{DirectoryEntry, EntryKind};

static UNIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([bcdlps-])([rwxsStTlL-]{9})\S*\s+(?:\d+\s+)?\S+\s+(?:\S+\s+)?(\d+)\s+([A-Za-z]{3})\s+(\d{1,2})\s+(\d{1,2}:\d{2}|\d{4})\s+(.+)$",
    )
    .expect("valid UNIX listing regex")
});

static DOS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{2})-(\d{2})-(\d{2}|\d{4})\s+(\d{1,2}):(\d{2})\s*([AaPp][Mm])?\s+(<DIR>|\d+)\s+(.+)$",
    )
    .expect("valid DOS listing regex")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Entries of one LIST reply, in server order
#[derive(Debug, Clone, Default)]
pub struct ParsedListing {
    pub entries: Vec<DirectoryEntry>,
    /// Lines that matched no known format
    pub skipped: usize,
}

impl ParsedListing {
    /// Entries after the hidden-file filter
    pub fn visible(&self, show_hidden: bool) -> Vec<DirectoryEntry> {
        self.entries
            .iter()
            .filter(|entry| show_hidden || !entry.is_hidden())
            .cloned()
            .collect()
    }

    pub fn hidden_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_hidden()).count()
    }
}

/// Parses a LIST reply relative to the current time
pub fn parse_list(text: &str) -> Result<ParsedListing> {
    parse_list_at(text, Utc::now())
}

/// Parses a LIST reply. `now` resolves the year of UNIX dates that only
/// carry a time of day.
pub fn parse_list_at(text: &str, now: DateTime<Utc>) -> Result<ParsedListing> {
    let mut listing = ParsedListing::default();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || is_total_line(line) {
            continue;
        }
        match parse_line(line, now) {
            Some(entry) => listing.entries.push(entry),
            None => {
                debug!("Skipping unrecognized listing line: {:?}", line);
                listing.skipped += 1;
            }
        }
    }

    if listing.entries.is_empty() && listing.skipped > 0 {
        return Err(FtpClientError::UnrecognizedListingFormat {
            lines: listing.skipped,
        });
    }
    Ok(listing)
}

/// Parses one LIST line in whichever format it is in
pub fn parse_line(line: &str, now: DateTime<Utc>) -> Option<DirectoryEntry> {
    parse_unix_line(line, now).or_else(|| parse_dos_line(line))
}

/// Splits an NLST reply into names, in server order
pub fn parse_name_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_total_line(line: &str) -> bool {
    line.strip_prefix("total ")
        .is_some_and(|rest| rest.trim().chars().all(|c| c.is_ascii_digit()))
}

fn parse_unix_line(line: &str, now: DateTime<Utc>) -> Option<DirectoryEntry> {
    let caps = UNIX_RE.captures(line)?;

    let type_char = caps[1].chars().next()?;
    let kind = EntryKind::from_unix_type(type_char);
    let size = caps[3].parse::<u64>().ok()?;
    let modified = unix_timestamp(&caps[4], &caps[5], &caps[6], now);

    let mut name = caps[7].to_string();
    let mut link_target = None;
    if kind == EntryKind::Symlink {
        if let Some((link, target)) = name.split_once(" -> ") {
            link_target = Some(target.to_string());
            name = link.to_string();
        }
    }

    Some(DirectoryEntry {
        name,
        kind,
        size,
        modified,
        permissions: Some(format!("{}{}", &caps[1], &caps[2])),
        link_target,
    })
}

/// `Mon DD HH:MM` carries no year: it is the current year unless that would
/// put the entry in the future, then the previous one. `Mon DD YYYY` is
/// taken at midnight.
fn unix_timestamp(month: &str, day: &str, time_or_year: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month))? as u32
        + 1;
    let day = day.parse::<u32>().ok()?;

    match time_or_year.split_once(':') {
        Some((hour, minute)) => {
            let hour = hour.parse::<u32>().ok()?;
            let minute = minute.parse::<u32>().ok()?;
            let at = |year: i32| {
                NaiveDate::from_ymd_opt(year, month, day)
                    .and_then(|date| date.and_hms_opt(hour, minute, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            };
            match at(now.year()) {
                Some(stamp) if stamp > now + Duration::days(1) => at(now.year() - 1),
                // Feb 29 of a non-leap current year belongs to an earlier year
                None => at(now.year() - 1),
                stamp => stamp,
            }
        }
        None => {
            let year = time_or_year.parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
    }
}

fn parse_dos_line(line: &str) -> Option<DirectoryEntry> {
    let caps = DOS_RE.captures(line)?;

    let month = caps[1].parse::<u32>().ok()?;
    let day = caps[2].parse::<u32>().ok()?;
    let year = match caps[3].parse::<i32>().ok()? {
        y if caps[3].len() == 4 => y,
        y if y < 70 => 2000 + y,
        y => 1900 + y,
    };

    let mut hour = caps[4].parse::<u32>().ok()?;
    let minute = caps[5].parse::<u32>().ok()?;
    if let Some(meridiem) = caps.get(6) {
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }

    let modified = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .map(|naive| Utc.from_utc_datetime(&naive));

    let (kind, size) = match &caps[7] {
        "<DIR>" => (EntryKind::Directory, 0),
        size => (EntryKind::File, size.parse::<u64>().ok()?),
    };

    Some(DirectoryEntry {
        name: caps[8].to_string(),
        kind,
        size,
        modified,
        permissions: None,
        link_target: None,
    })
}
