//! Listing module for the FTP client
//!
//! Turns raw LIST and NLST text into directory entries.

pub mod entry;
pub mod parser;

pub use entry::{DirectoryEntry, EntryKind};
pub use parser::{ParsedListing, parse_line, parse_list, parse_list_at, parse_name_list};
