//! FTP protocol wire codec
//!
//! Command encoding, reply parsing and reply payload parsers. No socket I/O.

pub mod commands;
pub mod parser;
pub mod responses;

pub use commands::{Command, format_port_argument};
pub use parser::{parse_epsv, parse_mdtm, parse_pasv, parse_quoted_path, parse_size};
pub use responses::{
    Response, ResponseAssembler, ResponseClass, ResponseLine, parse_response_line,
};
