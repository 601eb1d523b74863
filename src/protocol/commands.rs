//! Module `commands`
//!
//! Defines the FTP commands the client sends over the control channel and
//! their wire encoding.

use std::fmt;
use std::net::SocketAddrV4;

use crate::transfer::TransferType;

/// An FTP command sent by the client.
///
/// Commands that take a path or free-form argument store it as `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Type(TransferType),
    Size(String),
    Mdtm(String),
    List(Option<String>),
    Nlst(Option<String>),
    Retr(String),
    Stor(String),
    Rest(u64),
    Dele(String),
    Rmd(String),
    Mkd(String),
    Rnfr(String),
    Rnto(String),
    Cwd(String),
    Cdup,
    Pwd,
    Site(String),
    Syst,
    Pasv,
    Epsv,
    Port(SocketAddrV4),
    Abor,
    Quit,
}

impl Command {
    /// Command verb as sent on the wire
    pub fn verb(&self) -> &'static str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Type(_) => "TYPE",
            Command::Size(_) => "SIZE",
            Command::Mdtm(_) => "MDTM",
            Command::List(_) => "LIST",
            Command::Nlst(_) => "NLST",
            Command::Retr(_) => "RETR",
            Command::Stor(_) => "STOR",
            Command::Rest(_) => "REST",
            Command::Dele(_) => "DELE",
            Command::Rmd(_) => "RMD",
            Command::Mkd(_) => "MKD",
            Command::Rnfr(_) => "RNFR",
            Command::Rnto(_) => "RNTO",
            Command::Cwd(_) => "CWD",
            Command::Cdup => "CDUP",
            Command::Pwd => "PWD",
            Command::Site(_) => "SITE",
            Command::Syst => "SYST",
            Command::Pasv => "PASV",
            Command::Epsv => "EPSV",
            Command::Port(_) => "PORT",
            Command::Abor => "ABOR",
            Command::Quit => "QUIT",
        }
    }

    fn argument(&self) -> Option<String> {
        match self {
            Command::User(arg)
            | Command::Pass(arg)
            | Command::Size(arg)
            | Command::Mdtm(arg)
            | Command::Retr(arg)
            | Command::Stor(arg)
            | Command::Dele(arg)
            | Command::Rmd(arg)
            | Command::Mkd(arg)
            | Command::Rnfr(arg)
            | Command::Rnto(arg)
            | Command::Cwd(arg)
            | Command::Site(arg) => Some(arg.clone()),
            Command::List(arg) | Command::Nlst(arg) => arg.clone(),
            Command::Type(transfer_type) => Some(transfer_type.code().to_string()),
            Command::Rest(offset) => Some(offset.to_string()),
            Command::Port(addr) => Some(format_port_argument(addr)),
            Command::Cdup
            | Command::Pwd
            | Command::Syst
            | Command::Pasv
            | Command::Epsv
            | Command::Abor
            | Command::Quit => None,
        }
    }

    /// Commands accepted before the session is authenticated
    pub fn allowed_before_login(&self) -> bool {
        matches!(self, Command::User(_) | Command::Pass(_) | Command::Quit)
    }

    /// Whether the argument contains CR or LF, which would end the command
    /// line early and smuggle a second command onto the wire
    pub fn has_line_break(&self) -> bool {
        self.argument().is_some_and(|arg| arg.contains(['\r', '\n']))
    }

    /// Encodes the command as a CRLF-terminated line
    pub fn encode(&self) -> Vec<u8> {
        let mut line = match self.argument() {
            Some(arg) if !arg.is_empty() => format!("{} {}", self.verb(), arg),
            _ => self.verb().to_string(),
        };
        line.push_str("\r\n");
        line.into_bytes()
    }

    /// Loggable form with the password masked
    pub fn redacted(&self) -> String {
        match self {
            Command::Pass(_) => "PASS ****".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument() {
            Some(arg) if !arg.is_empty() => write!(f, "{} {}", self.verb(), arg),
            _ => f.write_str(self.verb()),
        }
    }
}

/// Formats the `h1,h2,h3,h4,p1,p2` argument of a PORT command
pub fn format_port_argument(addr: &SocketAddrV4) -> String {
    let [h1, h2, h3, h4] = addr.ip().octets();
    let port = addr.port();
    format!("{},{},{},{},{},{}", h1, h2, h3, h4, port >> 8, port & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_encode_basic_commands() {
        assert_eq!(Command::Pwd.encode(), b"PWD\r\n");
        assert_eq!(Command::Quit.encode(), b"QUIT\r\n");
        assert_eq!(Command::List(None).encode(), b"LIST\r\n");
    }

    #[test]
    fn test_encode_commands_with_args() {
        assert_eq!(
            Command::Cwd("/some/path".to_string()).encode(),
            b"CWD /some/path\r\n"
        );
        assert_eq!(
            Command::Retr("my file.txt".to_string()).encode(),
            b"RETR my file.txt\r\n"
        );
        assert_eq!(Command::Rest(1024).encode(), b"REST 1024\r\n");
        assert_eq!(Command::Type(TransferType::Binary).encode(), b"TYPE I\r\n");
        assert_eq!(Command::Type(TransferType::Ascii).encode(), b"TYPE A\r\n");
        assert_eq!(
            Command::Site("CHMOD 755 run.sh".to_string()).encode(),
            b"SITE CHMOD 755 run.sh\r\n"
        );
    }

    #[test]
    fn test_encode_port() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 5001);
        assert_eq!(format_port_argument(&addr), "192,168,1,2,19,137");
        assert_eq!(Command::Port(addr).encode(), b"PORT 192,168,1,2,19,137\r\n");
    }

    #[test]
    fn test_redacted_password() {
        let pass = Command::Pass("alice123".to_string());
        assert_eq!(pass.redacted(), "PASS ****");
        assert_eq!(Command::User("alice".into()).redacted(), "USER alice");
    }

    #[test]
    fn test_line_breaks_in_arguments() {
        assert!(Command::Cwd("/tmp\r\nDELE /important".to_string()).has_line_break());
        assert!(Command::Retr("a\nb".to_string()).has_line_break());
        assert!(Command::List(Some("dir\r".to_string())).has_line_break());
        assert!(Command::Pass("se\ncret".to_string()).has_line_break());
        assert!(!Command::Cwd("/tmp/with space".to_string()).has_line_break());
        assert!(!Command::List(None).has_line_break());
        assert!(!Command::Pwd.has_line_break());
    }

    #[test]
    fn test_allowed_before_login() {
        assert!(Command::User("alice".into()).allowed_before_login());
        assert!(Command::Quit.allowed_before_login());
        assert!(!Command::Pwd.allowed_before_login());
        assert!(!Command::Pasv.allowed_before_login());
    }
}
