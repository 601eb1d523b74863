//! FTP Response handling
//!
//! Defines FTP reply codes, reply classification and the line assembler that
//! turns raw control-channel lines into complete (possibly multi-line) replies.

use std::fmt;

use crate::error::{FtpClientError, Result};

/// Reply codes the engine inspects directly
pub const RESTART_MARKER: u16 = 110;
pub const SERVICE_READY_SOON: u16 = 120;
pub const DATA_CONNECTION_OPEN: u16 = 125;
pub const OPENING_DATA_CONNECTION: u16 = 150;
pub const OK: u16 = 200;
pub const FILE_STATUS: u16 = 213;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const CLOSING: u16 = 221;
pub const NO_TRANSFER_IN_PROGRESS: u16 = 225;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const PASSIVE_MODE: u16 = 227;
pub const EXTENDED_PASSIVE_MODE: u16 = 229;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const ACCOUNT_REQUIRED: u16 = 332;
pub const PENDING_FURTHER_INFO: u16 = 350;
pub const CANNOT_OPEN_DATA_CONNECTION: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;
pub const COMMAND_NOT_IMPLEMENTED: u16 = 502;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_NOT_FOUND: u16 = 550;

/// Reply class, taken from the first digit of the code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    PositivePreliminary,
    PositiveCompletion,
    PositiveIntermediate,
    TransientNegative,
    PermanentNegative,
}

impl ResponseClass {
    pub fn from_code(code: u16) -> Option<Self> {
        match code / 100 {
            1 => Some(ResponseClass::PositivePreliminary),
            2 => Some(ResponseClass::PositiveCompletion),
            3 => Some(ResponseClass::PositiveIntermediate),
            4 => Some(ResponseClass::TransientNegative),
            5 => Some(ResponseClass::PermanentNegative),
            _ => None,
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(
            self,
            ResponseClass::TransientNegative | ResponseClass::PermanentNegative
        )
    }
}

/// A complete server reply.
///
/// `lines` holds the text of every line with the code prefix stripped from the
/// first and last line; single-line replies have exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: u16,
    lines: Vec<String>,
}

impl Response {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn class(&self) -> ResponseClass {
        // Codes are validated to 100..=599 by the assembler
        ResponseClass::from_code(self.code).unwrap_or(ResponseClass::PermanentNegative)
    }

    /// Text of the final line, which carries the reply's meaning
    pub fn message(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    /// All lines joined with `\n`
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_multiline(&self) -> bool {
        self.lines.len() > 1
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == ResponseClass::PositivePreliminary
    }

    pub fn is_completion(&self) -> bool {
        self.class() == ResponseClass::PositiveCompletion
    }

    pub fn is_intermediate(&self) -> bool {
        self.class() == ResponseClass::PositiveIntermediate
    }

    pub fn is_negative(&self) -> bool {
        self.class().is_negative()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// One parsed reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    pub is_continuation: bool,
    pub text: String,
}

/// Parses a single reply line of the form `DDD text` or `DDD-text`.
///
/// A bare `DDD` is accepted as a final line with empty text. Trailing CR/LF
/// is ignored.
pub fn parse_response_line(raw: &[u8]) -> Result<ResponseLine> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    let bytes = line.as_bytes();

    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(FtpClientError::MalformedResponse(line.to_string()));
    }

    let code: u16 = line[..3]
        .parse()
        .map_err(|_| FtpClientError::MalformedResponse(line.to_string()))?;
    if !(100..600).contains(&code) {
        return Err(FtpClientError::MalformedResponse(line.to_string()));
    }

    let (is_continuation, text) = match bytes.get(3) {
        None => (false, ""),
        Some(b' ') => (false, &line[4..]),
        Some(b'-') => (true, &line[4..]),
        Some(_) => return Err(FtpClientError::MalformedResponse(line.to_string())),
    };

    Ok(ResponseLine {
        code,
        is_continuation,
        text: text.to_string(),
    })
}

/// Collects reply lines until a complete reply is available.
///
/// A reply is complete on a `DDD text` line; once a `DDD-text` line opened a
/// multi-line reply, any line that is not the matching terminator is kept as
/// free text.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    open_code: Option<u16>,
    lines: Vec<String>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a multi-line reply is currently open
    pub fn in_progress(&self) -> bool {
        self.open_code.is_some()
    }

    /// Feeds one raw line. Returns the reply once its final line was seen.
    pub fn push_line(&mut self, raw: &[u8]) -> Result<Option<Response>> {
        let Some(open_code) = self.open_code else {
            let parsed = parse_response_line(raw)?;
            if parsed.is_continuation {
                self.open_code = Some(parsed.code);
                self.lines.push(parsed.text);
                return Ok(None);
            }
            return Ok(Some(Response {
                code: parsed.code,
                lines: vec![parsed.text],
            }));
        };

        match parse_response_line(raw) {
            Ok(parsed) if parsed.code == open_code && !parsed.is_continuation => {
                self.lines.push(parsed.text);
                self.open_code = None;
                Ok(Some(Response {
                    code: open_code,
                    lines: std::mem::take(&mut self.lines),
                }))
            }
            Ok(parsed) if parsed.code == open_code => {
                self.lines.push(parsed.text);
                Ok(None)
            }
            _ => {
                let text = String::from_utf8_lossy(raw);
                self.lines
                    .push(text.trim_end_matches(['\r', '\n']).to_string());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(input: &[&str]) -> Result<Vec<Response>> {
        let mut assembler = ResponseAssembler::new();
        let mut out = Vec::new();
        for line in input {
            if let Some(response) = assembler.push_line(line.as_bytes())? {
                out.push(response);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_parse_single_line() {
        let line = parse_response_line(b"220 Welcome to RAX FTP Server\r\n").unwrap();
        assert_eq!(line.code, 220);
        assert!(!line.is_continuation);
        assert_eq!(line.text, "Welcome to RAX FTP Server");
    }

    #[test]
    fn test_parse_continuation_and_bare_code() {
        let line = parse_response_line(b"211-Features:\r\n").unwrap();
        assert!(line.is_continuation);
        assert_eq!(line.text, "Features:");

        let bare = parse_response_line(b"226\r\n").unwrap();
        assert_eq!(bare.code, 226);
        assert_eq!(bare.text, "");
    }

    #[test]
    fn test_parse_malformed_lines() {
        assert!(matches!(
            parse_response_line(b"hello\r\n"),
            Err(FtpClientError::MalformedResponse(_))
        ));
        assert!(parse_response_line(b"22 short\r\n").is_err());
        assert!(parse_response_line(b"220xWelcome\r\n").is_err());
        assert!(parse_response_line(b"999 out of range\r\n").is_err());
        assert!(parse_response_line(b"").is_err());
    }

    #[test]
    fn test_multiline_reply_keeps_free_text() {
        let replies = assemble(&[
            "211-Features:\r\n",
            " MDTM\r\n",
            " SIZE\r\n",
            "211-still open\r\n",
            "211 End\r\n",
        ])
        .unwrap();
        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        assert_eq!(reply.code(), 211);
        assert!(reply.is_multiline());
        assert_eq!(reply.message(), "End");
        assert_eq!(reply.lines().len(), 5);
        assert_eq!(reply.lines()[1], " MDTM");
    }

    #[test]
    fn test_other_code_inside_multiline_is_text() {
        let replies = assemble(&["230-Welcome\r\n", "220 not the end\r\n", "230 Logged in\r\n"])
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code(), 230);
        assert_eq!(replies[0].lines()[1], "220 not the end");
    }

    #[test]
    fn test_back_to_back_replies() {
        let replies = assemble(&["426 Transfer aborted\r\n", "226 Abort successful\r\n"]).unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].class(), ResponseClass::TransientNegative);
        assert_eq!(replies[1].class(), ResponseClass::PositiveCompletion);
    }

    #[test]
    fn test_classification() {
        assert!(Response::new(150, "Opening").is_preliminary());
        assert!(Response::new(331, "Password required").is_intermediate());
        assert!(Response::new(550, "No such file").is_negative());
        assert!(Response::new(421, "Bye").is_negative());
        assert_eq!(Response::new(226, "done").to_string(), "226 done");
    }
}
