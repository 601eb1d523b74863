//! Login credentials
//!
//! An immutable host/port/user/password value handed to every session
//! operation.

use std::fmt;

/// Standard FTP control port
pub const DEFAULT_PORT: u16 = 21;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Same credentials on another port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Login as `anonymous`
    pub fn anonymous(host: impl Into<String>) -> Self {
        Self::new(host, "anonymous", "anonymous@")
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let creds = Credentials::new("ftp.example.com", "alice", "alice123");
        assert_eq!(creds.port(), 21);
        assert_eq!(creds.with_port(2121).port(), 2121);
    }

    #[test]
    fn test_password_never_printed() {
        let creds = Credentials::new("ftp.example.com", "alice", "alice123");
        assert!(!format!("{:?}", creds).contains("alice123"));
        assert_eq!(creds.to_string(), "alice@ftp.example.com:21");
    }
}
