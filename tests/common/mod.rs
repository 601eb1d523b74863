//! Scripted in-process FTP server for integration tests.
//!
//! Serves an in-memory file tree to one user (`alice` / `alice123`) and
//! records every command it receives.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

use rax_ftp_client::{ConnectionOptions, Credentials, SessionOptions};

pub const USER: &str = "alice";
pub const PASSWORD: &str = "alice123";

/// Server-side knobs and observable state
#[derive(Debug, Default)]
pub struct ServerState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    /// Every command line received, in order
    pub commands: Vec<String>,
    pub connections: usize,
    /// Reply 502 to PASV and EPSV
    pub refuse_passive: bool,
    /// RETR of this path sends in chunks of `.1` bytes with `.2` between them
    pub slow_retr: Option<(String, usize, Duration)>,
    /// RETR of this path waits this long before sending anything
    pub stall_retr: Option<(String, Duration)>,
    /// RETR of this path stops after this many bytes but still reports success
    pub truncate_retr: Option<(String, usize)>,
    /// RETR of this path holds back the 226 after the data is sent
    pub delay_completion: Option<(String, Duration)>,
    /// Reply 502 to REST
    pub refuse_rest: bool,
    /// Reply 500 to PORT
    pub refuse_port: bool,
    /// Accept PORT but never connect back
    pub ignore_port: bool,
    /// Answer PASV with a reply that carries no address
    pub garbled_pasv: bool,
    /// Hold back the PWD reply
    pub delay_pwd: Option<Duration>,
    /// Never answer ABOR
    pub silent_abor: bool,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub async fn start(files: &[(&str, Vec<u8>)], dirs: &[&str]) -> MockServer {
        let mut state = ServerState::default();
        state.dirs.insert("/".to_string());
        for dir in dirs {
            state.dirs.insert(dir.to_string());
        }
        for (path, data) in files {
            state.files.insert(path.to_string(), data.clone());
        }
        let state = Arc::new(Mutex::new(state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                shared.lock().unwrap().connections += 1;
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = handle_client(stream, state).await;
                });
            }
        });

        MockServer { addr, state }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new("127.0.0.1", USER, PASSWORD).with_port(self.addr.port())
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn with_state(&self, f: impl FnOnce(&mut ServerState)) {
        f(&mut self.state.lock().unwrap());
    }
}

/// Short timeouts so failing tests fail fast
pub fn test_options() -> ConnectionOptions {
    ConnectionOptions {
        connect_timeout: Duration::from_secs(5),
        accept_timeout: Duration::from_secs(5),
        abort_timeout: Duration::from_secs(2),
        ..ConnectionOptions::default()
    }
}

pub fn session_options(reuse_connection: bool) -> SessionOptions {
    SessionOptions {
        connection: test_options(),
        reuse_connection,
        ..SessionOptions::default()
    }
}

/// Deterministic non-repeating-ish test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

enum PendingData {
    Listening(TcpListener),
    Connect(SocketAddr),
}

struct Session {
    user: Option<String>,
    authenticated: bool,
    cwd: String,
    rest: u64,
    rename_from: Option<String>,
    pending: Option<PendingData>,
    /// A 150 was sent but the data connection was never opened
    stalled_transfer: bool,
}

async fn reply(writer: &mut OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    writer.write_all(format!("{}\r\n", text).as_bytes()).await?;
    writer.flush().await
}

/// With `ignore_port`, announces the transfer but never connects back
async fn skip_active_data(
    state: &Arc<Mutex<ServerState>>,
    session: &mut Session,
    writer: &mut OwnedWriteHalf,
) -> std::io::Result<bool> {
    let ignore = state.lock().unwrap().ignore_port;
    if ignore && matches!(session.pending, Some(PendingData::Connect(_))) {
        session.pending = None;
        session.stalled_transfer = true;
        reply(writer, "150 Opening data connection").await?;
        return Ok(true);
    }
    Ok(false)
}

fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), arg)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn listing(state: &ServerState, dir: &str, names_only: bool) -> String {
    let mut out = String::new();
    if !names_only {
        out.push_str("total 8\r\n");
    }
    for sub in state.dirs.iter().filter(|d| *d != "/" && parent_of(d) == dir) {
        if names_only {
            out.push_str(&format!("{}\r\n", name_of(sub)));
        } else {
            out.push_str(&format!(
                "drwxr-xr-x    2 ftp      ftp          4096 Mar 14 09:12 {}\r\n",
                name_of(sub)
            ));
        }
    }
    for (path, data) in state.files.iter().filter(|(p, _)| parent_of(p) == dir) {
        if names_only {
            out.push_str(&format!("{}\r\n", name_of(path)));
        } else {
            out.push_str(&format!(
                "-rw-r--r--    1 ftp      ftp      {:>8} Mar 14 09:12 {}\r\n",
                data.len(),
                name_of(path)
            ));
        }
    }
    out
}

async fn open_data(pending: Option<PendingData>) -> std::io::Result<TcpStream> {
    match pending {
        Some(PendingData::Listening(listener)) => {
            match timeout(Duration::from_secs(5), listener.accept()).await {
                Ok(Ok((stream, _))) => Ok(stream),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(std::io::Error::from(std::io::ErrorKind::TimedOut)),
            }
        }
        Some(PendingData::Connect(addr)) => TcpStream::connect(addr).await,
        None => Err(std::io::Error::from(std::io::ErrorKind::NotConnected)),
    }
}

fn parse_port(arg: &str) -> Option<SocketAddr> {
    let values: Vec<u8> = arg.split(',').filter_map(|v| v.trim().parse().ok()).collect();
    if values.len() != 6 {
        return None;
    }
    let ip = Ipv4Addr::new(values[0], values[1], values[2], values[3]);
    let port = u16::from(values[4]) * 256 + u16::from(values[5]);
    Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

async fn handle_client(stream: TcpStream, state: Arc<Mutex<ServerState>>) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    writer
        .write_all(b"220-Welcome to the mock FTP server\r\n220 Ready\r\n")
        .await?;

    let mut session = Session {
        user: None,
        authenticated: false,
        cwd: "/".to_string(),
        rest: 0,
        rename_from: None,
        pending: None,
        stalled_transfer: false,
    };

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let raw = line.trim_end().to_string();
        state.lock().unwrap().commands.push(raw.clone());

        let (verb, arg) = match raw.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (raw.to_ascii_uppercase(), String::new()),
        };

        match verb.as_str() {
            "USER" => {
                session.user = Some(arg);
                reply(&mut writer, "331 Password required").await?;
                continue;
            }
            "PASS" => {
                if session.user.as_deref() == Some(USER) && arg == PASSWORD {
                    session.authenticated = true;
                    reply(&mut writer, "230 Login successful").await?;
                } else {
                    reply(&mut writer, "530 Login incorrect").await?;
                }
                continue;
            }
            "QUIT" => {
                reply(&mut writer, "221 Goodbye").await?;
                return Ok(());
            }
            _ if !session.authenticated => {
                reply(&mut writer, "530 Please login with USER and PASS").await?;
                continue;
            }
            _ => {}
        }

        let (refuse_rest, refuse_port, silent_abor) = {
            let state = state.lock().unwrap();
            (state.refuse_rest, state.refuse_port, state.silent_abor)
        };

        // A restart marker only applies to the command right after REST
        if !matches!(verb.as_str(), "REST" | "RETR" | "STOR") {
            session.rest = 0;
        }

        match verb.as_str() {
            "SYST" => reply(&mut writer, "215 UNIX Type: L8").await?,
            "TYPE" => reply(&mut writer, &format!("200 Switching to {} mode", arg)).await?,
            "PWD" => {
                let delay = state.lock().unwrap().delay_pwd;
                if let Some(delay) = delay {
                    sleep(delay).await;
                }
                let text = format!("257 \"{}\" is the current directory", session.cwd);
                reply(&mut writer, &text).await?
            }
            "CWD" => {
                let path = resolve(&session.cwd, &arg);
                if state.lock().unwrap().dirs.contains(&path) {
                    session.cwd = path;
                    reply(&mut writer, "250 Directory successfully changed").await?
                } else {
                    reply(&mut writer, "550 Failed to change directory").await?
                }
            }
            "CDUP" => {
                session.cwd = parent_of(&session.cwd);
                reply(&mut writer, "250 Directory successfully changed").await?
            }
            "MKD" => {
                let path = resolve(&session.cwd, &arg);
                state.lock().unwrap().dirs.insert(path.clone());
                reply(&mut writer, &format!("257 \"{}\" created", path)).await?
            }
            "RMD" => {
                let path = resolve(&session.cwd, &arg);
                if state.lock().unwrap().dirs.remove(&path) {
                    reply(&mut writer, "250 Remove directory operation successful").await?
                } else {
                    reply(&mut writer, "550 Remove directory operation failed").await?
                }
            }
            "DELE" => {
                let path = resolve(&session.cwd, &arg);
                if state.lock().unwrap().files.remove(&path).is_some() {
                    reply(&mut writer, "250 Delete operation successful").await?
                } else {
                    reply(&mut writer, "550 No such file or directory").await?
                }
            }
            "RNFR" => {
                let path = resolve(&session.cwd, &arg);
                let exists = {
                    let state = state.lock().unwrap();
                    state.files.contains_key(&path) || state.dirs.contains(&path)
                };
                if exists {
                    session.rename_from = Some(path);
                    reply(&mut writer, "350 Ready for RNTO").await?
                } else {
                    reply(&mut writer, "550 RNFR command failed").await?
                }
            }
            "RNTO" => {
                let to = resolve(&session.cwd, &arg);
                match session.rename_from.take() {
                    Some(from) => {
                        {
                            let mut state = state.lock().unwrap();
                            if let Some(data) = state.files.remove(&from) {
                                state.files.insert(to, data);
                            } else if state.dirs.remove(&from) {
                                state.dirs.insert(to);
                            }
                        }
                        reply(&mut writer, "250 Rename successful").await?
                    }
                    None => reply(&mut writer, "503 RNFR required first").await?,
                }
            }
            "SIZE" => {
                let path = resolve(&session.cwd, &arg);
                let size = state.lock().unwrap().files.get(&path).map(Vec::len);
                match size {
                    Some(size) => reply(&mut writer, &format!("213 {}", size)).await?,
                    None => reply(&mut writer, "550 Could not get file size").await?,
                }
            }
            "MDTM" => {
                let path = resolve(&session.cwd, &arg);
                if state.lock().unwrap().files.contains_key(&path) {
                    reply(&mut writer, "213 20240314091200").await?
                } else {
                    reply(&mut writer, "550 Could not get file modification time").await?
                }
            }
            "SITE" => {
                if arg.eq_ignore_ascii_case("HELP") {
                    writer
                        .write_all(
                            b"214-The following SITE commands are recognized\r\n CHMOD HELP\r\n214 Help OK\r\n",
                        )
                        .await?;
                } else if arg.to_ascii_uppercase().starts_with("CHMOD ") {
                    reply(&mut writer, "200 SITE CHMOD command ok").await?
                } else {
                    reply(&mut writer, "500 Unknown SITE command").await?
                }
            }
            "REST" if refuse_rest => {
                reply(&mut writer, "502 REST not implemented").await?
            }
            "REST" => match arg.parse::<u64>() {
                Ok(offset) => {
                    session.rest = offset;
                    reply(&mut writer, &format!("350 Restart position accepted ({})", offset))
                        .await?
                }
                Err(_) => reply(&mut writer, "501 Bad REST argument").await?,
            },
            "PASV" | "EPSV" => {
                if state.lock().unwrap().refuse_passive {
                    reply(&mut writer, "502 Command not implemented").await?;
                    continue;
                }
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                session.pending = Some(PendingData::Listening(listener));
                let garbled = state.lock().unwrap().garbled_pasv;
                if garbled && verb == "PASV" {
                    reply(&mut writer, "227 Entering Passive Mode (nonsense)").await?
                } else if verb == "PASV" {
                    let text = format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{}).",
                        port / 256,
                        port % 256
                    );
                    reply(&mut writer, &text).await?
                } else {
                    let text = format!("229 Entering Extended Passive Mode (|||{}|)", port);
                    reply(&mut writer, &text).await?
                }
            }
            "PORT" if refuse_port => {
                reply(&mut writer, "500 Illegal PORT command").await?
            }
            "PORT" => match parse_port(&arg) {
                Some(addr) => {
                    session.pending = Some(PendingData::Connect(addr));
                    reply(&mut writer, "200 PORT command successful").await?
                }
                None => reply(&mut writer, "501 Illegal PORT command").await?,
            },
            "LIST" | "NLST" => {
                let path = if arg.is_empty() {
                    session.cwd.clone()
                } else {
                    resolve(&session.cwd, &arg)
                };
                let text = listing(&state.lock().unwrap(), &path, verb == "NLST");
                if skip_active_data(&state, &mut session, &mut writer).await? {
                    continue;
                }
                reply(&mut writer, "150 Here comes the directory listing").await?;
                match open_data(session.pending.take()).await {
                    Ok(mut data) => {
                        data.write_all(text.as_bytes()).await?;
                        data.shutdown().await?;
                        reply(&mut writer, "226 Directory send OK").await?
                    }
                    Err(_) => reply(&mut writer, "425 Can't open data connection").await?,
                }
            }
            "RETR" => {
                let path = resolve(&session.cwd, &arg);
                let offset = std::mem::take(&mut session.rest) as usize;
                let (file, slow, stall, truncate, hold) = {
                    let state = state.lock().unwrap();
                    (
                        state.files.get(&path).cloned(),
                        state
                            .slow_retr
                            .clone()
                            .filter(|(p, _, _)| *p == path)
                            .map(|(_, chunk, delay)| (chunk, delay)),
                        state
                            .stall_retr
                            .clone()
                            .filter(|(p, _)| *p == path)
                            .map(|(_, delay)| delay),
                        state
                            .truncate_retr
                            .clone()
                            .filter(|(p, _)| *p == path)
                            .map(|(_, len)| len),
                        state
                            .delay_completion
                            .clone()
                            .filter(|(p, _)| *p == path)
                            .map(|(_, delay)| delay),
                    )
                };
                let Some(file) = file else {
                    session.pending = None;
                    reply(&mut writer, "550 Failed to open file").await?;
                    continue;
                };

                let mut body = file[offset.min(file.len())..].to_vec();
                if let Some(len) = truncate {
                    body.truncate(len);
                }

                if skip_active_data(&state, &mut session, &mut writer).await? {
                    continue;
                }
                reply(&mut writer, "150 Opening BINARY mode data connection").await?;
                let mut data = match open_data(session.pending.take()).await {
                    Ok(data) => data,
                    Err(_) => {
                        reply(&mut writer, "425 Can't open data connection").await?;
                        continue;
                    }
                };

                if let Some(delay) = stall {
                    sleep(delay).await;
                }

                let (chunk, delay) = slow.unwrap_or((body.len().max(1), Duration::ZERO));
                let mut sent_ok = true;
                for piece in body.chunks(chunk) {
                    if data.write_all(piece).await.is_err() {
                        sent_ok = false;
                        break;
                    }
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                if sent_ok {
                    let _ = data.shutdown().await;
                    if let Some(delay) = hold {
                        sleep(delay).await;
                    }
                    reply(&mut writer, "226 Transfer complete").await?
                } else {
                    reply(&mut writer, "426 Connection closed; transfer aborted").await?
                }
            }
            "STOR" => {
                let path = resolve(&session.cwd, &arg);
                let offset = std::mem::take(&mut session.rest) as usize;
                reply(&mut writer, "150 Ok to send data").await?;
                let mut data = match open_data(session.pending.take()).await {
                    Ok(data) => data,
                    Err(_) => {
                        reply(&mut writer, "425 Can't open data connection").await?;
                        continue;
                    }
                };
                let mut received = Vec::new();
                let _ = data.read_to_end(&mut received).await;
                {
                    let mut state = state.lock().unwrap();
                    let file = state.files.entry(path).or_default();
                    file.truncate(offset);
                    file.extend_from_slice(&received);
                }
                reply(&mut writer, "226 Transfer complete").await?
            }
            "ABOR" if silent_abor => {}
            "ABOR" if session.stalled_transfer => {
                session.stalled_transfer = false;
                writer
                    .write_all(b"426 Data connection never opened\r\n226 ABOR successful\r\n")
                    .await?;
            }
            "ABOR" => reply(&mut writer, "225 No transfer to abort").await?,
            "NOOP" => reply(&mut writer, "200 NOOP ok").await?,
            _ => reply(&mut writer, "502 Command not implemented").await?,
        }
    }
}
