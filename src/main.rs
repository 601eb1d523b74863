//! RAX FTP Client - Entry Point
//!
//! Command-line front end over the session facade.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use rax_ftp_client::utils::{level_for_verbosity, setup_logging};
use rax_ftp_client::{
    CancellationToken, ClientConfig, Flow, FtpSession, TransferMode, TransferRequest,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "RAX FTP client")]
struct Args {
    /// Configuration file (extension optional, missing file is fine)
    #[arg(long, default_value = "config")]
    config: String,

    /// Server host, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Use active mode (PORT)
    #[arg(long, conflicts_with = "epsv")]
    active: bool,

    /// Use extended passive mode (EPSV)
    #[arg(long)]
    epsv: bool,

    /// Include hidden entries in listings
    #[arg(short = 'a', long)]
    all: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Parsed directory listing
    Ls { path: Option<String> },
    /// Names only
    Nlst { path: Option<String> },
    /// Download a file
    Get {
        remote: String,
        local: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to read, 0 reads to end of file
        #[arg(long, default_value_t = 0)]
        length: u64,
    },
    /// Upload a file
    Put {
        local: PathBuf,
        remote: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    Mkdir { path: String },
    Rmdir { path: String },
    Rm { path: String },
    Mv { from: String, to: String },
    /// Copy a remote file to another remote path
    Cp { from: String, to: String },
    /// Change permissions, mode in octal (e.g. 644)
    Chmod { mode: String, path: String },
    Size { path: String },
    Mdtm { path: String },
    /// Exit status 0 when the path is a directory
    IsDir { path: String },
    Pwd,
    Syst,
    /// Raw SITE command
    Site { arguments: Vec<String> },
}

fn progress_printer() -> impl FnMut(u64, Option<u64>) -> Flow + Send + 'static {
    |done, total| {
        match total {
            Some(total) if total > 0 => {
                eprint!("\r{} / {} bytes ({}%)", done, total, done * 100 / total)
            }
            _ => eprint!("\r{} bytes", done),
        }
        let _ = std::io::stderr().flush();
        Flow::Continue
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<bool, Box<dyn Error>> {
    let mut config = ClientConfig::load_from(&args.config)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(user) = args.user {
        config.username = user;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if args.active {
        config.transfer_mode = TransferMode::Active;
    } else if args.epsv {
        config.transfer_mode = TransferMode::ExtendedPassive;
    }
    if args.all {
        config.show_hidden = true;
    }

    let mut session = FtpSession::new(config.credentials(), config.session_options());
    info!("Using {}", session.credentials());

    let mut success = true;
    match args.command {
        Action::Ls { path } => {
            for entry in session.list(path.as_deref(), &cancel).await? {
                let kind = if entry.is_directory() { 'd' } else { '-' };
                let modified = entry
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                match &entry.link_target {
                    Some(target) => println!(
                        "{} {:>12} {:16} {} -> {}",
                        kind, entry.size, modified, entry.name, target
                    ),
                    None => println!("{} {:>12} {:16} {}", kind, entry.size, modified, entry.name),
                }
            }
        }
        Action::Nlst { path } => {
            for name in session.name_list(path.as_deref(), &cancel).await? {
                println!("{}", name);
            }
        }
        Action::Get {
            remote,
            local,
            offset,
            length,
        } => {
            let request = TransferRequest::new(remote)
                .offset(offset)
                .length(length)
                .on_progress(progress_printer())
                .cancel_with(cancel.clone());
            let report = session.download_file(request, &local).await?;
            eprintln!();
            println!("{} bytes received", report.bytes);
        }
        Action::Put {
            local,
            remote,
            offset,
        } => {
            let request = TransferRequest::new(remote)
                .offset(offset)
                .on_progress(progress_printer())
                .cancel_with(cancel.clone());
            let report = session.upload_file(&local, request).await?;
            eprintln!();
            println!("{} bytes sent", report.bytes);
        }
        Action::Mkdir { path } => println!("{}", session.make_dir(&path).await?),
        Action::Rmdir { path } => session.remove_dir(&path).await?,
        Action::Rm { path } => session.delete_file(&path).await?,
        Action::Mv { from, to } => session.rename(&from, &to).await?,
        Action::Cp { from, to } => {
            let report = session.copy(&from, &to, &cancel).await?;
            println!("{} bytes copied", report.bytes);
        }
        Action::Chmod { mode, path } => {
            let mode = u32::from_str_radix(&mode, 8)?;
            session.chmod(&path, mode).await?;
        }
        Action::Size { path } => match session.file_size(&path).await? {
            Some(size) => println!("{}", size),
            None => {
                println!("{}: not found", path);
                success = false;
            }
        },
        Action::Mdtm { path } => println!("{}", session.last_modified(&path).await?.to_rfc3339()),
        Action::IsDir { path } => success = session.directory_exists(&path).await?,
        Action::Pwd => println!("{}", session.current_dir().await?),
        Action::Syst => println!("{}", session.system_type().await?),
        Action::Site { arguments } => println!("{}", session.site(&arguments.join(" ")).await?),
    }

    session.close().await?;
    Ok(success)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(level_for_verbosity(args.verbose));

    // Ctrl-C cancels the running operation; the engine aborts it cleanly
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, aborting...");
            on_interrupt.cancel();
        }
    });

    match run(args, cancel).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}
