//! Navigation and metadata command sequences
//!
//! Each function runs on an authenticated control channel and leaves it
//! ready for the next command.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::control::ControlChannel;
use crate::error::handlers::is_missing_file;
use crate::error::{FtpClientError, Operation, Result, classify_failure};
use crate::protocol::{Command, Response, ResponseClass, parse_mdtm, parse_quoted_path, parse_size};
use crate::transfer::{TransferType, set_type};

/// Creates a directory and returns the path the server reports for it
pub async fn make_dir(control: &mut ControlChannel, path: &str) -> Result<String> {
    let response = control
        .execute(
            Command::Mkd(path.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Mutation,
        )
        .await?;
    info!("Created directory {}", path);
    Ok(parse_quoted_path(&response).unwrap_or_else(|_| path.to_string()))
}

pub async fn remove_dir(control: &mut ControlChannel, path: &str) -> Result<()> {
    control
        .execute(
            Command::Rmd(path.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Mutation,
        )
        .await?;
    info!("Removed directory {}", path);
    Ok(())
}

pub async fn delete_file(control: &mut ControlChannel, path: &str) -> Result<()> {
    control
        .execute(
            Command::Dele(path.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Mutation,
        )
        .await?;
    info!("Deleted {}", path);
    Ok(())
}

/// RNFR (expects 350) followed by RNTO
pub async fn rename(control: &mut ControlChannel, from: &str, to: &str) -> Result<()> {
    control
        .execute(
            Command::Rnfr(from.to_string()),
            ResponseClass::PositiveIntermediate,
            Operation::Mutation,
        )
        .await?;
    control
        .execute(
            Command::Rnto(to.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Mutation,
        )
        .await?;
    info!("Renamed {} to {}", from, to);
    Ok(())
}

/// `SITE CHMOD <octal mode> <path>`
pub async fn chmod(control: &mut ControlChannel, path: &str, mode: u32) -> Result<()> {
    control
        .execute(
            Command::Site(format!("CHMOD {:03o} {}", mode, path)),
            ResponseClass::PositiveCompletion,
            Operation::Mutation,
        )
        .await?;
    info!("Changed mode of {} to {:03o}", path, mode);
    Ok(())
}

/// `TYPE I` then `SIZE`; `None` when the server reports the file missing
pub async fn file_size(control: &mut ControlChannel, path: &str) -> Result<Option<u64>> {
    set_type(control, TransferType::Binary).await?;
    let response = control.send_command(Command::Size(path.to_string())).await?;
    if response.is_completion() {
        parse_size(&response).map(Some)
    } else if is_missing_file(&response) {
        debug!("SIZE {}: not found ({})", path, response);
        Ok(None)
    } else {
        Err(classify_failure(Operation::Lookup, response))
    }
}

/// MDTM, interpreted as UTC since the protocol carries no zone
pub async fn last_modified(control: &mut ControlChannel, path: &str) -> Result<DateTime<Utc>> {
    let response = control
        .execute(
            Command::Mdtm(path.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Lookup,
        )
        .await?;
    parse_mdtm(&response)
}

pub async fn change_dir(control: &mut ControlChannel, path: &str) -> Result<()> {
    control
        .execute(
            Command::Cwd(path.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Lookup,
        )
        .await?;
    Ok(())
}

pub async fn cdup(control: &mut ControlChannel) -> Result<()> {
    control
        .execute(Command::Cdup, ResponseClass::PositiveCompletion, Operation::Lookup)
        .await?;
    Ok(())
}

pub async fn current_dir(control: &mut ControlChannel) -> Result<String> {
    let response = control
        .execute(Command::Pwd, ResponseClass::PositiveCompletion, Operation::Other)
        .await?;
    parse_quoted_path(&response)
}

/// Tries `CWD path`: 2xx is a directory, 5xx is not, anything else is an
/// error. The previous working directory is restored afterwards.
pub async fn directory_exists(control: &mut ControlChannel, path: &str) -> Result<bool> {
    let previous = current_dir(control).await?;

    let response = control.send_command(Command::Cwd(path.to_string())).await?;
    match response.class() {
        ResponseClass::PositiveCompletion => {
            change_dir(control, &previous).await?;
            Ok(true)
        }
        ResponseClass::PermanentNegative => {
            debug!("{} is not a directory: {}", path, response);
            Ok(false)
        }
        _ => Err(FtpClientError::UnexpectedResponse(response)),
    }
}

/// SYST; returns the system name text
pub async fn system_type(control: &mut ControlChannel) -> Result<String> {
    let response = control
        .execute(Command::Syst, ResponseClass::PositiveCompletion, Operation::Other)
        .await?;
    Ok(response.message().to_string())
}

/// SITE with a free-form argument
pub async fn site(control: &mut ControlChannel, arguments: &str) -> Result<Response> {
    control
        .execute(
            Command::Site(arguments.to_string()),
            ResponseClass::PositiveCompletion,
            Operation::Mutation,
        )
        .await
}
