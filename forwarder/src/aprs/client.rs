//! Minimal APRS-IS uplink: one connection per packet.
//!
//! ```text
//! server: # aprsc 2.1.14
//! client: user N0CALL pass 12345 vers traccar2forward 0.1.0
//! server: # logresp N0CALL verified, server T2TEST
//! client: N0CALL-10>TRCCAR,TCPIP*:/...
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const SOFTWARE: &str = "traccar2forward";

/// Passcode used for receive-only logins. The server answers "unverified".
const RECEIVE_ONLY_PASSCODE: &str = "-1";

#[derive(Error, Debug)]
pub enum AprsError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("timed out talking to {0}")]
    Timeout(String),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connects, logs in and sends a single packet line. The whole session is
/// bounded by `timeout`.
pub async fn send_packet(
    host: &str,
    port: u16,
    callsign: &str,
    passcode: &str,
    packet: &str,
    timeout: Duration,
) -> Result<(), AprsError> {
    let address = format!("{host}:{port}");

    tokio::time::timeout(
        timeout,
        session(&address, callsign, passcode, packet),
    )
    .await
    .map_err(|_| AprsError::Timeout(address.clone()))?
}

async fn session(
    address: &str,
    callsign: &str,
    passcode: &str,
    packet: &str,
) -> Result<(), AprsError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|source| AprsError::Connect {
            address: address.to_string(),
            source,
        })?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let banner = lines.next_line().await?.ok_or(AprsError::ConnectionClosed)?;
    tracing::debug!(%address, %banner, "Connected to APRS-IS");

    let login = format!(
        "user {callsign} pass {passcode} vers {SOFTWARE} {}",
        env!("CARGO_PKG_VERSION")
    );
    write_line(&mut writer, &login).await?;

    loop {
        let line = lines.next_line().await?.ok_or(AprsError::ConnectionClosed)?;
        if line.starts_with("# logresp") {
            check_login(&line, callsign, passcode)?;
            break;
        }
        tracing::trace!(%line, "Skipping server line");
    }

    write_line(&mut writer, packet).await?;
    writer.shutdown().await?;
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// `# logresp <callsign> <verified|unverified>, server <id>`
fn check_login(response: &str, callsign: &str, passcode: &str) -> Result<(), AprsError> {
    let fields: Vec<&str> = response.split_whitespace().collect();
    let (Some(login), Some(status)) = (fields.get(2), fields.get(3)) else {
        return Err(AprsError::LoginRejected(response.to_string()));
    };

    if !login.eq_ignore_ascii_case(callsign) {
        return Err(AprsError::LoginRejected(format!(
            "server logged in {login} instead of {callsign}"
        )));
    }

    if status.trim_end_matches(',') != "verified" && passcode != RECEIVE_ONLY_PASSCODE {
        return Err(AprsError::LoginRejected(format!(
            "passcode not accepted for {callsign}"
        )));
    }

    Ok(())
}
