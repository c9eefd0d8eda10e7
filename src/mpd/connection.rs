//! MPD text-protocol connection and the client traits the listener is written against.

use crate::mpd::status::PlayerStatus;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Upper bound on establishing the TCP session and reading the greeting.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Key/value pairs of a single MPD response, as sent by the server.
pub type Fields = HashMap<String, String>;

/// Errors that can occur while talking to MPD
#[derive(thiserror::Error, Debug)]
pub enum MpdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("server error {code}: {message}")]
    Ack { code: u32, message: String },
    #[error("connection closed by server")]
    Closed,
    #[error("timed out connecting to {0}")]
    Timeout(String),
}

/// Player subsystems understood by `idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Player,
}

impl Subsystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Player => "player",
        }
    }
}

/// A live session with the player.
pub trait PlayerClient: Send {
    /// Blocks until `subsystem` changes. `Ok(false)` means the idle ended
    /// without a change to that subsystem.
    fn idle(&mut self, subsystem: Subsystem) -> impl Future<Output = Result<bool, MpdError>> + Send;
    fn status(&mut self) -> impl Future<Output = Result<PlayerStatus, MpdError>> + Send;
    /// Raw tags of the current song. Missing keys are simply absent.
    fn current_song(&mut self) -> impl Future<Output = Result<Fields, MpdError>> + Send;
    /// Releases the session. Errors are ignored, the session is gone either way.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens sessions. Holds whatever address and credentials are needed.
pub trait Dialer: Send + Sync + 'static {
    type Client: PlayerClient + 'static;

    fn dial(&self) -> impl Future<Output = Result<Self::Client, MpdError>> + Send;
    /// Human readable target for logs.
    fn target(&self) -> String;
}

/// Dials MPD over TCP.
#[derive(Debug, Clone)]
pub struct MpdDialer {
    pub address: String,
    pub password: Option<String>,
}

impl MpdDialer {
    pub fn new(address: impl Into<String>, password: Option<String>) -> Self {
        Self { address: address.into(), password: password.filter(|p| !p.is_empty()) }
    }
}

impl Dialer for MpdDialer {
    type Client = MpdConnection;

    async fn dial(&self) -> Result<MpdConnection, MpdError> {
        let connect = MpdConnection::connect(&self.address, self.password.as_deref());
        let conn = tokio::time::timeout(DIAL_TIMEOUT, connect)
            .await
            .map_err(|_| MpdError::Timeout(self.address.clone()))??;
        tracing::debug!(version = conn.version(), "MPD greeting accepted");
        Ok(conn)
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}

/// One MPD protocol session.
#[derive(Debug)]
pub struct MpdConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    version: String,
}

impl MpdConnection {
    /// Connects, checks the `OK MPD <version>` greeting and authenticates when
    /// a password is given.
    pub async fn connect(address: &str, password: Option<&str>) -> Result<Self, MpdError> {
        let stream = TcpStream::connect(address).await?;
        let (read, writer) = stream.into_split();
        let mut reader = BufReader::new(read);

        let mut greeting = String::new();
        if reader.read_line(&mut greeting).await? == 0 {
            return Err(MpdError::Closed);
        }
        let version = greeting
            .trim_end()
            .strip_prefix("OK MPD ")
            .ok_or_else(|| MpdError::Protocol(format!("unexpected greeting {:?}", greeting.trim_end())))?
            .to_string();

        let mut conn = Self { reader, writer, version };
        if let Some(password) = password {
            conn.command(&format!("password {}", quote(password))).await?;
        }
        Ok(conn)
    }

    /// Protocol version announced by the server.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Sends one command and collects its response pairs up to `OK`.
    async fn command(&mut self, command: &str) -> Result<Vec<(String, String)>, MpdError> {
        tracing::trace!(command, "mpd command");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        self.read_response().await
    }

    async fn read_response(&mut self) -> Result<Vec<(String, String)>, MpdError> {
        let mut pairs = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(MpdError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line == "OK" {
                return Ok(pairs);
            }
            if let Some(ack) = line.strip_prefix("ACK ") {
                return Err(parse_ack(ack));
            }
            match line.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
                None => return Err(MpdError::Protocol(format!("malformed line {line:?}"))),
            }
        }
    }
}

impl PlayerClient for MpdConnection {
    async fn idle(&mut self, subsystem: Subsystem) -> Result<bool, MpdError> {
        let pairs = self.command(&format!("idle {}", subsystem.as_str())).await?;
        Ok(pairs
            .iter()
            .any(|(key, value)| key == "changed" && value == subsystem.as_str()))
    }

    async fn status(&mut self) -> Result<PlayerStatus, MpdError> {
        let pairs = self.command("status").await?;
        Ok(PlayerStatus::from_fields(&pairs.into_iter().collect()))
    }

    async fn current_song(&mut self) -> Result<Fields, MpdError> {
        // Multi-valued tags keep their first value.
        let mut fields = Fields::new();
        for (key, value) in self.command("currentsong").await? {
            fields.entry(key).or_insert(value);
        }
        Ok(fields)
    }

    async fn close(mut self) {
        let _ = self.writer.write_all(b"close\n").await;
        let _ = self.writer.shutdown().await;
    }
}

/// Parses `[code@index] {command} message` following `ACK `.
fn parse_ack(ack: &str) -> MpdError {
    let code = ack
        .strip_prefix('[')
        .and_then(|rest| rest.split_once('@'))
        .and_then(|(code, _)| code.parse().ok())
        .unwrap_or(0);
    let message = ack
        .split_once("} ")
        .map(|(_, message)| message)
        .unwrap_or(ack)
        .to_string();
    MpdError::Ack { code, message }
}

/// Quotes a command argument the way MPD expects.
fn quote(arg: &str) -> String {
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpd::status::PlayState;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Fake server: sends the greeting, then answers each received line
    /// with the scripted reply in order, recording the commands.
    async fn fake_server(replies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(b"OK MPD 0.23.5\n").await.unwrap();
            let mut received = Vec::new();
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received.push(line.trim_end().to_string());
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            // Drain whatever the client sends before it hangs up.
            let mut rest = String::new();
            let _ = reader.read_to_string(&mut rest).await;
            received.extend(rest.lines().map(str::to_string));
            received
        });
        (address, handle)
    }

    #[tokio::test]
    async fn greeting_and_password() {
        let (address, server) = fake_server(vec!["OK\n"]).await;
        let conn = MpdDialer::new(address, Some("se\"cret".into())).dial().await.unwrap();
        assert_eq!(conn.version(), "0.23.5");
        conn.close().await;
        let received = server.await.unwrap();
        assert_eq!(received, vec![r#"password "se\"cret""#.to_string(), "close".to_string()]);
    }

    #[tokio::test]
    async fn wrong_password_is_ack() {
        let (address, _server) =
            fake_server(vec!["ACK [3@0] {password} incorrect password\n"]).await;
        let err = MpdConnection::connect(&address, Some("nope")).await.unwrap_err();
        match err {
            MpdError::Ack { code, message } => {
                assert_eq!(code, 3);
                assert_eq!(message, "incorrect password");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_status_and_current_song() {
        let (address, server) = fake_server(vec![
            "changed: player\nOK\n",
            "volume: 80\nstate: play\nelapsed: 12.5\nOK\n",
            "file: music/a.flac\nTitle: Song\nArtist: One\nArtist: Two\nTime: 245\nOK\n",
            "changed: mixer\nOK\n",
        ])
        .await;
        let mut conn = MpdConnection::connect(&address, None).await.unwrap();

        assert!(conn.idle(Subsystem::Player).await.unwrap());
        let status = conn.status().await.unwrap();
        assert_eq!(status.state, PlayState::Playing);
        assert_eq!(status.elapsed, 12.5);

        let song = conn.current_song().await.unwrap();
        assert_eq!(song.get("file").map(String::as_str), Some("music/a.flac"));
        assert_eq!(song.get("Artist").map(String::as_str), Some("One"));
        assert_eq!(song.get("Time").map(String::as_str), Some("245"));
        assert!(!song.contains_key("Album"));

        assert!(!conn.idle(Subsystem::Player).await.unwrap());
        conn.close().await;

        let received = server.await.unwrap();
        assert_eq!(received, ["idle player", "status", "currentsong", "idle player", "close"]);
    }

    #[tokio::test]
    async fn eof_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            write.write_all(b"OK MPD 0.23.5\n").await.unwrap();
            // Take the command, then hang up without answering.
            let mut line = String::new();
            BufReader::new(read).read_line(&mut line).await.unwrap();
            assert_eq!(line, "status\n");
        });
        let mut conn = MpdConnection::connect(&address, None).await.unwrap();
        let result = conn.status().await;
        assert!(matches!(result, Err(MpdError::Closed)), "got {result:?}");
    }

    #[tokio::test]
    async fn eof_mid_response_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            write.write_all(b"OK MPD 0.23.5\n").await.unwrap();
            let mut line = String::new();
            BufReader::new(read).read_line(&mut line).await.unwrap();
            write.write_all(b"file: music/a.flac\nTitle: Song\n").await.unwrap();
        });
        let mut conn = MpdConnection::connect(&address, None).await.unwrap();
        let result = conn.current_song().await;
        assert!(matches!(result, Err(MpdError::Closed)), "got {result:?}");
    }

    #[tokio::test]
    async fn bad_greeting_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"HELLO\n").await.unwrap();
            let mut buf = Vec::new();
            let _ = socket.read_to_end(&mut buf).await;
        });
        let err = MpdConnection::connect(&address, None).await.unwrap_err();
        assert!(matches!(err, MpdError::Protocol(_)));
    }

    #[test]
    fn ack_parsing() {
        match parse_ack("[50@1] {play} No such song") {
            MpdError::Ack { code, message } => {
                assert_eq!(code, 50);
                assert_eq!(message, "No such song");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
