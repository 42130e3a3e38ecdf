//! Door session - the ASCII control connection that negotiates data channels.
//!
//! Requests are `<seq> 0 client <verb> ...` lines terminated by CRLF; every
//! request gets exactly one reply line. The sequence number of an `open`
//! request becomes the session id of the data channel it negotiates.

use crate::config::DcapConfig;
use crate::data::DataChannel;
use crate::error::{DcapError, Result};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Longest reply line accepted from a door, terminator included.
pub const MAX_REPLY_LEN: u64 = 8192;

/// Data channel coordinates returned by a successful `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEndpoint {
    pub host: String,
    pub port: u16,
    pub session_id: u32,
    pub challenge: Vec<u8>,
}

impl DataEndpoint {
    /// Open and bind the data channel described by this endpoint.
    pub async fn connect(&self, advisory_size: i64, config: &DcapConfig) -> Result<DataChannel> {
        DataChannel::connect(
            (self.host.as_str(), self.port),
            self.session_id,
            &self.challenge,
            advisory_size,
            config,
        )
        .await
    }
}

/// Control connection to a door.
pub struct DoorSession {
    door: String,
    stream: BufReader<TcpStream>,
    sequence: u32,
    request_timeout: Duration,
}

impl DoorSession {
    /// Connect to `door` (`host:port`) and say hello.
    pub async fn connect(door: &str, config: &DcapConfig) -> Result<Self> {
        let stream = match timeout(config.connect_timeout(), TcpStream::connect(door)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DcapError::Connection(format!(
                    "Failed to connect to door {}: {}",
                    door, e
                )))
            }
            Err(_) => {
                return Err(DcapError::Connection(format!(
                    "Connect to door {} timed out",
                    door
                )))
            }
        };

        let mut session = Self {
            door: door.to_string(),
            stream: BufReader::new(stream),
            sequence: 0,
            request_timeout: config.door_timeout(),
        };

        let seq = session.next_sequence();
        session
            .request(seq, format!("{} 0 client hello 0 0 0 0", seq))
            .await?;
        debug!(door, "door session established");
        Ok(session)
    }

    /// Ask the door for a data channel to `path` opened with `mode` (`r`, `w`, ...).
    pub async fn open(&mut self, path: &str, mode: &str) -> Result<DataEndpoint> {
        check_token("path", path)?;
        check_token("mode", mode)?;
        let seq = self.next_sequence();
        let line = format!(
            "{} 0 client open dcap://{}/{} {} localhost 1111 -passive",
            seq,
            self.door,
            path.trim_start_matches('/'),
            mode
        );
        let reply = self.request(seq, line).await?;
        let endpoint = parse_open_reply(seq, &reply)?;
        debug!(
            path,
            mode,
            host = %endpoint.host,
            port = endpoint.port,
            session_id = endpoint.session_id,
            "door granted data channel"
        );
        Ok(endpoint)
    }

    /// Say goodbye and drop the control connection.
    pub async fn disconnect(mut self) -> Result<()> {
        let seq = self.next_sequence();
        self.request(seq, format!("{} 0 client byebye", seq)).await?;
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }

    fn next_sequence(&mut self) -> u32 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    async fn request(&mut self, seq: u32, line: String) -> Result<String> {
        let limit = self.request_timeout;
        let stream = &mut self.stream;
        let exchange = async {
            let socket = stream.get_mut();
            socket.write_all(line.as_bytes()).await?;
            socket.write_all(b"\r\n").await?;
            socket.flush().await?;

            read_reply(stream).await
        };

        let reply = timeout(limit, exchange)
            .await
            .map_err(|_| DcapError::Timeout(limit))??;

        debug!(request = %line, reply = %reply, "door exchange");
        check_reply(seq, &reply)?;
        Ok(reply)
    }
}

/// Read one reply line, at most [`MAX_REPLY_LEN`] bytes long.
async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut reply = String::new();
    let n = (&mut *reader)
        .take(MAX_REPLY_LEN)
        .read_line(&mut reply)
        .await?;
    if n == 0 {
        return Err(DcapError::PeerClosed);
    }
    if !reply.ends_with('\n') {
        if n as u64 >= MAX_REPLY_LEN {
            return Err(DcapError::Control(format!(
                "Door reply longer than {} bytes",
                MAX_REPLY_LEN
            )));
        }
        return Err(DcapError::PeerClosed);
    }
    Ok(reply.trim_end_matches(['\r', '\n']).to_string())
}

/// Request fields are space separated; a value with whitespace or control
/// characters would split or end the request line.
fn check_token(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DcapError::Control(format!(
            "Invalid {} for door request: {:?}",
            what, value
        )));
    }
    Ok(())
}

/// Reject replies for another request and `failed` replies.
fn check_reply(seq: u32, reply: &str) -> Result<()> {
    let fields: Vec<&str> = reply.split_whitespace().collect();
    match fields.first().map(|s| s.parse::<u32>()) {
        Some(Ok(n)) if n == seq => {}
        _ => {
            return Err(DcapError::Control(format!(
                "Reply does not answer request {}: {}",
                seq, reply
            )))
        }
    }
    if fields.get(3) == Some(&"failed") {
        return Err(DcapError::Control(format!("Door refused request: {}", reply)));
    }
    Ok(())
}

/// `<seq> <id> server connect <host> <port> <challenge>`
fn parse_open_reply(seq: u32, reply: &str) -> Result<DataEndpoint> {
    let fields: Vec<&str> = reply.split_whitespace().collect();
    if fields.len() < 7 {
        return Err(DcapError::Control(format!(
            "Open reply too short: {}",
            reply
        )));
    }

    let port = fields[5]
        .parse::<u16>()
        .map_err(|_| DcapError::Control(format!("Invalid data port in reply: {}", fields[5])))?;

    Ok(DataEndpoint {
        host: fields[4].to_string(),
        port,
        session_id: seq,
        challenge: fields[6].as_bytes().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_reply() {
        let endpoint = parse_open_reply(3, "3 0 server connect pool-a 22125 Xy9z").unwrap();
        assert_eq!(endpoint.host, "pool-a");
        assert_eq!(endpoint.port, 22125);
        assert_eq!(endpoint.session_id, 3);
        assert_eq!(endpoint.challenge, b"Xy9z".to_vec());
    }

    #[test]
    fn test_parse_open_reply_short() {
        let err = parse_open_reply(1, "1 0 server connect pool-a").unwrap_err();
        assert!(matches!(err, DcapError::Control(_)));
    }

    #[test]
    fn test_parse_open_reply_bad_port() {
        let err = parse_open_reply(1, "1 0 server connect pool-a http abc").unwrap_err();
        assert!(matches!(err, DcapError::Control(_)));
    }

    #[test]
    fn test_check_token() {
        assert!(check_token("path", "/exports/data/p34").is_ok());
        assert!(check_token("mode", "r").is_ok());
        for bad in ["", "/a b", "/a\tb", "/a\r\n2 0 client byebye", "/a\u{0}"] {
            assert!(matches!(
                check_token("path", bad),
                Err(DcapError::Control(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_read_reply() {
        let mut src: &[u8] = b"0 0 server welcome 1 0\r\n1 0 server";
        assert_eq!(read_reply(&mut src).await.unwrap(), "0 0 server welcome 1 0");
        assert!(matches!(
            read_reply(&mut src).await,
            Err(DcapError::PeerClosed)
        ));
        assert!(matches!(
            read_reply(&mut src).await,
            Err(DcapError::PeerClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_reply_too_long() {
        let mut wire = vec![b'x'; MAX_REPLY_LEN as usize + 10];
        wire.extend_from_slice(b"\r\n");
        let mut src: &[u8] = &wire;
        assert!(matches!(
            read_reply(&mut src).await,
            Err(DcapError::Control(_))
        ));
    }

    #[test]
    fn test_check_reply() {
        assert!(check_reply(0, "0 0 server welcome 1 0").is_ok());
        assert!(check_reply(2, "1 0 server welcome").is_err());
        assert!(check_reply(2, "").is_err());
        assert!(matches!(
            check_reply(4, "4 0 server failed 2 \"No such file\""),
            Err(DcapError::Control(_))
        ));
    }
}
