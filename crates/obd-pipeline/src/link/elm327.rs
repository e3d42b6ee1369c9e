//! ELM327 adapter over TCP
//!
//! Wi-Fi OBD dongles expose the ELM327 interpreter on a raw TCP socket.
//! Commands are ASCII lines terminated by `\r`; every response ends with
//! the `>` prompt.

use std::time::Duration;

use async_trait::async_trait;
use obd_core::{Pid, RawFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{LinkAdapter, LinkError};
use crate::config::Elm327Config;

const PROMPT: u8 = b'>';

/// Initialisation sequence: reset, echo off, spaces off, linefeeds off,
/// automatic protocol detection
const INIT_COMMANDS: &[&str] = &["ATZ", "ATE0", "ATS0", "ATL0", "ATSP0"];

/// Reset drains at most this long before giving up on the connection
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Connection {
    async fn send_line(&mut self, command: &str) -> Result<(), LinkError> {
        debug!(command, "ELM327 send");
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\r").await?;
        Ok(())
    }

    /// Read until the next prompt, returning the text before it
    ///
    /// Bytes are accumulated in `buffer` so an interrupted read resumes
    /// where it left off.
    async fn read_until_prompt(&mut self) -> Result<String, LinkError> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == PROMPT) {
                let response: Vec<u8> = self.buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&response[..pos]).into_owned();
                return Ok(text);
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(LinkError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String, LinkError> {
        self.send_line(command).await?;
        tokio::time::timeout(timeout, self.read_until_prompt())
            .await
            .map_err(|_| LinkError::Timeout(timeout))?
    }
}

/// Map an interpreter response to a frame or a link error
pub fn classify_response(text: &str) -> Result<RawFrame, LinkError> {
    let upper = text.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(LinkError::NoData);
    }
    if upper.contains("NO DATA") || upper.contains("STOPPED") {
        return Err(LinkError::NoData);
    }
    for marker in ["UNABLE TO CONNECT", "BUS INIT", "CAN ERROR", "BUS ERROR", "BUFFER FULL"] {
        if upper.contains(marker) {
            return Err(LinkError::Protocol(marker.to_ascii_lowercase()));
        }
    }
    if upper == "?" {
        return Err(LinkError::Protocol("command not understood".to_string()));
    }
    Ok(RawFrame::Text(text.trim().to_string()))
}

/// ELM327 link adapter
pub struct Elm327Adapter {
    config: Elm327Config,
    connection: Mutex<Option<Connection>>,
}

impl Elm327Adapter {
    pub fn new(config: &Elm327Config) -> Self {
        Self {
            config: config.clone(),
            connection: Mutex::new(None),
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

#[async_trait]
impl LinkAdapter for Elm327Adapter {
    async fn connect(&self) -> Result<(), LinkError> {
        let address = self.address();
        let timeout = self.config.connect_timeout();

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| LinkError::Connect(format!("{} timed out after {:?}", address, timeout)))?
            .map_err(|e| LinkError::Connect(format!("{}: {}", address, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| LinkError::Connect(e.to_string()))?;

        let mut conn = Connection {
            stream,
            buffer: Vec::new(),
        };
        for command in INIT_COMMANDS {
            let response = conn.execute(command, timeout).await?;
            debug!(command, response = %response.trim(), "ELM327 init");
        }

        info!(address = %address, "ELM327 initialised");
        *self.connection.lock().await = Some(conn);
        Ok(())
    }

    async fn request(&self, pid: Pid, timeout: Duration) -> Result<RawFrame, LinkError> {
        let mut guard = self.connection.lock().await;
        let conn = guard.as_mut().ok_or(LinkError::NotConnected)?;

        match conn.execute(&pid.to_string(), timeout).await {
            Ok(text) => classify_response(&text),
            Err(e) => {
                if e.is_link_loss() {
                    *guard = None;
                }
                Err(e)
            }
        }
    }

    async fn reset(&self) -> Result<(), LinkError> {
        let mut guard = self.connection.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Err(LinkError::NotConnected);
        };

        // Any character interrupts a pending search; then wait for the prompt
        conn.buffer.clear();
        let drained = match conn.send_line("").await {
            Ok(()) => tokio::time::timeout(DRAIN_TIMEOUT, conn.read_until_prompt())
                .await
                .map_err(|_| LinkError::Timeout(DRAIN_TIMEOUT))
                .and_then(|r| r),
            Err(e) => Err(e),
        };

        match drained {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "ELM327 reset failed, dropping connection");
                if let Some(mut conn) = guard.take() {
                    let _ = conn.stream.shutdown().await;
                }
                Err(LinkError::Closed)
            }
        }
    }

    async fn disconnect(&self) {
        if let Some(mut conn) = self.connection.lock().await.take() {
            let _ = conn.stream.shutdown().await;
        }
    }

    fn describe(&self) -> String {
        format!("elm327://{}", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_classify_response() {
        assert_eq!(
            classify_response("41 0C 1A F8\r\r").unwrap(),
            RawFrame::Text("41 0C 1A F8".into())
        );
        assert_eq!(classify_response("NO DATA\r").unwrap_err(), LinkError::NoData);
        assert_eq!(
            classify_response("SEARCHING...\rNO DATA").unwrap_err(),
            LinkError::NoData
        );
        assert!(matches!(
            classify_response("UNABLE TO CONNECT"),
            Err(LinkError::Protocol(_))
        ));
        assert!(matches!(classify_response("?"), Err(LinkError::Protocol(_))));
    }

    /// Minimal ELM327 emulator: answers AT commands with OK, PIDs from a table
    ///
    /// With `answer_pids` false it keeps accepting AT commands but never
    /// replies to anything else, like an interpreter wedged mid-search.
    async fn spawn_dongle(responses: Vec<(&'static str, &'static str)>, answer_pids: bool) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let responses = responses.clone();
                tokio::spawn(async move {
                    let mut line = Vec::new();
                    let mut byte = [0u8; 1];
                    loop {
                        if socket.read(&mut byte).await.unwrap_or(0) == 0 {
                            return;
                        }
                        if byte[0] != b'\r' {
                            line.push(byte[0]);
                            continue;
                        }
                        let command = String::from_utf8_lossy(&line).to_string();
                        line.clear();
                        let reply = if command.starts_with("AT") {
                            "OK".to_string()
                        } else if !answer_pids {
                            continue;
                        } else {
                            responses
                                .iter()
                                .find(|(cmd, _)| *cmd == command)
                                .map(|(_, r)| r.to_string())
                                .unwrap_or_else(|| "NO DATA".to_string())
                        };
                        let _ = socket.write_all(format!("{}\r\r>", reply).as_bytes()).await;
                    }
                });
            }
        });
        port
    }

    async fn fake_dongle(responses: Vec<(&'static str, &'static str)>) -> u16 {
        spawn_dongle(responses, true).await
    }

    fn adapter_for(port: u16) -> Elm327Adapter {
        Elm327Adapter::new(&Elm327Config {
            host: "127.0.0.1".into(),
            port,
            connect_timeout_ms: 1000,
        })
    }

    #[tokio::test]
    async fn test_request_against_fake_dongle() {
        let port = fake_dongle(vec![("010C", "410C1AF8")]).await;
        let adapter = adapter_for(port);

        assert_eq!(
            adapter
                .request(Pid::current(0x0C), Duration::from_secs(1))
                .await
                .unwrap_err(),
            LinkError::NotConnected
        );

        adapter.connect().await.unwrap();
        let frame = adapter
            .request(Pid::current(0x0C), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, RawFrame::Text("410C1AF8".into()));

        let err = adapter
            .request(Pid::current(0x0D), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::NoData);

        adapter.disconnect().await;
        assert_eq!(adapter.describe(), format!("elm327://127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let adapter = adapter_for(port);
        assert!(matches!(adapter.connect().await, Err(LinkError::Connect(_))));
    }

    #[tokio::test]
    async fn test_failed_reset_drops_connection() {
        let port = spawn_dongle(vec![], false).await;
        let adapter = adapter_for(port);
        adapter.connect().await.unwrap();

        let err = adapter
            .request(Pid::current(0x0C), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::Timeout(Duration::from_millis(200)));

        assert_eq!(adapter.reset().await.unwrap_err(), LinkError::Closed);
        assert_eq!(
            adapter
                .request(Pid::current(0x0C), Duration::from_millis(200))
                .await
                .unwrap_err(),
            LinkError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_silent_dongle_triggers_reconnect() {
        use crate::config::ReconnectConfig;
        use crate::supervisor::ConnectionSupervisor;
        use obd_core::LinkState;
        use std::sync::Arc;
        use tokio::sync::watch;

        let port = spawn_dongle(vec![], false).await;
        let supervisor = Arc::new(ConnectionSupervisor::new(
            Arc::new(adapter_for(port)),
            ReconnectConfig {
                initial_backoff_ms: 50,
                max_backoff_ms: 200,
                jitter: 0.0,
            },
        ));
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(supervisor.clone().run(rx));

        let mut status = supervisor.subscribe_status();
        tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.is_connected()))
            .await
            .unwrap()
            .unwrap();
        let first_connect = supervisor.status().connected_since.unwrap();

        let err = supervisor
            .request(Pid::current(0x0C), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::Timeout(Duration::from_millis(200)));
        assert_ne!(supervisor.status().state, LinkState::Connected);
        assert!(supervisor.status().last_error.is_some());

        // A fresh session comes up instead of reporting a dead link as live
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.connected_since.is_some_and(|t| t > first_connect)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(supervisor.status().is_connected());

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }
}
