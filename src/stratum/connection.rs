//! Line-framed transport over TCP.
//!
//! Stratum frames are newline-terminated JSON objects. The reader half
//! accumulates bytes until a full line is available (frames may exceed any
//! single read), the writer half writes whole frames and flushes. The two
//! halves are separate traits because the session runs one dedicated reader
//! loop concurrently with mutex-serialised writers; channel-backed mocks
//! implement the same traits for deterministic tests.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::error::{StratumError, StratumResult};

/// Reading half of a framed transport.
#[async_trait]
pub trait TransportRead: Send {
    /// Read one complete frame, without its newline.
    ///
    /// Returns `None` on clean connection close (EOF).
    async fn read_frame(&mut self) -> StratumResult<Option<String>>;
}

/// Writing half of a framed transport.
#[async_trait]
pub trait TransportWrite: Send {
    /// Write one frame followed by a newline, retrying until every byte is
    /// on the wire.
    async fn write_frame(&mut self, frame: &str) -> StratumResult<()>;
}

/// A connected, buffered TCP session.
pub struct Connection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl Connection {
    /// Wrap an established TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Connection {
            reader: ConnectionReader {
                reader: BufReader::new(read_half),
                line: String::with_capacity(4096),
            },
            writer: ConnectionWriter {
                writer: BufWriter::new(write_half),
            },
        }
    }

    /// Connect to a pool address.
    ///
    /// Accepts `stratum+tcp://host:port`, `tcp://host:port` or a bare
    /// `host:port`.
    pub async fn connect(url: &str) -> StratumResult<Self> {
        let address = url
            .strip_prefix("stratum+tcp://")
            .or_else(|| url.strip_prefix("tcp://"))
            .unwrap_or(url);

        debug!(address, "Connecting to pool");
        let stream = TcpStream::connect(address)
            .await
            .map_err(|error| StratumError::ConnectionFailed(error.to_string()))?;
        debug!(address, "Connected");

        Ok(Connection::new(stream))
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

/// Reading half of a [`Connection`].
pub struct ConnectionReader {
    reader: BufReader<OwnedReadHalf>,
    line: String,
}

/// Writing half of a [`Connection`].
pub struct ConnectionWriter {
    writer: BufWriter<OwnedWriteHalf>,
}

#[async_trait]
impl TransportRead for ConnectionReader {
    async fn read_frame(&mut self) -> StratumResult<Option<String>> {
        loop {
            self.line.clear();

            let n = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(StratumError::Io)?;
            if n == 0 {
                return Ok(None);
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            trace!(rx = %line, "Received frame");
            return Ok(Some(line.to_string()));
        }
    }
}

#[async_trait]
impl TransportWrite for ConnectionWriter {
    async fn write_frame(&mut self, frame: &str) -> StratumResult<()> {
        trace!(tx = %frame, "Sending frame");
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Channel-backed transport for deterministic tests.
///
/// [`MockTransport::pair`] yields the client-side halves plus a
/// [`MockPool`] handle playing the server. Dropping the handle closes the
/// connection from the client's point of view.
#[cfg(test)]
pub(crate) struct MockTransport;

#[cfg(test)]
pub(crate) struct MockReader {
    rx: tokio::sync::mpsc::UnboundedReceiver<String>,
}

#[cfg(test)]
pub(crate) struct MockWriter {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

#[cfg(test)]
pub(crate) struct MockPool {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
    rx: tokio::sync::mpsc::UnboundedReceiver<String>,
}

#[cfg(test)]
impl MockTransport {
    pub fn pair() -> (MockReader, MockWriter, MockPool) {
        let (pool_tx, client_rx) = tokio::sync::mpsc::unbounded_channel();
        let (client_tx, pool_rx) = tokio::sync::mpsc::unbounded_channel();

        (
            MockReader { rx: client_rx },
            MockWriter { tx: client_tx },
            MockPool {
                tx: pool_tx,
                rx: pool_rx,
            },
        )
    }
}

#[cfg(test)]
#[async_trait]
impl TransportRead for MockReader {
    async fn read_frame(&mut self) -> StratumResult<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
#[async_trait]
impl TransportWrite for MockWriter {
    async fn write_frame(&mut self, frame: &str) -> StratumResult<()> {
        self.tx
            .send(frame.to_string())
            .map_err(|_| StratumError::Disconnected)
    }
}

#[cfg(test)]
impl MockPool {
    /// Send a JSON frame to the client.
    pub fn send(&self, message: serde_json::Value) {
        self.send_raw(&message.to_string());
    }

    /// Send a raw line to the client.
    pub fn send_raw(&self, line: &str) {
        self.tx.send(line.to_string()).expect("client reader dropped");
    }

    /// Receive the next frame the client wrote.
    pub async fn recv(&mut self) -> serde_json::Value {
        let frame = self.rx.recv().await.expect("client writer dropped");
        serde_json::from_str(&frame).expect("client wrote invalid JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Echo server.
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = Connection::new(socket).split();
            while let Ok(Some(frame)) = reader.read_frame().await {
                writer.write_frame(&frame).await.unwrap();
            }
        });

        let connection = Connection::connect(&format!("stratum+tcp://{addr}")).await.unwrap();
        let (mut reader, mut writer) = connection.split();

        writer.write_frame(r#"{"id":0,"method":"mining.subscribe","params":[]}"#).await.unwrap();
        writer.write_frame(r#"{"id":1,"method":"mining.authorize","params":[]}"#).await.unwrap();

        let first = reader.read_frame().await.unwrap().unwrap();
        assert!(first.contains("mining.subscribe"));
        let second = reader.read_frame().await.unwrap().unwrap();
        assert!(second.contains("mining.authorize"));
    }

    #[tokio::test]
    async fn reader_skips_blank_lines_and_reports_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"\n\n{\"id\":1,\"result\":true}\n").await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let connection = Connection::connect(&addr.to_string()).await.unwrap();
        let (mut reader, _writer) = connection.split();

        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"id":1,"result":true}"#);
        assert!(reader.read_frame().await.unwrap().is_none());
    }
}
