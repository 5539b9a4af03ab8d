//! Connection Handler
//!
//! Handles individual client connections: reads length-prefixed `Command`
//! frames and writes back `Response` frames.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::protocol::{self, Command, Response};
use crate::runtime::Runtime;

/// Handles a single client connection.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    runtime: Arc<Runtime>,
    peer_addr: String,
}

impl Connection {
    pub fn new(stream: TcpStream, runtime: Arc<Runtime>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            runtime,
            peer_addr,
        })
    }

    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let read_stream = self.reader.get_ref();
        let write_stream = self.writer.get_ref();

        if read_ms > 0 {
            read_stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            write_stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed). Reads commands in a
    /// loop and sends responses; returns when the client disconnects or an
    /// unrecoverable error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let command = match self.read_command() {
                Ok(Some(cmd)) => cmd,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(CoreError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            let response = self.runtime.execute(command);

            if let Err(e) = self.send_response(&response) {
                if let CoreError::Io(ref io_err) = e {
                    match io_err.kind() {
                        std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::BrokenPipe => {
                            tracing::debug!(
                                "Client {} disconnected before response could be sent: {}",
                                self.peer_addr,
                                e
                            );
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Read one length-prefixed command frame. `Ok(None)` means the client
    /// closed the connection cleanly at a frame boundary.
    fn read_command(&mut self) -> Result<Option<Command>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = protocol::frame_len(&len_buf);
        let mut frame = Vec::with_capacity(4 + len);
        frame.extend_from_slice(&len_buf);
        frame.resize(4 + len, 0);
        self.reader.read_exact(&mut frame[4..])?;
        protocol::decode_command(&frame).map(Some)
    }

    fn send_response(&mut self, response: &Response) -> Result<()> {
        let frame = protocol::encode_response(response)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
