//! Newline-delimited JSON framing over a TCP stream.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::messages::ControlMessage;
use crate::CoordinationError;

/// Read side of a control channel.
#[derive(Debug)]
pub struct ChannelReader {
    reader: BufReader<OwnedReadHalf>,
}

impl ChannelReader {
    /// Reads one frame. `Ok(None)` means the peer closed the channel.
    pub async fn recv(&mut self) -> Result<Option<ControlMessage>, CoordinationError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line.trim_end())?))
    }
}

/// Write side of a control channel.
#[derive(Debug)]
pub struct ChannelWriter {
    writer: OwnedWriteHalf,
}

impl ChannelWriter {
    pub async fn send(&mut self, message: &ControlMessage) -> Result<(), CoordinationError> {
        let mut frame = serde_json::to_vec(message)?;
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Bidirectional control channel over one TCP connection.
#[derive(Debug)]
pub struct Channel {
    reader: ChannelReader,
    writer: ChannelWriter,
}

impl Channel {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: ChannelReader {
                reader: BufReader::new(read_half),
            },
            writer: ChannelWriter { writer: write_half },
        }
    }

    pub async fn send(&mut self, message: &ControlMessage) -> Result<(), CoordinationError> {
        self.writer.send(message).await
    }

    pub async fn recv(&mut self) -> Result<Option<ControlMessage>, CoordinationError> {
        self.reader.recv().await
    }

    /// Expects one frame; a closed channel is an error here.
    pub async fn recv_required(&mut self) -> Result<ControlMessage, CoordinationError> {
        self.recv().await?.ok_or(CoordinationError::ChannelClosed)
    }

    /// Splits into independent halves so reads can move into a background
    /// task while the writer stays with the orchestrator for STOP.
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provbank_core::NodeId;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_cross_a_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut channel = Channel::new(TcpStream::connect(addr).await.unwrap());
            channel
                .send(&ControlMessage::Register {
                    node_id: NodeId::from("edge-1"),
                    sensor_count: 10,
                })
                .await
                .unwrap();
            channel.send(&ControlMessage::Stop).await.unwrap();
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = Channel::new(stream);
        match channel.recv_required().await.unwrap() {
            ControlMessage::Register { node_id, sensor_count } => {
                assert_eq!(node_id, NodeId::from("edge-1"));
                assert_eq!(sensor_count, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(channel.recv_required().await.unwrap(), ControlMessage::Stop);
        // Peer hung up after Stop.
        assert!(channel.recv().await.unwrap().is_none());
        client.await.unwrap();
    }
}
