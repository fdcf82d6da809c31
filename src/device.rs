//! ==============================================================================
//! device.rs - serial link to the microcontroller
//! ==============================================================================
//!
//! purpose:
//!     opens the usb serial port and splits it into the two directions the
//!     workers need:
//!     - inbound: a buffered line reader handed to the ingestor
//!     - outbound: a DeviceSink handed to the dispatcher
//!
//! wire format:
//!     both directions are newline terminated text.
//!     inbound:  LDR:123.45;UMIDADE:1;TEMPERATURA:22.00
//!     outbound: toggleLampada_ON
//!
//! lifetime:
//!     each half is owned by exactly one worker task. the port closes when
//!     both tasks are dropped, which main guarantees on every exit path.
//!
//! ==============================================================================

use crate::config::DeviceConfig;
use crate::error::DeviceError;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// anything that can carry a command line to the device
#[async_trait]
pub trait DeviceSink: Send {
    /// writes `line` followed by a newline
    async fn send_line(&mut self, line: &str) -> Result<(), DeviceError>;
}

/// write half of an async byte stream (the serial port in production)
pub struct SerialSink<W> {
    writer: W,
}

impl<W> SerialSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> DeviceSink for SerialSink<W> {
    async fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

pub type SerialReader = BufReader<ReadHalf<SerialStream>>;
pub type SerialWriter = SerialSink<WriteHalf<SerialStream>>;

/// opens the port and waits for the board to come out of reset
pub async fn open(config: &DeviceConfig) -> Result<(SerialReader, SerialWriter), DeviceError> {
    let stream = tokio_serial::new(&config.port, config.baud_rate)
        .open_native_async()
        .map_err(|source| DeviceError::Open { port: config.port.clone(), source })?;
    tracing::info!(port = %config.port, baud = config.baud_rate, "serial link open");

    tokio::time::sleep(std::time::Duration::from_millis(config.settle_ms)).await;

    let (read, write) = tokio::io::split(stream);
    Ok((BufReader::new(read), SerialSink::new(write)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_appends_newline() {
        let mut sink = SerialSink::new(Vec::new());
        sink.send_line("toggleLampada_ON").await.unwrap();
        sink.send_line("toggleLampada_OFF").await.unwrap();
        assert_eq!(sink.writer, b"toggleLampada_ON\ntoggleLampada_OFF\n");
    }
}
