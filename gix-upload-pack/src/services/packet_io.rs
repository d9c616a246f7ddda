//! Packet I/O factory service
//!
//! This service provides a factory for creating packet I/O objects,
//! allowing for better dependency injection and testability.

use std::io::{Read, Write};
use crate::{
    error::{Error, Result},
    types::{AckStatus, SideBandChannel, SideBandMode, protocol},
};
use gix_packetline::{
    encode::{band_to_write, data_to_write, delim_to_write, error_to_write, flush_to_write, response_end_to_write},
    PacketLineRef, StreamingPeekableIter,
};

/// Factory for creating packet I/O objects
pub struct PacketIOFactory;

impl PacketIOFactory {
    /// Create a new packet I/O factory
    pub fn new() -> Self {
        Self
    }

    /// Create an enhanced packet reader
    pub fn create_reader<R: Read>(&self, reader: R, trace: bool) -> EnhancedPacketReader<R> {
        EnhancedPacketReader::new(reader, trace)
    }

    /// Create an enhanced packet writer
    pub fn create_writer<W: Write>(&self, writer: W, sideband_mode: SideBandMode) -> EnhancedPacketWriter<W> {
        EnhancedPacketWriter::new(writer, sideband_mode)
    }

    /// Create a temporary packet writer for specific operations
    pub fn create_temp_writer<W: Write>(&self, writer: W) -> EnhancedPacketWriter<W> {
        EnhancedPacketWriter::new(writer, SideBandMode::None)
    }
}

impl Default for PacketIOFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Enhanced packet reader with error detection using gix-packetline
pub struct EnhancedPacketReader<R: Read> {
    reader: StreamingPeekableIter<R>,
    error_count: usize,
}

impl<R: Read> EnhancedPacketReader<R> {
    /// Create a new enhanced packet reader
    pub fn new(reader: R, _trace: bool) -> Self {
        let delimiters = &[
            PacketLineRef::Delimiter,
            PacketLineRef::ResponseEnd,
        ];

        let packet_reader = StreamingPeekableIter::new(reader, delimiters, true); // Enable tracing

        Self {
            reader: packet_reader,
            error_count: 0,
        }
    }

    /// Enable automatic ERR packet line detection
    pub fn enable_error_detection(&mut self) {
        self.reader.fail_on_err_lines(true);
    }

    /// Read the next packet line with error handling
    pub fn read_packet(&mut self) -> Result<Option<PacketLineRef<'_>>> {
        match self.reader.read_line() {
            Some(line_result) => match line_result {
                Ok(Ok(packet)) => {
                    self.error_count = 0; // Reset error count on success
                    Ok(Some(packet))
                }
                Ok(Err(decode_error)) => Err(Error::custom(format!("Packet decode error: {}", decode_error))),
                Err(io_error) => Err(Error::Io(io_error)),
            },
            None => Ok(None),
        }
    }

    /// Read a data packet as a string
    pub fn read_data_line(&mut self) -> Result<Option<String>> {
        match self.read_packet()? {
            Some(PacketLineRef::Data(data)) => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| Error::custom(format!("Invalid UTF-8 in packet: {}", e)))?
                    .to_string();
                Ok(Some(text))
            }
            Some(PacketLineRef::Flush) => Ok(None),
            Some(_) => Ok(None), // Delimiter or ResponseEnd
            None => Ok(None),
        }
    }

    /// Peek at the next packet without consuming it
    pub fn peek_packet(&mut self) -> Result<Option<PacketLineRef<'_>>> {
        match self.reader.peek_line() {
            Some(line_result) => match line_result {
                Ok(Ok(packet)) => Ok(Some(packet)),
                Ok(Err(decode_error)) => Err(Error::custom(format!("Packet decode error: {}", decode_error))),
                Err(io_error) => Err(Error::Io(io_error)),
            },
            None => Ok(None),
        }
    }

    /// Check if we stopped reading due to a delimiter or error
    pub fn stopped_at(&self) -> Option<PacketLineRef<'static>> {
        self.reader.stopped_at()
    }

    /// Reset the reader with new delimiters
    pub fn reset_with_delimiters(&mut self, delimiters: &'static [PacketLineRef<'static>]) {
        self.reader.reset_with(delimiters);
    }

    /// Get the underlying reader
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read> EnhancedPacketReader<R> {
    /// Read the next line (similar to StreamingPeekableIter::read_line)
    pub fn read_line(&mut self) -> Option<std::io::Result<std::result::Result<PacketLineRef<'_>, gix_packetline::decode::Error>>> {
        self.reader.read_line()
    }

    /// Check if a packet is a flush packet
    pub fn is_flush_packet(packet: &PacketLineRef<'_>) -> bool {
        matches!(packet, PacketLineRef::Flush)
    }

    /// Read packets until flush, returning all data packets
    pub fn read_until_flush(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut packets = Vec::new();
        
        while let Some(line_result) = self.read_line() {
            let line = line_result.map_err(Error::Io)?.map_err(Error::PacketlineDecode)?;
            
            if Self::is_flush_packet(&line) {
                break;
            }
            
            if let Some(data) = line.as_slice() {
                packets.push(data.to_vec());
            }
        }
        
        Ok(packets)
    }
}

/// Enhanced packet writer with side-band support using gix-packetline
#[derive(Clone, Copy)]
pub struct EnhancedPacketWriter<W: Write> {
    writer: W,
    mode: SideBandMode,
}

impl<W: Write> EnhancedPacketWriter<W> {
    /// Create a new enhanced packet writer
    pub fn new(writer: W, mode: SideBandMode) -> Self {
        Self { writer, mode }
    }

    /// Send data through the appropriate channel
    pub fn send_data(&mut self, data: &[u8]) -> Result<()> {
        match self.mode {
            SideBandMode::None => {
                // Write raw data directly without packet-line wrapping
                // This is used for pack data in non-sideband mode
                self.writer.write_all(data)?;
            }
            SideBandMode::Basic | SideBandMode::SideBand64k => {
                let max_size = self.mode.max_data_size().unwrap_or(65515);
                for chunk in data.chunks(max_size) {
                    band_to_write(SideBandChannel::Data, chunk, &mut self.writer)?;
                }
            }
        }
        Ok(())
    }



    /// Send progress message through the progress channel
    pub fn send_progress(&mut self, message: &str) -> Result<()> {
        if self.mode == SideBandMode::None {
            return Ok(()); // Cannot send progress without side-band
        }

        // Format progress message like native git
        let progress_msg = if message.ends_with(", done.") {
            format!("{}\n", message) // Completion messages use \n
        } else {
            format!("{}\r", message) // Progress updates use \r
        };

        let max_size = self.mode.max_data_size().unwrap_or(65515);
        for chunk in progress_msg.as_bytes().chunks(max_size) {
            band_to_write(SideBandChannel::Progress, chunk, &mut self.writer)?;
        }

        Ok(())
    }

    /// Send error message through the error channel or as ERR packet
    pub fn send_error(&mut self, error: &str) -> Result<()> {
        match self.mode {
            SideBandMode::None => {
                // Use gix-packetline's error_to_write function
                error_to_write(error.as_bytes(), &mut self.writer)?;
            }
            SideBandMode::Basic | SideBandMode::SideBand64k => {
                let error_msg = format!("error: {}\n", error);
                let max_size = self.mode.max_data_size().unwrap_or(65515);
                for chunk in error_msg.as_bytes().chunks(max_size) {
                    band_to_write(SideBandChannel::Error, chunk, &mut self.writer)?;
                }
            }
        }
        Ok(())
    }

    /// Write a flush packet using gix-packetline
    pub fn write_flush(&mut self) -> Result<()> {
        flush_to_write(&mut self.writer)?;
        Ok(())
    }

    /// Write a delimiter packet using gix-packetline
    pub fn write_delimiter(&mut self) -> Result<()> {
        delim_to_write(&mut self.writer)?;
        Ok(())
    }

    /// Write a response end packet using gix-packetline
    pub fn write_response_end(&mut self) -> Result<()> {
        response_end_to_write(&mut self.writer)?;
        Ok(())
    }

    /// Write a text line as a data packet
    pub fn write_text_line(&mut self, text: &str) -> Result<()> {
        let line = if text.ends_with('\n') {
            text.as_bytes()
        } else {
            return self.send_data(format!("{}\n", text).as_bytes());
        };
        self.send_data(line)
    }

    /// Write protocol message as packet-line (bypasses sideband)
    pub fn write_protocol_message(&mut self, data: &[u8]) -> Result<()> {
        data_to_write(data, &mut self.writer)?;
        Ok(())
    }

    /// Get access to the underlying writer for direct packet writing
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Update the sideband mode (used after capability negotiation)
    pub fn set_sideband_mode(&mut self, mode: SideBandMode) {
        self.mode = mode;
    }

    /// Send ACK response using gix-packetline
    pub fn send_ack(&mut self, oid: &gix_hash::ObjectId, status: AckStatus) -> Result<()> {
        let status_str = match status {
            AckStatus::Common => "",
            AckStatus::Continue => protocol::ACK_CONTINUE_SUFFIX,
            AckStatus::Ready => protocol::ACK_READY_SUFFIX,
        };

        let response = format!("{}{}{}\n", protocol::ACK_PREFIX, oid.to_hex(), status_str);
        data_to_write(response.as_bytes(), &mut self.writer)?;
        Ok(())
    }

    /// Send NAK response using gix-packetline
    pub fn send_nak(&mut self) -> Result<()> {
        data_to_write(protocol::NAK, &mut self.writer)?;
        Ok(())
    }

    /// Send a reference line with capabilities
    pub fn send_ref_with_capabilities(
        &mut self,
        oid_hex: &str,
        refname: &str,
        capabilities: &str,
    ) -> Result<()> {
        let line = format!("{} {}\0{}\n", oid_hex, refname, capabilities);
        self.send_data(line.as_bytes())?;
        Ok(())
    }

    /// Send a reference line without capabilities
    pub fn send_ref(&mut self, oid_hex: &str, refname: &str) -> Result<()> {
        let line = format!("{} {}\n", oid_hex, refname);
        self.send_data(line.as_bytes())?;
        Ok(())
    }

    /// Send a peeled reference line
    pub fn send_peeled_ref(&mut self, oid_hex: &str, refname: &str) -> Result<()> {
        let line = format!("{} {}^{{}}\n", oid_hex, refname);
        self.send_data(line.as_bytes())?;
        Ok(())
    }

    /// Send a capabilities-only line for empty repositories
    pub fn send_capabilities_only(
        &mut self,
        oid: &gix_hash::ObjectId,
        refname: &str,
        capabilities: &str,
    ) -> Result<()> {
        let line = format!("{} {}\0{}\n", oid.to_hex(), refname, capabilities);
        self.send_data(line.as_bytes())?;
        Ok(())
    }
}

/// Buffered writer for sideband mode to prevent fragmentation
pub struct BufferedSideBandWriter<W: Write> {
    writer: EnhancedPacketWriter<W>,
    buffer: Vec<u8>,
    max_packet_size: usize,
}

impl<W: Write> BufferedSideBandWriter<W> {
    pub fn new(writer: EnhancedPacketWriter<W>) -> Self {
        let max_packet_size = writer.mode.max_data_size().unwrap_or(65515);
        
        Self {
            writer,
            buffer: Vec::with_capacity(max_packet_size),
            max_packet_size,
        }
    }
    
    pub fn into_inner(mut self) -> std::io::Result<EnhancedPacketWriter<W>> {
        self.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for BufferedSideBandWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.writer.mode {
            SideBandMode::None => {
                // Write directly without buffering
                self.writer.writer.write(buf)
            }
            SideBandMode::Basic | SideBandMode::SideBand64k => {
                let mut remaining = buf;
                let mut total_written = 0;
                
                while !remaining.is_empty() {
                    let space_left = self.max_packet_size - self.buffer.len();
                    
                    if space_left == 0 {
                        // Buffer is full, flush it
                        self.flush_buffer()?;
                        continue;
                    }
                    
                    let to_copy = remaining.len().min(space_left);
                    self.buffer.extend_from_slice(&remaining[..to_copy]);
                    remaining = &remaining[to_copy..];
                    total_written += to_copy;
                }
                
                Ok(total_written)
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.flush_buffer()?;
        }
        self.writer.writer.flush()
    }
}

impl<W: Write> BufferedSideBandWriter<W> {
    fn flush_buffer(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            band_to_write(SideBandChannel::Data, &self.buffer, &mut self.writer.writer)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for EnhancedPacketWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.mode {
            SideBandMode::None => {
                // Write raw data directly without packet-line wrapping
                // This is used for pack data in non-sideband mode
                self.writer.write_all(buf)?;
            }
            SideBandMode::Basic | SideBandMode::SideBand64k => {
                // This should not be used directly for pack data!
                // Use BufferedSideBandWriter instead to prevent fragmentation
                eprintln!("WARNING: Direct write to EnhancedPacketWriter in sideband mode - this will fragment data!");
                let max_size = self.mode.max_data_size().unwrap_or(65515);
                for chunk in buf.chunks(max_size) {
                    band_to_write(SideBandChannel::Data, chunk, &mut self.writer)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Protocol action result from packet handling
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolAction {
    /// Continue processing packets
    Continue,
    /// Flush received, end current phase
    Flush,
    /// Delimiter received, transition to next phase
    Delimiter,
    /// Response end received, terminate session
    Terminate,
    /// Error occurred, abort session
    Error(String),
}

/// Trait for protocol-specific packet handlers
pub trait PacketHandler {
    /// Handle a received packet and return the appropriate action
    fn handle_packet(&mut self, packet: PacketLineRef<'_>) -> Result<ProtocolAction>;

    /// Handle protocol errors
    fn handle_error(&mut self, error: &Error) -> Result<ProtocolAction> {
        Ok(ProtocolAction::Error(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_enhanced_packet_reader() {
        let mut framed = Vec::new();
        data_to_write(b"want deadbeef\n", &mut framed).unwrap();
        flush_to_write(&mut framed).unwrap();

        let mut packet_reader = EnhancedPacketReader::new(Cursor::new(framed), false);

        let first = packet_reader.read_data_line().unwrap();
        assert_eq!(first.as_deref(), Some("want deadbeef\n"));

        let second = packet_reader.read_packet().unwrap();
        assert!(matches!(second, Some(PacketLineRef::Flush)));
    }

    #[test]
    fn test_enhanced_packet_writer() {
        let output = Vec::new();
        let mut writer = EnhancedPacketWriter::new(output, SideBandMode::None);

        writer.send_data(b"test data").unwrap();
        writer.write_flush().unwrap();
    }
}
