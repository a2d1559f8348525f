use serialport::SerialPort;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Framing bytes of a definite-length binary block: `#`, one digit giving the
/// width of the length field, the length field itself, the payload, then a
/// single terminator byte.
const BLOCK_MARKER: u8 = b'#';

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad block framing: expected '#' marker, got byte {got:#04x}")]
    BadBlockMarker { got: u8 },

    #[error("Bad block framing: length-field width byte {got:#04x} is not a digit")]
    BadLengthWidth { got: u8 },

    #[error("Bad block framing: length field {field:?} is not a decimal number")]
    BadLengthField { field: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// The command/response session this driver talks through.
///
/// The instrument's control link is strictly serial request/response with at
/// most one outstanding command; it is known to hang under malformed or
/// overlapping input, so implementations must not pipeline and must delegate
/// all waiting to a blocking read with their own timeout.
pub trait ScpiTransport {
    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Send a command and read one newline-terminated text reply.
    fn query_line(&mut self, command: &str) -> Result<String, TransportError>;

    /// Send a command and read a definite-length binary block.
    ///
    /// Returns the block verbatim, framing bytes included, so callers can
    /// retain it byte-for-byte for serialization.
    fn query_block(&mut self, command: &str) -> Result<Vec<u8>, TransportError>;
}

fn send_command(writer: &mut impl Write, command: &str) -> Result<(), TransportError> {
    // The trailing newline is part of the protocol framing.
    writer.write_all(command.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn read_reply_line(reader: &mut impl Read) -> Result<String, TransportError> {
    let mut response = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        if byte[0] == b'\n' {
            break;
        }
        response.push(byte[0]);
    }
    let line = String::from_utf8(response)?;
    Ok(line.trim().to_string())
}

/// Read one `#Nd...d<payload><terminator>` block, returning it verbatim.
fn read_block(reader: &mut impl Read) -> Result<Vec<u8>, TransportError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header)?;
    if header[0] != BLOCK_MARKER {
        return Err(TransportError::BadBlockMarker { got: header[0] });
    }
    if !header[1].is_ascii_digit() {
        return Err(TransportError::BadLengthWidth { got: header[1] });
    }
    let width = usize::from(header[1] - b'0');

    let mut length_field = vec![0u8; width];
    reader.read_exact(&mut length_field)?;
    let field = String::from_utf8(length_field.clone())?;
    let payload_len: usize = field
        .parse()
        .map_err(|_| TransportError::BadLengthField { field })?;

    // payload plus the trailing terminator byte
    let mut body = vec![0u8; payload_len + 1];
    reader.read_exact(&mut body)?;

    let mut block = Vec::with_capacity(2 + width + payload_len + 1);
    block.extend_from_slice(&header);
    block.extend_from_slice(&length_field);
    block.extend_from_slice(&body);
    Ok(block)
}

/// Raw-SCPI socket transport, the usual path for a bench scope on the LAN.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// The raw-SCPI port the DS4000E listens on.
    pub const DEFAULT_PORT: u16 = 5555;

    /// Connect to the instrument and apply a read timeout to every
    /// subsequent round trip.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Change the blocking-read timeout for later round trips.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }
}

impl ScpiTransport for TcpTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        log::debug!("write: {}", command);
        send_command(&mut self.stream, command)
    }

    fn query_line(&mut self, command: &str) -> Result<String, TransportError> {
        log::debug!("query: {}", command);
        send_command(&mut self.stream, command)?;
        read_reply_line(&mut self.stream)
    }

    fn query_block(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        log::debug!("query block: {}", command);
        send_command(&mut self.stream, command)?;
        read_block(&mut self.stream)
    }
}

/// Legacy USB-serial transport. The serial link is noticeably flakier than
/// the socket one; prefer [`TcpTransport`] where the scope is networked.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(port: &str, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(port, 9600).timeout(timeout).open()?;
        Ok(Self { port })
    }

    /// Drop anything buffered from an interrupted exchange. After an aborted
    /// capture sequence the link state is ambiguous; callers should clear and
    /// re-select the channel before continuing.
    pub fn clear(&mut self) -> Result<(), TransportError> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

impl ScpiTransport for SerialTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        log::debug!("write: {}", command);
        send_command(&mut self.port, command)
    }

    fn query_line(&mut self, command: &str) -> Result<String, TransportError> {
        log::debug!("query: {}", command);
        send_command(&mut self.port, command)?;
        read_reply_line(&mut self.port)
    }

    fn query_block(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        log::debug!("query block: {}", command);
        send_command(&mut self.port, command)?;
        read_block(&mut self.port)
    }
}
