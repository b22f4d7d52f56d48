//! Serial port transport
//!
//! Adapts a real serial device to the link halves the dispatcher and
//! reader consume. The port is cloned so reads and writes proceed
//! independently, matching how the reader thread and the dispatcher
//! touch the link from different contexts.

use std::io::{Read, Write};
use std::time::Duration;

use biolink_protocol::{LinkError, LinkRx, LinkTx};

/// Timeout the port is opened with; individual reads override it.
const OPEN_TIMEOUT: Duration = Duration::from_millis(200);

/// Open `path` at `baud` and split it into link halves.
pub fn open(path: &str, baud: u32) -> Result<(SerialTx, SerialRx), serialport::Error> {
    let mut port = serialport::new(path, baud)
        .timeout(OPEN_TIMEOUT)
        .flow_control(serialport::FlowControl::None)
        .open()?;
    // Some field boards only start talking once DTR is up.
    port.write_data_terminal_ready(true)?;
    let reader = port.try_clone()?;
    Ok((SerialTx(port), SerialRx(reader)))
}

/// Transmit half of a serial link.
pub struct SerialTx(Box<dyn serialport::SerialPort>);

impl LinkTx for SerialTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.0.write_all(bytes)?;
        self.0.flush()?;
        Ok(())
    }
}

/// Receive half of a serial link.
pub struct SerialRx(Box<dyn serialport::SerialPort>);

impl LinkRx for SerialRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        self.0
            .set_timeout(timeout)
            .map_err(|e| LinkError::Io(e.into()))?;
        match self.0.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(LinkError::Io(e)),
        }
    }
}
