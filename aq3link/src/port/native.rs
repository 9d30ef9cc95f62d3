//! Native serial port implementation using the `serialport` crate.
//!
//! Works on Linux, macOS, Windows and the BSDs. `serialport` exposes a single
//! blocking timeout per port, so the interval/total split of
//! [`LineTimeouts`](super::LineTimeouts) is implemented one level up in
//! [`Transport`](crate::transport::Transport) by re-arming the timeout before
//! every read.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortEnumerator, PortInfo, SerialConfig},
    },
    log::{debug, trace},
    serialport::ClearBuffer,
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let timeout = config
            .timeouts
            .read_total(0);
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| Error::Connection {
                port: config
                    .port_name
                    .clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Opened {} at {} baud (queue size hint {})",
            config.port_name, config.baud_rate, config.queue_size
        );

        Ok(Self {
            port: Some(port),
            name: config
                .port_name
                .clone(),
            timeout,
        })
    }

    fn closed_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed")
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout == self.timeout {
            return Ok(());
        }
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        if self
            .port
            .take()
            .is_some()
        {
            trace!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(std::io::Write::flush)
    }
}

/// Lists the serial devices the OS reports, sorted by name.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let mut ports: Vec<PortInfo> = serialport::available_ports()
            .map_err(Error::Serial)?
            .into_iter()
            .map(port_info)
            .collect();
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        trace!("Found {} serial ports", ports.len());
        Ok(ports)
    }
}

/// USB-to-RS232 adapters carry vendor data; built-in UARTs do not.
fn port_info(port: serialport::SerialPortInfo) -> PortInfo {
    let mut info = PortInfo {
        name: port.port_name,
        vid: None,
        pid: None,
        manufacturer: None,
        product: None,
    };
    if let serialport::SerialPortType::UsbPort(usb) = port.port_type {
        info.vid = Some(usb.vid);
        info.pid = Some(usb.pid);
        info.manufacturer = usb.manufacturer;
        info.product = usb.product;
    }
    info
}
