use crate::channel::ChannelError;
use crate::serial_channel::{ChannelConfig, SerialChannel};
use serialport::SerialPortType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmodPort {
    pub name: String,
    pub port: String,
    pub usb: bool,
}

impl PmodPort {
    pub fn new(name: String, port: String, usb: bool) -> Self {
        Self { name, port, usb }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("No USB serial device found. Please connect the module or specify the port manually")]
    DeviceNotFound,
}

pub struct PmodConnector;

impl PmodConnector {
    /// Open the configured port, or the first USB serial port if none is set.
    pub fn open(config: &ChannelConfig) -> Result<SerialChannel, ConnectorError> {
        let port = match &config.port {
            Some(port) => port.clone(),
            None => Self::find_usb_port()?,
        };
        log::debug!("Connecting to module on port {}", port);
        Ok(SerialChannel::open(&port, config)?)
    }

    /// List every serial port the OS reports.
    pub fn available_ports() -> Result<Vec<PmodPort>, ConnectorError> {
        let ports = serialport::available_ports()?
            .into_iter()
            .map(|info| {
                let (name, usb) = match &info.port_type {
                    SerialPortType::UsbPort(usb) => (
                        usb.product
                            .clone()
                            .unwrap_or_else(|| format!("{:04x}:{:04x}", usb.vid, usb.pid)),
                        true,
                    ),
                    SerialPortType::PciPort => ("PCI".to_string(), false),
                    SerialPortType::BluetoothPort => ("Bluetooth".to_string(), false),
                    SerialPortType::Unknown => ("Unknown".to_string(), false),
                };
                PmodPort::new(name, info.port_name, usb)
            })
            .collect();
        Ok(ports)
    }

    fn find_usb_port() -> Result<String, ConnectorError> {
        log::debug!("Searching for a USB serial device");
        Self::available_ports()?
            .into_iter()
            .find(|p| p.usb)
            .map(|p| p.port)
            .ok_or(ConnectorError::DeviceNotFound)
    }
}
