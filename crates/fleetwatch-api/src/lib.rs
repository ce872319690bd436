// fleetwatch-api: device transport and telemetry envelope parsing

pub mod device;
pub mod display;
pub mod error;
pub mod transport;

pub use device::{DeviceClient, PollTarget};
pub use display::{Telemetry, parse_display};
pub use error::{Error, FormatError};
pub use transport::TransportConfig;
