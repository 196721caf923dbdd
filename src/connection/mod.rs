// Device connectivity: status flag and reconnection backoff

pub mod reconnect;
pub mod status;

pub use reconnect::{ReconnectSchedule, ReconnectionStrategy};
pub use status::{AtomicDeviceStatus, DeviceStatus};
