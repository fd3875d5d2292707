//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockTransport, ScsiCall};
pub use nusb::NusbTransport;
pub use traits::{ScsiTransport, TransportError};
