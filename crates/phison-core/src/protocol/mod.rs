//! Protocol module - Phison vendor command definitions.

pub mod codec;
pub mod command;
pub mod constants;
pub mod status;

pub use codec::CodecError;
pub use command::{Command, CommandDescriptor, Field};
pub use constants::*;
pub use status::TransferStatus;
