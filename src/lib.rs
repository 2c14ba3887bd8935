//! Offline extractor for encrypted SDC download containers

pub mod cli;
pub mod common;
pub mod error;
pub mod logging;
pub mod sdc;

pub use cli::run;
pub use error::{ErrorKind, SdcError, SdcResult};
pub use sdc::{inspect, unpack, unpack_with_progress, ContainerInfo, UnpackOptions, UnpackReport};
