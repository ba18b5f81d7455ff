//! DPG container: config, header, seek index and thumbnail.

pub mod gop;
pub mod header;
pub mod settings;
pub mod thumbnail;
