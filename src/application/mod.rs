//! Application layer - services built on top of the ports.

pub mod pipeline;
pub mod scheduler;
