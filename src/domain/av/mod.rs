//! Audio/Video domain modules.

pub mod plan;
pub mod probe;
pub mod stream;
