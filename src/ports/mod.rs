//! Ports - Trait definitions for the pipeline's collaborators.

pub mod encoder;
pub mod media;
