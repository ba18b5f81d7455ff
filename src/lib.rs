//! DPG Online - converts uploaded videos into DPG containers for handheld
//! media players, one conversion at a time.
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (container format, media planning, jobs)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (ffmpeg, filesystem, HTTP)
//! - application/: Encoding pipeline and job scheduler
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use config::ServerConfig;
pub use error::{EncodeError, SchedulerError, ValidationError};
