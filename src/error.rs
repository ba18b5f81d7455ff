//! Error types shared across the pipeline and scheduler.

use std::fmt;

pub use crate::domain::dpg::settings::ValidationError;

/// A named step of the encoding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Video,
    Audio,
    Gop,
    Thumbnail,
    Header,
    Final,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Video => "video",
            Stage::Audio => "audio",
            Stage::Gop => "gop",
            Stage::Thumbnail => "thumbnail",
            Stage::Header => "header",
            Stage::Final => "final",
        };
        f.write_str(name)
    }
}

/// Why a conversion did not produce an artifact.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("could not read the source video: {0}")]
    Probe(String),

    #[error("Encoding failed at {stage} stage.")]
    Stage { stage: Stage },

    #[error("{0}")]
    Pipeline(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    pub fn stage(stage: Stage) -> Self {
        Self::Stage { stage }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Also returned when the job belongs to another requester.
    #[error("job not found")]
    NotFound,
}
