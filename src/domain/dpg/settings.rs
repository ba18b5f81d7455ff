use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Largest picture the player can show.
pub const CANVAS_WIDTH: u32 = 256;
pub const CANVAS_HEIGHT: u32 = 192;

pub const MAX_FPS: u32 = 60;
pub const MAX_VERSION: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is missing")]
    Missing { field: &'static str },
    #[error("{field} is not a number: {value:?}")]
    NotNumeric { field: &'static str, value: String },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("unexpected value for {field}: {value:?}")]
    Unexpected { field: &'static str, value: String },
}

/// Picture quality, traded against artifact size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QualityTier {
    Low,
    #[default]
    Normal,
    High,
}

impl QualityTier {
    /// Video bitrate handed to the encoder.
    pub fn video_bitrate(self) -> &'static str {
        match self {
            QualityTier::Low => "192k",
            QualityTier::Normal => "256k",
            QualityTier::High => "384k",
        }
    }
}

/// Form fields exactly as the submitter sent them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEncodeConfig {
    pub fps: Option<String>,
    pub dpg: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub aspect: Option<String>,
    pub quality: Option<String>,
}

/// A checked conversion request. Never constructed from unchecked input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeConfig {
    fps: u32,
    version: u8,
    width: u32,
    height: u32,
    keep_aspect: bool,
    quality: QualityTier,
    output: PathBuf,
}

impl EncodeConfig {
    pub fn validate(raw: &RawEncodeConfig) -> Result<Self, ValidationError> {
        let fps = parse_in_range("fps", raw.fps.as_deref(), 1, MAX_FPS as i64)?;
        let version = parse_in_range("dpg", raw.dpg.as_deref(), 0, MAX_VERSION as i64)?;
        let width = parse_in_range("width", raw.width.as_deref(), 1, CANVAS_WIDTH as i64)?;
        let height = parse_in_range("height", raw.height.as_deref(), 1, CANVAS_HEIGHT as i64)?;

        // Checkbox semantics: absent means off, "on" means on.
        let keep_aspect = match raw.aspect.as_deref() {
            None | Some("") => false,
            Some("on") => true,
            Some(other) => {
                return Err(ValidationError::Unexpected {
                    field: "aspect",
                    value: other.to_string(),
                })
            }
        };

        let quality = match raw.quality.as_deref().map(str::trim) {
            None | Some("") | Some("normal") => QualityTier::Normal,
            Some("low") => QualityTier::Low,
            Some("high") => QualityTier::High,
            Some(other) => {
                return Err(ValidationError::Unexpected {
                    field: "quality",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            fps: fps as u32,
            version: version as u8,
            width: width as u32,
            height: height as u32,
            keep_aspect,
            quality,
            output: PathBuf::new(),
        })
    }

    /// Binds the config to the file the finished container is written to.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn keep_aspect(&self) -> bool {
        self.keep_aspect
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn has_gop_index(&self) -> bool {
        self.version >= 2
    }

    pub fn has_thumbnail(&self) -> bool {
        self.version == 4
    }
}

fn parse_in_range(
    field: &'static str,
    value: Option<&str>,
    min: i64,
    max: i64,
) -> Result<i64, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field })?;
    let parsed: i64 = value
        .trim()
        .parse()
        .map_err(|_| ValidationError::NotNumeric {
            field,
            value: value.to_string(),
        })?;

    if parsed < min || parsed > max {
        return Err(ValidationError::OutOfRange {
            field,
            value: parsed,
            min,
            max,
        });
    }
    Ok(parsed)
}
