//! Target parameters for the external encoders, negotiated between the
//! requested config and the probed source.

use super::probe::MediaInfo;
use crate::domain::dpg::settings::{EncodeConfig, QualityTier, CANVAS_HEIGHT, CANVAS_WIDTH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPlan {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub quality: QualityTier,
}

impl VideoPlan {
    pub fn new(config: &EncodeConfig, info: &MediaInfo) -> Self {
        // never ask for more frames than the source has
        let fps = if info.frame_rate >= 1 {
            config.fps().min(info.frame_rate)
        } else {
            config.fps()
        };

        let (width, height) = if config.keep_aspect() && info.width > 0 && info.height > 0 {
            aspect_fit(info.width, info.height)
        } else {
            (
                config.width().min(CANVAS_WIDTH),
                config.height().min(CANVAS_HEIGHT),
            )
        };

        VideoPlan {
            fps,
            width,
            height,
            pad_x: (CANVAS_WIDTH - width) / 2,
            pad_y: (CANVAS_HEIGHT - height) / 2,
            quality: config.quality(),
        }
    }
}

/// Largest rectangle inside the canvas with the source's aspect ratio.
pub fn aspect_fit(width: u32, height: u32) -> (u32, u32) {
    let aspect = width as f64 / height as f64;
    let fitted_height = (CANVAS_WIDTH as f64 / aspect).floor() as u32;

    if fitted_height <= CANVAS_HEIGHT {
        (CANVAS_WIDTH, fitted_height.max(1))
    } else {
        let fitted_width = (aspect * CANVAS_HEIGHT as f64).floor() as u32;
        (fitted_width.clamp(1, CANVAS_WIDTH), CANVAS_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioPlan {
    Encode { channels: u32 },
    /// The source has no audio; a silent mono track of this length stands in.
    Silence { seconds: f64 },
}

impl AudioPlan {
    /// `None` when there is neither an audio stream nor a usable duration.
    pub fn new(config: &EncodeConfig, info: &MediaInfo) -> Option<Self> {
        match (info.channels, info.duration) {
            // version 0 players only handle mono
            (Some(channels), _) if channels >= 2 && config.version() != 0 => {
                Some(AudioPlan::Encode { channels: 2 })
            }
            (Some(_), _) => Some(AudioPlan::Encode { channels: 1 }),
            (None, Some(seconds)) if seconds > 0.0 => Some(AudioPlan::Silence { seconds }),
            (None, _) => None,
        }
    }
}
