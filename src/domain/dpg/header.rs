//! DPG container layout and header encoding.
//!
//! Byte order is not uniform: every 32-bit field is little-endian while the
//! frame rate and the reserved 16-bit field after it are big-endian. Players
//! read the header with exactly this layout, so it is reproduced as is.

use super::settings::{CANVAS_HEIGHT, CANVAS_WIDTH};

/// Audio sample rate written into every header and used for every audio track.
pub const AUDIO_SAMPLE_RATE: u32 = 32000;

/// Value of the pixel format field ("RGB24"; players ignore it).
pub const PIXEL_FORMAT: u32 = 3;

/// Raw 15-bit thumbnail, two bytes per pixel.
pub const THUMBNAIL_LEN: u64 = (CANVAS_WIDTH * CANVAS_HEIGHT * 2) as u64;

const THUMBNAIL_TAG: &[u8; 4] = b"THM0";

/// A segment of the container, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Thumbnail,
    Audio,
    Video,
    Gop,
}

impl Segment {
    /// Segments present in a container of `version`, in the only valid order.
    pub fn order(version: u8) -> Vec<Segment> {
        let mut order = vec![Segment::Header];
        if version == 4 {
            order.push(Segment::Thumbnail);
        }
        order.push(Segment::Audio);
        order.push(Segment::Video);
        if version >= 2 {
            order.push(Segment::Gop);
        }
        order
    }
}

/// Length of the fixed header for `version`.
pub fn header_len(version: u8) -> u64 {
    // tag, frames, fps, reserved, sample rate, reserved, audio and video extents
    let mut len = 4 + 4 + 2 + 2 + 4 + 4 + 8 + 8;
    if version >= 2 {
        len += 8;
    }
    if writes_pixel_format(version) {
        len += 4;
    }
    if version == 4 {
        len += 4;
    }
    len
}

/// Version 0 predates the pixel format field; every later version carries it.
pub fn writes_pixel_format(version: u8) -> bool {
    version != 0
}

/// Measured sizes of the payload segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSizes {
    pub audio: u64,
    pub video: u64,
    pub gop: Option<u64>,
}

/// Offset and size of one segment, relative to the start of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub size: u64,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    pub version: u8,
    pub header: Extent,
    pub thumbnail: Option<Extent>,
    pub audio: Extent,
    pub video: Extent,
    pub gop: Option<Extent>,
}

impl ContainerLayout {
    /// Every start offset is the sum of the sizes before it.
    pub fn compute(version: u8, sizes: SegmentSizes) -> Self {
        let header = Extent {
            start: 0,
            size: header_len(version),
        };
        let thumbnail = (version == 4).then(|| Extent {
            start: header.end(),
            size: THUMBNAIL_LEN,
        });
        let audio = Extent {
            start: thumbnail.map_or(header.end(), |t| t.end()),
            size: sizes.audio,
        };
        let video = Extent {
            start: audio.end(),
            size: sizes.video,
        };
        let gop = (version >= 2).then(|| Extent {
            start: video.end(),
            size: sizes.gop.unwrap_or(0),
        });

        Self {
            version,
            header,
            thumbnail,
            audio,
            video,
            gop,
        }
    }

    pub fn total_len(&self) -> u64 {
        self.gop.unwrap_or(self.video).end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub layout: ContainerLayout,
    pub frames: u32,
    pub fps: u16,
}

impl Header {
    pub fn new(layout: ContainerLayout, frames: u32, fps: u16) -> Self {
        Self {
            layout,
            frames,
            fps,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let version = self.layout.version;
        let mut out = Vec::with_capacity(header_len(version) as usize);

        out.extend_from_slice(b"DPG");
        out.push(b'0' + version);
        out.extend_from_slice(&self.frames.to_le_bytes());
        out.extend_from_slice(&self.fps.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&AUDIO_SAMPLE_RATE.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        push_extent(&mut out, self.layout.audio);
        push_extent(&mut out, self.layout.video);

        if let Some(gop) = self.layout.gop {
            push_extent(&mut out, gop);
        }
        if writes_pixel_format(version) {
            out.extend_from_slice(&PIXEL_FORMAT.to_le_bytes());
        }
        if version == 4 {
            out.extend_from_slice(THUMBNAIL_TAG);
        }
        out
    }
}

fn push_extent(out: &mut Vec<u8>, extent: Extent) {
    out.extend_from_slice(&(extent.start as u32).to_le_bytes());
    out.extend_from_slice(&(extent.size as u32).to_le_bytes());
}
