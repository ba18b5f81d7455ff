use crate::domain::av::plan::{AudioPlan, VideoPlan};
use async_trait::async_trait;
use std::io;
use std::path::Path;

/// The external programs the pipeline drives. Each call runs one command to
/// completion; a failed launch or non-zero exit is an `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Stream and format report for `source`, as prober JSON.
    async fn probe(&self, source: &Path) -> io::Result<Vec<u8>>;

    /// Writes a raw MPEG-1 elementary stream padded to the canvas.
    async fn encode_video(&self, source: &Path, plan: &VideoPlan, output: &Path)
        -> io::Result<()>;

    /// Writes a raw MP2 elementary stream, or silence when the plan asks for it.
    async fn encode_audio(&self, source: &Path, plan: &AudioPlan, output: &Path)
        -> io::Result<()>;

    /// Per-frame CSV report (`frame,<pkt_pos>,<pict_type>`) of an encoded stream.
    async fn probe_frames(&self, video: &Path) -> io::Result<String>;

    /// Saves the frame at `at_second` as a still image.
    async fn extract_frame(&self, video: &Path, at_second: u32, output: &Path) -> io::Result<()>;
}
