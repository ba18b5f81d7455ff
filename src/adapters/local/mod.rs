//! Local adapters: external media tools, the filesystem, and HTTP.

pub mod ffmpeg;
pub mod fs;
pub mod http;

pub use ffmpeg::FfmpegTools;
