//! Seek index over the encoded MPEG-1 video segment.

const SEQUENCE_HEADER: u8 = 0xB3;
const PICTURE_START: u8 = 0x00;

/// Keyframe interval passed to the video encoder. The start-code scan assumes
/// every sequence holds exactly this many pictures, so the two move together.
pub const KEYFRAME_INTERVAL: u32 = 10;

/// One record of the index: a frame number and where it can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopEntry {
    pub frame_index: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GopIndex {
    pub frames: u32,
    pub entries: Vec<GopEntry>,
}

impl GopIndex {
    /// Walks the raw elementary stream looking for start codes. Each sequence
    /// header yields an entry with its byte offset; pictures are counted for
    /// the total.
    pub fn scan_start_codes(stream: &[u8]) -> Self {
        let mut index = GopIndex::default();
        let mut sequences = 0u32;
        let mut i = 0;

        while i + 3 < stream.len() {
            if stream[i] != 0 || stream[i + 1] != 0 || stream[i + 2] != 1 {
                i += 1;
                continue;
            }
            match stream[i + 3] {
                SEQUENCE_HEADER => {
                    index.entries.push(GopEntry {
                        frame_index: sequences * KEYFRAME_INTERVAL,
                        offset: i as u32,
                    });
                    sequences += 1;
                }
                PICTURE_START => index.frames += 1,
                _ => {}
            }
            i += 4;
        }
        index
    }

    /// Reads `ffprobe -show_frames -print_format csv` rows of the form
    /// `frame,<pkt_pos>,<pict_type>`. Every frame row counts; intra frames
    /// yield an entry holding the number of frames before them.
    pub fn from_frame_csv(csv: &str) -> Self {
        let mut index = GopIndex::default();

        for line in csv.lines() {
            let mut fields = line.trim().split(',');
            if fields.next() != Some("frame") {
                continue;
            }
            let pkt_pos = fields.next().and_then(|pos| pos.trim().parse::<u32>().ok());
            let pict_type = fields.next().map(str::trim);

            if let (Some(offset), Some("I")) = (pkt_pos, pict_type) {
                index.entries.push(GopEntry {
                    frame_index: index.frames,
                    offset,
                });
            }
            index.frames += 1;
        }
        index
    }

    /// Fixed 8-byte little-endian records, no count prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 8);
        for entry in &self.entries {
            out.extend_from_slice(&entry.frame_index.to_le_bytes());
            out.extend_from_slice(&entry.offset.to_le_bytes());
        }
        out
    }
}
