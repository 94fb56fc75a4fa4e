//! Built-in engine that sniffs the container from the first bytes and
//! dispatches to a structural parser.

use tracing::{debug, info};

use crate::constants::MOOV_READ_LIMIT;
use crate::engine::riff::{AVI_FORM, RIFF_MAGIC, WAVE_FORM};
use crate::engine::{EngineError, Media, MediaReport, MetadataEngine, Track, TrackKind, bmff, riff};
use crate::reader::ByteReader;

const SNIFF_LEN: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    IsoBmff,
    Wave,
    Avi,
    Unknown,
}

pub fn sniff(head: &[u8]) -> ContainerKind {
    if head.len() >= 12 && &head[0..4] == RIFF_MAGIC {
        if &head[8..12] == WAVE_FORM {
            return ContainerKind::Wave;
        }
        if &head[8..12] == AVI_FORM {
            return ContainerKind::Avi;
        }
    }
    if bmff::looks_like_bmff(head) {
        return ContainerKind::IsoBmff;
    }
    ContainerKind::Unknown
}

#[derive(Debug, Clone)]
pub struct ContainerProbe {
    moov_read_limit: u64,
}

impl ContainerProbe {
    pub fn new(moov_read_limit: u64) -> Self {
        Self { moov_read_limit }
    }
}

impl Default for ContainerProbe {
    fn default() -> Self {
        Self::new(MOOV_READ_LIMIT)
    }
}

impl MetadataEngine for ContainerProbe {
    fn name(&self) -> &str {
        "container-probe"
    }

    fn analyze(&self, input: &dyn ByteReader) -> Result<MediaReport, EngineError> {
        let head = input.read_at(0, SNIFF_LEN)?;
        let kind = sniff(&head);
        debug!(?kind, size = input.size(), "sniffed container");

        let track = match kind {
            ContainerKind::IsoBmff => bmff::probe(input, self.moov_read_limit)?,
            ContainerKind::Wave => riff::probe_wave(input)?,
            ContainerKind::Avi => riff::probe_avi(input)?,
            ContainerKind::Unknown => {
                let mut general = Track::new(TrackKind::General);
                general.set("Format", "Unknown").set("FileSize", input.size());
                vec![general]
            }
        };
        info!(tracks = track.len(), ?kind, "probe finished");
        Ok(MediaReport {
            media: Media { track },
        })
    }
}
