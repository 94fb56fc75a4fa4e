//! # Metadata Engines
//!
//! An engine turns a pull reader into a [`MediaReport`]. The analyzer only
//! knows the [`MetadataEngine`] trait; [`ContainerProbe`] is the engine the
//! binary ships with.

mod bmff;
pub mod probe;
mod riff;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reader::ByteReader;
use crate::source::ReadError;

pub use probe::ContainerProbe;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("malformed container: {0}")]
    Malformed(String),
    #[error("engine failed to initialize: {0}")]
    Init(String),
}

pub trait MetadataEngine: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, input: &dyn ByteReader) -> Result<MediaReport, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrackKind {
    General,
    Video,
    Audio,
    Text,
    Other(String),
}

impl From<String> for TrackKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "General" => TrackKind::General,
            "Video" => TrackKind::Video,
            "Audio" => TrackKind::Audio,
            "Text" => TrackKind::Text,
            _ => TrackKind::Other(value),
        }
    }
}

impl From<TrackKind> for String {
    fn from(kind: TrackKind) -> Self {
        match kind {
            TrackKind::General => "General".to_string(),
            TrackKind::Video => "Video".to_string(),
            TrackKind::Audio => "Audio".to_string(),
            TrackKind::Text => "Text".to_string(),
            TrackKind::Other(name) => name,
        }
    }
}

/// One track: a type tag plus a flat map of field name to scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "@type")]
    pub kind: TrackKind,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl Track {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub track: Vec<Track>,
}

/// Structured report produced by an engine. The analyzer passes it through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReport {
    pub media: Media,
}

impl MediaReport {
    pub fn tracks(&self) -> &[Track] {
        &self.media.track
    }

    pub fn tracks_of(&self, kind: &TrackKind) -> impl Iterator<Item = &Track> {
        self.media.track.iter().filter(move |t| &t.kind == kind)
    }
}

/// Seconds rendered the way reports carry durations.
pub(crate) fn seconds_field(seconds: f64) -> String {
    format!("{seconds:.3}")
}
