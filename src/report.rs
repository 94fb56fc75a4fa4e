//! # Report Presentation
//!
//! Groups report tracks for display, builds summary lines and field tables,
//! and writes the JSON export.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{MediaReport, Track, TrackKind};
use crate::format;

pub const GENERAL_FIELDS: [(&str, &str); 8] = [
    ("CompleteName", "Complete name"),
    ("Format", "Format"),
    ("Format_Version", "Format version"),
    ("FileSize", "File size"),
    ("Duration", "Duration"),
    ("OverallBitRate", "Overall bit rate"),
    ("Encoded_Date", "Encoded date"),
    ("Tagged_Date", "Tagged date"),
];

pub const VIDEO_FIELDS: [(&str, &str); 10] = [
    ("Format", "Format"),
    ("Format_Profile", "Format profile"),
    ("Width", "Width"),
    ("Height", "Height"),
    ("DisplayAspectRatio", "Display aspect ratio"),
    ("FrameRate", "Frame rate"),
    ("BitRate", "Bit rate"),
    ("ColorSpace", "Color space"),
    ("BitDepth", "Bit depth"),
    ("Duration", "Duration"),
];

pub const AUDIO_FIELDS: [(&str, &str); 9] = [
    ("Format", "Format"),
    ("Format_Profile", "Format profile"),
    ("Duration", "Duration"),
    ("BitRate", "Bit rate"),
    ("Channel_s_", "Channels"),
    ("ChannelLayout", "Channel layout"),
    ("SamplingRate", "Sampling rate"),
    ("BitDepth", "Bit depth"),
    ("Language", "Language"),
];

/// Tracks the front end knows how to show. Other kinds are left out.
#[derive(Debug, Default)]
pub struct TrackGroups<'a> {
    pub general: Vec<&'a Track>,
    pub video: Vec<&'a Track>,
    pub audio: Vec<&'a Track>,
}

impl<'a> TrackGroups<'a> {
    pub fn from_report(report: &'a MediaReport) -> Self {
        let mut groups = TrackGroups::default();
        for track in report.tracks() {
            match track.kind {
                TrackKind::General => groups.general.push(track),
                TrackKind::Video => groups.video.push(track),
                TrackKind::Audio => groups.audio.push(track),
                _ => {}
            }
        }
        groups
    }
}

fn codec(track: &Track) -> Option<String> {
    let format = track.get("Format")?;
    Some(match track.get("Format_Profile") {
        Some(profile) => format!("{format} ({profile})"),
        None => format.to_string(),
    })
}

fn numbered(label: &str, index: usize, count: usize) -> String {
    if count > 1 {
        format!("{label} {}", index + 1)
    } else {
        label.to_string()
    }
}

fn video_summary(track: &Track) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(codec) = codec(track) {
        parts.push(format!("codec: {codec}"));
    }
    if let (Some(w), Some(h)) = (track.get("Width"), track.get("Height")) {
        let mut resolution = format!("{w}x{h}");
        if let Some(dar) = track.get("DisplayAspectRatio") {
            resolution.push_str(&format!(" ({})", format::aspect_ratio(dar)));
        }
        parts.push(format!("resolution: {resolution}"));
    }
    if let Some(fps) = track.get("FrameRate") {
        parts.push(format!("frame rate: {}", format::value("FrameRate", fps)));
    }
    if let Some(rate) = track.get("BitRate") {
        parts.push(format!("bit rate: {}", format::value("BitRate", rate)));
    }
    parts
}

fn audio_summary(track: &Track) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(codec) = codec(track) {
        parts.push(format!("codec: {codec}"));
    }
    if let Some(rate) = track.get("SamplingRate") {
        parts.push(format!("sampling rate: {}", format::value("SamplingRate", rate)));
    }
    match (track.get("Channel_s_"), track.get("ChannelLayout")) {
        (Some(n), Some(layout)) => parts.push(format!("channels: {n} ({layout})")),
        (Some(n), None) => parts.push(format!("channels: {n}")),
        (None, Some(layout)) => parts.push(format!("channels: {layout}")),
        (None, None) => {}
    }
    if let Some(rate) = track.get("BitRate") {
        parts.push(format!("bit rate: {}", format::value("BitRate", rate)));
    }
    parts
}

/// One line per video and audio track.
pub fn summary_lines(groups: &TrackGroups<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    for (idx, track) in groups.video.iter().enumerate() {
        let parts = video_summary(track);
        let body = if parts.is_empty() {
            "no data".to_string()
        } else {
            parts.join(", ")
        };
        lines.push(format!("{}: {body}", numbered("Video", idx, groups.video.len())));
    }
    for (idx, track) in groups.audio.iter().enumerate() {
        let parts = audio_summary(track);
        let body = if parts.is_empty() {
            "no data".to_string()
        } else {
            parts.join(", ")
        };
        lines.push(format!("{}: {body}", numbered("Audio", idx, groups.audio.len())));
    }
    if lines.is_empty() {
        lines.push("no video or audio tracks found".to_string());
    }
    lines
}

/// `(label, formatted value)` rows for the fields present on `track`.
pub fn field_rows(track: &Track, fields: &[(&str, &str)]) -> Vec<(String, String)> {
    fields
        .iter()
        .filter_map(|(key, label)| {
            let raw = track.get(key)?;
            if raw.is_empty() {
                return None;
            }
            Some((label.to_string(), format::value(key, raw)))
        })
        .collect()
}

/// Full text rendering: summary, then general, video and audio sections.
pub fn render_text(report: &MediaReport) -> String {
    let groups = TrackGroups::from_report(report);
    let mut out = String::new();

    out.push_str("Summary\n");
    for line in summary_lines(&groups) {
        out.push_str(&format!("  {line}\n"));
    }

    out.push_str("\nGeneral\n");
    match groups.general.first() {
        Some(track) => push_rows(&mut out, &field_rows(track, &GENERAL_FIELDS)),
        None => out.push_str("  general information unavailable\n"),
    }

    render_section(&mut out, "Video", &groups.video, &VIDEO_FIELDS, "no video tracks found");
    render_section(&mut out, "Audio", &groups.audio, &AUDIO_FIELDS, "no audio tracks found");
    out
}

fn render_section(
    out: &mut String,
    title: &str,
    tracks: &[&Track],
    fields: &[(&str, &str)],
    empty: &str,
) {
    out.push_str(&format!("\n{title}\n"));
    if tracks.is_empty() {
        out.push_str(&format!("  {empty}\n"));
        return;
    }
    for (idx, track) in tracks.iter().enumerate() {
        if tracks.len() > 1 {
            out.push_str(&format!("  {title} track {}\n", idx + 1));
        }
        push_rows(out, &field_rows(track, fields));
    }
}

fn push_rows(out: &mut String, rows: &[(String, String)]) {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, value) in rows {
        out.push_str(&format!("  {label:<width$} : {value}\n"));
    }
}

/// Export document: the raw report plus where and how it was produced.
#[derive(Debug, Serialize)]
pub struct ExportRecord<'a> {
    pub source_path: String,
    pub tool_version: &'a str,
    pub config_hash: &'a str,
    pub exported_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: &'a MediaReport,
}

pub fn export_json(path: &Path, record: &ExportRecord<'_>) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Media;

    fn sample_report() -> MediaReport {
        let mut general = Track::new(TrackKind::General);
        general.set("Format", "MPEG-4").set("FileSize", 2048).set("Duration", "75.000");
        let mut video = Track::new(TrackKind::Video);
        video
            .set("Format", "AVC")
            .set("Format_Profile", "High@L4")
            .set("Width", 1920)
            .set("Height", 1080)
            .set("DisplayAspectRatio", "1.778")
            .set("FrameRate", "25.000")
            .set("BitRate", 4_000_000);
        let mut audio = Track::new(TrackKind::Audio);
        audio
            .set("Format", "AAC")
            .set("SamplingRate", 48000)
            .set("Channel_s_", 2)
            .set("ChannelLayout", "L R");
        let text = Track::new(TrackKind::Text);
        MediaReport {
            media: Media {
                track: vec![general, video, audio, text],
            },
        }
    }

    #[test]
    fn groups_known_track_kinds() {
        let report = sample_report();
        let groups = TrackGroups::from_report(&report);
        assert_eq!(groups.general.len(), 1);
        assert_eq!(groups.video.len(), 1);
        assert_eq!(groups.audio.len(), 1);
    }

    #[test]
    fn summarizes_tracks() {
        let report = sample_report();
        let lines = summary_lines(&TrackGroups::from_report(&report));
        assert_eq!(
            lines[0],
            "Video: codec: AVC (High@L4), resolution: 1920x1080 (16:9), frame rate: 25.000 fps, bit rate: 4000 kbps"
        );
        assert_eq!(
            lines[1],
            "Audio: codec: AAC, sampling rate: 48 kHz, channels: 2 (L R)"
        );
    }

    #[test]
    fn empty_report_says_so() {
        let report = MediaReport::default();
        let lines = summary_lines(&TrackGroups::from_report(&report));
        assert_eq!(lines, vec!["no video or audio tracks found"]);
        assert!(render_text(&report).contains("general information unavailable"));
    }

    #[test]
    fn field_rows_skip_missing_fields() {
        let report = sample_report();
        let rows = field_rows(&report.tracks()[0], &GENERAL_FIELDS);
        let labels: Vec<_> = rows.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Format", "File size", "Duration"]);
        assert_eq!(rows[1].1, "2 KB");
        assert_eq!(rows[2].1, "1:15");
    }

    #[test]
    fn export_writes_report_and_provenance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mp4_mediainfo.json");
        let report = sample_report();
        let record = ExportRecord {
            source_path: "clip.mp4".to_string(),
            tool_version: "0.1.0",
            config_hash: "abc",
            exported_at: Utc::now(),
            report: &report,
        };
        export_json(&path, &record).expect("export");

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["source_path"], "clip.mp4");
        assert_eq!(value["media"]["track"][1]["Width"], "1920");
    }
}
