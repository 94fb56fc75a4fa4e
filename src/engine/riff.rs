//! RIFF containers: WAVE audio and AVI.

use tracing::debug;

use crate::engine::{EngineError, Track, TrackKind, seconds_field};
use crate::reader::ByteReader;

pub(crate) const RIFF_MAGIC: &[u8; 4] = b"RIFF";
pub(crate) const WAVE_FORM: &[u8; 4] = b"WAVE";
pub(crate) const AVI_FORM: &[u8; 4] = b"AVI ";

const CHUNK_HEADER_LEN: u64 = 8;
const FMT_READ_LIMIT: u64 = 64;
const HDRL_READ_LIMIT: u64 = 1024 * 1024;

fn le_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn le_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn padded(size: u64) -> u64 {
    size + (size & 1)
}

/// Iterates sub-chunks of an in-memory RIFF payload.
struct ChunkIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let id: [u8; 4] = self.data.get(self.pos..self.pos + 4)?.try_into().ok()?;
        let size = le_u32(self.data, self.pos + 4)? as usize;
        let start = self.pos + 8;
        let end = start.checked_add(size)?;
        let payload = self.data.get(start..end)?;
        self.pos = end + (size & 1);
        Some((id, payload))
    }
}

fn chunks(data: &[u8]) -> ChunkIter<'_> {
    ChunkIter { data, pos: 0 }
}

#[derive(Debug, Clone, Copy, Default)]
struct WaveFormat {
    tag: u16,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    bits: u16,
}

fn parse_wave_format(fmt: &[u8]) -> Option<WaveFormat> {
    Some(WaveFormat {
        tag: le_u16(fmt, 0)?,
        channels: le_u16(fmt, 2)?,
        sample_rate: le_u32(fmt, 4)?,
        byte_rate: le_u32(fmt, 8)?,
        bits: le_u16(fmt, 14).unwrap_or(0),
    })
}

fn wave_format_name(tag: u16) -> String {
    match tag {
        0x0001 | 0x0003 | 0xFFFE => "PCM".to_string(),
        0x0002 => "ADPCM".to_string(),
        0x0006 => "A-Law".to_string(),
        0x0007 => "U-Law".to_string(),
        0x0050 | 0x0055 => "MPEG Audio".to_string(),
        0x00FF => "AAC".to_string(),
        0x2000 => "AC-3".to_string(),
        other => format!("0x{other:04X}"),
    }
}

fn fill_audio(track: &mut Track, fmt: &WaveFormat) {
    track.set("Format", wave_format_name(fmt.tag));
    track.set("CodecID", format!("{:X}", fmt.tag));
    if fmt.channels > 0 {
        track.set("Channel_s_", fmt.channels);
    }
    if fmt.sample_rate > 0 {
        track.set("SamplingRate", fmt.sample_rate);
    }
    if fmt.bits > 0 {
        track.set("BitDepth", fmt.bits);
    }
    if fmt.byte_rate > 0 {
        track.set("BitRate", u64::from(fmt.byte_rate) * 8);
    }
}

/// Walks the top-level chunks of a WAVE file, reading only `fmt ` payloads.
pub(crate) fn probe_wave(input: &dyn ByteReader) -> Result<Vec<Track>, EngineError> {
    let total = input.size();
    let mut fmt = None;
    let mut data_len = None;
    let mut offset = 12u64;

    while offset.saturating_add(CHUNK_HEADER_LEN) <= total
        && (fmt.is_none() || data_len.is_none())
    {
        let header = input.read_at(offset, CHUNK_HEADER_LEN)?;
        if header.len() < CHUNK_HEADER_LEN as usize {
            break;
        }
        let size = u64::from(le_u32(&header, 4).unwrap_or(0));
        debug!(offset, size, id = %String::from_utf8_lossy(&header[0..4]), "wave chunk");
        match &header[0..4] {
            b"fmt " => {
                let payload = input.read_at(offset + CHUNK_HEADER_LEN, size.min(FMT_READ_LIMIT))?;
                fmt = Some(parse_wave_format(&payload).ok_or_else(|| {
                    EngineError::Malformed(format!("fmt chunk at {offset} is too short"))
                })?);
            }
            b"data" => {
                data_len = Some(size.min(total.saturating_sub(offset + CHUNK_HEADER_LEN)));
            }
            _ => {}
        }
        offset = offset
            .saturating_add(CHUNK_HEADER_LEN)
            .saturating_add(padded(size));
    }

    let fmt = fmt.ok_or_else(|| EngineError::Malformed("wave file has no fmt chunk".to_string()))?;

    let mut general = Track::new(TrackKind::General);
    general.set("Format", "Wave").set("FileSize", total);
    let mut audio = Track::new(TrackKind::Audio);
    fill_audio(&mut audio, &fmt);

    if let Some(len) = data_len {
        audio.set("StreamSize", len);
        if fmt.byte_rate > 0 {
            let seconds = len as f64 / f64::from(fmt.byte_rate);
            audio.set("Duration", seconds_field(seconds));
            general.set("Duration", seconds_field(seconds));
            if seconds > 0.0 {
                general.set(
                    "OverallBitRate",
                    ((total as f64 * 8.0) / seconds).round() as u64,
                );
            }
        }
    }
    general.set("AudioCount", 1);
    Ok(vec![general, audio])
}

fn avi_video_format(handler: &str) -> String {
    match handler.to_ascii_uppercase().as_str() {
        "H264" | "X264" | "AVC1" => "AVC".to_string(),
        "HEVC" | "H265" | "HVC1" => "HEVC".to_string(),
        "XVID" | "DIVX" | "DX50" | "FMP4" | "MP4V" => "MPEG-4 Visual".to_string(),
        "MJPG" => "JPEG".to_string(),
        "" => "Unknown".to_string(),
        _ => handler.trim().to_string(),
    }
}

/// Reads the `hdrl` list at the start of an AVI file.
pub(crate) fn probe_avi(input: &dyn ByteReader) -> Result<Vec<Track>, EngineError> {
    let total = input.size();
    let header = input.read_at(12, 12)?;
    if header.len() < 12 || &header[0..4] != b"LIST" || &header[8..12] != b"hdrl" {
        return Err(EngineError::Malformed(
            "avi file does not start with a hdrl list".to_string(),
        ));
    }
    let list_size = u64::from(le_u32(&header, 4).unwrap_or(0));
    if list_size < 4 {
        return Err(EngineError::Malformed("hdrl list is empty".to_string()));
    }
    let hdrl = input.read_at(24, (list_size - 4).min(HDRL_READ_LIMIT))?;

    let mut general = Track::new(TrackKind::General);
    general.set("Format", "AVI").set("FileSize", total);

    let mut frame_seconds = None;
    let mut tracks = Vec::new();
    for (id, payload) in chunks(&hdrl) {
        match &id {
            b"avih" => {
                let usec = le_u32(payload, 0).unwrap_or(0);
                let frames = le_u32(payload, 16).unwrap_or(0);
                if usec > 0 {
                    frame_seconds = Some(f64::from(usec) / 1_000_000.0);
                    if frames > 0 {
                        let seconds = f64::from(frames) * f64::from(usec) / 1_000_000.0;
                        general.set("Duration", seconds_field(seconds));
                        general.set(
                            "OverallBitRate",
                            ((total as f64 * 8.0) / seconds).round() as u64,
                        );
                    }
                }
            }
            b"LIST" if payload.get(0..4) == Some(&b"strl"[..]) => {
                if let Some(track) = parse_strl(&payload[4..], frame_seconds) {
                    tracks.push(track);
                }
            }
            _ => {}
        }
    }

    let video = tracks.iter().filter(|t| t.kind == TrackKind::Video).count();
    let audio = tracks.iter().filter(|t| t.kind == TrackKind::Audio).count();
    if video > 0 {
        general.set("VideoCount", video);
    }
    if audio > 0 {
        general.set("AudioCount", audio);
    }

    let mut out = vec![general];
    out.extend(tracks);
    Ok(out)
}

fn parse_strl(strl: &[u8], frame_seconds: Option<f64>) -> Option<Track> {
    let mut strh = None;
    let mut strf = None;
    for (id, payload) in chunks(strl) {
        match &id {
            b"strh" => strh = Some(payload),
            b"strf" => strf = Some(payload),
            _ => {}
        }
    }
    let strh = strh?;
    let stream_type = strh.get(0..4)?;
    let handler = String::from_utf8_lossy(strh.get(4..8)?).trim_matches('\0').to_string();
    let scale = le_u32(strh, 20).unwrap_or(0);
    let rate = le_u32(strh, 24).unwrap_or(0);
    let length = le_u32(strh, 32).unwrap_or(0);

    match stream_type {
        b"vids" => {
            let mut track = Track::new(TrackKind::Video);
            let compression = strf
                .and_then(|f| f.get(16..20))
                .map(|c| String::from_utf8_lossy(c).trim_matches('\0').to_string())
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(handler);
            track.set("CodecID", compression.trim());
            track.set("Format", avi_video_format(&compression));
            if let Some(f) = strf {
                if let (Some(w), Some(h)) = (le_u32(f, 4), le_u32(f, 8)) {
                    let h = (h as i32).unsigned_abs();
                    track.set("Width", w).set("Height", h);
                    if h > 0 {
                        track.set("DisplayAspectRatio", format!("{:.3}", w as f64 / h as f64));
                    }
                }
                if let Some(bits) = le_u16(f, 14) {
                    if bits == 24 {
                        track.set("BitDepth", 8);
                    }
                }
            }
            let fps = if scale > 0 && rate > 0 {
                Some(f64::from(rate) / f64::from(scale))
            } else {
                frame_seconds.filter(|s| *s > 0.0).map(|s| 1.0 / s)
            };
            if let Some(fps) = fps {
                track.set("FrameRate", format!("{fps:.3}"));
                if length > 0 {
                    track.set("FrameCount", length);
                    track.set("Duration", seconds_field(f64::from(length) / fps));
                }
            }
            Some(track)
        }
        b"auds" => {
            let mut track = Track::new(TrackKind::Audio);
            if let Some(fmt) = strf.and_then(parse_wave_format) {
                fill_audio(&mut track, &fmt);
            }
            Some(track)
        }
        b"txts" => Some(Track::new(TrackKind::Text)),
        _ => None,
    }
}
