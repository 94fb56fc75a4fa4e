//! ISO base media (MP4 / MOV / M4A) probing.
//!
//! Only box headers are read while walking the top level, so the media
//! payload (`mdat`) is never pulled. `moov` is buffered whole, up to a limit.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, warn};

use crate::engine::{EngineError, Track, TrackKind, seconds_field};
use crate::reader::ByteReader;

const BOX_HEADER_LEN: u64 = 8;
const EXTENDED_HEADER_LEN: u64 = 16;
const FTYP_READ_LIMIT: u64 = 4096;

const TOP_LEVEL_TYPES: [&[u8; 4]; 8] = [
    b"ftyp", b"moov", b"mdat", b"free", b"skip", b"wide", b"pnot", b"uuid",
];

pub(crate) fn looks_like_bmff(head: &[u8]) -> bool {
    head.len() >= 8 && TOP_LEVEL_TYPES.iter().any(|t| &head[4..8] == t.as_slice())
}

fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64(data: &[u8], pos: usize) -> Option<u64> {
    data.get(pos..pos + 8).map(|b| {
        u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

fn fourcc(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
}

/// Iterates child boxes of an in-memory payload. Stops at the first child
/// whose size does not fit.
struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let size32 = be_u32(self.data, start)? as usize;
        let kind: [u8; 4] = self.data.get(start + 4..start + 8)?.try_into().ok()?;
        let (size, header) = match size32 {
            0 => (self.data.len() - start, 8),
            1 => (usize::try_from(be_u64(self.data, start + 8)?).ok()?, 16),
            n => (n, 8),
        };
        if size < header || start.checked_add(size)? > self.data.len() {
            return None;
        }
        self.pos = start + size;
        Some((kind, &self.data[start + header..start + size]))
    }
}

fn find_child<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    BoxIter::new(data).find(|(k, _)| k == kind).map(|(_, p)| p)
}

fn find_path<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
    path.iter().try_fold(data, |cur, kind| find_child(cur, kind))
}

#[derive(Debug, Default)]
struct TopLevel {
    major_brand: Option<String>,
    compatible: Vec<String>,
    moov: Option<Vec<u8>>,
    mdat_bytes: u64,
}

pub(crate) fn probe(input: &dyn ByteReader, moov_limit: u64) -> Result<Vec<Track>, EngineError> {
    let total = input.size();
    let top = walk_top_level(input, moov_limit)?;

    let mut general = Track::new(TrackKind::General);
    general.set("FileSize", total);
    let brand = top.major_brand.clone().unwrap_or_default();
    let brand_trimmed = brand.trim();
    if brand_trimmed == "qt" {
        general.set("Format", "QuickTime");
    } else {
        general.set("Format", "MPEG-4");
    }
    if !brand_trimmed.is_empty() {
        general.set("CodecID", brand_trimmed);
        if let Some(profile) = brand_profile(brand_trimmed) {
            general.set("Format_Profile", profile);
        }
    }
    if !top.compatible.is_empty() {
        general.set("CodecID_Compatible", top.compatible.join("/"));
    }
    if top.mdat_bytes > 0 {
        general.set("StreamSize", top.mdat_bytes);
    }

    let Some(moov) = top.moov.as_deref() else {
        warn!("no moov box found; reporting container only");
        return Ok(vec![general]);
    };

    let mut tracks = Vec::new();
    if let Some(mvhd) = find_child(moov, b"mvhd") {
        if let Some(header) = parse_movie_header(mvhd) {
            if header.timescale > 0 && header.duration > 0 {
                let seconds = header.duration as f64 / header.timescale as f64;
                general.set("Duration", seconds_field(seconds));
                if seconds > 0.0 {
                    general.set(
                        "OverallBitRate",
                        ((total as f64 * 8.0) / seconds).round() as u64,
                    );
                }
            }
            if let Some(date) = mac_epoch_date(header.creation_time) {
                general.set("Encoded_Date", date);
            }
            if let Some(date) = mac_epoch_date(header.modification_time) {
                general.set("Tagged_Date", date);
            }
        }
    }

    let mut video_count = 0u32;
    let mut audio_count = 0u32;
    for (kind, trak) in BoxIter::new(moov) {
        if &kind != b"trak" {
            continue;
        }
        if let Some(track) = parse_trak(trak) {
            match track.kind {
                TrackKind::Video => video_count += 1,
                TrackKind::Audio => audio_count += 1,
                _ => {}
            }
            tracks.push(track);
        }
    }
    if video_count > 0 {
        general.set("VideoCount", video_count);
    }
    if audio_count > 0 {
        general.set("AudioCount", audio_count);
    }

    let mut out = Vec::with_capacity(tracks.len() + 1);
    out.push(general);
    out.extend(tracks);
    Ok(out)
}

fn walk_top_level(input: &dyn ByteReader, moov_limit: u64) -> Result<TopLevel, EngineError> {
    let total = input.size();
    let mut top = TopLevel::default();
    let mut offset = 0u64;

    while offset.saturating_add(BOX_HEADER_LEN) <= total {
        let header = input.read_at(offset, EXTENDED_HEADER_LEN)?;
        if header.len() < BOX_HEADER_LEN as usize {
            break;
        }
        let size32 = u64::from(be_u32(&header, 0).unwrap_or(0));
        let kind: [u8; 4] = [header[4], header[5], header[6], header[7]];

        let (box_size, header_len) = match size32 {
            0 => (total - offset, BOX_HEADER_LEN),
            1 => {
                let size64 = be_u64(&header, 8).ok_or_else(|| {
                    EngineError::Malformed(format!(
                        "truncated extended size for '{}' at {offset}",
                        fourcc(&kind)
                    ))
                })?;
                (size64, EXTENDED_HEADER_LEN)
            }
            n => (n, BOX_HEADER_LEN),
        };
        if box_size < header_len {
            return Err(EngineError::Malformed(format!(
                "box '{}' at {offset} declares size {box_size} below its header",
                fourcc(&kind)
            )));
        }
        let end = offset.saturating_add(box_size);
        let payload_len = box_size - header_len;
        debug!(offset, box_size, kind = %fourcc(&kind), "top-level box");

        match &kind {
            b"ftyp" => {
                let payload = input.read_at(offset + header_len, payload_len.min(FTYP_READ_LIMIT))?;
                if payload.len() >= 4 {
                    top.major_brand = Some(fourcc(&payload[0..4]));
                    top.compatible = payload
                        .get(8..)
                        .unwrap_or_default()
                        .chunks_exact(4)
                        .map(|c| fourcc(c).trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect();
                }
            }
            b"moov" => {
                if end > total {
                    return Err(EngineError::Malformed(format!(
                        "moov at {offset} extends past end of file"
                    )));
                }
                if payload_len > moov_limit {
                    return Err(EngineError::Malformed(format!(
                        "moov of {payload_len} bytes exceeds read limit {moov_limit}"
                    )));
                }
                top.moov = Some(input.read_at(offset + header_len, payload_len)?);
            }
            b"mdat" => {
                top.mdat_bytes = top.mdat_bytes.saturating_add(payload_len.min(total - offset));
            }
            _ => {}
        }

        if end > total {
            warn!(
                "box '{}' at {offset} runs past end of file; stopping",
                fourcc(&kind)
            );
            break;
        }
        offset = end;
    }
    Ok(top)
}

#[derive(Debug, Default)]
struct MovieHeader {
    creation_time: u64,
    modification_time: u64,
    timescale: u32,
    duration: u64,
}

fn parse_movie_header(mvhd: &[u8]) -> Option<MovieHeader> {
    let version = *mvhd.first()?;
    if version == 1 {
        Some(MovieHeader {
            creation_time: be_u64(mvhd, 4)?,
            modification_time: be_u64(mvhd, 12)?,
            timescale: be_u32(mvhd, 20)?,
            duration: be_u64(mvhd, 24)?,
        })
    } else {
        Some(MovieHeader {
            creation_time: u64::from(be_u32(mvhd, 4)?),
            modification_time: u64::from(be_u32(mvhd, 8)?),
            timescale: be_u32(mvhd, 12)?,
            duration: u64::from(be_u32(mvhd, 16)?),
        })
    }
}

/// QuickTime timestamps count seconds from 1904-01-01.
fn mac_epoch_date(seconds: u64) -> Option<String> {
    if seconds == 0 {
        return None;
    }
    let epoch: DateTime<Utc> = Utc.with_ymd_and_hms(1904, 1, 1, 0, 0, 0).single()?;
    let secs = i64::try_from(seconds).ok()?;
    let date = epoch.checked_add_signed(Duration::try_seconds(secs)?)?;
    Some(date.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn brand_profile(brand: &str) -> Option<&'static str> {
    match brand {
        "isom" | "iso2" | "iso4" | "iso5" | "iso6" => Some("Base Media"),
        "mp41" => Some("Base Media / Version 1"),
        "mp42" => Some("Base Media / Version 2"),
        "M4A" => Some("Apple audio with iTunes info"),
        "M4V" => Some("Apple video"),
        "3gp4" | "3gp5" | "3gp6" => Some("3GPP Media"),
        "dash" => Some("DASH"),
        _ => None,
    }
}

fn codec_format(code: &str) -> String {
    match code {
        "avc1" | "avc3" => "AVC",
        "hvc1" | "hev1" => "HEVC",
        "av01" => "AV1",
        "vp08" => "VP8",
        "vp09" => "VP9",
        "mp4v" => "MPEG-4 Visual",
        "apcn" | "apch" | "apcs" | "apco" | "ap4h" => "ProRes",
        "jpeg" | "mjpa" => "JPEG",
        "mp4a" => "AAC",
        "ac-3" => "AC-3",
        "ec-3" => "E-AC-3",
        "Opus" => "Opus",
        "fLaC" => "FLAC",
        "alac" => "ALAC",
        ".mp3" => "MPEG Audio",
        "lpcm" | "sowt" | "twos" | "in24" | "fl32" => "PCM",
        "tx3g" => "Timed Text",
        "wvtt" => "WebVTT",
        "c608" => "EIA-608",
        other => return other.trim().to_string(),
    }
    .to_string()
}

fn avc_profile(profile_idc: u8) -> Option<&'static str> {
    match profile_idc {
        66 => Some("Baseline"),
        77 => Some("Main"),
        88 => Some("Extended"),
        100 => Some("High"),
        110 => Some("High 10"),
        122 => Some("High 4:2:2"),
        244 => Some("High 4:4:4 Predictive"),
        _ => None,
    }
}

fn channel_layout(channels: u16) -> Option<&'static str> {
    match channels {
        1 => Some("M"),
        2 => Some("L R"),
        3 => Some("L R C"),
        4 => Some("L R Ls Rs"),
        6 => Some("L R C LFE Ls Rs"),
        8 => Some("L R C LFE Ls Rs Lb Rb"),
        _ => None,
    }
}

/// ISO-639-2/T code packed as three 5-bit letters.
fn mdhd_language(packed: u16) -> Option<String> {
    if packed == 0 || packed == 0x7FFF {
        return None;
    }
    let letters: String = [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
        .collect();
    if letters == "und" || !letters.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }
    Some(letters)
}

fn parse_trak(trak: &[u8]) -> Option<Track> {
    let mdia = find_child(trak, b"mdia")?;
    let hdlr = find_child(mdia, b"hdlr")?;
    let handler = hdlr.get(8..12)?;
    let kind = match handler {
        b"vide" => TrackKind::Video,
        b"soun" => TrackKind::Audio,
        b"text" | b"sbtl" | b"subt" | b"clcp" => TrackKind::Text,
        other => TrackKind::Other(fourcc(other)),
    };
    let mut track = Track::new(kind.clone());

    if let Some(tkhd) = find_child(trak, b"tkhd") {
        let id_pos = if tkhd.first() == Some(&1) { 20 } else { 12 };
        if let Some(id) = be_u32(tkhd, id_pos) {
            track.set("ID", id);
        }
        if kind == TrackKind::Video {
            let pos = if tkhd.first() == Some(&1) { 88 } else { 76 };
            if let (Some(w), Some(h)) = (be_u32(tkhd, pos), be_u32(tkhd, pos + 4)) {
                let (w, h) = (w >> 16, h >> 16);
                if w > 0 && h > 0 {
                    track.set("DisplayAspectRatio", format!("{:.3}", w as f64 / h as f64));
                }
            }
        }
    }

    let mut seconds = None;
    if let Some(mdhd) = find_child(mdia, b"mdhd") {
        let v1 = mdhd.first() == Some(&1);
        let (ts_pos, dur, lang_pos) = if v1 {
            (20, be_u64(mdhd, 24), 32)
        } else {
            (12, be_u32(mdhd, 16).map(u64::from), 20)
        };
        if let (Some(timescale), Some(duration)) = (be_u32(mdhd, ts_pos), dur) {
            if timescale > 0 && duration > 0 && duration != u64::from(u32::MAX) {
                let s = duration as f64 / timescale as f64;
                track.set("Duration", seconds_field(s));
                seconds = Some(s);
            }
        }
        if let Some(lang) = be_u16(mdhd, lang_pos).and_then(mdhd_language) {
            track.set("Language", lang);
        }
    }

    let stbl = find_path(mdia, &[b"minf", b"stbl"]);
    if let Some(entry) = stbl.and_then(|s| find_child(s, b"stsd")).and_then(first_sample_entry) {
        parse_sample_entry(&mut track, &kind, entry);
    }

    if let Some(stbl) = stbl {
        if let Some(frames) = find_child(stbl, b"stts").and_then(sample_count_stts) {
            if kind == TrackKind::Video && frames > 0 {
                track.set("FrameCount", frames);
                if let Some(s) = seconds.filter(|s| *s > 0.0) {
                    track.set("FrameRate", format!("{:.3}", frames as f64 / s));
                }
            }
        }
        if let Some(bytes) = find_child(stbl, b"stsz").and_then(total_sample_bytes) {
            track.set("StreamSize", bytes);
            if let Some(s) = seconds.filter(|s| *s > 0.0) {
                track.set("BitRate", ((bytes as f64 * 8.0) / s).round() as u64);
            }
        }
    }

    Some(track)
}

/// Returns the first sample entry, including its 8-byte box header.
fn first_sample_entry(stsd: &[u8]) -> Option<&[u8]> {
    let count = be_u32(stsd, 4)?;
    if count == 0 {
        return None;
    }
    let size = be_u32(stsd, 8)? as usize;
    stsd.get(8..8usize.checked_add(size)?)
}

fn parse_sample_entry(track: &mut Track, kind: &TrackKind, entry: &[u8]) {
    let Some(code) = entry.get(4..8).map(fourcc) else {
        return;
    };
    track.set("CodecID", code.trim());
    track.set("Format", codec_format(&code));

    match kind {
        TrackKind::Video => {
            if let (Some(w), Some(h)) = (be_u16(entry, 32), be_u16(entry, 34)) {
                track.set("Width", w).set("Height", h);
                if track.get("DisplayAspectRatio").is_none() && h > 0 {
                    track.set("DisplayAspectRatio", format!("{:.3}", w as f64 / h as f64));
                }
            }
            if let Some(depth) = be_u16(entry, 82) {
                if depth == 24 {
                    track.set("BitDepth", 8);
                }
            }
            if let Some(avcc) = entry.get(86..).and_then(|children| find_child(children, b"avcC")) {
                if let (Some(&profile), Some(&level)) = (avcc.get(1), avcc.get(3)) {
                    if let Some(name) = avc_profile(profile) {
                        let level = f64::from(level) / 10.0;
                        track.set("Format_Profile", format!("{name}@L{level}"));
                    }
                }
            }
        }
        TrackKind::Audio => {
            if let Some(channels) = be_u16(entry, 24) {
                track.set("Channel_s_", channels);
                if let Some(layout) = channel_layout(channels) {
                    track.set("ChannelLayout", layout);
                }
            }
            if let Some(bits) = be_u16(entry, 26) {
                if codec_format(&code) == "PCM" || code == "alac" || code == "fLaC" {
                    track.set("BitDepth", bits);
                }
            }
            if let Some(rate) = be_u32(entry, 32) {
                let rate = rate >> 16;
                if rate > 0 {
                    track.set("SamplingRate", rate);
                }
            }
            if code == "mp4a" {
                if let Some(es) = mp4a_esds(entry).and_then(parse_esds) {
                    describe_mp4a(track, es);
                }
            }
        }
        _ => {}
    }
}

/// `esds` payload of an `mp4a` entry, directly or inside a QuickTime `wave`.
fn mp4a_esds(entry: &[u8]) -> Option<&[u8]> {
    let extra = match be_u16(entry, 16)? {
        1 => 16,
        2 => 36,
        _ => 0,
    };
    let children = entry.get(36 + extra..)?;
    find_child(children, b"esds")
        .or_else(|| find_child(children, b"wave").and_then(|wave| find_child(wave, b"esds")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EsDescription {
    object_type: u8,
    audio_object_type: Option<u8>,
}

/// Returns `(tag, body offset, body length)` of the descriptor at `pos`.
fn descriptor(data: &[u8], pos: usize) -> Option<(u8, usize, usize)> {
    let tag = *data.get(pos)?;
    let mut cursor = pos + 1;
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = *data.get(cursor)?;
        cursor += 1;
        len = (len << 7) | usize::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
    }
    Some((tag, cursor, len))
}

fn parse_esds(esds: &[u8]) -> Option<EsDescription> {
    let (tag, mut pos, _) = descriptor(esds, 4)?;
    if tag != 0x03 {
        return None;
    }
    let flags = *esds.get(pos + 2)?;
    pos += 3;
    if flags & 0x80 != 0 {
        pos += 2;
    }
    if flags & 0x40 != 0 {
        pos += 1 + usize::from(*esds.get(pos)?);
    }
    if flags & 0x20 != 0 {
        pos += 2;
    }

    let (tag, config, config_len) = descriptor(esds, pos)?;
    if tag != 0x04 {
        return None;
    }
    let object_type = *esds.get(config)?;
    // object type, stream type, buffer size (3), max and average bitrate (4 + 4)
    let aot = (config_len > 13)
        .then(|| descriptor(esds, config + 13))
        .flatten()
        .filter(|(tag, _, _)| *tag == 0x05)
        .and_then(|(_, start, _)| esds.get(start..))
        .and_then(audio_object_type);
    Some(EsDescription {
        object_type,
        audio_object_type: aot,
    })
}

/// First field of an AudioSpecificConfig, with the 6-bit escape for 31.
fn audio_object_type(asc: &[u8]) -> Option<u8> {
    let first = *asc.first()?;
    match first >> 3 {
        31 => {
            let second = *asc.get(1)?;
            Some(32 + (((first & 0x07) << 3) | (second >> 5)))
        }
        aot => Some(aot),
    }
}

fn aac_profile(audio_object_type: u8) -> Option<&'static str> {
    match audio_object_type {
        1 => Some("Main"),
        2 => Some("LC"),
        3 => Some("SSR"),
        4 => Some("LTP"),
        5 => Some("HE-AAC"),
        23 => Some("LD"),
        29 => Some("HE-AACv2"),
        39 => Some("ELD"),
        _ => None,
    }
}

fn describe_mp4a(track: &mut Track, es: EsDescription) {
    let (format, profile) = match es.object_type {
        0x40 => ("AAC", es.audio_object_type.and_then(aac_profile)),
        0x66 => ("AAC", Some("Main")),
        0x67 => ("AAC", Some("LC")),
        0x68 => ("AAC", Some("SSR")),
        0x69 | 0x6B => ("MPEG Audio", None),
        0xA5 => ("AC-3", None),
        0xA6 => ("E-AC-3", None),
        _ => ("MPEG-4 Audio", None),
    };
    track.set("Format", format);
    if let Some(profile) = profile {
        track.set("Format_Profile", profile);
    }
    let codec_id = match (es.object_type, es.audio_object_type) {
        (0x40, Some(aot)) => format!("mp4a-40-{aot}"),
        (oti, _) => format!("mp4a-{oti:02X}"),
    };
    track.set("CodecID", codec_id);
}

fn sample_count_stts(stts: &[u8]) -> Option<u64> {
    let entries = be_u32(stts, 4)? as usize;
    let mut total = 0u64;
    for i in 0..entries {
        total = total.saturating_add(u64::from(be_u32(stts, 8 + i * 8)?));
    }
    Some(total)
}

fn total_sample_bytes(stsz: &[u8]) -> Option<u64> {
    let uniform = be_u32(stsz, 4)?;
    let count = be_u32(stsz, 8)?;
    if uniform != 0 {
        return Some(u64::from(uniform) * u64::from(count));
    }
    let mut total = 0u64;
    for i in 0..count as usize {
        total = total.saturating_add(u64::from(be_u32(stsz, 12 + i * 4)?));
    }
    Some(total)
}
