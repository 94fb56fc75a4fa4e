//! Shared test infrastructure: synthetic sources that never hold the whole
//! file, a recording engine, and container fixture builders.

#![allow(dead_code)]

use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mediascope::analysis::{Analyzer, AnalyzerSettings};
use mediascope::engine::{EngineError, Media, MediaReport, MetadataEngine, Track, TrackKind};
use mediascope::progress::{ProgressReporter, ProgressUpdate};
use mediascope::reader::ByteReader;
use mediascope::source::{ByteSource, SourceError};

// ============================================================================
// Sources
// ============================================================================

pub fn pattern_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Deterministic content of any length, generated on demand.
pub struct PatternSource {
    pub len: u64,
}

impl ByteSource for PatternSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        let n = (buf.len() as u64).min(self.len.saturating_sub(offset)) as usize;
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte = pattern_byte(offset + i as u64);
        }
        Ok(n)
    }
}

/// All zeros; cheap enough for multi-gigabyte sequential reads.
pub struct ZeroSource {
    pub len: u64,
}

impl ByteSource for ZeroSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        let n = (buf.len() as u64).min(self.len.saturating_sub(offset)) as usize;
        buf[..n].fill(0);
        Ok(n)
    }
}

/// In-memory fixture bytes.
pub struct VecSource(pub Vec<u8>);

impl ByteSource for VecSource {
    fn len(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        let start = (offset as usize).min(self.0.len());
        let n = buf.len().min(self.0.len() - start);
        buf[..n].copy_from_slice(&self.0[start..start + n]);
        Ok(n)
    }
}

/// Log of storage reads, shared with the test after the source is moved.
#[derive(Clone, Default)]
pub struct ReadLog(pub Arc<Mutex<Vec<(u64, usize)>>>);

impl ReadLog {
    pub fn entries(&self) -> Vec<(u64, usize)> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries().iter().map(|(_, len)| *len as u64).sum()
    }
}

/// Records every storage read, optionally failing the Nth one (1-based).
pub struct RecordingSource<S: ByteSource> {
    pub inner: S,
    pub log: ReadLog,
    pub fail_on: Option<(u64, ErrorKind)>,
    calls: AtomicU64,
}

impl<S: ByteSource> RecordingSource<S> {
    pub fn new(inner: S, log: ReadLog) -> Self {
        Self {
            inner,
            log,
            fail_on: None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn failing_on(mut self, call: u64, kind: ErrorKind) -> Self {
        self.fail_on = Some((call, kind));
        self
    }
}

impl<S: ByteSource> ByteSource for RecordingSource<S> {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.0.lock().unwrap().push((offset, buf.len()));
        if let Some((fail_call, kind)) = self.fail_on {
            if call == fail_call {
                return Err(SourceError::Io(std::io::Error::from(kind)));
            }
        }
        self.inner.read_at(offset, buf)
    }
}

// ============================================================================
// Progress and engines
// ============================================================================

#[derive(Default)]
pub struct RecordingReporter(pub Mutex<Vec<ProgressUpdate>>);

impl RecordingReporter {
    pub fn percents(&self) -> Vec<f64> {
        self.0.lock().unwrap().iter().map(|u| u.percent).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|u| u.message.clone()).collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.0.lock().unwrap().push(update.clone());
    }
}

/// `(offset, requested, returned)` for every engine-level read.
pub type EngineLog = Arc<Mutex<Vec<(u64, u64, u64)>>>;

/// Reads the whole input front to back in `chunk_size()` requests.
pub struct SequentialEngine {
    pub log: EngineLog,
}

impl MetadataEngine for SequentialEngine {
    fn name(&self) -> &str {
        "sequential"
    }

    fn analyze(&self, input: &dyn ByteReader) -> Result<MediaReport, EngineError> {
        let total = input.size();
        let step = input.chunk_size();
        let mut offset = 0u64;
        while offset < total {
            self.log.lock().unwrap().push((offset, step, 0));
            let data = input.read_at(offset, step)?;
            if let Some(last) = self.log.lock().unwrap().last_mut() {
                last.2 = data.len() as u64;
            }
            if data.is_empty() {
                break;
            }
            offset += data.len() as u64;
        }
        let mut general = Track::new(TrackKind::General);
        general.set("FileSize", total).set("Format", "Scanned");
        Ok(MediaReport {
            media: Media {
                track: vec![general],
            },
        })
    }
}

/// Reads the tail of the file before the head, like engines that look for
/// an index at the end.
pub struct TailFirstEngine;

impl MetadataEngine for TailFirstEngine {
    fn name(&self) -> &str {
        "tail-first"
    }

    fn analyze(&self, input: &dyn ByteReader) -> Result<MediaReport, EngineError> {
        let total = input.size();
        input.read_at(total.saturating_sub(64), 64)?;
        input.read_at(total / 2, 64)?;
        input.read_at(0, 64)?;
        Ok(MediaReport::default())
    }
}

pub fn quick_settings() -> AnalyzerSettings {
    AnalyzerSettings {
        completion_delay: Duration::ZERO,
        ..AnalyzerSettings::default()
    }
}

pub fn analyzer_with(
    engine: Box<dyn MetadataEngine>,
    settings: AnalyzerSettings,
    reporter: Arc<dyn ProgressReporter>,
) -> Analyzer {
    Analyzer::init(move || Ok(engine), settings, reporter).with_memory_probe(|| None)
}

pub fn assert_monotonic_in_range(percents: &[f64]) {
    for pair in percents.windows(2) {
        assert!(pair[1] >= pair[0], "progress went backwards: {percents:?}");
    }
    for p in percents {
        assert!((0.0..=100.0).contains(p), "progress out of range: {p}");
    }
}

// ============================================================================
// Fixture builders
// ============================================================================

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn full_box(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
    let mut payload = vec![version, 0, 0, 0];
    payload.extend_from_slice(body);
    mp4_box(kind, &payload)
}

fn be32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&be32(2_082_844_800 + 1_600_000_000)); // creation
    body.extend_from_slice(&be32(0)); // modification
    body.extend_from_slice(&be32(timescale));
    body.extend_from_slice(&be32(duration));
    body.extend_from_slice(&[0u8; 80]);
    full_box(b"mvhd", 0, &body)
}

fn tkhd(track_id: u32, width: u32, height: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&be32(0)); // creation
    body.extend_from_slice(&be32(0)); // modification
    body.extend_from_slice(&be32(track_id));
    body.extend_from_slice(&be32(0)); // reserved
    body.extend_from_slice(&be32(0)); // duration
    body.extend_from_slice(&[0u8; 8]); // reserved
    body.extend_from_slice(&[0u8; 8]); // layer, alternate group, volume, reserved
    body.extend_from_slice(&[0u8; 36]); // matrix
    body.extend_from_slice(&be32(width << 16));
    body.extend_from_slice(&be32(height << 16));
    full_box(b"tkhd", 0, &body)
}

fn mdhd(timescale: u32, duration: u32, language: &[u8; 3]) -> Vec<u8> {
    let packed = language
        .iter()
        .fold(0u16, |acc, c| (acc << 5) | u16::from(c - 0x60));
    let mut body = Vec::new();
    body.extend_from_slice(&be32(0));
    body.extend_from_slice(&be32(0));
    body.extend_from_slice(&be32(timescale));
    body.extend_from_slice(&be32(duration));
    body.extend_from_slice(&packed.to_be_bytes());
    body.extend_from_slice(&[0, 0]);
    full_box(b"mdhd", 0, &body)
}

fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(handler);
    body.extend_from_slice(&[0u8; 12]);
    body.push(0);
    full_box(b"hdlr", 0, &body)
}

fn avc1_entry(width: u16, height: u16, profile: u8, level: u8) -> Vec<u8> {
    let mut body = vec![0u8; 6];
    body.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    body.extend_from_slice(&[0u8; 16]); // pre_defined, reserved
    body.extend_from_slice(&width.to_be_bytes());
    body.extend_from_slice(&height.to_be_bytes());
    body.extend_from_slice(&be32(0x0048_0000));
    body.extend_from_slice(&be32(0x0048_0000));
    body.extend_from_slice(&be32(0));
    body.extend_from_slice(&1u16.to_be_bytes()); // frame count
    body.extend_from_slice(&[0u8; 32]); // compressor name
    body.extend_from_slice(&0x0018u16.to_be_bytes()); // depth
    body.extend_from_slice(&0xFFFFu16.to_be_bytes());
    body.extend(mp4_box(b"avcC", &[1, profile, 0, level, 0xFF, 0xE0]));
    mp4_box(b"avc1", &body)
}

/// MPEG-4 audio, AudioSpecificConfig for AAC LC at 48 kHz stereo.
fn esds_aac_lc() -> Vec<u8> {
    let mut config = vec![0x40, 0x15, 0, 0, 0];
    config.extend_from_slice(&[0u8; 8]);
    config.extend_from_slice(&[0x05, 2, 0x11, 0x90]);
    let mut es = vec![0, 1, 0, 0x04, config.len() as u8];
    es.extend(config);
    let mut payload = vec![0x03, es.len() as u8];
    payload.extend(es);
    full_box(b"esds", 0, &payload)
}

fn mp4a_entry(channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut body = vec![0u8; 6];
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 8]);
    body.extend_from_slice(&channels.to_be_bytes());
    body.extend_from_slice(&16u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 4]);
    body.extend_from_slice(&be32(sample_rate << 16));
    body.extend(esds_aac_lc());
    mp4_box(b"mp4a", &body)
}

fn stbl(entry: Vec<u8>, samples: u32, sample_size: u32) -> Vec<u8> {
    let mut stsd = be32(1).to_vec();
    stsd.extend(entry);
    let mut stts = be32(1).to_vec();
    stts.extend_from_slice(&be32(samples));
    stts.extend_from_slice(&be32(1));
    let mut stsz = be32(sample_size).to_vec();
    stsz.extend_from_slice(&be32(samples));

    let mut payload = full_box(b"stsd", 0, &stsd);
    payload.extend(full_box(b"stts", 0, &stts));
    payload.extend(full_box(b"stsz", 0, &stsz));
    mp4_box(b"stbl", &payload)
}

fn trak(tkhd_box: Vec<u8>, mdhd_box: Vec<u8>, handler: &[u8; 4], stbl_box: Vec<u8>) -> Vec<u8> {
    let minf = mp4_box(b"minf", &stbl_box);
    let mut mdia = mdhd_box;
    mdia.extend(hdlr(handler));
    mdia.extend(minf);
    let mut payload = tkhd_box;
    payload.extend(mp4_box(b"mdia", &mdia));
    mp4_box(b"trak", &payload)
}

/// A 10-second MP4: 1280x720 AVC High@L4 at 25 fps, stereo 48 kHz AAC, and
/// an `mdat` of `mdat_len` bytes placed after `moov`.
pub fn build_mp4(mdat_len: usize) -> Vec<u8> {
    let mut ftyp = b"isom".to_vec();
    ftyp.extend_from_slice(&be32(512));
    ftyp.extend_from_slice(b"isomavc1mp41");

    let video = trak(
        tkhd(1, 1280, 720),
        mdhd(25, 250, b"und"),
        b"vide",
        stbl(avc1_entry(1280, 720, 100, 40), 250, 1000),
    );
    let audio = trak(
        tkhd(2, 0, 0),
        mdhd(48_000, 480_000, b"eng"),
        b"soun",
        stbl(mp4a_entry(2, 48_000), 469, 200),
    );

    let mut moov = mvhd(1000, 10_000);
    moov.extend(video);
    moov.extend(audio);

    let mut out = mp4_box(b"ftyp", &ftyp);
    out.extend(mp4_box(b"moov", &moov));
    out.extend(mp4_box(b"mdat", &vec![0xEE; mdat_len]));
    out
}

fn riff_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn riff_file(form: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(form);
    out.extend_from_slice(body);
    out
}

fn wave_format(
    tag: u16,
    channels: u16,
    rate: u32,
    byte_rate: u32,
    align: u16,
    bits: u16,
) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&tag.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&rate.to_le_bytes());
    fmt.extend_from_slice(&byte_rate.to_le_bytes());
    fmt.extend_from_slice(&align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());
    fmt
}

/// Two seconds of 16-bit stereo 44.1 kHz PCM, with an odd-sized chunk
/// before `data` to exercise padding.
pub fn build_wav() -> Vec<u8> {
    let mut body = riff_chunk(b"fmt ", &wave_format(1, 2, 44_100, 176_400, 4, 16));
    body.extend(riff_chunk(b"LIST", b"abc"));
    body.extend(riff_chunk(b"data", &vec![0u8; 176_400 * 2]));
    riff_file(b"WAVE", &body)
}

fn le32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// 100 frames of 640x480 XVID at 25 fps plus an MP3 audio stream.
pub fn build_avi() -> Vec<u8> {
    let mut avih = Vec::new();
    avih.extend_from_slice(&le32(40_000)); // usec per frame
    avih.extend_from_slice(&le32(0)); // max bytes per sec
    avih.extend_from_slice(&le32(0)); // padding
    avih.extend_from_slice(&le32(0)); // flags
    avih.extend_from_slice(&le32(100)); // total frames
    avih.extend_from_slice(&le32(0)); // initial frames
    avih.extend_from_slice(&le32(2)); // streams
    avih.extend_from_slice(&le32(0)); // suggested buffer
    avih.extend_from_slice(&le32(640));
    avih.extend_from_slice(&le32(480));
    avih.extend_from_slice(&[0u8; 16]);

    let mut vstrh = b"vidsXVID".to_vec();
    vstrh.extend_from_slice(&[0u8; 12]); // flags, priority, language, initial frames
    vstrh.extend_from_slice(&le32(1)); // scale
    vstrh.extend_from_slice(&le32(25)); // rate
    vstrh.extend_from_slice(&le32(0)); // start
    vstrh.extend_from_slice(&le32(100)); // length
    vstrh.extend_from_slice(&[0u8; 20]);

    let mut vstrf = Vec::new();
    vstrf.extend_from_slice(&le32(40));
    vstrf.extend_from_slice(&le32(640));
    vstrf.extend_from_slice(&le32(480));
    vstrf.extend_from_slice(&1u16.to_le_bytes());
    vstrf.extend_from_slice(&24u16.to_le_bytes());
    vstrf.extend_from_slice(b"XVID");
    vstrf.extend_from_slice(&[0u8; 20]);

    let mut astrh = b"auds\0\0\0\0".to_vec();
    astrh.extend_from_slice(&[0u8; 48]);
    let astrf = wave_format(0x55, 2, 44_100, 16_000, 1, 0);

    let mut vstrl = b"strl".to_vec();
    vstrl.extend(riff_chunk(b"strh", &vstrh));
    vstrl.extend(riff_chunk(b"strf", &vstrf));
    let mut astrl = b"strl".to_vec();
    astrl.extend(riff_chunk(b"strh", &astrh));
    astrl.extend(riff_chunk(b"strf", &astrf));

    let mut hdrl = b"hdrl".to_vec();
    hdrl.extend(riff_chunk(b"avih", &avih));
    hdrl.extend(riff_chunk(b"LIST", &vstrl));
    hdrl.extend(riff_chunk(b"LIST", &astrl));

    let mut movi = b"movi".to_vec();
    movi.extend(riff_chunk(b"00dc", &[0u8; 32]));

    let mut body = riff_chunk(b"LIST", &hdrl);
    body.extend(riff_chunk(b"LIST", &movi));
    riff_file(b"AVI ", &body)
}
