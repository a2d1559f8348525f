use crate::preamble::Preamble;
use crate::scope::{Ds4000, ScopeError};
use crate::transport::ScpiTransport;
use base64::prelude::*;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;

/// Schema revision written into every serialized document.
pub const DOCUMENT_VERSION: u32 = 1;

/// TMC framing around a `:WAV:DATA?` block: `#9` plus a nine-digit length
/// field in front, one terminator byte behind.
const BLOCK_HEADER_LEN: usize = 11;
const BLOCK_TRAILER_LEN: usize = 1;

/// One captured configuration value, or a nested group of them.
///
/// Settings captures are flat query→reply maps, except that the
/// mode-dispatched subsystems store their sub-mode's replies as a group under
/// the reported mode name (`"EDGE"`, `"SUB"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsEntry {
    Value(String),
    Group(BTreeMap<String, String>),
}

pub type SettingsMap = BTreeMap<String, SettingsEntry>;

#[derive(Debug, thiserror::Error)]
pub enum WaveformError {
    #[error("Unsupported sample format {format} in preamble; only format 0 (byte) is handled")]
    UnsupportedFormat { format: u32 },

    #[error("Data block is {actual} bytes, expected {expected} (header + {n_points} samples + terminator)")]
    BlockLength {
        expected: usize,
        actual: usize,
        n_points: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bad base64 in buf_b64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unrecognized document version {version}, expected {DOCUMENT_VERSION}")]
    UnsupportedVersion { version: u32 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Waveform(#[from] WaveformError),
}

/// One channel's capture: the raw data block, the scaling preamble, and the
/// configuration state gathered alongside it.
///
/// The raw block is authoritative and is kept verbatim for serialization;
/// the sample/time/voltage series and the sample rate are derived from it
/// once at construction and are never stored.
///
/// Trigger settings are read at retrieval time, not at trigger time. If the
/// trigger knobs were touched between the scope capturing and this driver
/// fetching, the newer settings are what get recorded; the firmware offers
/// no way to do better.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub version: u32,
    pub preamble: Preamble,
    /// Verbatim `:WAV:DATA?` reply, framing bytes included.
    pub raw: Vec<u8>,
    pub channel_settings: SettingsMap,
    /// `*IDN?` reply, kept for traceability.
    pub identity: String,
    pub trigger_settings: SettingsMap,
    /// Unscaled 8-bit samples, header and terminator stripped.
    pub samples: Vec<u8>,
    /// Seconds, `x_origin + i * x_step`.
    pub time: Vec<f64>,
    /// Volts, `(sample + (y_origin - y_reference)) * y_step`.
    pub voltage: Vec<f64>,
    /// Samples per second, `1 / x_step`.
    pub sample_rate: f64,
}

impl Waveform {
    /// Assemble a waveform from the pieces of a capture, deriving the
    /// physical-unit series.
    ///
    /// Rejects any sample encoding other than 8-bit unsigned and any block
    /// whose length disagrees with the preamble's point count. A non-normal
    /// acquisition mode is allowed through with a warning; its downstream
    /// semantics are unverified.
    pub fn new(
        preamble: Preamble,
        raw: Vec<u8>,
        channel_settings: SettingsMap,
        identity: String,
        trigger_settings: SettingsMap,
    ) -> Result<Self, WaveformError> {
        if preamble.format != Preamble::FORMAT_BYTE {
            return Err(WaveformError::UnsupportedFormat {
                format: preamble.format,
            });
        }
        if preamble.mode != Preamble::MODE_NORMAL {
            log::warn!("acquisition mode {} is untested; derived series may be off", preamble.mode);
        }

        let framing = BLOCK_HEADER_LEN + BLOCK_TRAILER_LEN;
        if preamble.n_points.checked_add(framing) != Some(raw.len()) {
            return Err(WaveformError::BlockLength {
                expected: preamble.n_points.saturating_add(framing),
                actual: raw.len(),
                n_points: preamble.n_points,
            });
        }

        let samples = raw[BLOCK_HEADER_LEN..raw.len() - BLOCK_TRAILER_LEN].to_vec();

        let dx = preamble.x_step;
        let x0 = preamble.x_origin;
        let dy = preamble.y_step;
        let y0 = preamble.y_origin - preamble.y_reference;

        let sample_rate = 1.0 / dx;
        let time = (0..samples.len()).map(|i| x0 + dx * i as f64).collect();
        let voltage = samples.iter().map(|&s| (f64::from(s) + y0) * dy).collect();

        Ok(Self {
            version: DOCUMENT_VERSION,
            preamble,
            raw,
            channel_settings,
            identity,
            trigger_settings,
            samples,
            time,
            voltage,
            sample_rate,
        })
    }

    /// The derived series as a polars DataFrame with `time` and `voltage`
    /// columns, for offline analysis.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let time: Column = Series::new("time".into(), &self.time).into();
        let voltage: Column = Series::new("voltage".into(), &self.voltage).into();
        DataFrame::new(vec![time, voltage])
    }

    fn to_doc(&self) -> WaveformDoc {
        WaveformDoc {
            version: self.version,
            idn_line: self.identity.clone(),
            channel_settings: self.channel_settings.clone(),
            trigger_settings: self.trigger_settings.clone(),
            preamble: self.preamble.clone(),
            buf_b64: BASE64_STANDARD.encode(&self.raw),
        }
    }

    fn from_doc(doc: WaveformDoc) -> Result<Self, DocumentError> {
        if doc.version != DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                version: doc.version,
            });
        }
        let raw = BASE64_STANDARD.decode(doc.buf_b64)?;
        let waveform = Self::new(
            doc.preamble,
            raw,
            doc.channel_settings,
            doc.idn_line,
            doc.trigger_settings,
        )?;
        Ok(waveform)
    }

    /// Serialize to a JSON document string.
    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(&self.to_doc())?)
    }

    /// Deserialize from a JSON document string, re-deriving the series.
    pub fn from_json_string(s: &str) -> Result<Self, DocumentError> {
        Self::from_doc(serde_json::from_str(s)?)
    }

    /// Serialize to any write handle.
    pub fn to_json_writer(&self, writer: impl io::Write) -> Result<(), DocumentError> {
        Ok(serde_json::to_writer(writer, &self.to_doc())?)
    }

    /// Deserialize from any read handle.
    pub fn from_json_reader(reader: impl io::Read) -> Result<Self, DocumentError> {
        Self::from_doc(serde_json::from_reader(reader)?)
    }
}

/// On-disk shape of a [`Waveform`]. The field names are part of the stable
/// archive format; existing captures must stay readable.
#[derive(Serialize, Deserialize)]
struct WaveformDoc {
    version: u32,
    idn_line: String,
    channel_settings: SettingsMap,
    trigger_settings: SettingsMap,
    preamble: Preamble,
    buf_b64: String,
}

/// A set of channel captures taken under one trigger-settings snapshot,
/// with a session title and advisory human-readable channel labels.
///
/// Labels are advisory only: a channel may be captured without a label, and
/// a label may name a channel that was not captured.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformBundle {
    pub version: u32,
    pub title: String,
    pub channel_names: BTreeMap<String, String>,
    pub waveforms: BTreeMap<String, Waveform>,
}

impl WaveformBundle {
    pub fn new(
        title: String,
        channel_names: BTreeMap<String, String>,
        waveforms: BTreeMap<String, Waveform>,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            title,
            channel_names,
            waveforms,
        }
    }

    /// Capture every channel named in `channel_names` from the instrument,
    /// sharing a single trigger-settings snapshot across the batch.
    ///
    /// All-or-nothing: if any channel's fetch fails, the whole collection
    /// fails and no partial bundle is returned.
    pub fn collect<T: ScpiTransport>(
        title: &str,
        channel_names: &BTreeMap<String, String>,
        scope: &mut Ds4000<T>,
    ) -> Result<Self, ScopeError> {
        let channels: Vec<&str> = channel_names.keys().map(String::as_str).collect();
        let waveforms = scope.fetch_waveforms(&channels)?;
        Ok(Self::new(
            title.to_string(),
            channel_names.clone(),
            waveforms,
        ))
    }

    fn to_doc(&self) -> BundleDoc {
        BundleDoc {
            version: self.version,
            title: self.title.clone(),
            channel_names: self.channel_names.clone(),
            waveforms: self
                .waveforms
                .iter()
                .map(|(name, wf)| (name.clone(), wf.to_doc()))
                .collect(),
        }
    }

    fn from_doc(doc: BundleDoc) -> Result<Self, DocumentError> {
        if doc.version != DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                version: doc.version,
            });
        }
        let mut waveforms = BTreeMap::new();
        for (name, wf_doc) in doc.waveforms {
            waveforms.insert(name, Waveform::from_doc(wf_doc)?);
        }
        Ok(Self {
            version: doc.version,
            title: doc.title,
            channel_names: doc.channel_names,
            waveforms,
        })
    }

    /// Serialize to a JSON document string.
    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(&self.to_doc())?)
    }

    /// Deserialize from a JSON document string, re-deriving every embedded
    /// waveform's series.
    pub fn from_json_string(s: &str) -> Result<Self, DocumentError> {
        Self::from_doc(serde_json::from_str(s)?)
    }

    /// Serialize to any write handle.
    pub fn to_json_writer(&self, writer: impl io::Write) -> Result<(), DocumentError> {
        Ok(serde_json::to_writer(writer, &self.to_doc())?)
    }

    /// Deserialize from any read handle.
    pub fn from_json_reader(reader: impl io::Read) -> Result<Self, DocumentError> {
        Self::from_doc(serde_json::from_reader(reader)?)
    }
}

#[derive(Serialize, Deserialize)]
struct BundleDoc {
    version: u32,
    title: String,
    channel_names: BTreeMap<String, String>,
    waveforms: BTreeMap<String, WaveformDoc>,
}
