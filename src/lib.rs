//! # DS4000 RS
//!
//! A Rust client driver for Rigol DS4000E series oscilloscopes over a
//! line-oriented SCPI control link.
//!
//! The driver captures the instrument's configuration state (per-channel
//! vertical settings, the mode-dispatched trigger and computed-channel
//! subsystems), retrieves waveforms as length-prefixed binary blocks decoded
//! into physical units, and serializes everything losslessly to versioned
//! JSON documents for offline analysis.
//!
//! ## Features
//!
//! - **Transport seam**: every driver operation runs against the
//!   [`ScpiTransport`] trait; `TcpTransport` (raw SCPI socket) and
//!   `SerialTransport` (legacy USB serial) ship in the crate
//! - **Mode-dispatch settings capture**: trigger and `CALC` state captured
//!   via two-phase fetch-then-dispatch against closed sub-mode tables
//! - **Physical-unit decode**: time/voltage series and sample rate derived
//!   from the 10-field scaling preamble
//! - **Lossless archival**: JSON documents with the raw block base64-encoded
//!   verbatim; derived series are recomputed on load, never stored
//! - **DataFrame output**: Uses `polars` for downstream analysis
//!
//! ## Examples
//!
//! ### Capture a bundle over the network
//!
//! ```rust,no_run
//! use ds4000_rs::{Ds4000, TcpTransport, WaveformBundle};
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! let transport = TcpTransport::connect(
//!     ("192.168.0.220", TcpTransport::DEFAULT_PORT),
//!     Duration::from_secs(5),
//! )?;
//! let mut scope = Ds4000::new(transport);
//!
//! let mut channel_names = BTreeMap::new();
//! channel_names.insert("CHAN1".to_string(), "input left".to_string());
//! channel_names.insert("CHAN3".to_string(), "output left".to_string());
//!
//! let bundle = WaveformBundle::collect("Fader at midpoint", &channel_names, &mut scope)?;
//! let mut file = std::fs::File::create("midpoint.json")?;
//! bundle.to_json_writer(&mut file)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Reload a capture offline
//!
//! ```rust,no_run
//! use ds4000_rs::WaveformBundle;
//!
//! let file = std::fs::File::open("midpoint.json")?;
//! let bundle = WaveformBundle::from_json_reader(file)?;
//! let waveform = &bundle.waveforms["CHAN1"];
//! println!("Fs = {} Sa/s, first sample {} V", waveform.sample_rate, waveform.voltage[0]);
//! println!("{}", waveform.to_dataframe()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Single-channel fetch
//!
//! ```rust,no_run
//! use ds4000_rs::{Ds4000, TcpTransport};
//! use std::time::Duration;
//!
//! let transport = TcpTransport::connect(("192.168.0.220", 5555), Duration::from_secs(5))?;
//! let mut scope = Ds4000::new(transport);
//! let waveform = scope.fetch_waveform("CHAN1", None)?;
//! println!("Captured {} samples", waveform.samples.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod preamble;
pub mod scope;
pub mod transport;
pub mod trigger_modes;
pub mod waveform;

// Re-export the main types for convenience
pub use preamble::{Preamble, PreambleError};

pub use scope::{Ds4000, ScopeError, CHANNEL_SETTINGS};

pub use transport::{ScpiTransport, SerialTransport, TcpTransport, TransportError};

pub use trigger_modes::{MathMode, TriggerMode};

pub use waveform::{
    DocumentError, SettingsEntry, SettingsMap, Waveform, WaveformBundle, WaveformError,
    DOCUMENT_VERSION,
};
