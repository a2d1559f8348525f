use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum PreambleError {
    #[error("Preamble has {got} fields, expected 10")]
    FieldCount { got: usize },

    #[error("Preamble field '{name}' is not numeric: {value:?}")]
    BadField { name: &'static str, value: String },
}

/// Decoded `:WAV:PRE?` reply: the scaling and shape descriptor the scope
/// reports for the currently selected waveform source.
///
/// Field order and semantics follow the DS4000E programming guide for the
/// 00.02.03 firmwares. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preamble {
    /// Sample encoding. Only [`Self::FORMAT_BYTE`] is handled.
    pub format: u32,
    /// Acquisition mode. Anything but [`Self::MODE_NORMAL`] is unverified.
    pub mode: u32,
    pub n_points: usize,
    pub n_avgs: u32,
    pub x_step: f64,
    pub x_origin: f64,
    /// Literally always zero, per the guide.
    pub x_reference: f64,
    pub y_step: f64,
    pub y_origin: f64,
    /// Literally always 127, per the guide.
    pub y_reference: f64,
}

impl Preamble {
    /// 8-bit unsigned samples, the only encoding this driver decodes.
    pub const FORMAT_BYTE: u32 = 0;
    /// Normal acquisition; averaged/peak capture semantics are unverified.
    pub const MODE_NORMAL: u32 = 0;
}

/// Parse one field, integer or float depending on the target type. The four
/// count-like fields must parse as integers; a negative, fractional, or
/// out-of-range value there is malformed, not something to round.
fn parse_field<T: FromStr>(name: &'static str, value: &str) -> Result<T, PreambleError> {
    value.trim().parse().map_err(|_| PreambleError::BadField {
        name,
        value: value.to_string(),
    })
}

impl FromStr for Preamble {
    type Err = PreambleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let raw: Vec<&str> = line.trim().split(',').collect();
        if raw.len() != 10 {
            return Err(PreambleError::FieldCount { got: raw.len() });
        }

        Ok(Self {
            format: parse_field("format", raw[0])?,
            mode: parse_field("mode", raw[1])?,
            n_points: parse_field("n_points", raw[2])?,
            n_avgs: parse_field("n_avgs", raw[3])?,
            x_step: parse_field("x_step", raw[4])?,
            x_origin: parse_field("x_origin", raw[5])?,
            x_reference: parse_field("x_reference", raw[6])?,
            y_step: parse_field("y_step", raw[7])?,
            y_origin: parse_field("y_origin", raw[8])?,
            y_reference: parse_field("y_reference", raw[9])?,
        })
    }
}
