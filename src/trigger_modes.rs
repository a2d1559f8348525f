//! Closed vocabularies for the scope's mode-dispatched subsystems.
//!
//! Both the trigger subsystem and the computed-channel (`CALC`) subsystem
//! report an operating sub-mode, and the set of queryable parameters depends
//! on it. The families and their parameter sets below were extracted from
//! the DS4000E programming guide; a reported mode outside these tables is a
//! hard error for the caller, never a silent skip.

/// Trigger sub-mode families as reported by `:TRIG:MODE?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Can,
    Edge,
    Iic,
    Pattern,
    Pulse,
    Runt,
    NthEdge,
    Rs232,
    Slope,
    Spi,
    Usb,
    Video,
    FlexRay,
}

impl TriggerMode {
    pub const ALL: [Self; 13] = [
        Self::Can,
        Self::Edge,
        Self::Iic,
        Self::Pattern,
        Self::Pulse,
        Self::Runt,
        Self::NthEdge,
        Self::Rs232,
        Self::Slope,
        Self::Spi,
        Self::Usb,
        Self::Video,
        Self::FlexRay,
    ];

    /// The mode token as the instrument reports and accepts it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Can => "CAN",
            Self::Edge => "EDGE",
            Self::Iic => "IIC",
            Self::Pattern => "PATT",
            Self::Pulse => "PULS",
            Self::Runt => "RUNT",
            Self::NthEdge => "NEDG",
            Self::Rs232 => "RS232",
            Self::Slope => "SLOP",
            Self::Spi => "SPI",
            Self::Usb => "USB",
            Self::Video => "VID",
            Self::FlexRay => "FLEX",
        }
    }

    /// Parse a `:TRIG:MODE?` reply. `None` for anything outside the table.
    pub fn from_reply(reply: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == reply.trim())
    }

    /// Parameter tokens queryable under `:TRIG:<mode>:`.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            Self::Can => &["BAUD", "BUS", "FTYP", "LEV", "SOUR", "SPO", "STYP", "WHEN"],
            Self::Edge => &["LEV", "SLOP", "SOUR"],
            Self::Iic => &["ADDR", "AWID", "CLEV", "DATA", "DIR", "DLEV", "SCL", "SDA", "WHEN"],
            Self::Pattern => &["LEV", "PATT", "SOUR"],
            Self::Pulse => &["LEV", "LWID", "SOUR", "UWID", "WHEN"],
            Self::Runt => &["ALEV", "BLEV", "POL", "SOUR", "WHEN", "WLOW", "WUPP"],
            Self::NthEdge => &["EDGE", "IDLE", "LEV", "SLOP", "SOUR"],
            Self::Rs232 => &["BAUD", "BUS", "DATA", "LEV", "PAR", "SOUR", "STOP", "WHEN", "WIDT"],
            Self::Slope => &["ALEV", "BLEV", "SOUR", "TLOW", "TUPP", "WHEN", "WIND"],
            Self::Spi => &[
                "CLEV", "CS", "DATA", "DLEV", "MODE", "SCL", "SDA", "SLEV", "SLOP", "TIM", "WHEN",
                "WIDT",
            ],
            Self::Usb => &["DMIN", "DPL", "MLEV", "PLEV", "SPE", "WHEN"],
            Self::Video => &["LEV", "LINE", "MODE", "POL", "SOUR", "STAN"],
            Self::FlexRay => &["BAUD", "LEV", "SOUR", "WHEN"],
        }
    }

    /// Whether capture of this mode's state has been exercised against real
    /// hardware. Unverified modes still capture, with a warning.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Edge)
    }
}

/// Computed-channel sub-mode families as reported by `:CALC:MODE?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathMode {
    Advanced,
    Add,
    Divide,
    Fft,
    Logic,
    Multiply,
    Subtract,
}

impl MathMode {
    pub const ALL: [Self; 7] = [
        Self::Advanced,
        Self::Add,
        Self::Divide,
        Self::Fft,
        Self::Logic,
        Self::Multiply,
        Self::Subtract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advanced => "ADV",
            Self::Add => "ADD",
            Self::Divide => "DIV",
            Self::Fft => "FFT",
            Self::Logic => "LOG",
            Self::Multiply => "MULT",
            Self::Subtract => "SUB",
        }
    }

    /// Parse a `:CALC:MODE?` reply. `None` for anything outside the table.
    pub fn from_reply(reply: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == reply.trim())
    }

    /// Parameter tokens queryable under `:CALC:<mode>:`.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            Self::Advanced => &["EXPR", "INV", "VAR1", "VAR2", "VOFF", "VSC"],
            Self::Add | Self::Divide | Self::Multiply | Self::Subtract => {
                &["INV", "SA", "SB", "VOFF", "VSC"]
            }
            Self::Fft => &["HCEN", "HOFF", "HSC", "HSP", "SOUR", "SPL", "VOFF", "VSC", "VSM", "WIND"],
            Self::Logic => &["ATHR", "BTHR", "INV", "OPER", "SA", "SB", "VOFF", "VSC"],
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Subtract)
    }
}
