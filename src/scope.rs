use crate::preamble::{Preamble, PreambleError};
use crate::transport::{ScpiTransport, TransportError};
use crate::trigger_modes::{MathMode, TriggerMode};
use crate::waveform::{SettingsEntry, SettingsMap, Waveform, WaveformError};
use std::collections::BTreeMap;

/// Per-channel vertical settings captured with every waveform.
pub const CHANNEL_SETTINGS: [&str; 14] = [
    "BVOL", "BWL", "COUP", "DISP", "IMP", "INV", "OFFS", "PEND", "PROB", "SCAL", "TCAL", "TYPE",
    "UNIT", "VERN",
];

/// Trigger-subsystem top-level settings; `MODE` selects the dispatch table.
const TRIGGER_SETTINGS: [&str; 6] = ["COUP", "HOLD", "MODE", "NREJ", "STAT", "SWE"];

/// Computed-channel top-level settings; everything else hangs off the mode.
const MATH_SETTINGS: [&str; 1] = ["MODE"];

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed preamble: {0}")]
    Preamble(#[from] PreambleError),

    #[error(transparent)]
    Waveform(#[from] WaveformError),

    #[error("Instrument reported unknown trigger mode {mode:?}")]
    UnknownTriggerMode { mode: String },

    #[error("Instrument reported unknown math mode {mode:?}")]
    UnknownMathMode { mode: String },

    #[error("FFT settings capture is not implemented")]
    FftSettingsUnsupported,

    #[error("Display capture is not implemented: the :DISP:DATA? path returns broken bitmaps in known firmwares")]
    DisplayCaptureUnsupported,
}

/// Driver for a DS4000E-series oscilloscope behind any [`ScpiTransport`].
///
/// The control link is strictly one-command-at-a-time; the scope hangs under
/// malformed or overlapping input, so every operation here is a plain
/// blocking round trip and there is no cancellation mid-sequence. If a
/// capture sequence is interrupted the channel-selection state on the
/// instrument is ambiguous; re-select the channel before fetching again.
pub struct Ds4000<T: ScpiTransport> {
    transport: T,
}

impl<T: ScpiTransport> Ds4000<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Give the session back, e.g. to adjust its timeout.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// `*IDN?`, the instrument's self-identification line.
    pub fn identity(&mut self) -> Result<String, ScopeError> {
        Ok(self.transport.query_line("*IDN?")?)
    }

    /// Select the waveform source channel for subsequent fetches.
    pub fn select_channel(&mut self, channel: &str) -> Result<(), ScopeError> {
        Ok(self.transport.write(&format!(":WAV:SOUR {}", channel))?)
    }

    /// The currently selected waveform source channel.
    pub fn selected_channel(&mut self) -> Result<String, ScopeError> {
        Ok(self.transport.query_line(":WAV:SOUR?")?)
    }

    /// Set the number of points a waveform fetch returns.
    pub fn set_points(&mut self, n: u32) -> Result<(), ScopeError> {
        Ok(self.transport.write(&format!(":WAV:POIN {}", n))?)
    }

    /// `:WAV:STAR` reading-start handshake; the instrument answers with a
    /// status line.
    pub fn start(&mut self) -> Result<String, ScopeError> {
        Ok(self.transport.query_line(":WAV:STAR")?)
    }

    /// Fetch and parse the scaling preamble for the selected channel.
    pub fn fetch_preamble(&mut self) -> Result<Preamble, ScopeError> {
        let line = self.transport.query_line(":WAV:PRE?")?;
        Ok(line.parse()?)
    }

    /// Run a batch of `:<prefix>:<token>?` queries into a flat map.
    ///
    /// One round trip per token; callers pick the token sets, and any
    /// transport failure propagates unmodified with no retry.
    fn fetch_settings(
        &mut self,
        prefix: &str,
        tokens: &[&str],
    ) -> Result<BTreeMap<String, String>, ScopeError> {
        let mut result = BTreeMap::new();
        for token in tokens {
            let reply = self.transport.query_line(&format!(":{}:{}?", prefix, token))?;
            result.insert((*token).to_string(), reply);
        }
        Ok(result)
    }

    /// Capture a channel's settings.
    ///
    /// Real channels get the fixed vertical-settings set; `MATH` dispatches
    /// through the calc subsystem's mode. `FFT` is refused outright, before
    /// any traffic reaches the instrument.
    pub fn fetch_channel_settings(&mut self, channel: &str) -> Result<SettingsMap, ScopeError> {
        if channel == "MATH" {
            return self.fetch_math_settings();
        }
        if channel == "FFT" {
            return Err(ScopeError::FftSettingsUnsupported);
        }

        let flat = self.fetch_settings(channel, &CHANNEL_SETTINGS)?;
        Ok(flat
            .into_iter()
            .map(|(k, v)| (k, SettingsEntry::Value(v)))
            .collect())
    }

    /// Capture the trigger subsystem's state.
    ///
    /// Two phases: the fixed top-level set first, then the parameter set of
    /// whatever mode the scope reports, merged in as a group under the mode
    /// name. A mode outside the known families is a hard error; a known but
    /// hardware-unverified mode captures with a warning.
    pub fn fetch_trigger_settings(&mut self) -> Result<SettingsMap, ScopeError> {
        let top = self.fetch_settings("TRIG", &TRIGGER_SETTINGS)?;
        let reported = top.get("MODE").map(String::as_str).unwrap_or("");
        let mode = TriggerMode::from_reply(reported).ok_or_else(|| {
            ScopeError::UnknownTriggerMode {
                mode: reported.to_string(),
            }
        })?;
        if !mode.is_verified() {
            log::warn!("capturing state of trigger mode {} is untested", mode.as_str());
        }

        let sub = self.fetch_settings(&format!("TRIG:{}", mode.as_str()), mode.parameters())?;

        let mut merged: SettingsMap = top
            .into_iter()
            .map(|(k, v)| (k, SettingsEntry::Value(v)))
            .collect();
        merged.insert(mode.as_str().to_string(), SettingsEntry::Group(sub));
        Ok(merged)
    }

    /// Capture the computed-channel (`CALC`) subsystem's state, with the same
    /// two-phase mode dispatch as the trigger capture.
    pub fn fetch_math_settings(&mut self) -> Result<SettingsMap, ScopeError> {
        let top = self.fetch_settings("CALC", &MATH_SETTINGS)?;
        let reported = top.get("MODE").map(String::as_str).unwrap_or("");
        let mode = MathMode::from_reply(reported).ok_or_else(|| ScopeError::UnknownMathMode {
            mode: reported.to_string(),
        })?;
        if !mode.is_verified() {
            log::warn!("capturing state of calc mode {} is untested", mode.as_str());
        }

        let sub = self.fetch_settings(&format!("CALC:{}", mode.as_str()), mode.parameters())?;

        let mut merged: SettingsMap = top
            .into_iter()
            .map(|(k, v)| (k, SettingsEntry::Value(v)))
            .collect();
        merged.insert(mode.as_str().to_string(), SettingsEntry::Group(sub));
        Ok(merged)
    }

    /// Fetch one channel's waveform, with optional pre-captured trigger
    /// settings.
    ///
    /// Sequence: select channel, preamble, data block, channel settings,
    /// identity, trigger settings. Passing `trigger_settings` does not set
    /// the trigger; it just skips re-capturing the trigger state for every
    /// channel of a batch, since those fetches add up on this slow link.
    /// Either way the recorded trigger state is retrieval-time state, not
    /// trigger-time state.
    pub fn fetch_waveform(
        &mut self,
        channel: &str,
        trigger_settings: Option<&SettingsMap>,
    ) -> Result<Waveform, ScopeError> {
        self.select_channel(channel)?;
        let preamble = self.fetch_preamble()?;
        let raw = self.transport.query_block(":WAV:DATA?")?;
        let channel_settings = self.fetch_channel_settings(channel)?;
        let identity = self.identity()?;

        let trigger_settings = match trigger_settings {
            Some(shared) => shared.clone(),
            None => self.fetch_trigger_settings()?,
        };

        Ok(Waveform::new(
            preamble,
            raw,
            channel_settings,
            identity,
            trigger_settings,
        )?)
    }

    /// Fetch a waveform for every listed channel, sharing one trigger
    /// snapshot across the batch. Any failure aborts the whole batch.
    pub fn fetch_waveforms(
        &mut self,
        channels: &[&str],
    ) -> Result<BTreeMap<String, Waveform>, ScopeError> {
        let trigger_settings = self.fetch_trigger_settings()?;

        let mut results = BTreeMap::new();
        for channel in channels {
            let waveform = self.fetch_waveform(channel, Some(&trigger_settings))?;
            results.insert((*channel).to_string(), waveform);
        }
        Ok(results)
    }

    /// Screen-bitmap capture. Unimplemented by design: `:DISP:DATA?` returns
    /// a broken three-channel grayscale bitmap on the firmwares this driver
    /// targets, and failing loudly beats returning wrong data.
    pub fn fetch_display(&mut self) -> Result<Vec<u8>, ScopeError> {
        Err(ScopeError::DisplayCaptureUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::WaveformBundle;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io;
    use std::rc::Rc;

    /// Scripted transport: line queries answer from a map, block queries
    /// return a canned framed block, and every command lands in a shared log.
    struct MockTransport {
        replies: HashMap<String, String>,
        block: Vec<u8>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                replies: HashMap::new(),
                block: framed_block(&[]),
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn reply(mut self, command: &str, reply: &str) -> Self {
            self.replies.insert(command.to_string(), reply.to_string());
            self
        }

        fn block(mut self, samples: &[u8]) -> Self {
            self.block = framed_block(samples);
            self
        }

        fn with_settings_replies(mut self, prefix: &str, tokens: &[&str]) -> Self {
            for token in tokens {
                self.replies.insert(
                    format!(":{}:{}?", prefix, token),
                    format!("{}-reply", token),
                );
            }
            self
        }

        fn with_edge_trigger(self) -> Self {
            self.with_settings_replies("TRIG", &TRIGGER_SETTINGS)
                .reply(":TRIG:MODE?", "EDGE")
                .with_settings_replies("TRIG:EDGE", TriggerMode::Edge.parameters())
        }

        fn with_channel(self, channel: &str) -> Self {
            self.with_settings_replies(channel, &CHANNEL_SETTINGS)
        }

        fn log_handle(&self) -> Rc<RefCell<Vec<String>>> {
            Rc::clone(&self.log)
        }
    }

    impl ScpiTransport for MockTransport {
        fn write(&mut self, command: &str) -> Result<(), TransportError> {
            self.log.borrow_mut().push(command.to_string());
            Ok(())
        }

        fn query_line(&mut self, command: &str) -> Result<String, TransportError> {
            self.log.borrow_mut().push(command.to_string());
            self.replies.get(command).cloned().ok_or_else(|| {
                TransportError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no scripted reply for {:?}", command),
                ))
            })
        }

        fn query_block(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
            self.log.borrow_mut().push(command.to_string());
            Ok(self.block.clone())
        }
    }

    fn framed_block(samples: &[u8]) -> Vec<u8> {
        let mut block = format!("#9{:09}", samples.len()).into_bytes();
        block.extend_from_slice(samples);
        block.push(b'\n');
        block
    }

    fn preamble_line(n_points: usize) -> String {
        format!("0,0,{},1,1e-06,-0.0007,0,0.04,5,127", n_points)
    }

    const IDN: &str = "RIGOL TECHNOLOGIES,DS4024,DS4A0000000001,00.02.03";

    fn capture_ready_transport(channels: &[&str], samples: &[u8]) -> MockTransport {
        let mut transport = MockTransport::new()
            .reply("*IDN?", IDN)
            .reply(":WAV:PRE?", &preamble_line(samples.len()))
            .block(samples)
            .with_edge_trigger();
        for channel in channels {
            transport = transport.with_channel(channel);
        }
        transport
    }

    #[test]
    fn test_edge_mode_dispatch_issues_exact_parameter_set() {
        let transport = MockTransport::new().with_edge_trigger();
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        let settings = scope.fetch_trigger_settings().unwrap();

        let phase_two: Vec<String> = log
            .borrow()
            .iter()
            .filter(|c| c.starts_with(":TRIG:EDGE:"))
            .cloned()
            .collect();
        assert_eq!(
            phase_two,
            [":TRIG:EDGE:LEV?", ":TRIG:EDGE:SLOP?", ":TRIG:EDGE:SOUR?"]
        );

        match settings.get("EDGE").unwrap() {
            SettingsEntry::Group(sub) => {
                let keys: Vec<&str> = sub.keys().map(String::as_str).collect();
                assert_eq!(keys, ["LEV", "SLOP", "SOUR"]);
            }
            SettingsEntry::Value(v) => panic!("expected group under EDGE, got value {:?}", v),
        }
        assert_eq!(
            settings.get("MODE"),
            Some(&SettingsEntry::Value("EDGE".to_string()))
        );
    }

    #[test]
    fn test_unknown_trigger_mode_is_a_hard_error() {
        let transport = MockTransport::new()
            .with_settings_replies("TRIG", &TRIGGER_SETTINGS)
            .reply(":TRIG:MODE?", "ZORK");
        let mut scope = Ds4000::new(transport);

        let result = scope.fetch_trigger_settings();
        assert!(matches!(
            result,
            Err(ScopeError::UnknownTriggerMode { mode }) if mode == "ZORK"
        ));
    }

    #[test]
    fn test_untested_trigger_mode_still_captures() {
        let transport = MockTransport::new()
            .with_settings_replies("TRIG", &TRIGGER_SETTINGS)
            .reply(":TRIG:MODE?", "CAN")
            .with_settings_replies("TRIG:CAN", TriggerMode::Can.parameters());
        let mut scope = Ds4000::new(transport);

        let settings = scope.fetch_trigger_settings().unwrap();
        assert!(matches!(settings.get("CAN"), Some(SettingsEntry::Group(_))));
    }

    #[test]
    fn test_math_channel_dispatches_through_calc_mode() {
        let transport = MockTransport::new()
            .reply(":CALC:MODE?", "SUB")
            .with_settings_replies("CALC:SUB", MathMode::Subtract.parameters());
        let mut scope = Ds4000::new(transport);

        let settings = scope.fetch_channel_settings("MATH").unwrap();
        match settings.get("SUB").unwrap() {
            SettingsEntry::Group(sub) => {
                let keys: Vec<&str> = sub.keys().map(String::as_str).collect();
                assert_eq!(keys, ["INV", "SA", "SB", "VOFF", "VSC"]);
            }
            SettingsEntry::Value(v) => panic!("expected group under SUB, got value {:?}", v),
        }
    }

    #[test]
    fn test_unknown_math_mode_is_a_hard_error() {
        let transport = MockTransport::new().reply(":CALC:MODE?", "WAVELET");
        let mut scope = Ds4000::new(transport);

        let result = scope.fetch_math_settings();
        assert!(matches!(
            result,
            Err(ScopeError::UnknownMathMode { mode }) if mode == "WAVELET"
        ));
    }

    #[test]
    fn test_fft_channel_fails_before_any_transport_call() {
        let transport = MockTransport::new();
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        let result = scope.fetch_channel_settings("FFT");
        assert!(matches!(result, Err(ScopeError::FftSettingsUnsupported)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_fetch_waveform_sequencing() {
        let transport = capture_ready_transport(&["CHAN1"], &[120, 130, 140, 150]);
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        let waveform = scope.fetch_waveform("CHAN1", None).unwrap();
        assert_eq!(waveform.samples, [120, 130, 140, 150]);
        assert_eq!(waveform.identity, IDN);

        let log = log.borrow();
        assert_eq!(log[0], ":WAV:SOUR CHAN1");
        assert_eq!(log[1], ":WAV:PRE?");
        assert_eq!(log[2], ":WAV:DATA?");
        assert_eq!(log[3], ":CHAN1:BVOL?");
        // identity after the channel settings batch, trigger capture last
        let idn_pos = log.iter().position(|c| c == "*IDN?").unwrap();
        let trig_pos = log.iter().position(|c| c == ":TRIG:COUP?").unwrap();
        assert!(idn_pos < trig_pos);
    }

    #[test]
    fn test_shared_trigger_snapshot_skips_refetch() {
        let transport = capture_ready_transport(&["CHAN1"], &[1, 2]);
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        let shared = scope.fetch_trigger_settings().unwrap();
        log.borrow_mut().clear();

        let waveform = scope.fetch_waveform("CHAN1", Some(&shared)).unwrap();
        assert_eq!(waveform.trigger_settings, shared);
        assert!(log.borrow().iter().all(|c| !c.starts_with(":TRIG:")));
    }

    #[test]
    fn test_batch_fetch_captures_trigger_once() {
        let transport = capture_ready_transport(&["CHAN1", "CHAN3"], &[9, 8, 7]);
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        let waveforms = scope.fetch_waveforms(&["CHAN1", "CHAN3"]).unwrap();
        assert_eq!(waveforms.len(), 2);

        let trigger_mode_queries = log
            .borrow()
            .iter()
            .filter(|c| *c == ":TRIG:MODE?")
            .count();
        assert_eq!(trigger_mode_queries, 1);
        assert_eq!(
            waveforms["CHAN1"].trigger_settings,
            waveforms["CHAN3"].trigger_settings
        );
    }

    #[test]
    fn test_bundle_collect_covers_named_channels() {
        let transport = capture_ready_transport(&["CHAN1", "CHAN3"], &[4, 5, 6]);
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        let mut names = BTreeMap::new();
        names.insert("CHAN1".to_string(), "input left".to_string());
        names.insert("CHAN3".to_string(), "output left".to_string());

        let bundle = WaveformBundle::collect("fader midpoint", &names, &mut scope).unwrap();
        assert_eq!(bundle.title, "fader midpoint");
        assert_eq!(bundle.waveforms.len(), 2);
        assert_eq!(bundle.channel_names, names);

        let trigger_mode_queries = log
            .borrow()
            .iter()
            .filter(|c| *c == ":TRIG:MODE?")
            .count();
        assert_eq!(trigger_mode_queries, 1);
    }

    #[test]
    fn test_batch_fetch_aborts_whole_batch_on_failure() {
        // CHAN3 has no scripted channel-settings replies, so its fetch fails
        let transport = capture_ready_transport(&["CHAN1"], &[1]);
        let mut scope = Ds4000::new(transport);

        let result = scope.fetch_waveforms(&["CHAN1", "CHAN3"]);
        assert!(matches!(result, Err(ScopeError::Transport(_))));
    }

    #[test]
    fn test_channel_select_and_points_commands() {
        let transport = MockTransport::new().reply(":WAV:SOUR?", "CHAN2");
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        scope.select_channel("CHAN2").unwrap();
        assert_eq!(scope.selected_channel().unwrap(), "CHAN2");
        scope.set_points(1400).unwrap();

        let log = log.borrow();
        assert_eq!(log[0], ":WAV:SOUR CHAN2");
        assert_eq!(log[2], ":WAV:POIN 1400");
    }

    #[test]
    fn test_start_issues_handshake_command() {
        let transport = MockTransport::new().reply(":WAV:STAR", "1");
        let log = transport.log_handle();
        let mut scope = Ds4000::new(transport);

        assert_eq!(scope.start().unwrap(), "1");
        assert_eq!(log.borrow().as_slice(), [":WAV:STAR"]);
    }

    #[test]
    fn test_display_capture_is_refused() {
        let transport = MockTransport::new();
        let mut scope = Ds4000::new(transport);
        assert!(matches!(
            scope.fetch_display(),
            Err(ScopeError::DisplayCaptureUnsupported)
        ));
    }
}
