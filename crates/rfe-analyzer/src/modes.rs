//! Operating modes and settings reported by, or sent to, the analyzer.

/// The device's current operating mode, as reported in `#C2-F:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    #[default]
    SpectrumAnalyzer = 0,
    RfGenerator = 1,
    WifiAnalyzer = 2,
    AnalyzerTracking = 5,
    RfSniffer = 6,
    CwTransmitter = 60,
    SweepFrequency = 61,
    SweepAmplitude = 62,
    GeneratorTracking = 63,
    Unknown = 255,
}

impl From<u8> for Mode {
    fn from(code: u8) -> Self {
        match code {
            0 => Mode::SpectrumAnalyzer,
            1 => Mode::RfGenerator,
            2 => Mode::WifiAnalyzer,
            5 => Mode::AnalyzerTracking,
            6 => Mode::RfSniffer,
            60 => Mode::CwTransmitter,
            61 => Mode::SweepFrequency,
            62 => Mode::SweepAmplitude,
            63 => Mode::GeneratorTracking,
            _ => Mode::Unknown,
        }
    }
}

/// How successive sweeps are combined on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalcMode {
    Normal = 0,
    Max = 1,
    Avg = 2,
    Overwrite = 3,
    MaxHold = 4,
}

impl CalcMode {
    pub fn from_code(code: u8) -> Option<CalcMode> {
        match code {
            0 => Some(CalcMode::Normal),
            1 => Some(CalcMode::Max),
            2 => Some(CalcMode::Avg),
            3 => Some(CalcMode::Overwrite),
            4 => Some(CalcMode::MaxHold),
            _ => None,
        }
    }
}

/// Digital signal processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DspMode {
    Auto = 0,
    Filter = 1,
    Fast = 2,
    NoImg = 3,
}

impl DspMode {
    pub fn from_code(code: u8) -> Option<DspMode> {
        match code {
            0 => Some(DspMode::Auto),
            1 => Some(DspMode::Filter),
            2 => Some(DspMode::Fast),
            3 => Some(DspMode::NoImg),
            _ => None,
        }
    }
}

/// RF input stage. Encoded on the wire as an ASCII digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InputStage {
    Direct = b'0',
    Attenuator30dB = b'1',
    Lna25dB = b'2',
    Attenuator60dB = b'3',
    Lna12dB = b'4',
}

impl InputStage {
    pub fn from_byte(byte: u8) -> Option<InputStage> {
        match byte {
            b'0' => Some(InputStage::Direct),
            b'1' => Some(InputStage::Attenuator30dB),
            b'2' => Some(InputStage::Lna25dB),
            b'3' => Some(InputStage::Attenuator60dB),
            b'4' => Some(InputStage::Lna12dB),
            _ => None,
        }
    }
}

/// One of the analyzer's two radio modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RadioModule {
    Main = 0,
    Expansion = 1,
}

/// Tracking generator status, reported by `#K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Disabled,
    Enabled,
}
