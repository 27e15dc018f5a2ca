//! RF Explorer radio module models.
//!
//! Each analyzer has a main radio module and optionally an expansion module.
//! The `#C2-M:` setup message reports both as numeric codes; this table maps
//! them to names and frequency capabilities.

use std::fmt;

/// Numeric code the device reports when no expansion module is fitted.
pub const NO_EXPANSION: u8 = 255;

/// A spectrum analyzer radio module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Model {
    Rfe433M = 0,
    Rfe868M = 1,
    Rfe915M = 2,
    RfeWSub1G = 3,
    Rfe24G = 4,
    RfeWSub3G = 5,
    Rfe6G = 6,
    RfeWSub1GPlus = 10,
    RfeProAudio = 11,
    Rfe24GPlus = 12,
    Rfe4GPlus = 13,
    Rfe6GPlus = 14,
}

const KHZ: u64 = 1_000;
const MHZ: u64 = 1_000_000;

impl Model {
    /// Every known analyzer module, in code order.
    pub const ALL: [Model; 12] = [
        Model::Rfe433M,
        Model::Rfe868M,
        Model::Rfe915M,
        Model::RfeWSub1G,
        Model::Rfe24G,
        Model::RfeWSub3G,
        Model::Rfe6G,
        Model::RfeWSub1GPlus,
        Model::RfeProAudio,
        Model::Rfe24GPlus,
        Model::Rfe4GPlus,
        Model::Rfe6GPlus,
    ];

    /// Look up a model by the code the device reports.
    pub fn from_code(code: u8) -> Option<Model> {
        let model = match code {
            0 => Model::Rfe433M,
            1 => Model::Rfe868M,
            2 => Model::Rfe915M,
            3 => Model::RfeWSub1G,
            4 => Model::Rfe24G,
            5 => Model::RfeWSub3G,
            6 => Model::Rfe6G,
            10 => Model::RfeWSub1GPlus,
            11 => Model::RfeProAudio,
            12 => Model::Rfe24GPlus,
            13 => Model::Rfe4GPlus,
            14 => Model::Rfe6GPlus,
            _ => return None,
        };
        Some(model)
    }

    /// The code the device uses for this model.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Display name, as printed on the device.
    pub fn name(self) -> &'static str {
        match self {
            Model::Rfe433M => "433M",
            Model::Rfe868M => "868M",
            Model::Rfe915M => "915M",
            Model::RfeWSub1G => "WSUB1G",
            Model::Rfe24G => "2.4G",
            Model::RfeWSub3G => "WSUB3G",
            Model::Rfe6G => "6G",
            Model::RfeWSub1GPlus => "WSUB1G+",
            Model::RfeProAudio => "ProAudio",
            Model::Rfe24GPlus => "2.4G+",
            Model::Rfe4GPlus => "4G+",
            Model::Rfe6GPlus => "6G+",
        }
    }

    /// Whether this is a "Plus" model. Only Plus models accept a sweep
    /// point count other than 112.
    pub fn is_plus(self) -> bool {
        matches!(
            self,
            Model::RfeWSub1GPlus
                | Model::RfeProAudio
                | Model::Rfe24GPlus
                | Model::Rfe4GPlus
                | Model::Rfe6GPlus
        )
    }

    /// Lowest frequency the module can sweep, in hertz.
    pub fn min_freq_hz(self) -> u64 {
        match self {
            Model::Rfe433M => 430 * MHZ,
            Model::Rfe868M => 860 * MHZ,
            Model::Rfe915M => 910 * MHZ,
            Model::RfeWSub1G => 240 * MHZ,
            Model::Rfe24G | Model::Rfe24GPlus => 2_350 * MHZ,
            Model::RfeWSub3G => 15 * MHZ,
            Model::Rfe6G => 4_850 * MHZ,
            Model::Rfe4GPlus => 240 * MHZ,
            Model::RfeWSub1GPlus | Model::RfeProAudio | Model::Rfe6GPlus => 50 * KHZ,
        }
    }

    /// Highest frequency the module can sweep, in hertz.
    pub fn max_freq_hz(self) -> u64 {
        match self {
            Model::Rfe433M => 440 * MHZ,
            Model::Rfe868M => 870 * MHZ,
            Model::Rfe915M => 920 * MHZ,
            Model::RfeWSub1G | Model::RfeWSub1GPlus => 960 * MHZ,
            Model::Rfe24G | Model::Rfe24GPlus => 2_550 * MHZ,
            Model::RfeWSub3G => 2_700 * MHZ,
            Model::Rfe6G => 6_100 * MHZ,
            Model::Rfe4GPlus => 4_000 * MHZ,
            Model::RfeProAudio | Model::Rfe6GPlus => 6_000 * MHZ,
        }
    }

    /// Narrowest span the module supports, in hertz.
    pub fn min_span_hz(self) -> u64 {
        match self {
            Model::Rfe24G | Model::Rfe6G => 2 * MHZ,
            _ => 112 * KHZ,
        }
    }

    /// Widest span the module supports, in hertz.
    pub fn max_span_hz(self) -> u64 {
        self.max_freq_hz() - self.min_freq_hz()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
