//! Raw ADC code to NTC temperature conversion
//!
//! The thermistor sits in a divider with a fixed resistor `R1`:
//!
//! ```text
//! Vref ---+
//!         |
//!        [Rntc]
//!         |
//!         +------> ADC
//!         |
//!        [R1]
//!         |
//! GND ----+
//! ```
//!
//! `Rntc = R1 * (raw_max / raw - 1)` and the Steinhart-Hart form
//! `1/T = A + B ln(Rntc) + D ln(Rntc)^3` gives the temperature in Kelvin.
//! All arithmetic is single precision (`libm::logf` / `libm::powf`) so every
//! target produces bit-identical results.

use core::fmt;

use libm::{logf, powf};

/// Offset subtracted from the Kelvin result (as in the deployed logger)
pub const KELVIN_OFFSET: f32 = 272.15;

/// Calibration constants of the NTC divider
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NtcCalibration {
    /// Fixed divider resistor, in Ohm
    pub r1: f32,
    /// Steinhart-Hart `A`
    pub a: f32,
    /// Steinhart-Hart `B`
    pub b: f32,
    /// Steinhart-Hart `D` (cubic term)
    pub d: f32,
}

impl Default for NtcCalibration {
    fn default() -> Self {
        Self {
            r1: 1000.0,
            a: 10.597_192_9e-3,
            b: -23.655_845_44e-4,
            d: 266.037_843_6e-7,
        }
    }
}

/// Physical value derived from a sample
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Measurement {
    /// Temperature in degrees Celsius
    Celsius(f32),
    /// Saturated or zero reading, or an unusable calibration
    Invalid,
}

impl Measurement {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Celsius(_))
    }

    pub fn celsius(&self) -> Option<f32> {
        match self {
            Self::Celsius(value) => Some(*value),
            Self::Invalid => None,
        }
    }

    /// Value as a float, NaN when invalid
    pub fn as_f32(&self) -> f32 {
        self.celsius().unwrap_or(f32::NAN)
    }
}

/// Two decimals, or `nan` for an invalid measurement
impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Celsius(value) => write!(f, "{:.2}", value),
            Self::Invalid => f.write_str("nan"),
        }
    }
}

/// Convert a raw ADC code into a temperature
///
/// Returns [`Measurement::Invalid`] when `raw >= raw_max`, `raw == 0` or
/// `R1 == 0`. Pure and lock-free; callable from any task.
pub fn raw_to_celsius(raw: u16, raw_max: u16, calibration: &NtcCalibration) -> Measurement {
    if raw >= raw_max || raw == 0 || calibration.r1 == 0.0 {
        return Measurement::Invalid;
    }

    let r_ntc = calibration.r1 * (raw_max as f32 / raw as f32 - 1.0);
    let ln_r = logf(r_ntc);
    let inverse_kelvin = calibration.a + calibration.b * ln_r + calibration.d * powf(ln_r, 3.0);

    Measurement::Celsius(1.0 / inverse_kelvin - KELVIN_OFFSET)
}
