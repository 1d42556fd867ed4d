//! Value Codec
//!
//! Pure encoders from typed measurements to the byte layouts carried by
//! GATT characteristic values. Every encoder is deterministic and
//! allocation is bounded by the layout of the characteristic it serves.
//!
//! ## Modules
//!
//! - [`health`] - battery, heart rate, thermometer, blood pressure, glucose, weight, SpO2
//! - [`time`] - Date Time, Current Time and Device Time structures
//! - [`fitness`] - Fitness Machine telemetry and control point frames
//! - [`environment`] - Environmental Sensing fixed-point values
//! - [`scale`] - proprietary body-composition scale frames

pub mod environment;
pub mod fitness;
pub mod health;
pub mod scale;
pub mod time;

use serde::{Deserialize, Serialize};

/// SFLOAT "not a number"
pub const SFLOAT_NAN: u16 = 0x07FF;
/// SFLOAT positive infinity
pub const SFLOAT_POSITIVE_INFINITY: u16 = 0x07FE;
/// SFLOAT negative infinity
pub const SFLOAT_NEGATIVE_INFINITY: u16 = 0x0802;

// Mantissa values 0x07FE..=0x0802 are reserved for the special values above.
const SFLOAT_MAX_MANTISSA: f64 = 2045.0;
const SFLOAT_MAX_EXPONENT: i8 = 7;
const SFLOAT_MIN_EXPONENT: i8 = -8;

/// How medical quantities (pressures, concentrations, SpO2) are packed into
/// their 16-bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicalFloat {
    /// Integer part as a little-endian `i16` (behavior of the reference device)
    #[default]
    Truncated,
    /// IEEE-11073 16-bit SFLOAT
    Sfloat,
}

impl MedicalFloat {
    /// Encode `value` into a little-endian 16-bit field.
    pub fn encode(self, value: f32) -> [u8; 2] {
        match self {
            Self::Truncated => (value as i16).to_le_bytes(),
            Self::Sfloat => sfloat(value).to_le_bytes(),
        }
    }
}

/// Encode `value` as an IEEE-11073 SFLOAT (4-bit exponent, 12-bit mantissa,
/// both two's complement, base 10).
pub fn sfloat(value: f32) -> u16 {
    if value.is_nan() {
        return SFLOAT_NAN;
    }
    if value.is_infinite() {
        return if value > 0.0 {
            SFLOAT_POSITIVE_INFINITY
        } else {
            SFLOAT_NEGATIVE_INFINITY
        };
    }

    let mut mantissa = value as f64;
    let mut exponent: i8 = 0;

    while mantissa.abs() > SFLOAT_MAX_MANTISSA && exponent < SFLOAT_MAX_EXPONENT {
        mantissa /= 10.0;
        exponent += 1;
    }
    if mantissa.abs() > SFLOAT_MAX_MANTISSA {
        return if value > 0.0 {
            SFLOAT_POSITIVE_INFINITY
        } else {
            SFLOAT_NEGATIVE_INFINITY
        };
    }

    // Spend spare mantissa range on fractional digits
    while exponent > SFLOAT_MIN_EXPONENT {
        if (mantissa - mantissa.round()).abs() < 1e-6 {
            break;
        }
        let scaled = mantissa * 10.0;
        if scaled.abs() > SFLOAT_MAX_MANTISSA {
            break;
        }
        mantissa = scaled;
        exponent -= 1;
    }

    let mantissa = mantissa
        .round()
        .clamp(-SFLOAT_MAX_MANTISSA, SFLOAT_MAX_MANTISSA) as i16;
    (((exponent as u16) & 0x000F) << 12) | ((mantissa as u16) & 0x0FFF)
}

/// Append the low 24 bits of `value`, little-endian.
pub(crate) fn put_u24_le(buf: &mut Vec<u8>, value: u32) {
    let bytes = value.min(0x00FF_FFFF).to_le_bytes();
    buf.extend_from_slice(&bytes[..3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_drops_fraction() {
        assert_eq!(MedicalFloat::Truncated.encode(120.9), [120, 0]);
        assert_eq!(MedicalFloat::Truncated.encode(-3.7), (-3i16).to_le_bytes());
    }

    #[test]
    fn test_sfloat_integers_use_zero_exponent() {
        assert_eq!(sfloat(120.0), 0x0078);
        assert_eq!(sfloat(0.0), 0x0000);
    }

    #[test]
    fn test_sfloat_fractions() {
        // 36.6 -> mantissa 366, exponent -1
        assert_eq!(sfloat(36.6), 0xF16E);
        // -1.5 -> mantissa -15, exponent -1
        assert_eq!(sfloat(-1.5), 0xFFF1);
    }

    #[test]
    fn test_sfloat_large_values_raise_exponent() {
        // 30000 -> mantissa 300, exponent 2
        assert_eq!(sfloat(30000.0), 0x212C);
    }

    #[test]
    fn test_sfloat_special_values() {
        assert_eq!(sfloat(f32::NAN), SFLOAT_NAN);
        assert_eq!(sfloat(f32::INFINITY), SFLOAT_POSITIVE_INFINITY);
        assert_eq!(sfloat(-1.0e12), SFLOAT_NEGATIVE_INFINITY);
    }

    #[test]
    fn test_put_u24_le() {
        let mut buf = Vec::new();
        put_u24_le(&mut buf, 0x0012_3456);
        assert_eq!(buf, [0x56, 0x34, 0x12]);

        buf.clear();
        put_u24_le(&mut buf, u32::MAX);
        assert_eq!(buf, [0xFF, 0xFF, 0xFF]);
    }
}
