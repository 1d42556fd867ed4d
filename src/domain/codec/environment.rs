//! Environmental Sensing encoders

/// Encode Temperature (0x2A6E): `i16`, 0.01 degrees Celsius.
pub fn temperature(celsius: f32) -> [u8; 2] {
    let raw = (celsius * 100.0)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    raw.to_le_bytes()
}

/// Encode Humidity (0x2A6F): `u16`, 0.01 percent.
pub fn humidity(percent: f32) -> [u8; 2] {
    let raw = (percent.clamp(0.0, 100.0) * 100.0).round() as u16;
    raw.to_le_bytes()
}

/// Encode Pressure (0x2A6D): `u32`, 0.1 Pa, from hectopascals.
pub fn pressure(hectopascals: f32) -> [u8; 4] {
    let raw = (hectopascals as f64 * 1000.0)
        .round()
        .clamp(0.0, u32::MAX as f64) as u32;
    raw.to_le_bytes()
}

/// Encode Wind Chill (0x2A79): `i8`, whole degrees Celsius.
pub fn wind_chill(celsius: i8) -> [u8; 1] {
    celsius.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_centidegrees() {
        assert_eq!(temperature(23.45), 2345i16.to_le_bytes());
        assert_eq!(temperature(-4.5), (-450i16).to_le_bytes());
    }

    #[test]
    fn test_humidity_centipercent() {
        assert_eq!(humidity(55.25), 5525u16.to_le_bytes());
        assert_eq!(humidity(140.0), 10000u16.to_le_bytes());
    }

    #[test]
    fn test_pressure_decipascals() {
        // 1013.25 hPa = 101325 Pa = 1013250 dPa
        assert_eq!(pressure(1013.25), 1_013_250u32.to_le_bytes());
    }

    #[test]
    fn test_wind_chill_signed() {
        assert_eq!(wind_chill(-12), [0xF4]);
    }
}
