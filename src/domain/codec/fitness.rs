//! Fitness Machine encoders
//!
//! All multi-byte values are little-endian. Speed is km/h * 100, cadence is
//! rpm * 2, inclination is percent * 10.

use super::put_u24_le;

/// Indoor Bike Data flags
pub const INDOOR_BIKE_FLAGS: u16 = 0x0136;
/// Treadmill Data flags
pub const TREADMILL_FLAGS: u16 = 0x010C;
/// Cross Trainer Data flags
pub const CROSS_TRAINER_FLAGS: u16 = 0x0126;

/// Fitness Machine Features: cadence, total distance, inclination,
/// resistance level, heart rate, power measurement
pub const MACHINE_FEATURES: u32 = 0x0000_448E;
/// Target Setting Features: resistance target
pub const TARGET_SETTING_FEATURES: u32 = 0x0000_0004;

/// Training Status: idle
pub const TRAINING_STATUS_IDLE: u8 = 0x01;
/// Training Status: manual mode (quick start)
pub const TRAINING_STATUS_MANUAL_MODE: u8 = 0x0D;

/// Control point response opcode
pub const RESPONSE_CODE: u8 = 0x80;

/// Machine Status opcode: target resistance level changed
pub const STATUS_TARGET_RESISTANCE_CHANGED: u8 = 0x07;

/// Indoor Bike Data (0x2AD2) inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndoorBikeData {
    pub speed_kmh: f32,
    pub cadence_rpm: f32,
    pub power_watts: i16,
    pub heart_rate: u8,
    pub total_distance_m: u32,
}

impl IndoorBikeData {
    /// Encode the 12-byte frame.
    ///
    /// ```text
    /// [0-1]   : Flags (0x0136)
    /// [2-3]   : Instantaneous speed (u16, km/h * 100)
    /// [4-5]   : Instantaneous cadence (u16, rpm * 2)
    /// [6-7]   : Instantaneous power (i16, watts)
    /// [8]     : Heart rate (u8, bpm)
    /// [9-11]  : Total distance (u24, meters)
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        machine_frame(
            INDOOR_BIKE_FLAGS,
            self.speed_kmh,
            scale_unsigned(self.cadence_rpm, 2.0).to_le_bytes(),
            self.power_watts,
            self.heart_rate,
            self.total_distance_m,
        )
    }
}

/// Treadmill Data (0x2ACD) inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreadmillData {
    pub speed_kmh: f32,
    pub incline_percent: f32,
    pub power_watts: i16,
    pub heart_rate: u8,
    pub total_distance_m: u32,
}

impl TreadmillData {
    /// Encode the 12-byte frame; the cadence slot carries inclination
    /// (i16, percent * 10).
    pub fn encode(&self) -> Vec<u8> {
        let incline = (self.incline_percent * 10.0)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        machine_frame(
            TREADMILL_FLAGS,
            self.speed_kmh,
            incline.to_le_bytes(),
            self.power_watts,
            self.heart_rate,
            self.total_distance_m,
        )
    }
}

/// Cross Trainer Data (0x2ACE) inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossTrainerData {
    pub speed_kmh: f32,
    /// Strides per minute
    pub stride_rate: f32,
    pub power_watts: i16,
    pub heart_rate: u8,
    pub total_distance_m: u32,
}

impl CrossTrainerData {
    /// Encode the 12-byte frame; the cadence slot carries the stride rate
    /// (u16, strides/min * 2).
    pub fn encode(&self) -> Vec<u8> {
        machine_frame(
            CROSS_TRAINER_FLAGS,
            self.speed_kmh,
            scale_unsigned(self.stride_rate, 2.0).to_le_bytes(),
            self.power_watts,
            self.heart_rate,
            self.total_distance_m,
        )
    }
}

fn scale_unsigned(value: f32, factor: f32) -> u16 {
    (value * factor).round().clamp(0.0, u16::MAX as f32) as u16
}

fn machine_frame(
    flags: u16,
    speed_kmh: f32,
    second_field: [u8; 2],
    power_watts: i16,
    heart_rate: u8,
    total_distance_m: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&scale_unsigned(speed_kmh, 100.0).to_le_bytes());
    buf.extend_from_slice(&second_field);
    buf.extend_from_slice(&power_watts.to_le_bytes());
    buf.push(heart_rate);
    put_u24_le(&mut buf, total_distance_m);
    buf
}

/// Encode Fitness Machine Feature (0x2ACC): machine features followed by
/// target setting features, both `u32`.
pub fn feature() -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&MACHINE_FEATURES.to_le_bytes());
    buf[4..8].copy_from_slice(&TARGET_SETTING_FEATURES.to_le_bytes());
    buf
}

/// Encode Training Status (0x2AD3) without a status string.
pub fn training_status(status: u8) -> [u8; 2] {
    [0x00, status]
}

/// Encode Supported Resistance Range (0x2AD6): minimum, maximum and step as
/// `i16` at 0.1 resolution. Resistance targets are whole levels 0-255.
pub fn supported_resistance_range() -> [u8; 6] {
    let min: i16 = 0;
    let max: i16 = 2550;
    let step: i16 = 10;
    let mut buf = [0u8; 6];
    buf[0..2].copy_from_slice(&min.to_le_bytes());
    buf[2..4].copy_from_slice(&max.to_le_bytes());
    buf[4..6].copy_from_slice(&step.to_le_bytes());
    buf
}

/// Encode a control point response indication: `[0x80, request_opcode, result]`.
pub fn control_point_response(request_opcode: u8, result: u8) -> [u8; 3] {
    [RESPONSE_CODE, request_opcode, result]
}

/// Encode a Machine Status notification for a new target resistance.
pub fn resistance_changed(level: u8) -> [u8; 2] {
    [STATUS_TARGET_RESISTANCE_CHANGED, level]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indoor_bike_reference_frame() {
        let data = IndoorBikeData {
            speed_kmh: 30.0,
            cadence_rpm: 90.0,
            power_watts: 200,
            heart_rate: 140,
            total_distance_m: 1000,
        };
        let encoded = data.encode();

        assert_eq!(encoded.len(), 12);
        assert_eq!(&encoded[0..2], &[0x36, 0x01]);
        assert_eq!(u16::from_le_bytes([encoded[2], encoded[3]]), 3000);
        assert_eq!(u16::from_le_bytes([encoded[4], encoded[5]]), 180);
        assert_eq!(i16::from_le_bytes([encoded[6], encoded[7]]), 200);
        assert_eq!(encoded[8], 140);
        assert_eq!(&encoded[9..12], &[0xE8, 0x03, 0x00]);
    }

    #[test]
    fn test_indoor_bike_negative_power() {
        let data = IndoorBikeData {
            speed_kmh: 0.0,
            cadence_rpm: 0.0,
            power_watts: -5,
            heart_rate: 0,
            total_distance_m: 0,
        };
        assert_eq!(&data.encode()[6..8], &[0xFB, 0xFF]);
    }

    #[test]
    fn test_treadmill_incline() {
        let data = TreadmillData {
            speed_kmh: 10.5,
            incline_percent: -2.5,
            power_watts: 150,
            heart_rate: 130,
            total_distance_m: 0x01_0000,
        };
        let encoded = data.encode();
        assert_eq!(&encoded[0..2], &TREADMILL_FLAGS.to_le_bytes());
        assert_eq!(u16::from_le_bytes([encoded[2], encoded[3]]), 1050);
        assert_eq!(i16::from_le_bytes([encoded[4], encoded[5]]), -25);
        assert_eq!(&encoded[9..12], &[0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_cross_trainer_stride_rate() {
        let data = CrossTrainerData {
            speed_kmh: 8.0,
            stride_rate: 55.5,
            power_watts: 90,
            heart_rate: 120,
            total_distance_m: 42,
        };
        let encoded = data.encode();
        assert_eq!(&encoded[0..2], &CROSS_TRAINER_FLAGS.to_le_bytes());
        assert_eq!(u16::from_le_bytes([encoded[4], encoded[5]]), 111);
    }

    #[test]
    fn test_feature_and_ranges() {
        assert_eq!(feature(), [0x8E, 0x44, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00]);
        assert_eq!(supported_resistance_range(), [0x00, 0x00, 0xF6, 0x09, 0x0A, 0x00]);
    }

    #[test]
    fn test_control_point_frames() {
        assert_eq!(control_point_response(0x04, 0x01), [0x80, 0x04, 0x01]);
        assert_eq!(resistance_changed(42), [0x07, 42]);
        assert_eq!(training_status(TRAINING_STATUS_IDLE), [0x00, 0x01]);
    }
}
