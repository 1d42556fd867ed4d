//! Health device encoders
//!
//! Battery Level, Heart Rate Measurement, Temperature Measurement, Blood
//! Pressure Measurement, Glucose Measurement, Weight Measurement and PLX
//! Continuous Measurement.

use super::time::{self, DateTime};
use super::MedicalFloat;

bitflags::bitflags! {
    /// Heart Rate Measurement flags byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeartRateFlags: u8 {
        /// Heart rate value is a `u16` instead of a `u8`
        const UINT16 = 0b0000_0001;
        /// Energy Expended field present
        const ENERGY_EXPENDED = 0b0000_1000;
    }
}

bitflags::bitflags! {
    /// Blood Pressure Measurement flags byte (units bit clear: mmHg)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BloodPressureFlags: u8 {
        const PULSE_RATE = 0b0000_0100;
    }
}

bitflags::bitflags! {
    /// Glucose Measurement flags byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlucoseFlags: u8 {
        const TIME_OFFSET = 0b0000_0001;
        /// Type / Sample Location byte present
        const TYPE_LOCATION = 0b0000_0010;
    }
}

/// Weight Measurement resolution in kilograms
pub const WEIGHT_RESOLUTION_KG: f32 = 0.005;

/// Encode Battery Level (0x2A19): one byte, percent, capped at 100.
pub fn battery_level(level: u8) -> Vec<u8> {
    vec![level.min(100)]
}

/// Heart Rate Measurement (0x2A37) inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartRateMeasurement {
    pub heart_rate: u16,
    /// Encode the heart rate as a `u16`
    pub wide: bool,
    /// Energy expended in kilojoules
    pub energy_expended: Option<u16>,
}

impl HeartRateMeasurement {
    /// 8-bit heart rate with no optional fields
    pub fn basic(heart_rate: u8) -> Self {
        Self {
            heart_rate: heart_rate as u16,
            wide: false,
            energy_expended: None,
        }
    }

    /// Encode the measurement.
    ///
    /// The flags byte always carries bit 3, matching the peripheral this
    /// simulator reproduces; the Energy Expended field itself is only
    /// written when a value is supplied.
    ///
    /// ```text
    /// [0]     : Flags
    /// [1]     : Heart rate (u8), or
    /// [1-2]   : Heart rate (u16 little-endian) when bit 0 is set
    /// [..+2]  : Energy expended (u16 little-endian), optional
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = HeartRateFlags::ENERGY_EXPENDED;
        let mut buf = Vec::with_capacity(5);

        flags.set(HeartRateFlags::UINT16, self.wide);
        buf.push(flags.bits());

        if self.wide {
            buf.extend_from_slice(&self.heart_rate.to_le_bytes());
        } else {
            buf.push(self.heart_rate.min(u8::MAX as u16) as u8);
        }

        if let Some(energy) = self.energy_expended {
            buf.extend_from_slice(&energy.to_le_bytes());
        }

        buf
    }
}

/// Encode Temperature Measurement (0x2A1C): Celsius flags byte followed by
/// an IEEE-754 `f32`, little-endian.
pub fn temperature_measurement(celsius: f32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(0x00);
    buf.extend_from_slice(&celsius.to_le_bytes());
    buf
}

/// Blood Pressure Measurement (0x2A35) inputs, in mmHg and beats per minute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloodPressure {
    pub systolic: f32,
    pub diastolic: f32,
    pub mean_arterial: f32,
    pub pulse_rate: Option<f32>,
}

impl BloodPressure {
    /// Encode the measurement.
    ///
    /// ```text
    /// [0]     : Flags (bit 2: pulse rate present, units always mmHg)
    /// [1-2]   : Systolic
    /// [3-4]   : Diastolic
    /// [5-6]   : Mean arterial pressure
    /// [7-8]   : Pulse rate, optional
    /// ```
    pub fn encode(&self, format: MedicalFloat) -> Vec<u8> {
        let mut flags = BloodPressureFlags::empty();
        flags.set(BloodPressureFlags::PULSE_RATE, self.pulse_rate.is_some());

        let mut buf = Vec::with_capacity(9);
        buf.push(flags.bits());
        buf.extend_from_slice(&format.encode(self.systolic));
        buf.extend_from_slice(&format.encode(self.diastolic));
        buf.extend_from_slice(&format.encode(self.mean_arterial));
        if let Some(pulse) = self.pulse_rate {
            buf.extend_from_slice(&format.encode(pulse));
        }
        buf
    }
}

/// Glucose Measurement (0x2A18) inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseMeasurement {
    /// Caller-maintained, increments once per measurement
    pub sequence: u16,
    pub base_time: DateTime,
    /// Minutes relative to `base_time`
    pub time_offset: Option<i16>,
    /// Concentration in mg/dL
    pub concentration: f32,
    /// `(type, sample_location)` nibbles
    pub type_location: Option<(u8, u8)>,
}

impl GlucoseMeasurement {
    /// Encode the measurement.
    ///
    /// ```text
    /// [0]      : Flags
    /// [1-2]    : Sequence number (u16 little-endian)
    /// [3-9]    : Base time (Date Time)
    /// [10-11]  : Time offset (i16 little-endian), optional
    /// [..+2]   : Concentration
    /// [..+1]   : Sample location (high nibble) | type (low nibble), optional
    /// ```
    pub fn encode(&self, format: MedicalFloat) -> Vec<u8> {
        let mut flags = GlucoseFlags::empty();
        flags.set(GlucoseFlags::TIME_OFFSET, self.time_offset.is_some());
        flags.set(GlucoseFlags::TYPE_LOCATION, self.type_location.is_some());

        let mut buf = Vec::with_capacity(15);
        buf.push(flags.bits());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&time::date_time(&self.base_time));
        if let Some(offset) = self.time_offset {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        buf.extend_from_slice(&format.encode(self.concentration));
        if let Some((kind, location)) = self.type_location {
            buf.push(((location & 0x0F) << 4) | (kind & 0x0F));
        }
        buf
    }
}

/// Encode Weight Measurement (0x2A9D): SI flags byte followed by the weight
/// in 5 g steps.
pub fn weight_measurement(kilograms: f32) -> Vec<u8> {
    let raw = (kilograms / WEIGHT_RESOLUTION_KG)
        .round()
        .clamp(0.0, u16::MAX as f32) as u16;
    let mut buf = Vec::with_capacity(3);
    buf.push(0x00);
    buf.extend_from_slice(&raw.to_le_bytes());
    buf
}

/// Encode PLX Continuous Measurement (0x2A5F): flags, SpO2 percent and pulse
/// rate.
pub fn plx_continuous(spo2: f32, pulse_rate: f32, format: MedicalFloat) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(0x00);
    buf.extend_from_slice(&format.encode(spo2));
    buf.extend_from_slice(&format.encode(pulse_rate));
    buf
}
