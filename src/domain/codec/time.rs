//! Time encoders
//!
//! Date Time (7 bytes), Current Time (10 bytes) and Device Time (9 bytes).

use chrono::{Datelike, Timelike};

/// Adjust Reason: manual time update
pub const ADJUST_REASON_MANUAL: u8 = 0x01;

/// Calendar fields as read from the local clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Sunday ... 6 = Saturday
    pub weekday_from_sunday: u8,
}

impl DateTime {
    /// Capture calendar fields from any chrono date-time.
    pub fn from_chrono<T: Datelike + Timelike>(value: &T) -> Self {
        Self {
            year: value.year().clamp(0, u16::MAX as i32) as u16,
            month: value.month() as u8,
            day: value.day() as u8,
            hour: value.hour() as u8,
            minute: value.minute() as u8,
            second: value.second() as u8,
            weekday_from_sunday: value.weekday().num_days_from_sunday() as u8,
        }
    }

    /// Current local time
    pub fn now() -> Self {
        Self::from_chrono(&chrono::Local::now())
    }

    /// Day of week in the SIG convention: Monday = 1 ... Sunday = 7.
    pub fn iso_weekday(&self) -> u8 {
        match self.weekday_from_sunday % 7 {
            0 => 7,
            day => day,
        }
    }
}

/// Encode Date Time (0x2A08).
///
/// ```text
/// [0-1] : Year (u16 little-endian)
/// [2]   : Month
/// [3]   : Day
/// [4]   : Hours
/// [5]   : Minutes
/// [6]   : Seconds
/// ```
pub fn date_time(value: &DateTime) -> [u8; 7] {
    let year = value.year.to_le_bytes();
    [
        year[0],
        year[1],
        value.month,
        value.day,
        value.hour,
        value.minute,
        value.second,
    ]
}

/// Encode Current Time (0x2A2B) / Exact Time 256.
///
/// Date Time, then day of week, fractions of a second (always 0) and the
/// adjust reason when one is given.
pub fn current_time(value: &DateTime, adjust_reason: Option<u8>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    buf.extend_from_slice(&date_time(value));
    buf.push(value.iso_weekday());
    buf.push(0x00);
    if let Some(reason) = adjust_reason {
        buf.push(reason);
    }
    buf
}

/// Encode Device Time (0x2B90): Exact Time 256 without an adjust reason.
pub fn device_time(value: &DateTime) -> Vec<u8> {
    current_time(value, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(weekday_from_sunday: u8) -> DateTime {
        DateTime {
            year: 2025,
            month: 12,
            day: 31,
            hour: 23,
            minute: 59,
            second: 58,
            weekday_from_sunday,
        }
    }

    #[test]
    fn test_iso_weekday_conversion() {
        assert_eq!(at(0).iso_weekday(), 7);
        assert_eq!(at(1).iso_weekday(), 1);
        assert_eq!(at(6).iso_weekday(), 6);
    }

    #[test]
    fn test_current_time_layout() {
        let encoded = current_time(&at(3), Some(ADJUST_REASON_MANUAL));
        assert_eq!(encoded, vec![0xE9, 0x07, 12, 31, 23, 59, 58, 3, 0, 1]);
    }

    #[test]
    fn test_device_time_has_no_adjust_reason() {
        let encoded = device_time(&at(0));
        assert_eq!(encoded.len(), 9);
        assert_eq!(encoded[7], 7);
    }

    #[test]
    fn test_from_chrono() {
        // 2024-03-17 was a Sunday
        let value = NaiveDate::from_ymd_opt(2024, 3, 17)
            .and_then(|d| d.and_hms_opt(10, 20, 30))
            .unwrap();
        let dt = DateTime::from_chrono(&value);
        assert_eq!(dt.weekday_from_sunday, 0);
        assert_eq!(dt.iso_weekday(), 7);
        assert_eq!(date_time(&dt), [0xE8, 0x07, 3, 17, 10, 20, 30]);
    }
}
