//! Proprietary scale frames
//!
//! The body-composition scale speaks a framed protocol over the 0xFFF0
//! service. Every frame ends in a one-byte additive checksum over the bytes
//! from offset 1 up to (but excluding) the checksum itself, truncated to
//! 8 bits. Where a frame carries a length byte it counts the whole frame,
//! checksum included. Multi-byte fields are little-endian.

/// Device information frame header
pub const DEVICE_INFO_HEADER: [u8; 2] = [0xFE, 0x36];
/// Realtime impedance frame header
pub const REALTIME_HEADER: u8 = 0xDF;
/// History frame header (also the history request opcode)
pub const HISTORY_HEADER: u8 = 0xF2;
/// Generic acknowledgement header
pub const ACK_HEADER: u8 = 0xFD;
/// Generic MCU response header
pub const MCU_HEADER: [u8; 2] = [0x55, 0xFD];
/// Generic MCU response trailer
pub const MCU_TRAILER: u8 = 0xAA;

/// Realtime impedance frame length, checksum included
pub const REALTIME_FRAME_LEN: usize = 22;
/// Device information frame length, checksum included
pub const DEVICE_INFO_FRAME_LEN: usize = 15;

/// History TLV record types
pub mod tlv {
    /// Unix timestamp, `u32`
    pub const TIMESTAMP: u8 = 0x01;
    /// Weight, `u16`, kg * 100
    pub const WEIGHT: u8 = 0x02;
    /// Impedance, `u16`, ohms
    pub const IMPEDANCE: u8 = 0x03;
    /// User slot, `u8`
    pub const USER: u8 = 0x04;
}

/// Encoded size of one history record (four TLVs)
pub const HISTORY_RECORD_LEN: usize = 17;
/// Records that fit in one history frame with a one-byte length
pub const MAX_HISTORY_RECORDS: usize = 14;

/// ACK status: accepted
pub const ACK_OK: u8 = 0x00;
/// ACK status: command not supported
pub const ACK_UNSUPPORTED: u8 = 0x01;

/// Weight unit as displayed by the scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WeightUnit {
    #[default]
    Kilogram = 0x00,
    Pound = 0x01,
    Jin = 0x02,
}

/// 8-bit additive checksum
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Append the checksum of `frame[1..]`.
fn seal(mut frame: Vec<u8>) -> Vec<u8> {
    let sum = checksum(frame.get(1..).unwrap_or_default());
    frame.push(sum);
    frame
}

fn scaled_u16(value: f32, factor: f32) -> [u8; 2] {
    ((value * factor).round().clamp(0.0, u16::MAX as f32) as u16).to_le_bytes()
}

/// Scale identity reported in the 0xFE36 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub protocol_version: u8,
    pub battery_percent: u8,
    pub unit: WeightUnit,
    pub firmware: (u8, u8),
    pub mac: [u8; 6],
}

impl DeviceInfo {
    /// Encode the device information frame.
    ///
    /// ```text
    /// [0-1]   : 0xFE 0x36
    /// [2]     : Frame length (15)
    /// [3]     : Protocol version
    /// [4]     : Battery percent
    /// [5]     : Weight unit
    /// [6-7]   : Firmware major, minor
    /// [8-13]  : MAC address
    /// [14]    : Checksum of [1..=13]
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(DEVICE_INFO_FRAME_LEN);
        frame.extend_from_slice(&DEVICE_INFO_HEADER);
        frame.push(DEVICE_INFO_FRAME_LEN as u8);
        frame.push(self.protocol_version);
        frame.push(self.battery_percent.min(100));
        frame.push(self.unit as u8);
        frame.push(self.firmware.0);
        frame.push(self.firmware.1);
        frame.extend_from_slice(&self.mac);
        seal(frame)
    }
}

/// One realtime body-composition sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpedanceReading {
    pub stable: bool,
    pub unit: WeightUnit,
    pub weight_kg: f32,
    pub impedance_ohm: u16,
    pub body_fat_percent: f32,
    pub heart_rate: u8,
    pub user_id: u8,
    pub timestamp: u32,
    pub high_frequency_impedance_ohm: u16,
    pub battery_percent: u8,
    pub sequence: u8,
}

impl ImpedanceReading {
    /// Encode the 22-byte realtime impedance frame.
    ///
    /// ```text
    /// [0]      : 0xDF
    /// [1]      : Frame length (22)
    /// [2]      : State (0 measuring, 1 stable)
    /// [3]      : Weight unit
    /// [4-5]    : Weight (kg * 100)
    /// [6-7]    : Impedance (ohms)
    /// [8-9]    : Body fat (percent * 10)
    /// [10]     : Heart rate
    /// [11]     : User slot
    /// [12-15]  : Unix timestamp
    /// [16-17]  : High-frequency impedance (ohms)
    /// [18]     : Battery percent
    /// [19]     : Sequence
    /// [20]     : Reserved
    /// [21]     : Checksum of [1..=20]
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(REALTIME_FRAME_LEN);
        frame.push(REALTIME_HEADER);
        frame.push(REALTIME_FRAME_LEN as u8);
        frame.push(u8::from(self.stable));
        frame.push(self.unit as u8);
        frame.extend_from_slice(&scaled_u16(self.weight_kg, 100.0));
        frame.extend_from_slice(&self.impedance_ohm.to_le_bytes());
        frame.extend_from_slice(&scaled_u16(self.body_fat_percent, 10.0));
        frame.push(self.heart_rate);
        frame.push(self.user_id);
        frame.extend_from_slice(&self.timestamp.to_le_bytes());
        frame.extend_from_slice(&self.high_frequency_impedance_ohm.to_le_bytes());
        frame.push(self.battery_percent.min(100));
        frame.push(self.sequence);
        frame.push(0x00);
        seal(frame)
    }
}

/// One stored weighing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: u32,
    pub weight_kg: f32,
    pub impedance_ohm: u16,
    pub user_id: u8,
}

/// Encode a history frame carrying up to [`MAX_HISTORY_RECORDS`] records.
///
/// ```text
/// [0]      : 0xF2
/// [1]      : Frame length
/// [2]      : Record count
/// [3..]    : Per record: TLV timestamp, TLV weight, TLV impedance, TLV user
/// [last]   : Checksum of [1..last]
/// ```
pub fn history_frame(records: &[HistoryRecord]) -> Vec<u8> {
    let records = &records[..records.len().min(MAX_HISTORY_RECORDS)];
    let len = 3 + records.len() * HISTORY_RECORD_LEN + 1;

    let mut frame = Vec::with_capacity(len);
    frame.push(HISTORY_HEADER);
    frame.push(len as u8);
    frame.push(records.len() as u8);
    for record in records {
        frame.extend_from_slice(&[tlv::TIMESTAMP, 4]);
        frame.extend_from_slice(&record.timestamp.to_le_bytes());
        frame.extend_from_slice(&[tlv::WEIGHT, 2]);
        frame.extend_from_slice(&scaled_u16(record.weight_kg, 100.0));
        frame.extend_from_slice(&[tlv::IMPEDANCE, 2]);
        frame.extend_from_slice(&record.impedance_ohm.to_le_bytes());
        frame.extend_from_slice(&[tlv::USER, 1, record.user_id]);
    }
    seal(frame)
}

/// Encode a generic acknowledgement: `[0xFD, opcode, status, checksum]`.
pub fn ack(opcode: u8, status: u8) -> Vec<u8> {
    seal(vec![ACK_HEADER, opcode, status])
}

/// Encode a generic MCU response.
///
/// ```text
/// [0-1]    : 0x55 0xFD
/// [2]      : Command
/// [3]      : Payload length
/// [4..]    : Payload
/// [n-2]    : Checksum of [1..n-2]
/// [n-1]    : 0xAA
/// ```
pub fn mcu_response(command: u8, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(u8::MAX as usize)];
    let mut frame = Vec::with_capacity(payload.len() + 6);
    frame.extend_from_slice(&MCU_HEADER);
    frame.push(command);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    let mut frame = seal(frame);
    frame.push(MCU_TRAILER);
    frame
}
