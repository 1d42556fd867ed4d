//! Inbound Write Protocol
//!
//! Parsers for the byte patterns centrals write to the peripheral: CCCD
//! values, the Fitness Machine control point, the proprietary scale command
//! characteristic and the glucose Record Access Control Point.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty write")]
    Empty,
    #[error("CCCD value must be 2 bytes, got {0}")]
    CccdLength(usize),
    #[error("unrecognized CCCD value {0:02X?}")]
    MalformedCccd([u8; 2]),
    #[error("opcode 0x{opcode:02X} is missing its parameter")]
    MissingParameter { opcode: u8 },
}

/// Canonical Client Characteristic Configuration values
pub mod cccd {
    pub const DISABLE: [u8; 2] = [0x00, 0x00];
    pub const ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];
    pub const ENABLE_INDICATION: [u8; 2] = [0x02, 0x00];
}

/// Outbound push types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Unacknowledged
    Notify,
    /// Acknowledged
    Indicate,
}

impl DispatchKind {
    pub fn is_indication(self) -> bool {
        matches!(self, Self::Indicate)
    }
}

/// What a central asked for by writing a CCCD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SubscriptionMode {
    #[default]
    Disabled,
    Notify,
    Indicate,
}

impl SubscriptionMode {
    /// Parse a written CCCD value; only the canonical patterns are accepted.
    pub fn parse(value: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; 2] = value
            .try_into()
            .map_err(|_| ProtocolError::CccdLength(value.len()))?;
        match bytes {
            cccd::DISABLE => Ok(Self::Disabled),
            cccd::ENABLE_NOTIFICATION => Ok(Self::Notify),
            cccd::ENABLE_INDICATION => Ok(Self::Indicate),
            other => Err(ProtocolError::MalformedCccd(other)),
        }
    }

    /// Whether a push of `kind` may be delivered under this mode
    pub fn accepts(self, kind: DispatchKind) -> bool {
        matches!(
            (self, kind),
            (Self::Notify, DispatchKind::Notify) | (Self::Indicate, DispatchKind::Indicate)
        )
    }
}

/// Fitness Machine control point result codes
pub mod fitness_result {
    pub const SUCCESS: u8 = 0x01;
    pub const OP_CODE_NOT_SUPPORTED: u8 = 0x02;
    pub const INVALID_PARAMETER: u8 = 0x03;
}

/// Fitness Machine control point commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitnessCommand {
    RequestControl,
    Reset,
    /// Target resistance level, 0-255
    SetTargetResistance(u8),
    StartOrResume,
    /// Optional control parameter: 0x01 stop, 0x02 pause
    StopOrPause(Option<u8>),
    Unsupported(u8),
}

impl FitnessCommand {
    /// Parse a control point write.
    ///
    /// ```text
    /// [0]     : Opcode
    /// [1..]   : Parameter, opcode specific
    /// ```
    pub fn parse(value: &[u8]) -> Result<Self, ProtocolError> {
        let (&opcode, params) = value.split_first().ok_or(ProtocolError::Empty)?;
        let command = match opcode {
            0x00 => Self::RequestControl,
            0x01 => Self::Reset,
            0x04 => Self::SetTargetResistance(
                *params
                    .first()
                    .ok_or(ProtocolError::MissingParameter { opcode })?,
            ),
            0x07 => Self::StartOrResume,
            0x08 => Self::StopOrPause(params.first().copied()),
            other => Self::Unsupported(other),
        };
        Ok(command)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::RequestControl => 0x00,
            Self::Reset => 0x01,
            Self::SetTargetResistance(_) => 0x04,
            Self::StartOrResume => 0x07,
            Self::StopOrPause(_) => 0x08,
            Self::Unsupported(op) => *op,
        }
    }
}

/// Commands written to the proprietary scale characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleCommand {
    HistoryRequest,
    DeviceInfoRequest,
    Mcu { command: u8, payload: Vec<u8> },
    Unknown(u8),
}

impl ScaleCommand {
    pub const HISTORY_REQUEST: u8 = 0xF2;
    pub const DEVICE_INFO_REQUEST: u8 = 0xFE;
    pub const MCU_PREFIX: [u8; 2] = [0x55, 0xFD];

    pub fn parse(value: &[u8]) -> Result<Self, ProtocolError> {
        let (&opcode, rest) = value.split_first().ok_or(ProtocolError::Empty)?;
        let command = match opcode {
            Self::HISTORY_REQUEST => Self::HistoryRequest,
            Self::DEVICE_INFO_REQUEST => Self::DeviceInfoRequest,
            _ if value.starts_with(&Self::MCU_PREFIX) => {
                let (&command, payload) = rest[1..]
                    .split_first()
                    .ok_or(ProtocolError::MissingParameter { opcode })?;
                Self::Mcu {
                    command,
                    payload: payload.to_vec(),
                }
            }
            other => Self::Unknown(other),
        };
        Ok(command)
    }
}

/// Heart Rate Control Point: reset energy expended
pub const HR_CONTROL_RESET_ENERGY_EXPENDED: u8 = 0x01;

/// Record Access Control Point opcodes and stub responses
pub mod racp {
    pub const REPORT_STORED_RECORDS: u8 = 0x01;
    pub const DELETE_STORED_RECORDS: u8 = 0x02;
    pub const ABORT_OPERATION: u8 = 0x03;
    pub const REPORT_NUMBER_OF_RECORDS: u8 = 0x04;
    pub const NUMBER_OF_RECORDS_RESPONSE: u8 = 0x05;
    pub const RESPONSE_CODE: u8 = 0x06;

    pub const OPERATOR_NULL: u8 = 0x00;

    pub const SUCCESS: u8 = 0x01;
    pub const OP_CODE_NOT_SUPPORTED: u8 = 0x02;
    pub const NO_RECORDS_FOUND: u8 = 0x06;

    /// `[0x05, 0x00, count]`
    pub fn number_of_records(count: u16) -> Vec<u8> {
        let mut buf = vec![NUMBER_OF_RECORDS_RESPONSE, OPERATOR_NULL];
        buf.extend_from_slice(&count.to_le_bytes());
        buf
    }

    /// `[0x06, 0x00, request_opcode, response_code]`
    pub fn response(request_opcode: u8, code: u8) -> Vec<u8> {
        vec![RESPONSE_CODE, OPERATOR_NULL, request_opcode, code]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cccd_patterns() {
        assert_eq!(SubscriptionMode::parse(&[0x01, 0x00]), Ok(SubscriptionMode::Notify));
        assert_eq!(SubscriptionMode::parse(&[0x02, 0x00]), Ok(SubscriptionMode::Indicate));
        assert_eq!(SubscriptionMode::parse(&[0x00, 0x00]), Ok(SubscriptionMode::Disabled));
        assert_eq!(
            SubscriptionMode::parse(&[0x03, 0x00]),
            Err(ProtocolError::MalformedCccd([0x03, 0x00]))
        );
        assert_eq!(SubscriptionMode::parse(&[0x01]), Err(ProtocolError::CccdLength(1)));
    }

    #[test]
    fn test_mode_accepts_matching_kind_only() {
        assert!(SubscriptionMode::Notify.accepts(DispatchKind::Notify));
        assert!(!SubscriptionMode::Notify.accepts(DispatchKind::Indicate));
        assert!(SubscriptionMode::Indicate.accepts(DispatchKind::Indicate));
        assert!(!SubscriptionMode::Disabled.accepts(DispatchKind::Notify));
    }

    #[test]
    fn test_fitness_commands() {
        assert_eq!(
            FitnessCommand::parse(&[0x04, 42]),
            Ok(FitnessCommand::SetTargetResistance(42))
        );
        assert_eq!(
            FitnessCommand::parse(&[0x04]),
            Err(ProtocolError::MissingParameter { opcode: 0x04 })
        );
        assert_eq!(FitnessCommand::parse(&[0x08]), Ok(FitnessCommand::StopOrPause(None)));
        assert_eq!(FitnessCommand::parse(&[0x11]), Ok(FitnessCommand::Unsupported(0x11)));
        assert_eq!(FitnessCommand::parse(&[]), Err(ProtocolError::Empty));
        assert_eq!(FitnessCommand::Unsupported(0x11).opcode(), 0x11);
    }

    #[test]
    fn test_scale_commands() {
        assert_eq!(ScaleCommand::parse(&[0xF2]), Ok(ScaleCommand::HistoryRequest));
        assert_eq!(ScaleCommand::parse(&[0xFE, 0x00]), Ok(ScaleCommand::DeviceInfoRequest));
        assert_eq!(
            ScaleCommand::parse(&[0x55, 0xFD, 0x10, 0xAB]),
            Ok(ScaleCommand::Mcu {
                command: 0x10,
                payload: vec![0xAB]
            })
        );
        assert_eq!(
            ScaleCommand::parse(&[0x55, 0xFD]),
            Err(ProtocolError::MissingParameter { opcode: 0x55 })
        );
        assert_eq!(ScaleCommand::parse(&[0x55, 0x01]), Ok(ScaleCommand::Unknown(0x55)));
    }

    #[test]
    fn test_racp_frames() {
        assert_eq!(racp::number_of_records(3), vec![0x05, 0x00, 0x03, 0x00]);
        assert_eq!(
            racp::response(racp::REPORT_STORED_RECORDS, racp::NO_RECORDS_FOUND),
            vec![0x06, 0x00, 0x01, 0x06]
        );
    }
}
