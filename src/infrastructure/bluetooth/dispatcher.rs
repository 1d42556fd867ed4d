//! Command Dispatcher
//!
//! Handles inbound reads, characteristic writes and descriptor writes.
//! Writes are answered with an ATT status first; any control point reply
//! goes out afterwards as a notification or indication.

use crate::domain::codec::fitness;
use crate::domain::codec::scale::{self, DeviceInfo, WeightUnit};
use crate::domain::gatt::{Characteristic, CharacteristicRef, Properties};
use crate::domain::uuids::{characteristic as chr, descriptor, service as svc};
use crate::infrastructure::bluetooth::host::{AttStatus, DeviceId, RequestId};
use crate::infrastructure::bluetooth::protocol::{
    fitness_result, racp, DispatchKind, FitnessCommand, ProtocolError, ScaleCommand,
    SubscriptionMode, HR_CONTROL_RESET_ENERGY_EXPENDED,
};
use crate::infrastructure::bluetooth::service::PeripheralService;
use crate::infrastructure::bluetooth::simulation;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Number of stored weighings reported on a scale history request
const HISTORY_RECORDS: usize = 3;

/// A push that follows a write acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    target: CharacteristicRef,
    value: Vec<u8>,
    kind: DispatchKind,
    /// Send to every subscriber instead of the writer only
    broadcast: bool,
}

impl Reply {
    fn to_writer(target: CharacteristicRef, value: impl Into<Vec<u8>>, kind: DispatchKind) -> Self {
        Self {
            target,
            value: value.into(),
            kind,
            broadcast: false,
        }
    }

    fn to_all(target: CharacteristicRef, value: impl Into<Vec<u8>>, kind: DispatchKind) -> Self {
        Self {
            broadcast: true,
            ..Self::to_writer(target, value, kind)
        }
    }
}

struct WriteOutcome {
    status: AttStatus,
    replies: Vec<Reply>,
}

impl WriteOutcome {
    fn status(status: AttStatus) -> Self {
        Self {
            status,
            replies: Vec::new(),
        }
    }

    fn success(replies: Vec<Reply>) -> Self {
        Self {
            status: AttStatus::Success,
            replies,
        }
    }
}

fn scale_notify() -> CharacteristicRef {
    CharacteristicRef::new(svc::SCALE, chr::SCALE_NOTIFY)
}

fn fitness_control_point() -> CharacteristicRef {
    CharacteristicRef::new(svc::FITNESS_MACHINE, chr::FITNESS_MACHINE_CONTROL_POINT)
}

impl PeripheralService {
    pub(crate) fn on_characteristic_read(
        &self,
        device: &DeviceId,
        request: RequestId,
        target: CharacteristicRef,
        offset: u16,
    ) {
        let Some(handle) = self.server() else {
            warn!(%device, %target, "Read request without an open server");
            return;
        };

        let (status, value) = match self.database().characteristic(&target) {
            Err(e) => {
                debug!(%device, "Read of unknown attribute: {}", e);
                (AttStatus::AttributeNotFound, Vec::new())
            }
            Ok(c) if !c.properties().is_readable() => (AttStatus::ReadNotPermitted, Vec::new()),
            // No characteristic here needs a long read
            Ok(_) if offset != 0 => (AttStatus::InvalidOffset, Vec::new()),
            Ok(c) => (AttStatus::Success, c.value()),
        };

        debug!(%device, %target, offset, ?status, "Read request");
        if let Err(e) = self
            .host()
            .send_read_response(handle, device, request, status, offset, &value)
        {
            error!(%device, %target, "Failed to send read response: {}", e);
        }
    }

    pub(crate) fn on_characteristic_write(
        &self,
        device: &DeviceId,
        request: RequestId,
        target: CharacteristicRef,
        value: Vec<u8>,
        response_needed: bool,
    ) {
        debug!(%device, %target, "Write request: {:02X?}", value);

        let outcome = match self.database().characteristic(&target) {
            Err(e) => {
                debug!(%device, "Write to unknown attribute: {}", e);
                WriteOutcome::status(AttStatus::AttributeNotFound)
            }
            Ok(c) if !c.properties().is_writable() => {
                WriteOutcome::status(AttStatus::WriteNotPermitted)
            }
            Ok(c) => self.apply_write(device, target, c, value),
        };

        if response_needed {
            self.ack(device, request, outcome.status);
        }

        for reply in outcome.replies {
            if reply.broadcast {
                self.publish(&reply.target, reply.value, reply.kind);
            } else {
                self.notify_device(device, &reply.target, reply.value, reply.kind);
            }
        }
    }

    pub(crate) fn on_descriptor_write(
        &self,
        device: &DeviceId,
        request: RequestId,
        target: CharacteristicRef,
        descriptor_uuid: Uuid,
        value: &[u8],
        response_needed: bool,
    ) {
        let status = if descriptor_uuid == descriptor::CLIENT_CHARACTERISTIC_CONFIGURATION {
            self.write_cccd(device, target, value)
        } else {
            debug!(%device, %target, descriptor = %descriptor_uuid, "Write to unsupported descriptor");
            AttStatus::RequestNotSupported
        };

        if response_needed {
            self.ack(device, request, status);
        }
    }

    fn ack(&self, device: &DeviceId, request: RequestId, status: AttStatus) {
        let Some(handle) = self.server() else {
            warn!(%device, "Cannot acknowledge write without an open server");
            return;
        };
        if let Err(e) = self.host().send_write_ack(handle, device, request, status) {
            error!(%device, "Failed to send write response: {}", e);
        }
    }

    fn write_cccd(&self, device: &DeviceId, target: CharacteristicRef, value: &[u8]) -> AttStatus {
        let properties = match self.database().characteristic(&target) {
            Ok(c) if c.properties().is_subscribable() => c.properties(),
            Ok(_) => return AttStatus::RequestNotSupported,
            Err(_) => return AttStatus::AttributeNotFound,
        };

        let mode = match SubscriptionMode::parse(value) {
            Ok(mode) => mode,
            Err(ProtocolError::CccdLength(len)) => {
                debug!(%device, %target, len, "CCCD write with wrong length");
                return AttStatus::InvalidAttributeValueLength;
            }
            Err(e) => {
                debug!(%device, %target, "{}", e);
                return AttStatus::CccdImproperlyConfigured;
            }
        };

        let supported = match mode {
            SubscriptionMode::Disabled => true,
            SubscriptionMode::Notify => properties.contains(Properties::NOTIFY),
            SubscriptionMode::Indicate => properties.contains(Properties::INDICATE),
        };
        if !supported {
            debug!(%device, %target, ?mode, "Subscription kind not offered");
            return AttStatus::CccdImproperlyConfigured;
        }

        self.links().record(device.clone(), target, mode);
        info!(%device, %target, ?mode, "Subscription updated");
        AttStatus::Success
    }

    fn apply_write(
        &self,
        device: &DeviceId,
        target: CharacteristicRef,
        characteristic: &Characteristic,
        value: Vec<u8>,
    ) -> WriteOutcome {
        match target.characteristic {
            chr::FITNESS_MACHINE_CONTROL_POINT => self.fitness_control(&value),
            chr::SCALE_WRITE => self.scale_command(device, &value),
            chr::HEART_RATE_CONTROL_POINT => self.heart_rate_control(&value),
            chr::RECORD_ACCESS_CONTROL_POINT => self.record_access(target, &value),
            chr::MEASUREMENT_INTERVAL => measurement_interval(characteristic, value),
            _ => {
                characteristic.set_value(value);
                WriteOutcome::status(AttStatus::Success)
            }
        }
    }

    fn fitness_control(&self, value: &[u8]) -> WriteOutcome {
        let control_point = fitness_control_point();
        let respond = |opcode, result| {
            Reply::to_writer(
                control_point,
                fitness::control_point_response(opcode, result),
                DispatchKind::Indicate,
            )
        };

        let command = match FitnessCommand::parse(value) {
            Ok(command) => command,
            Err(ProtocolError::MissingParameter { opcode }) => {
                warn!(opcode, "Fitness control point write without parameter");
                return WriteOutcome::success(vec![respond(
                    opcode,
                    fitness_result::INVALID_PARAMETER,
                )]);
            }
            Err(e) => {
                warn!("Fitness control point: {}", e);
                return WriteOutcome::status(AttStatus::InvalidAttributeValueLength);
            }
        };

        let opcode = command.opcode();
        let controls = self.controls();
        let mut replies = Vec::new();
        let result = match command {
            FitnessCommand::RequestControl => fitness_result::SUCCESS,
            FitnessCommand::Reset => {
                controls.set_target_resistance(0);
                controls.set_training(false);
                replies.push(training_status(fitness::TRAINING_STATUS_IDLE));
                fitness_result::SUCCESS
            }
            FitnessCommand::SetTargetResistance(level) => {
                controls.set_target_resistance(level);
                info!(level, "Target resistance set");
                replies.push(Reply::to_all(
                    CharacteristicRef::new(svc::FITNESS_MACHINE, chr::FITNESS_MACHINE_STATUS),
                    fitness::resistance_changed(level),
                    DispatchKind::Notify,
                ));
                fitness_result::SUCCESS
            }
            FitnessCommand::StartOrResume => {
                controls.set_training(true);
                replies.push(training_status(fitness::TRAINING_STATUS_MANUAL_MODE));
                fitness_result::SUCCESS
            }
            FitnessCommand::StopOrPause(_) => {
                controls.set_training(false);
                replies.push(training_status(fitness::TRAINING_STATUS_IDLE));
                fitness_result::SUCCESS
            }
            FitnessCommand::Unsupported(op) => {
                warn!(opcode = op, "Unsupported fitness machine opcode");
                fitness_result::OP_CODE_NOT_SUPPORTED
            }
        };

        // The response indication precedes any status change
        replies.insert(0, respond(opcode, result));
        WriteOutcome::success(replies)
    }

    fn scale_command(&self, device: &DeviceId, value: &[u8]) -> WriteOutcome {
        let notify = |frame: Vec<u8>| Reply::to_writer(scale_notify(), frame, DispatchKind::Notify);

        let command = match ScaleCommand::parse(value) {
            Ok(command) => command,
            Err(ProtocolError::MissingParameter { opcode }) => {
                return WriteOutcome::success(vec![notify(scale::ack(opcode, scale::ACK_UNSUPPORTED))]);
            }
            Err(e) => {
                warn!("Scale command: {}", e);
                return WriteOutcome::status(AttStatus::InvalidAttributeValueLength);
            }
        };

        let frame = match command {
            ScaleCommand::HistoryRequest => {
                self.schedule_history_reply(device.clone());
                scale::ack(ScaleCommand::HISTORY_REQUEST, scale::ACK_OK)
            }
            ScaleCommand::DeviceInfoRequest => self.scale_device_info().encode(),
            ScaleCommand::Mcu { command, payload } => scale::mcu_response(command, &payload),
            ScaleCommand::Unknown(op) => {
                warn!(opcode = op, "Unsupported scale command");
                scale::ack(op, scale::ACK_UNSUPPORTED)
            }
        };
        WriteOutcome::success(vec![notify(frame)])
    }

    fn scale_device_info(&self) -> DeviceInfo {
        let battery = self
            .database()
            .value(&CharacteristicRef::new(svc::BATTERY, chr::BATTERY_LEVEL))
            .ok()
            .and_then(|v| v.first().copied())
            .unwrap_or(100);
        DeviceInfo {
            protocol_version: 0x01,
            battery_percent: battery,
            unit: WeightUnit::Kilogram,
            firmware: (1, 0),
            mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
        }
    }

    /// Fire-and-forget: the history frame follows after the configured delay.
    fn schedule_history_reply(&self, device: DeviceId) {
        let peripheral = self.clone();
        let delay = self.settings().history_reply_delay();
        self.runtime().spawn(async move {
            tokio::time::sleep(delay).await;
            let records = simulation::synthetic_history(
                &mut rand::thread_rng(),
                simulation::history_now(),
                HISTORY_RECORDS,
            );
            let sent = peripheral.notify_device(
                &device,
                &scale_notify(),
                scale::history_frame(&records),
                DispatchKind::Notify,
            );
            debug!(%device, sent, "History reply");
        });
    }

    fn heart_rate_control(&self, value: &[u8]) -> WriteOutcome {
        if value == [HR_CONTROL_RESET_ENERGY_EXPENDED] {
            self.controls().reset_energy();
            info!("Energy expended reset");
            WriteOutcome::status(AttStatus::Success)
        } else {
            warn!("Unsupported heart rate control value {:02X?}", value);
            WriteOutcome::status(AttStatus::ApplicationError)
        }
    }

    fn record_access(&self, target: CharacteristicRef, value: &[u8]) -> WriteOutcome {
        let Some(&opcode) = value.first() else {
            return WriteOutcome::status(AttStatus::InvalidAttributeValueLength);
        };
        // Records are not retained, so the store is always empty
        let frame = match opcode {
            racp::REPORT_NUMBER_OF_RECORDS => racp::number_of_records(0),
            racp::REPORT_STORED_RECORDS => racp::response(opcode, racp::NO_RECORDS_FOUND),
            racp::DELETE_STORED_RECORDS | racp::ABORT_OPERATION => {
                racp::response(opcode, racp::SUCCESS)
            }
            other => {
                warn!(opcode = other, "Unsupported RACP opcode");
                racp::response(other, racp::OP_CODE_NOT_SUPPORTED)
            }
        };
        WriteOutcome::success(vec![Reply::to_writer(target, frame, DispatchKind::Indicate)])
    }
}

fn training_status(status: u8) -> Reply {
    Reply::to_all(
        CharacteristicRef::new(svc::FITNESS_MACHINE, chr::TRAINING_STATUS),
        fitness::training_status(status),
        DispatchKind::Notify,
    )
}

fn measurement_interval(characteristic: &Characteristic, value: Vec<u8>) -> WriteOutcome {
    let Ok(bytes) = <[u8; 2]>::try_from(value.as_slice()) else {
        return WriteOutcome::status(AttStatus::InvalidAttributeValueLength);
    };
    let interval = u16::from_le_bytes(bytes);
    let in_range = characteristic
        .descriptor(&descriptor::VALID_RANGE)
        .and_then(|d| d.as_u16_range())
        .map_or(true, |(lower, upper)| (lower..=upper).contains(&interval));
    if !in_range {
        warn!(interval, "Measurement interval out of range");
        return WriteOutcome::status(AttStatus::OutOfRange);
    }
    characteristic.set_value(value);
    info!(interval, "Measurement interval updated");
    WriteOutcome::status(AttStatus::Success)
}
