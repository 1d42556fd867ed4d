//! GATT identifiers
//!
//! Service, characteristic and descriptor UUIDs exposed by the simulated
//! peripheral. SIG-assigned 16-bit numbers are expanded onto the Bluetooth
//! base UUID `0000XXXX-0000-1000-8000-00805f9b34fb`.

use uuid::Uuid;

/// Expand a 16-bit SIG-assigned number onto the Bluetooth base UUID.
pub const fn ble_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb_u128)
}

/// Return the 16-bit short form if `uuid` sits on the Bluetooth base UUID.
pub fn short_form(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let base = value & !(0xFFFF_FFFF_u128 << 96);
    if base == 0x0000_0000_0000_1000_8000_00805f9b34fb_u128 && (value >> 112) == 0 {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

pub mod service {
    use super::ble_uuid;
    use uuid::Uuid;

    pub const IMMEDIATE_ALERT: Uuid = ble_uuid(0x1802);
    pub const TX_POWER: Uuid = ble_uuid(0x1804);
    pub const CURRENT_TIME: Uuid = ble_uuid(0x1805);
    pub const GLUCOSE: Uuid = ble_uuid(0x1808);
    pub const HEALTH_THERMOMETER: Uuid = ble_uuid(0x1809);
    pub const DEVICE_INFORMATION: Uuid = ble_uuid(0x180A);
    pub const HEART_RATE: Uuid = ble_uuid(0x180D);
    pub const BATTERY: Uuid = ble_uuid(0x180F);
    pub const BLOOD_PRESSURE: Uuid = ble_uuid(0x1810);
    pub const ENVIRONMENTAL_SENSING: Uuid = ble_uuid(0x181A);
    pub const WEIGHT_SCALE: Uuid = ble_uuid(0x181D);
    pub const PULSE_OXIMETER: Uuid = ble_uuid(0x1822);
    pub const FITNESS_MACHINE: Uuid = ble_uuid(0x1826);
    pub const DEVICE_TIME: Uuid = ble_uuid(0x1847);
    /// Proprietary body-composition scale
    pub const SCALE: Uuid = ble_uuid(0xFFF0);
}

pub mod characteristic {
    use super::ble_uuid;
    use uuid::Uuid;

    pub const ALERT_LEVEL: Uuid = ble_uuid(0x2A06);
    pub const TX_POWER_LEVEL: Uuid = ble_uuid(0x2A07);
    pub const GLUCOSE_MEASUREMENT: Uuid = ble_uuid(0x2A18);
    pub const BATTERY_LEVEL: Uuid = ble_uuid(0x2A19);
    pub const TEMPERATURE_MEASUREMENT: Uuid = ble_uuid(0x2A1C);
    pub const MEASUREMENT_INTERVAL: Uuid = ble_uuid(0x2A21);
    pub const MODEL_NUMBER: Uuid = ble_uuid(0x2A24);
    pub const SERIAL_NUMBER: Uuid = ble_uuid(0x2A25);
    pub const FIRMWARE_REVISION: Uuid = ble_uuid(0x2A26);
    pub const MANUFACTURER_NAME: Uuid = ble_uuid(0x2A29);
    pub const CURRENT_TIME: Uuid = ble_uuid(0x2A2B);
    pub const BLOOD_PRESSURE_MEASUREMENT: Uuid = ble_uuid(0x2A35);
    pub const HEART_RATE_MEASUREMENT: Uuid = ble_uuid(0x2A37);
    pub const BODY_SENSOR_LOCATION: Uuid = ble_uuid(0x2A38);
    pub const HEART_RATE_CONTROL_POINT: Uuid = ble_uuid(0x2A39);
    pub const BLOOD_PRESSURE_FEATURE: Uuid = ble_uuid(0x2A49);
    pub const GLUCOSE_FEATURE: Uuid = ble_uuid(0x2A51);
    pub const RECORD_ACCESS_CONTROL_POINT: Uuid = ble_uuid(0x2A52);
    pub const PLX_CONTINUOUS_MEASUREMENT: Uuid = ble_uuid(0x2A5F);
    pub const PRESSURE: Uuid = ble_uuid(0x2A6D);
    pub const TEMPERATURE: Uuid = ble_uuid(0x2A6E);
    pub const HUMIDITY: Uuid = ble_uuid(0x2A6F);
    pub const WIND_CHILL: Uuid = ble_uuid(0x2A79);
    pub const WEIGHT_MEASUREMENT: Uuid = ble_uuid(0x2A9D);
    pub const WEIGHT_SCALE_FEATURE: Uuid = ble_uuid(0x2A9E);
    pub const FITNESS_MACHINE_FEATURE: Uuid = ble_uuid(0x2ACC);
    pub const TREADMILL_DATA: Uuid = ble_uuid(0x2ACD);
    pub const CROSS_TRAINER_DATA: Uuid = ble_uuid(0x2ACE);
    pub const INDOOR_BIKE_DATA: Uuid = ble_uuid(0x2AD2);
    pub const TRAINING_STATUS: Uuid = ble_uuid(0x2AD3);
    pub const SUPPORTED_RESISTANCE_RANGE: Uuid = ble_uuid(0x2AD6);
    pub const FITNESS_MACHINE_CONTROL_POINT: Uuid = ble_uuid(0x2AD9);
    pub const FITNESS_MACHINE_STATUS: Uuid = ble_uuid(0x2ADA);
    pub const DEVICE_TIME: Uuid = ble_uuid(0x2B90);
    /// Proprietary scale command characteristic (client writes here)
    pub const SCALE_WRITE: Uuid = ble_uuid(0xFFF1);
    /// Proprietary scale frame characteristic (peripheral notifies here)
    pub const SCALE_NOTIFY: Uuid = ble_uuid(0xFFF4);
}

pub mod descriptor {
    use super::ble_uuid;
    use uuid::Uuid;

    pub const USER_DESCRIPTION: Uuid = ble_uuid(0x2901);
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = ble_uuid(0x2902);
    pub const VALID_RANGE: Uuid = ble_uuid(0x2906);
}
