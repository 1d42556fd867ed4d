//! Service Catalog
//!
//! Builds the static set of services the simulated peripheral exposes,
//! each characteristic seeded with a plausible initial value.

use crate::domain::codec::health::{self, BloodPressure, GlucoseMeasurement, HeartRateMeasurement};
use crate::domain::codec::time::{self, DateTime};
use crate::domain::codec::{environment, fitness, MedicalFloat};
use crate::domain::gatt::{Characteristic, Descriptor, GattDatabase, Properties, Service};
use crate::domain::settings::DeviceInfoSettings;
use crate::domain::uuids::{characteristic as chr, service as svc};

/// Initial measurement interval of the thermometer, in seconds
pub const DEFAULT_MEASUREMENT_INTERVAL_S: u16 = 5;
/// Accepted measurement interval range, in seconds
pub const MEASUREMENT_INTERVAL_RANGE: (u16, u16) = (1, 60);

const READ_NOTIFY: Properties = Properties::READ.union(Properties::NOTIFY);

/// Build the full catalog in registration order.
pub fn standard_catalog(
    device_info: &DeviceInfoSettings,
    now: &DateTime,
    format: MedicalFloat,
) -> GattDatabase {
    GattDatabase::new(vec![
        battery(),
        heart_rate(),
        health_thermometer(),
        device_information(device_info),
        current_time(now),
        device_time(now),
        blood_pressure(format),
        glucose(now, format),
        weight_scale(),
        pulse_oximeter(format),
        fitness_machine(),
        environmental_sensing(),
        immediate_alert(),
        tx_power(),
        proprietary_scale(),
    ])
}

fn battery() -> Service {
    Service::primary(svc::BATTERY).with_characteristic(
        Characteristic::new(chr::BATTERY_LEVEL, READ_NOTIFY).with_value(health::battery_level(80)),
    )
}

fn heart_rate() -> Service {
    let initial = HeartRateMeasurement {
        energy_expended: Some(0),
        ..HeartRateMeasurement::basic(60)
    };
    Service::primary(svc::HEART_RATE)
        .with_characteristic(
            Characteristic::new(chr::HEART_RATE_MEASUREMENT, Properties::NOTIFY)
                .with_value(initial.encode()),
        )
        // Chest
        .with_characteristic(
            Characteristic::new(chr::BODY_SENSOR_LOCATION, Properties::READ).with_value(vec![0x01]),
        )
        .with_characteristic(Characteristic::new(
            chr::HEART_RATE_CONTROL_POINT,
            Properties::WRITE,
        ))
}

fn health_thermometer() -> Service {
    let (lower, upper) = MEASUREMENT_INTERVAL_RANGE;
    Service::primary(svc::HEALTH_THERMOMETER)
        .with_characteristic(
            Characteristic::new(chr::TEMPERATURE_MEASUREMENT, Properties::INDICATE)
                .with_value(health::temperature_measurement(37.0)),
        )
        .with_characteristic(
            Characteristic::new(chr::MEASUREMENT_INTERVAL, Properties::READ | Properties::WRITE)
                .with_value(DEFAULT_MEASUREMENT_INTERVAL_S.to_le_bytes().to_vec())
                .with_descriptor(Descriptor::valid_range_u16(lower, upper)),
        )
}

fn device_information(info: &DeviceInfoSettings) -> Service {
    let text = |uuid, value: &str| {
        Characteristic::new(uuid, Properties::READ).with_value(value.as_bytes().to_vec())
    };
    Service::primary(svc::DEVICE_INFORMATION)
        .with_characteristic(text(chr::MANUFACTURER_NAME, &info.manufacturer))
        .with_characteristic(text(chr::MODEL_NUMBER, &info.model))
        .with_characteristic(text(chr::SERIAL_NUMBER, &info.serial))
        .with_characteristic(text(chr::FIRMWARE_REVISION, &info.firmware_revision))
}

fn current_time(now: &DateTime) -> Service {
    Service::primary(svc::CURRENT_TIME).with_characteristic(
        Characteristic::new(chr::CURRENT_TIME, READ_NOTIFY)
            .with_value(time::current_time(now, Some(time::ADJUST_REASON_MANUAL))),
    )
}

fn device_time(now: &DateTime) -> Service {
    Service::primary(svc::DEVICE_TIME).with_characteristic(
        Characteristic::new(chr::DEVICE_TIME, READ_NOTIFY).with_value(time::device_time(now)),
    )
}

fn blood_pressure(format: MedicalFloat) -> Service {
    let initial = BloodPressure {
        systolic: 120.0,
        diastolic: 80.0,
        mean_arterial: 93.0,
        pulse_rate: Some(70.0),
    };
    Service::primary(svc::BLOOD_PRESSURE)
        .with_characteristic(
            Characteristic::new(chr::BLOOD_PRESSURE_MEASUREMENT, Properties::INDICATE)
                .with_value(initial.encode(format)),
        )
        .with_characteristic(
            Characteristic::new(chr::BLOOD_PRESSURE_FEATURE, Properties::READ)
                .with_value(vec![0x00, 0x00]),
        )
}

fn glucose(now: &DateTime, format: MedicalFloat) -> Service {
    let initial = GlucoseMeasurement {
        sequence: 0,
        base_time: *now,
        time_offset: None,
        concentration: 100.0,
        // Capillary whole blood, finger
        type_location: Some((0x01, 0x01)),
    };
    Service::primary(svc::GLUCOSE)
        .with_characteristic(
            Characteristic::new(chr::GLUCOSE_MEASUREMENT, Properties::INDICATE)
                .with_value(initial.encode(format)),
        )
        .with_characteristic(
            Characteristic::new(chr::GLUCOSE_FEATURE, Properties::READ).with_value(vec![0x00, 0x00]),
        )
        .with_characteristic(Characteristic::new(
            chr::RECORD_ACCESS_CONTROL_POINT,
            Properties::WRITE | Properties::INDICATE,
        ))
}

fn weight_scale() -> Service {
    Service::primary(svc::WEIGHT_SCALE)
        .with_characteristic(
            Characteristic::new(chr::WEIGHT_MEASUREMENT, Properties::INDICATE)
                .with_value(health::weight_measurement(70.0)),
        )
        .with_characteristic(
            Characteristic::new(chr::WEIGHT_SCALE_FEATURE, Properties::READ)
                .with_value(0u32.to_le_bytes().to_vec()),
        )
}

fn pulse_oximeter(format: MedicalFloat) -> Service {
    Service::primary(svc::PULSE_OXIMETER).with_characteristic(
        Characteristic::new(chr::PLX_CONTINUOUS_MEASUREMENT, Properties::NOTIFY)
            .with_value(health::plx_continuous(98.0, 70.0, format)),
    )
}

fn fitness_machine() -> Service {
    let idle_bike = fitness::IndoorBikeData {
        speed_kmh: 0.0,
        cadence_rpm: 0.0,
        power_watts: 0,
        heart_rate: 0,
        total_distance_m: 0,
    };
    let idle_treadmill = fitness::TreadmillData {
        speed_kmh: 0.0,
        incline_percent: 0.0,
        power_watts: 0,
        heart_rate: 0,
        total_distance_m: 0,
    };
    let idle_cross_trainer = fitness::CrossTrainerData {
        speed_kmh: 0.0,
        stride_rate: 0.0,
        power_watts: 0,
        heart_rate: 0,
        total_distance_m: 0,
    };

    Service::primary(svc::FITNESS_MACHINE)
        .with_characteristic(
            Characteristic::new(chr::FITNESS_MACHINE_FEATURE, Properties::READ)
                .with_value(fitness::feature().to_vec()),
        )
        .with_characteristic(
            Characteristic::new(chr::TREADMILL_DATA, Properties::NOTIFY)
                .with_value(idle_treadmill.encode()),
        )
        .with_characteristic(
            Characteristic::new(chr::CROSS_TRAINER_DATA, Properties::NOTIFY)
                .with_value(idle_cross_trainer.encode()),
        )
        .with_characteristic(
            Characteristic::new(chr::INDOOR_BIKE_DATA, Properties::NOTIFY)
                .with_value(idle_bike.encode()),
        )
        .with_characteristic(
            Characteristic::new(chr::TRAINING_STATUS, READ_NOTIFY)
                .with_value(fitness::training_status(fitness::TRAINING_STATUS_IDLE).to_vec()),
        )
        .with_characteristic(
            Characteristic::new(chr::SUPPORTED_RESISTANCE_RANGE, Properties::READ)
                .with_value(fitness::supported_resistance_range().to_vec()),
        )
        .with_characteristic(Characteristic::new(
            chr::FITNESS_MACHINE_CONTROL_POINT,
            Properties::WRITE | Properties::INDICATE,
        ))
        .with_characteristic(Characteristic::new(
            chr::FITNESS_MACHINE_STATUS,
            Properties::NOTIFY,
        ))
}

fn environmental_sensing() -> Service {
    Service::primary(svc::ENVIRONMENTAL_SENSING)
        .with_characteristic(
            Characteristic::new(chr::TEMPERATURE, READ_NOTIFY)
                .with_value(environment::temperature(21.5).to_vec()),
        )
        .with_characteristic(
            Characteristic::new(chr::HUMIDITY, READ_NOTIFY)
                .with_value(environment::humidity(45.0).to_vec()),
        )
        .with_characteristic(
            Characteristic::new(chr::PRESSURE, READ_NOTIFY)
                .with_value(environment::pressure(1013.25).to_vec()),
        )
        .with_characteristic(
            Characteristic::new(chr::WIND_CHILL, READ_NOTIFY)
                .with_value(environment::wind_chill(20).to_vec()),
        )
}

fn immediate_alert() -> Service {
    Service::primary(svc::IMMEDIATE_ALERT).with_characteristic(
        Characteristic::new(chr::ALERT_LEVEL, Properties::WRITE_WITHOUT_RESPONSE)
            .with_value(vec![0x00]),
    )
}

fn tx_power() -> Service {
    Service::primary(svc::TX_POWER).with_characteristic(
        Characteristic::new(chr::TX_POWER_LEVEL, Properties::READ)
            .with_value(0i8.to_le_bytes().to_vec()),
    )
}

fn proprietary_scale() -> Service {
    Service::primary(svc::SCALE)
        .with_characteristic(
            Characteristic::new(
                chr::SCALE_WRITE,
                Properties::WRITE | Properties::WRITE_WITHOUT_RESPONSE,
            )
            .with_descriptor(Descriptor::user_description("Scale command")),
        )
        .with_characteristic(Characteristic::new(chr::SCALE_NOTIFY, Properties::NOTIFY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatt::CharacteristicRef;
    use crate::domain::uuids::descriptor;
    use std::collections::HashSet;

    fn catalog() -> GattDatabase {
        let now = DateTime {
            year: 2024,
            month: 6,
            day: 1,
            hour: 12,
            minute: 0,
            second: 0,
            weekday_from_sunday: 6,
        };
        standard_catalog(&DeviceInfoSettings::default(), &now, MedicalFloat::Truncated)
    }

    #[test]
    fn test_catalog_has_distinct_services() {
        let db = catalog();
        let uuids: HashSet<_> = db.services().iter().map(|s| s.uuid()).collect();
        assert!(db.services().len() >= 15);
        assert_eq!(uuids.len(), db.services().len());
    }

    #[test]
    fn test_every_subscribable_characteristic_has_cccd() {
        let db = catalog();
        let mut count = 0;
        for (target, _) in db.subscribable() {
            let c = db.characteristic(&target).unwrap();
            assert!(
                c.descriptor(&descriptor::CLIENT_CHARACTERISTIC_CONFIGURATION)
                    .is_some(),
                "{target} has no CCCD"
            );
            count += 1;
        }
        assert!(count > 15);
    }

    #[test]
    fn test_initial_values() {
        let db = catalog();
        let value = |s, c| db.value(&CharacteristicRef::new(s, c)).unwrap();

        assert_eq!(value(svc::BATTERY, chr::BATTERY_LEVEL), vec![80]);
        assert_eq!(
            value(svc::HEART_RATE, chr::HEART_RATE_MEASUREMENT),
            vec![0x08, 60, 0, 0]
        );
        assert_eq!(value(svc::HEART_RATE, chr::BODY_SENSOR_LOCATION), vec![0x01]);
        assert_eq!(
            value(svc::DEVICE_INFORMATION, chr::SERIAL_NUMBER),
            b"1234-ABCD".to_vec()
        );
        assert_eq!(value(svc::CURRENT_TIME, chr::CURRENT_TIME).len(), 10);
        assert_eq!(value(svc::DEVICE_TIME, chr::DEVICE_TIME).len(), 9);
    }

    #[test]
    fn test_measurement_interval_range() {
        let db = catalog();
        let target = CharacteristicRef::new(svc::HEALTH_THERMOMETER, chr::MEASUREMENT_INTERVAL);
        let c = db.characteristic(&target).unwrap();

        assert_eq!(c.value(), vec![5, 0]);
        let range = c.descriptor(&descriptor::VALID_RANGE).unwrap();
        assert_eq!(range.as_u16_range(), Some(MEASUREMENT_INTERVAL_RANGE));
    }
}
