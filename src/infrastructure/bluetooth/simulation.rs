//! Simulation Scheduler
//!
//! One [`Generator`] per measurement family. Each runs as its own tokio task
//! on its own interval and shares nothing with the others except the
//! [`Controls`] written by inbound commands.

use crate::domain::codec::health::{self, BloodPressure, GlucoseMeasurement, HeartRateMeasurement};
use crate::domain::codec::scale::{HistoryRecord, ImpedanceReading, WeightUnit};
use crate::domain::codec::time::{self, DateTime};
use crate::domain::codec::{environment, fitness, MedicalFloat};
use crate::domain::gatt::CharacteristicRef;
use crate::domain::settings::SimulationSettings;
use crate::domain::uuids::{characteristic as chr, service as svc};
use crate::infrastructure::bluetooth::protocol::DispatchKind;
use crate::infrastructure::bluetooth::service::{Inner, PeripheralService};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};
use uuid::Uuid;

/// Fitness machines with an odometer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    IndoorBike,
    Treadmill,
    CrossTrainer,
}

/// State shared between the command dispatcher and the generators. Lives as
/// long as the peripheral, so counters keep running across stop and start.
#[derive(Debug, Default)]
pub struct Controls {
    target_resistance: AtomicU8,
    energy_expended_kj: AtomicU16,
    training: AtomicBool,
    glucose_sequence: AtomicU16,
    scale_sequence: AtomicU8,
    distance_mm: [AtomicU64; 3],
}

impl Controls {
    pub fn target_resistance(&self) -> u8 {
        self.target_resistance.load(Ordering::Relaxed)
    }

    pub fn set_target_resistance(&self, level: u8) {
        self.target_resistance.store(level, Ordering::Relaxed);
    }

    /// Add to the energy counter, saturating, and return the new total.
    pub fn add_energy(&self, kilojoules: u16) -> u16 {
        let previous = self
            .energy_expended_kj
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |e| {
                Some(e.saturating_add(kilojoules))
            })
            .unwrap_or_default();
        previous.saturating_add(kilojoules)
    }

    pub fn energy_expended(&self) -> u16 {
        self.energy_expended_kj.load(Ordering::Relaxed)
    }

    pub fn reset_energy(&self) {
        self.energy_expended_kj.store(0, Ordering::Relaxed);
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    pub fn set_training(&self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    /// Glucose record sequence number, starting at 1
    pub fn next_glucose_sequence(&self) -> u16 {
        self.glucose_sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn next_scale_sequence(&self) -> u8 {
        self.scale_sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Add `metres` to the odometer of `machine` and return the whole-metre total.
    pub fn advance_distance(&self, machine: Machine, metres: f64) -> u32 {
        let mm = (metres.max(0.0) * 1000.0).round() as u64;
        let total = self.distance_mm[machine as usize]
            .fetch_add(mm, Ordering::Relaxed)
            .saturating_add(mm);
        (total / 1000).min(u32::MAX as u64) as u32
    }
}

/// One encoded value ready for the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub target: CharacteristicRef,
    pub value: Vec<u8>,
    pub kind: DispatchKind,
}

impl Sample {
    fn notify(service: Uuid, characteristic: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self {
            target: CharacteristicRef::new(service, characteristic),
            value: value.into(),
            kind: DispatchKind::Notify,
        }
    }

    fn indicate(service: Uuid, characteristic: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: DispatchKind::Indicate,
            ..Self::notify(service, characteristic, value)
        }
    }
}

/// A periodic producer of measurement values
pub trait Generator: Send {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    /// Produce the next values. Must not block.
    fn tick(&mut self, rng: &mut StdRng, controls: &Controls) -> Vec<Sample>;
}

fn period(ms: u64) -> Duration {
    // tokio intervals reject a zero period
    Duration::from_millis(ms.max(1))
}

fn unix_seconds() -> u32 {
    chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Every generator, configured from `settings`
pub fn standard_generators(settings: &SimulationSettings) -> Vec<Box<dyn Generator>> {
    let format = settings.medical_float;
    vec![
        Box::new(BatteryGenerator::new(settings.battery_interval_ms)),
        Box::new(HeartRateGenerator::new(settings.heart_rate_interval_ms)),
        Box::new(TemperatureGenerator::new(settings.temperature_interval_ms)),
        Box::new(BloodPressureGenerator::new(settings.blood_pressure_interval_ms, format)),
        Box::new(GlucoseGenerator::new(settings.glucose_interval_ms, format)),
        Box::new(WeightGenerator::new(settings.weight_interval_ms)),
        Box::new(PulseOximeterGenerator::new(settings.pulse_oximeter_interval_ms, format)),
        Box::new(FitnessGenerator::new(settings.fitness_interval_ms)),
        Box::new(EnvironmentGenerator::new(settings.environment_interval_ms)),
        Box::new(ClockGenerator::new(settings.time_interval_ms)),
        Box::new(ScaleGenerator::new(settings.scale_interval_ms)),
    ]
}

pub struct BatteryGenerator {
    period: Duration,
}

impl BatteryGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for BatteryGenerator {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let level = rng.gen_range(20..100);
        vec![Sample::notify(
            svc::BATTERY,
            chr::BATTERY_LEVEL,
            health::battery_level(level),
        )]
    }
}

pub struct HeartRateGenerator {
    period: Duration,
}

impl HeartRateGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for HeartRateGenerator {
    fn name(&self) -> &'static str {
        "heart_rate"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, controls: &Controls) -> Vec<Sample> {
        let measurement = HeartRateMeasurement {
            energy_expended: Some(controls.add_energy(1)),
            ..HeartRateMeasurement::basic(rng.gen_range(60..75))
        };
        vec![Sample::notify(
            svc::HEART_RATE,
            chr::HEART_RATE_MEASUREMENT,
            measurement.encode(),
        )]
    }
}

pub struct TemperatureGenerator {
    period: Duration,
}

impl TemperatureGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for TemperatureGenerator {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let celsius = 36.5 + rng.gen::<f32>();
        vec![Sample::indicate(
            svc::HEALTH_THERMOMETER,
            chr::TEMPERATURE_MEASUREMENT,
            health::temperature_measurement(celsius),
        )]
    }
}

pub struct BloodPressureGenerator {
    period: Duration,
    format: MedicalFloat,
}

impl BloodPressureGenerator {
    pub fn new(period_ms: u64, format: MedicalFloat) -> Self {
        Self {
            period: period(period_ms),
            format,
        }
    }
}

impl Generator for BloodPressureGenerator {
    fn name(&self) -> &'static str {
        "blood_pressure"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let systolic = rng.gen_range(110.0..130.0f32).round();
        let diastolic = rng.gen_range(70.0..85.0f32).round();
        let measurement = BloodPressure {
            systolic,
            diastolic,
            mean_arterial: (diastolic + (systolic - diastolic) / 3.0).round(),
            pulse_rate: Some(rng.gen_range(60.0..90.0f32).round()),
        };
        vec![Sample::indicate(
            svc::BLOOD_PRESSURE,
            chr::BLOOD_PRESSURE_MEASUREMENT,
            measurement.encode(self.format),
        )]
    }
}

pub struct GlucoseGenerator {
    period: Duration,
    format: MedicalFloat,
}

impl GlucoseGenerator {
    pub fn new(period_ms: u64, format: MedicalFloat) -> Self {
        Self {
            period: period(period_ms),
            format,
        }
    }
}

impl Generator for GlucoseGenerator {
    fn name(&self) -> &'static str {
        "glucose"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, controls: &Controls) -> Vec<Sample> {
        let measurement = GlucoseMeasurement {
            sequence: controls.next_glucose_sequence(),
            base_time: DateTime::now(),
            time_offset: None,
            concentration: rng.gen_range(80.0..140.0f32).round(),
            type_location: Some((0x01, 0x01)),
        };
        vec![Sample::indicate(
            svc::GLUCOSE,
            chr::GLUCOSE_MEASUREMENT,
            measurement.encode(self.format),
        )]
    }
}

pub struct WeightGenerator {
    period: Duration,
}

impl WeightGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for WeightGenerator {
    fn name(&self) -> &'static str {
        "weight"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let kilograms = rng.gen_range(60.0..80.0f32);
        vec![Sample::indicate(
            svc::WEIGHT_SCALE,
            chr::WEIGHT_MEASUREMENT,
            health::weight_measurement(kilograms),
        )]
    }
}

pub struct PulseOximeterGenerator {
    period: Duration,
    format: MedicalFloat,
}

impl PulseOximeterGenerator {
    pub fn new(period_ms: u64, format: MedicalFloat) -> Self {
        Self {
            period: period(period_ms),
            format,
        }
    }
}

impl Generator for PulseOximeterGenerator {
    fn name(&self) -> &'static str {
        "pulse_oximeter"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let spo2 = rng.gen_range(95..=99) as f32;
        let pulse = rng.gen_range(60..=90) as f32;
        vec![Sample::notify(
            svc::PULSE_OXIMETER,
            chr::PLX_CONTINUOUS_MEASUREMENT,
            health::plx_continuous(spo2, pulse, self.format),
        )]
    }
}

/// Indoor bike, treadmill and cross trainer telemetry
pub struct FitnessGenerator {
    period: Duration,
}

impl FitnessGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }

    fn advance(&self, controls: &Controls, machine: Machine, speed_kmh: f32) -> u32 {
        let metres = speed_kmh as f64 / 3.6 * self.period.as_secs_f64();
        controls.advance_distance(machine, metres)
    }
}

impl Generator for FitnessGenerator {
    fn name(&self) -> &'static str {
        "fitness"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, controls: &Controls) -> Vec<Sample> {
        let resistance = controls.target_resistance() as i32;
        let heart_rate = rng.gen_range(100..160);

        let cadence_rpm = rng.gen_range(70.0..100.0f32);
        let bike_speed = cadence_rpm * 0.33;
        // Harder resistance means more work at the same cadence
        let bike_power = (100 + rng.gen_range(0..50) + resistance * 2).min(i16::MAX as i32) as i16;
        let bike = fitness::IndoorBikeData {
            speed_kmh: bike_speed,
            cadence_rpm,
            power_watts: bike_power,
            heart_rate,
            total_distance_m: self.advance(controls, Machine::IndoorBike, bike_speed),
        };

        let treadmill_speed = rng.gen_range(6.0..12.0f32);
        let treadmill = fitness::TreadmillData {
            speed_kmh: treadmill_speed,
            incline_percent: rng.gen_range(0.0..5.0f32),
            power_watts: rng.gen_range(120..220),
            heart_rate,
            total_distance_m: self.advance(controls, Machine::Treadmill, treadmill_speed),
        };

        let cross_speed = rng.gen_range(5.0..10.0f32);
        let cross_trainer = fitness::CrossTrainerData {
            speed_kmh: cross_speed,
            stride_rate: rng.gen_range(50.0..70.0f32),
            power_watts: rng.gen_range(80..180),
            heart_rate,
            total_distance_m: self.advance(controls, Machine::CrossTrainer, cross_speed),
        };

        vec![
            Sample::notify(svc::FITNESS_MACHINE, chr::INDOOR_BIKE_DATA, bike.encode()),
            Sample::notify(svc::FITNESS_MACHINE, chr::TREADMILL_DATA, treadmill.encode()),
            Sample::notify(svc::FITNESS_MACHINE, chr::CROSS_TRAINER_DATA, cross_trainer.encode()),
        ]
    }
}

pub struct EnvironmentGenerator {
    period: Duration,
}

impl EnvironmentGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for EnvironmentGenerator {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let celsius = rng.gen_range(18.0..26.0f32);
        let chill = (celsius - rng.gen_range(0.0..5.0f32)).round() as i8;
        vec![
            Sample::notify(
                svc::ENVIRONMENTAL_SENSING,
                chr::TEMPERATURE,
                environment::temperature(celsius),
            ),
            Sample::notify(
                svc::ENVIRONMENTAL_SENSING,
                chr::HUMIDITY,
                environment::humidity(rng.gen_range(30.0..60.0)),
            ),
            Sample::notify(
                svc::ENVIRONMENTAL_SENSING,
                chr::PRESSURE,
                environment::pressure(rng.gen_range(990.0..1030.0)),
            ),
            Sample::notify(
                svc::ENVIRONMENTAL_SENSING,
                chr::WIND_CHILL,
                environment::wind_chill(chill),
            ),
        ]
    }
}

/// Current Time and Device Time from the local clock
pub struct ClockGenerator {
    period: Duration,
}

impl ClockGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for ClockGenerator {
    fn name(&self) -> &'static str {
        "time"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, _rng: &mut StdRng, _controls: &Controls) -> Vec<Sample> {
        let now = DateTime::now();
        vec![
            Sample::notify(
                svc::CURRENT_TIME,
                chr::CURRENT_TIME,
                time::current_time(&now, Some(time::ADJUST_REASON_MANUAL)),
            ),
            Sample::notify(svc::DEVICE_TIME, chr::DEVICE_TIME, time::device_time(&now)),
        ]
    }
}

/// Realtime frames of the proprietary body-composition scale
pub struct ScaleGenerator {
    period: Duration,
}

impl ScaleGenerator {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period: period(period_ms),
        }
    }
}

impl Generator for ScaleGenerator {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, rng: &mut StdRng, controls: &Controls) -> Vec<Sample> {
        let impedance_ohm = rng.gen_range(400..600);
        let reading = ImpedanceReading {
            stable: rng.gen_bool(0.5),
            unit: WeightUnit::Kilogram,
            weight_kg: rng.gen_range(60.0..80.0),
            impedance_ohm,
            body_fat_percent: rng.gen_range(15.0..30.0),
            heart_rate: rng.gen_range(60..90),
            user_id: 1,
            timestamp: unix_seconds(),
            high_frequency_impedance_ohm: impedance_ohm.saturating_sub(rng.gen_range(20..60)),
            battery_percent: rng.gen_range(50..=100),
            sequence: controls.next_scale_sequence(),
        };
        vec![Sample::notify(svc::SCALE, chr::SCALE_NOTIFY, reading.encode())]
    }
}

/// Stored weighings reported in reply to a history request, one per day
/// going back from `now`.
pub fn synthetic_history(rng: &mut impl Rng, now: u32, count: usize) -> Vec<HistoryRecord> {
    (0..count as u32)
        .map(|day| HistoryRecord {
            timestamp: now.saturating_sub(day * 86_400),
            weight_kg: rng.gen_range(60.0..80.0),
            impedance_ohm: rng.gen_range(400..600),
            user_id: 1,
        })
        .collect()
}

pub(crate) fn history_now() -> u32 {
    unix_seconds()
}

/// Drive one generator until `stop` fires, the flag clears, or the
/// peripheral is dropped.
pub(crate) async fn run_generator(
    mut generator: Box<dyn Generator>,
    inner: Weak<Inner>,
    mut stop: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = interval(generator.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(generator = generator.name(), period = ?generator.period(), "generator started");

    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let peripheral = PeripheralService::from_inner(inner);
                if !peripheral.is_simulating() {
                    break;
                }
                for sample in generator.tick(&mut rng, peripheral.controls()) {
                    let delivered = peripheral.publish(&sample.target, sample.value, sample.kind);
                    trace!(generator = generator.name(), characteristic = %sample.target, delivered, "tick");
                }
            }
        }
    }

    debug!(generator = generator.name(), "generator stopped");
}
