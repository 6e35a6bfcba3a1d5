//! Synthetic telemetry for simulated vehicles.
//!
//! [`VehicleState`] holds the evolving position of one vehicle and
//! [`LogGenerator`] turns it into validated records.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::errors::ValidationError;
use crate::models::{
    Emulator, GeofenceEvent, GeofenceLog, GpsCycle, GpsInfo, GpsLog, GpsStatus, PowerLog,
    PowerStatus, MAX_TRIP_METER,
};
use crate::motion::{bearing_deg, distance_m, smooth_heading, smooth_speed, MAX_STEP_METERS};

/// Samples in one reporting cycle, one per second of a minute
pub const CYCLE_SECONDS: usize = 60;

/// Largest random offset per axis for one step
const STEP_DEGREES: f64 = 0.0001;
const STEP_ATTEMPTS: usize = 5;

/// Mutable state of one simulated vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    /// Ignition on
    pub active: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// Smoothed heading in degrees
    pub heading: f64,
    /// Smoothed speed in km/h
    pub speed: f64,
    /// Metres driven since the session was first started
    pub accumulated_distance: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub last_power_on: Option<DateTime<Utc>>,
    /// Where the vehicle was switched off
    pub parked_position: Option<(f64, f64)>,
}

/// One realtime position sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed: f64,
    pub trip_meter: u32,
    pub occurred_time: DateTime<Utc>,
}

impl VehicleState {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            active: false,
            latitude,
            longitude,
            heading: 0.0,
            speed: 0.0,
            accumulated_distance: 0.0,
            last_update: None,
            last_power_on: None,
            parked_position: None,
        }
    }

    /// A state placed at `(latitude, longitude)` shifted by at most `jitter` degrees per axis
    pub fn near<R: Rng + ?Sized>(latitude: f64, longitude: f64, jitter: f64, rng: &mut R) -> Self {
        let (lat, lon) = jittered((latitude, longitude), jitter, rng);
        Self::new(lat, lon)
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Accumulated distance as reported on the wire
    pub fn trip_meter(&self) -> u32 {
        trip_meter(self.accumulated_distance)
    }

    /// Draw a random step of at most 80 m from the current position.
    ///
    /// Returns `None` when every attempt was rejected.
    fn random_step<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<((f64, f64), f64)> {
        let from = self.position();
        for _ in 0..STEP_ATTEMPTS {
            let to = (
                (from.0 + rng.gen_range(-STEP_DEGREES..=STEP_DEGREES)).clamp(-90.0, 90.0),
                (from.1 + rng.gen_range(-STEP_DEGREES..=STEP_DEGREES)).clamp(-180.0, 180.0),
            );
            let distance = distance_m(from, to);
            if distance <= MAX_STEP_METERS {
                return Some((to, distance));
            }
        }
        None
    }

    /// Move to `to` at `now`, updating speed, heading and trip meter.
    ///
    /// Jumps longer than 80 m move the vehicle but do not count towards
    /// the trip meter.
    pub fn record_movement(&mut self, to: (f64, f64), now: DateTime<Utc>) -> TrackSample {
        let from = self.position();
        let distance = distance_m(from, to);
        let elapsed = self
            .last_update
            .map(|t| (now - t).num_milliseconds() as f64 / 1000.0)
            .filter(|secs| *secs > 0.0)
            .unwrap_or(1.0);

        self.speed = smooth_speed(self.speed, distance, elapsed);
        if distance > 0.0 {
            self.heading = smooth_heading(self.heading, bearing_deg(from, to));
        }
        if distance <= MAX_STEP_METERS {
            self.accumulated_distance += distance;
        }
        self.latitude = to.0;
        self.longitude = to.1;
        self.last_update = Some(now);

        TrackSample {
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed: self.speed,
            trip_meter: self.trip_meter(),
            occurred_time: now,
        }
    }

    /// Take one realtime sample at `now`
    pub fn advance<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) -> TrackSample {
        let to = self
            .random_step(rng)
            .map(|(to, _)| to)
            .unwrap_or_else(|| self.position());
        self.record_movement(to, now)
    }
}

fn jittered<R: Rng + ?Sized>((lat, lon): (f64, f64), jitter: f64, rng: &mut R) -> (f64, f64) {
    if jitter <= 0.0 {
        return (lat, lon);
    }
    (
        (lat + rng.gen_range(-jitter..=jitter)).clamp(-90.0, 90.0),
        (lon + rng.gen_range(-jitter..=jitter)).clamp(-180.0, 180.0),
    )
}

fn trip_meter(distance: f64) -> u32 {
    if distance <= 0.0 {
        return 0;
    }
    (distance as u64).min(MAX_TRIP_METER as u64) as u32
}

/// Produces records from vehicle state using its own random source.
#[derive(Debug)]
pub struct LogGenerator<R = StdRng> {
    rng: R,
}

impl LogGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> LogGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn rng(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Start position for a new session
    pub fn start_state(&mut self, latitude: f64, longitude: f64, jitter: f64) -> VehicleState {
        VehicleState::near(latitude, longitude, jitter, &mut self.rng)
    }

    /// 90 % FIXED, 8 % LOST, 2 % UNKNOWN
    fn cycle_status(&mut self) -> GpsStatus {
        let draw: f64 = self.rng.gen();
        if draw > 0.10 {
            GpsStatus::Fixed
        } else if draw > 0.02 {
            GpsStatus::Lost
        } else {
            GpsStatus::Unknown
        }
    }

    fn battery_voltage(&mut self) -> u16 {
        (self.rng.gen_range(11.5..14.5) * 10.0) as u16
    }

    /// FIXED 95 % of the time, LOST otherwise
    fn mostly_fixed(&mut self) -> GpsStatus {
        if self.rng.gen_bool(0.95) {
            GpsStatus::Fixed
        } else {
            GpsStatus::Lost
        }
    }

    /// A full reporting cycle of [`CYCLE_SECONDS`] samples starting at `start`.
    ///
    /// The vehicle takes one random step per second and `state` is left at
    /// the final position.
    pub fn gps_cycle(
        &mut self,
        emulator: &Emulator,
        state: &mut VehicleState,
        start: DateTime<Utc>,
    ) -> Result<GpsCycle, ValidationError> {
        let status = self.cycle_status();
        let device = emulator.device_identifier();
        let mut logs = Vec::with_capacity(CYCLE_SECONDS);

        for sec in 0..CYCLE_SECONDS {
            let occurred_time = start + Duration::seconds(sec as i64);
            let builder = GpsLog::builder()
                .device(device)
                .battery_voltage(self.battery_voltage())
                .occurred_time(occurred_time);

            let log = if status == GpsStatus::Unknown {
                builder
                    .gps(GpsInfo::without_position(status)?)
                    .angle(0)
                    .speed(0)
                    .total_trip_meter(state.trip_meter())
                    .build()?
            } else {
                if let Some((to, distance)) = state.random_step(&mut self.rng) {
                    state.latitude = to.0;
                    state.longitude = to.1;
                    state.accumulated_distance += distance;
                }
                let speed = if state.active {
                    self.rng.gen_range(0..=255)
                } else {
                    0
                };
                builder
                    .gps(GpsInfo::new(
                        status,
                        Some(state.latitude),
                        Some(state.longitude),
                    )?)
                    .angle(self.rng.gen_range(0..=359))
                    .speed(speed)
                    .total_trip_meter(state.trip_meter())
                    .build()?
            };
            logs.push(log);
        }

        state.last_update = Some(start + Duration::seconds(CYCLE_SECONDS as i64 - 1));
        GpsCycle::new(logs)
    }

    /// Package realtime samples as a cycle; every sample carries a fix.
    pub fn cycle_from_samples(
        &mut self,
        emulator: &Emulator,
        samples: &[TrackSample],
    ) -> Result<GpsCycle, ValidationError> {
        let device = emulator.device_identifier();
        let logs = samples
            .iter()
            .map(|sample| {
                GpsLog::builder()
                    .device(device)
                    .gps(GpsInfo::fixed(sample.latitude, sample.longitude)?)
                    .angle((sample.heading.round() as u16) % 360)
                    .speed(sample.speed.round().clamp(0.0, 255.0) as u16)
                    .total_trip_meter(sample.trip_meter)
                    .battery_voltage(self.battery_voltage())
                    .occurred_time(sample.occurred_time)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        GpsCycle::new(logs)
    }

    /// Ignition ON at `now`: report the parked position, or no position on
    /// the first start of a session. Marks the vehicle active.
    pub fn power_on(
        &mut self,
        emulator: &Emulator,
        state: &mut VehicleState,
        now: DateTime<Utc>,
    ) -> Result<PowerLog, ValidationError> {
        let gps = match state.parked_position {
            Some((lat, lon)) => GpsInfo::new(self.mostly_fixed(), Some(lat), Some(lon))?,
            None => GpsInfo::without_position(GpsStatus::Lost)?,
        };

        let log = PowerLog::builder()
            .device(emulator.device_identifier())
            .gps(gps)
            .power_status(PowerStatus::On)
            .power_time(now)
            .total_trip_meter(state.trip_meter())
            .angle(self.rng.gen_range(0..=359))
            .speed(0)
            .build()?;

        state.active = true;
        state.last_power_on = Some(now);
        state.speed = 0.0;
        state.last_update = Some(now);
        Ok(log)
    }

    /// Ignition OFF at `now`: report the current position and the time of
    /// the preceding ON. Parks and deactivates the vehicle.
    pub fn power_off(
        &mut self,
        emulator: &Emulator,
        state: &mut VehicleState,
        now: DateTime<Utc>,
    ) -> Result<PowerLog, ValidationError> {
        let on_time = match state.last_power_on {
            Some(on_time) => on_time,
            None => {
                let fallback = now - Duration::hours(1);
                warn!(
                    mdn = %emulator.mdn(),
                    "No power-on time recorded, using {fallback}"
                );
                fallback
            }
        };

        let log = PowerLog::builder()
            .device(emulator.device_identifier())
            .gps(GpsInfo::new(
                self.mostly_fixed(),
                Some(state.latitude),
                Some(state.longitude),
            )?)
            .power_status(PowerStatus::Off)
            .power_time(now)
            .power_on_time(on_time)
            .total_trip_meter(state.trip_meter())
            .angle(self.rng.gen_range(0..=359))
            .speed(self.rng.gen_range(0..=100))
            .build()?;

        state.active = false;
        state.parked_position = Some(state.position());
        state.speed = 0.0;
        Ok(log)
    }

    /// A geofence crossing at the current position
    pub fn geofence(
        &mut self,
        emulator: &Emulator,
        state: &VehicleState,
        geofence_group_id: u64,
        geofence_id: u64,
        event: GeofenceEvent,
        now: DateTime<Utc>,
    ) -> Result<GeofenceLog, ValidationError> {
        let gps = if self.rng.gen_bool(0.95) {
            GpsInfo::fixed(state.latitude, state.longitude)?
        } else if self.rng.gen_bool(0.9) {
            GpsInfo::new(GpsStatus::Lost, Some(state.latitude), Some(state.longitude))?
        } else {
            GpsInfo::without_position(GpsStatus::Unknown)?
        };
        let speed = if state.active {
            self.rng.gen_range(0..=255)
        } else {
            0
        };

        GeofenceLog::builder()
            .device(emulator.device_identifier())
            .geofence_group_id(geofence_group_id)
            .geofence_id(geofence_id)
            .event(event)
            .gps(gps)
            .angle(self.rng.gen_range(0..=359))
            .speed(speed)
            .total_trip_meter(state.trip_meter())
            .occurred_time(now)
            .build()
    }
}
