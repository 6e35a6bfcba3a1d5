//! Data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Highest accepted trip meter value, in metres.
pub const MAX_TRIP_METER: u32 = 9_999_999;

/// Mobile Device Number (MDN)
///
/// Identifies one simulated vehicle terminal. At most 15 decimal digits,
/// never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Mdn(u64);

impl TryFrom<u64> for Mdn {
    type Error = ValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 || value > 999_999_999_999_999 {
            return Err(ValidationError::InvalidMdn(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for Mdn {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidMdn(value.to_string()));
        }
        let parsed = trimmed
            .parse::<u64>()
            .map_err(|_| ValidationError::InvalidMdn(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl FromStr for Mdn {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<Mdn> for u64 {
    fn from(value: Mdn) -> Self {
        value.0
    }
}

impl fmt::Display for Mdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Mdn {
    /// Get the raw MDN value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Which vehicle and terminal a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentifier {
    vehicle_id: u64,
    mdn: Mdn,
}

impl DeviceIdentifier {
    pub fn new(vehicle_id: u64, mdn: Mdn) -> Self {
        Self { vehicle_id, mdn }
    }

    pub fn vehicle_id(&self) -> u64 {
        self.vehicle_id
    }

    pub fn mdn(&self) -> Mdn {
        self.mdn
    }
}

/// Whether the terminal currently has a valid position fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum GpsStatus {
    Fixed,
    Lost,
    #[default]
    Unknown,
}

impl GpsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::Lost => "LOST",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Backend code: `A` = fix, `V` = no fix, `0` = no receiver data.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Fixed => "A",
            Self::Lost => "V",
            Self::Unknown => "0",
        }
    }

    pub fn from_wire_code(code: &str) -> Result<Self, ValidationError> {
        match code {
            "A" => Ok(Self::Fixed),
            "V" => Ok(Self::Lost),
            "0" => Ok(Self::Unknown),
            other => Err(ValidationError::UnknownGpsStatus(other.to_string())),
        }
    }
}

impl FromStr for GpsStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIXED" => Ok(Self::Fixed),
            "LOST" => Ok(Self::Lost),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ValidationError::UnknownGpsStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for GpsStatus {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for GpsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ignition state carried by a power log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum PowerStatus {
    On,
    Off,
    #[default]
    Unknown,
}

impl PowerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for PowerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ValidationError::UnknownPowerStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for PowerStatus {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPS snapshot embedded in every log record.
///
/// Latitude and longitude are WGS84 decimal degrees and are either both
/// present or both absent. A `Fixed` status always carries a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawGpsInfo")]
pub struct GpsInfo {
    gps_status: GpsStatus,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGpsInfo {
    gps_status: GpsStatus,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl TryFrom<RawGpsInfo> for GpsInfo {
    type Error = ValidationError;

    fn try_from(raw: RawGpsInfo) -> Result<Self, Self::Error> {
        Self::new(raw.gps_status, raw.latitude, raw.longitude)
    }
}

impl GpsInfo {
    pub fn new(
        gps_status: GpsStatus,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Self, ValidationError> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(ValidationError::OutOfRange {
                        field: "latitude",
                        value: lat.to_string(),
                    });
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(ValidationError::OutOfRange {
                        field: "longitude",
                        value: lon.to_string(),
                    });
                }
            }
            (None, None) => {
                if gps_status == GpsStatus::Fixed {
                    return Err(ValidationError::MissingPosition);
                }
            }
            _ => return Err(ValidationError::PartialPosition),
        }

        Ok(Self {
            gps_status,
            latitude,
            longitude,
        })
    }

    /// A valid fix at the given position
    pub fn fixed(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        Self::new(GpsStatus::Fixed, Some(latitude), Some(longitude))
    }

    /// No position at all
    pub fn without_position(gps_status: GpsStatus) -> Result<Self, ValidationError> {
        Self::new(gps_status, None, None)
    }

    pub fn gps_status(&self) -> GpsStatus {
        self.gps_status
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    /// `(latitude, longitude)` when a position is present
    pub fn position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

fn check_max<T>(field: &'static str, value: T, max: T) -> Result<T, ValidationError>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Identifiers are persisted as signed 64-bit integers
pub const MAX_ID: u64 = i64::MAX as u64;

fn check_id(field: &'static str, value: u64) -> Result<u64, ValidationError> {
    check_max(field, value, MAX_ID)
}

fn check_device(device: DeviceIdentifier) -> Result<DeviceIdentifier, ValidationError> {
    check_id("vehicleId", device.vehicle_id())?;
    Ok(device)
}

fn check_angle(value: u16) -> Result<u16, ValidationError> {
    check_max("angle", value, 359)
}

fn check_speed(value: u16) -> Result<u16, ValidationError> {
    check_max("speed", value, 255)
}

fn check_trip_meter(value: u32) -> Result<u32, ValidationError> {
    check_max("totalTripMeter", value, MAX_TRIP_METER)
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

/// One per-second telemetry sample of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "GpsLogBuilder")]
pub struct GpsLog {
    device_identifier: DeviceIdentifier,
    gps_info: GpsInfo,
    /// Heading in degrees, 0-359
    angle: u16,
    /// Speed in km/h, 0-255
    speed: u16,
    /// Cumulative distance in metres
    total_trip_meter: u32,
    /// Battery voltage in tenths of a volt
    battery_voltage: u16,
    occurred_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsLogBuilder {
    device_identifier: Option<DeviceIdentifier>,
    gps_info: Option<GpsInfo>,
    angle: Option<u16>,
    speed: Option<u16>,
    total_trip_meter: Option<u32>,
    battery_voltage: Option<u16>,
    occurred_time: Option<DateTime<Utc>>,
}

impl GpsLogBuilder {
    pub fn device(mut self, device: DeviceIdentifier) -> Self {
        self.device_identifier = Some(device);
        self
    }

    pub fn gps(mut self, gps: GpsInfo) -> Self {
        self.gps_info = Some(gps);
        self
    }

    pub fn angle(mut self, angle: u16) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn speed(mut self, speed: u16) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn total_trip_meter(mut self, meters: u32) -> Self {
        self.total_trip_meter = Some(meters);
        self
    }

    pub fn battery_voltage(mut self, decivolts: u16) -> Self {
        self.battery_voltage = Some(decivolts);
        self
    }

    pub fn occurred_time(mut self, time: DateTime<Utc>) -> Self {
        self.occurred_time = Some(time);
        self
    }

    pub fn build(self) -> Result<GpsLog, ValidationError> {
        Ok(GpsLog {
            device_identifier: check_device(require(self.device_identifier, "deviceIdentifier")?)?,
            gps_info: require(self.gps_info, "gpsInfo")?,
            angle: check_angle(require(self.angle, "angle")?)?,
            speed: check_speed(require(self.speed, "speed")?)?,
            total_trip_meter: check_trip_meter(require(self.total_trip_meter, "totalTripMeter")?)?,
            battery_voltage: check_max(
                "batteryVoltage",
                require(self.battery_voltage, "batteryVoltage")?,
                9999,
            )?,
            occurred_time: require(self.occurred_time, "occurredTime")?,
        })
    }
}

impl TryFrom<GpsLogBuilder> for GpsLog {
    type Error = ValidationError;

    fn try_from(builder: GpsLogBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl GpsLog {
    pub fn builder() -> GpsLogBuilder {
        GpsLogBuilder::default()
    }

    pub fn device_identifier(&self) -> DeviceIdentifier {
        self.device_identifier
    }

    pub fn gps_info(&self) -> GpsInfo {
        self.gps_info
    }

    pub fn angle(&self) -> u16 {
        self.angle
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    pub fn total_trip_meter(&self) -> u32 {
        self.total_trip_meter
    }

    pub fn battery_voltage(&self) -> u16 {
        self.battery_voltage
    }

    pub fn occurred_time(&self) -> DateTime<Utc> {
        self.occurred_time
    }
}

/// An ignition (power) state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PowerLogBuilder")]
pub struct PowerLog {
    device_identifier: DeviceIdentifier,
    gps_info: GpsInfo,
    power_status: PowerStatus,
    power_time: DateTime<Utc>,
    total_trip_meter: Option<u32>,
    angle: Option<u16>,
    speed: Option<u16>,
    /// For an OFF transition, when the ignition was switched on
    power_on_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerLogBuilder {
    device_identifier: Option<DeviceIdentifier>,
    gps_info: Option<GpsInfo>,
    power_status: Option<PowerStatus>,
    power_time: Option<DateTime<Utc>>,
    total_trip_meter: Option<u32>,
    angle: Option<u16>,
    speed: Option<u16>,
    power_on_time: Option<DateTime<Utc>>,
}

impl PowerLogBuilder {
    pub fn device(mut self, device: DeviceIdentifier) -> Self {
        self.device_identifier = Some(device);
        self
    }

    pub fn gps(mut self, gps: GpsInfo) -> Self {
        self.gps_info = Some(gps);
        self
    }

    pub fn power_status(mut self, status: PowerStatus) -> Self {
        self.power_status = Some(status);
        self
    }

    pub fn power_time(mut self, time: DateTime<Utc>) -> Self {
        self.power_time = Some(time);
        self
    }

    pub fn total_trip_meter(mut self, meters: u32) -> Self {
        self.total_trip_meter = Some(meters);
        self
    }

    pub fn angle(mut self, angle: u16) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn speed(mut self, speed: u16) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn power_on_time(mut self, time: DateTime<Utc>) -> Self {
        self.power_on_time = Some(time);
        self
    }

    pub fn build(self) -> Result<PowerLog, ValidationError> {
        Ok(PowerLog {
            device_identifier: check_device(require(self.device_identifier, "deviceIdentifier")?)?,
            gps_info: require(self.gps_info, "gpsInfo")?,
            power_status: require(self.power_status, "powerStatus")?,
            power_time: require(self.power_time, "powerTime")?,
            total_trip_meter: self.total_trip_meter.map(check_trip_meter).transpose()?,
            angle: self.angle.map(check_angle).transpose()?,
            speed: self.speed.map(check_speed).transpose()?,
            power_on_time: self.power_on_time,
        })
    }
}

impl TryFrom<PowerLogBuilder> for PowerLog {
    type Error = ValidationError;

    fn try_from(builder: PowerLogBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl PowerLog {
    pub fn builder() -> PowerLogBuilder {
        PowerLogBuilder::default()
    }

    pub fn device_identifier(&self) -> DeviceIdentifier {
        self.device_identifier
    }

    pub fn gps_info(&self) -> GpsInfo {
        self.gps_info
    }

    pub fn power_status(&self) -> PowerStatus {
        self.power_status
    }

    pub fn power_time(&self) -> DateTime<Utc> {
        self.power_time
    }

    pub fn total_trip_meter(&self) -> Option<u32> {
        self.total_trip_meter
    }

    pub fn angle(&self) -> Option<u16> {
        self.angle
    }

    pub fn speed(&self) -> Option<u16> {
        self.speed
    }

    pub fn power_on_time(&self) -> Option<DateTime<Utc>> {
        self.power_on_time
    }
}

/// Direction of a geofence boundary crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceEvent {
    Enter,
    Exit,
}

impl GeofenceEvent {
    /// Persisted boolean: `true` on enter
    pub fn event_val(&self) -> bool {
        matches!(self, Self::Enter)
    }

    pub fn from_event_val(value: bool) -> Self {
        if value {
            Self::Enter
        } else {
            Self::Exit
        }
    }
}

impl FromStr for GeofenceEvent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enter" | "in" | "1" => Ok(Self::Enter),
            "exit" | "out" | "2" => Ok(Self::Exit),
            _ => Err(ValidationError::OutOfRange {
                field: "eventVal",
                value: s.to_string(),
            }),
        }
    }
}

/// A geofence boundary crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "GeofenceLogBuilder")]
pub struct GeofenceLog {
    device_identifier: DeviceIdentifier,
    geofence_group_id: u64,
    geofence_id: u64,
    event_val: bool,
    gps_info: GpsInfo,
    angle: u16,
    speed: Option<u16>,
    total_trip_meter: Option<u32>,
    occurred_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceLogBuilder {
    device_identifier: Option<DeviceIdentifier>,
    geofence_group_id: Option<u64>,
    geofence_id: Option<u64>,
    event_val: Option<bool>,
    gps_info: Option<GpsInfo>,
    angle: Option<u16>,
    speed: Option<u16>,
    total_trip_meter: Option<u32>,
    occurred_time: Option<DateTime<Utc>>,
}

impl GeofenceLogBuilder {
    pub fn device(mut self, device: DeviceIdentifier) -> Self {
        self.device_identifier = Some(device);
        self
    }

    pub fn geofence_group_id(mut self, id: u64) -> Self {
        self.geofence_group_id = Some(id);
        self
    }

    pub fn geofence_id(mut self, id: u64) -> Self {
        self.geofence_id = Some(id);
        self
    }

    pub fn event(mut self, event: GeofenceEvent) -> Self {
        self.event_val = Some(event.event_val());
        self
    }

    pub fn gps(mut self, gps: GpsInfo) -> Self {
        self.gps_info = Some(gps);
        self
    }

    pub fn angle(mut self, angle: u16) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn speed(mut self, speed: u16) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn total_trip_meter(mut self, meters: u32) -> Self {
        self.total_trip_meter = Some(meters);
        self
    }

    pub fn occurred_time(mut self, time: DateTime<Utc>) -> Self {
        self.occurred_time = Some(time);
        self
    }

    pub fn build(self) -> Result<GeofenceLog, ValidationError> {
        Ok(GeofenceLog {
            device_identifier: check_device(require(self.device_identifier, "deviceIdentifier")?)?,
            geofence_group_id: check_id(
                "geofenceGroupId",
                require(self.geofence_group_id, "geofenceGroupId")?,
            )?,
            geofence_id: check_id("geofenceId", require(self.geofence_id, "geofenceId")?)?,
            event_val: require(self.event_val, "eventVal")?,
            gps_info: require(self.gps_info, "gpsInfo")?,
            angle: check_angle(require(self.angle, "angle")?)?,
            speed: self.speed.map(check_speed).transpose()?,
            total_trip_meter: self.total_trip_meter.map(check_trip_meter).transpose()?,
            occurred_time: require(self.occurred_time, "occurredTime")?,
        })
    }
}

impl TryFrom<GeofenceLogBuilder> for GeofenceLog {
    type Error = ValidationError;

    fn try_from(builder: GeofenceLogBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl GeofenceLog {
    pub fn builder() -> GeofenceLogBuilder {
        GeofenceLogBuilder::default()
    }

    pub fn device_identifier(&self) -> DeviceIdentifier {
        self.device_identifier
    }

    pub fn geofence_group_id(&self) -> u64 {
        self.geofence_group_id
    }

    pub fn geofence_id(&self) -> u64 {
        self.geofence_id
    }

    pub fn event_val(&self) -> bool {
        self.event_val
    }

    pub fn event(&self) -> GeofenceEvent {
        GeofenceEvent::from_event_val(self.event_val)
    }

    pub fn gps_info(&self) -> GpsInfo {
        self.gps_info
    }

    pub fn angle(&self) -> u16 {
        self.angle
    }

    pub fn speed(&self) -> Option<u16> {
        self.speed
    }

    pub fn total_trip_meter(&self) -> Option<u32> {
        self.total_trip_meter
    }

    pub fn occurred_time(&self) -> DateTime<Utc> {
        self.occurred_time
    }
}

/// Static registration metadata of one simulated terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EmulatorBuilder")]
pub struct Emulator {
    mdn: Mdn,
    vehicle_id: u64,
    terminal_id: String,
    manufacture_id: u32,
    packet_version: u32,
    device_id: u32,
    device_firmware_version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmulatorBuilder {
    mdn: Option<Mdn>,
    vehicle_id: Option<u64>,
    terminal_id: Option<String>,
    manufacture_id: Option<u32>,
    packet_version: Option<u32>,
    device_id: Option<u32>,
    device_firmware_version: Option<String>,
}

impl EmulatorBuilder {
    pub fn mdn(mut self, mdn: Mdn) -> Self {
        self.mdn = Some(mdn);
        self
    }

    pub fn vehicle_id(mut self, id: u64) -> Self {
        self.vehicle_id = Some(id);
        self
    }

    pub fn terminal_id(mut self, id: impl Into<String>) -> Self {
        self.terminal_id = Some(id.into());
        self
    }

    pub fn manufacture_id(mut self, id: u32) -> Self {
        self.manufacture_id = Some(id);
        self
    }

    pub fn packet_version(mut self, version: u32) -> Self {
        self.packet_version = Some(version);
        self
    }

    pub fn device_id(mut self, id: u32) -> Self {
        self.device_id = Some(id);
        self
    }

    pub fn device_firmware_version(mut self, version: impl Into<String>) -> Self {
        self.device_firmware_version = Some(version.into());
        self
    }

    pub fn build(self) -> Result<Emulator, ValidationError> {
        let terminal_id = require(self.terminal_id, "terminalId")?;
        if terminal_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("terminalId"));
        }
        let device_firmware_version =
            require(self.device_firmware_version, "deviceFirmwareVersion")?;
        if device_firmware_version.trim().is_empty() {
            return Err(ValidationError::EmptyField("deviceFirmwareVersion"));
        }

        Ok(Emulator {
            mdn: require(self.mdn, "mdn")?,
            vehicle_id: check_id("vehicleId", require(self.vehicle_id, "vehicleId")?)?,
            terminal_id,
            manufacture_id: require(self.manufacture_id, "manufactureId")?,
            packet_version: require(self.packet_version, "packetVersion")?,
            device_id: require(self.device_id, "deviceId")?,
            device_firmware_version,
        })
    }
}

impl TryFrom<EmulatorBuilder> for Emulator {
    type Error = ValidationError;

    fn try_from(builder: EmulatorBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl Emulator {
    pub fn builder() -> EmulatorBuilder {
        EmulatorBuilder::default()
    }

    pub fn mdn(&self) -> Mdn {
        self.mdn
    }

    pub fn vehicle_id(&self) -> u64 {
        self.vehicle_id
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }

    pub fn manufacture_id(&self) -> u32 {
        self.manufacture_id
    }

    pub fn packet_version(&self) -> u32 {
        self.packet_version
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn device_firmware_version(&self) -> &str {
        &self.device_firmware_version
    }

    pub fn device_identifier(&self) -> DeviceIdentifier {
        DeviceIdentifier::new(self.vehicle_id, self.mdn)
    }
}

/// A record as written by the storage layer, with its audit fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: T,
}

/// Log stream a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogKind {
    Gps,
    Power,
    Geofence,
}

impl LogKind {
    pub const ALL: [LogKind; 3] = [LogKind::Gps, LogKind::Power, LogKind::Geofence];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Power => "power",
            Self::Geofence => "geofence",
        }
    }

    /// Backend path receiving this stream
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Gps => "/api/logs/gps",
            Self::Power => "/api/logs/power",
            Self::Geofence => "/api/logs/geofence",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One reporting cycle of GPS samples for a single terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsCycle {
    logs: Vec<GpsLog>,
}

impl GpsCycle {
    pub fn new(logs: Vec<GpsLog>) -> Result<Self, ValidationError> {
        let first = logs.first().ok_or(ValidationError::MissingField("gpsLogs"))?;
        let mdn = first.device_identifier().mdn();
        if let Some(other) = logs.iter().find(|log| log.device_identifier().mdn() != mdn) {
            return Err(ValidationError::InvalidMdn(
                other.device_identifier().mdn().to_string(),
            ));
        }
        Ok(Self { logs })
    }

    pub fn logs(&self) -> &[GpsLog] {
        &self.logs
    }

    pub fn mdn(&self) -> Mdn {
        self.logs[0].device_identifier().mdn()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Time of the first sample
    pub fn started_at(&self) -> DateTime<Utc> {
        self.logs[0].occurred_time()
    }
}

/// Unit of delivery to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum LogReport {
    GpsCycle(GpsCycle),
    Power(PowerLog),
    Geofence(GeofenceLog),
}

impl LogReport {
    pub fn kind(&self) -> LogKind {
        match self {
            Self::GpsCycle(_) => LogKind::Gps,
            Self::Power(_) => LogKind::Power,
            Self::Geofence(_) => LogKind::Geofence,
        }
    }

    pub fn mdn(&self) -> Mdn {
        match self {
            Self::GpsCycle(cycle) => cycle.mdn(),
            Self::Power(log) => log.device_identifier().mdn(),
            Self::Geofence(log) => log.device_identifier().mdn(),
        }
    }

    /// Number of individual records in the report
    pub fn record_count(&self) -> usize {
        match self {
            Self::GpsCycle(cycle) => cycle.len(),
            Self::Power(_) | Self::Geofence(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn device() -> DeviceIdentifier {
        DeviceIdentifier::new(1, Mdn::try_from(1234567890).unwrap())
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    fn sample_gps_log() -> GpsLog {
        GpsLog::builder()
            .device(device())
            .gps(GpsInfo::fixed(37.5665, 126.9780).unwrap())
            .angle(90)
            .speed(40)
            .total_trip_meter(1500)
            .battery_voltage(12)
            .occurred_time(time())
            .build()
            .unwrap()
    }

    #[test]
    fn mdn_parsing() {
        assert_eq!(Mdn::try_from("01012345678").unwrap().value(), 1012345678);
        assert_eq!(" 1234567890 ".parse::<Mdn>().unwrap().value(), 1234567890);
        assert!(Mdn::try_from("").is_err());
        assert!(Mdn::try_from("12ab").is_err());
        assert!(Mdn::try_from("-12").is_err());
        assert!(Mdn::try_from(0).is_err());
        assert!(Mdn::try_from(1_000_000_000_000_000).is_err());
    }

    #[test]
    fn gps_log_round_trip() {
        let log = sample_gps_log();

        assert_eq!(log.device_identifier().mdn().value(), 1234567890);
        assert_eq!(log.device_identifier().vehicle_id(), 1);
        assert_eq!(log.gps_info().gps_status(), GpsStatus::Fixed);
        assert_eq!(log.gps_info().latitude(), Some(37.5665));
        assert_eq!(log.gps_info().longitude(), Some(126.9780));
        assert_eq!(log.angle(), 90);
        assert_eq!(log.speed(), 40);
        assert_eq!(log.total_trip_meter(), 1500);
        assert_eq!(log.battery_voltage(), 12);
        assert_eq!(log.occurred_time(), time());
    }

    #[test]
    fn gps_log_missing_occurred_time() {
        let result = GpsLog::builder()
            .device(device())
            .gps(GpsInfo::fixed(37.5665, 126.9780).unwrap())
            .angle(90)
            .speed(40)
            .total_trip_meter(1500)
            .battery_voltage(12)
            .build();

        assert_eq!(result, Err(ValidationError::MissingField("occurredTime")));
    }

    #[test]
    fn gps_log_rejects_out_of_range_values() {
        let base = || {
            GpsLog::builder()
                .device(device())
                .gps(GpsInfo::fixed(37.5665, 126.9780).unwrap())
                .angle(90)
                .speed(40)
                .total_trip_meter(1500)
                .battery_voltage(120)
                .occurred_time(time())
        };

        assert!(base().angle(360).build().is_err());
        assert!(base().speed(256).build().is_err());
        assert!(base().total_trip_meter(MAX_TRIP_METER + 1).build().is_err());
        assert!(base().battery_voltage(10_000).build().is_err());
        assert!(base().build().is_ok());
    }

    #[test]
    fn fixed_requires_position() {
        assert_eq!(
            GpsInfo::new(GpsStatus::Fixed, None, None),
            Err(ValidationError::MissingPosition)
        );
        assert_eq!(
            GpsInfo::new(GpsStatus::Lost, Some(37.0), None),
            Err(ValidationError::PartialPosition)
        );
        assert!(GpsInfo::new(GpsStatus::Fixed, Some(91.0), Some(0.0)).is_err());
        assert!(GpsInfo::new(GpsStatus::Fixed, Some(0.0), Some(-181.0)).is_err());

        let lost = GpsInfo::without_position(GpsStatus::Lost).unwrap();
        assert_eq!(lost.position(), None);
        let unknown = GpsInfo::new(GpsStatus::Unknown, Some(1.0), Some(2.0)).unwrap();
        assert_eq!(unknown.position(), Some((1.0, 2.0)));
    }

    #[test]
    fn status_decoding() {
        assert_eq!("FIXED".parse::<GpsStatus>().unwrap(), GpsStatus::Fixed);
        assert_eq!("lost".parse::<GpsStatus>().unwrap(), GpsStatus::Lost);
        assert_eq!("Unknown".parse::<GpsStatus>().unwrap(), GpsStatus::Unknown);
        assert_eq!(
            "DRIFTING".parse::<GpsStatus>(),
            Err(ValidationError::UnknownGpsStatus("DRIFTING".to_string()))
        );

        assert_eq!(GpsStatus::from_wire_code("A").unwrap(), GpsStatus::Fixed);
        assert_eq!(GpsStatus::from_wire_code("V").unwrap(), GpsStatus::Lost);
        assert_eq!(GpsStatus::from_wire_code("0").unwrap(), GpsStatus::Unknown);
        assert!(GpsStatus::from_wire_code("P").is_err());

        assert_eq!("on".parse::<PowerStatus>().unwrap(), PowerStatus::On);
        assert_eq!("OFF".parse::<PowerStatus>().unwrap(), PowerStatus::Off);
        assert!("STANDBY".parse::<PowerStatus>().is_err());

        assert_eq!(GpsStatus::default(), GpsStatus::Unknown);
        assert_eq!(PowerStatus::default(), PowerStatus::Unknown);
    }

    #[test]
    fn status_deserialization_rejects_unknown_values() {
        let status: GpsStatus = serde_json::from_str(r#""FIXED""#).unwrap();
        assert_eq!(status, GpsStatus::Fixed);
        assert!(serde_json::from_str::<GpsStatus>(r#""SOMETIMES""#).is_err());
        assert!(serde_json::from_str::<PowerStatus>(r#""HALF""#).is_err());
    }

    #[test]
    fn gps_log_json() {
        let log = sample_gps_log();
        let value = serde_json::to_value(&log).unwrap();

        assert_eq!(value["deviceIdentifier"]["mdn"], 1234567890);
        assert_eq!(value["deviceIdentifier"]["vehicleId"], 1);
        assert_eq!(value["gpsInfo"]["gpsStatus"], "FIXED");
        assert_eq!(value["totalTripMeter"], 1500);

        let parsed: GpsLog = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, log);
    }

    #[test]
    fn gps_log_json_validates() {
        let s = r#"{
            "deviceIdentifier": {"vehicleId": 1, "mdn": 1234567890},
            "gpsInfo": {"gpsStatus": "FIXED", "latitude": null, "longitude": null},
            "angle": 0,
            "speed": 0,
            "totalTripMeter": 0,
            "batteryVoltage": 120,
            "occurredTime": "2024-05-01T09:30:00Z"
        }"#;
        assert!(serde_json::from_str::<GpsLog>(s).is_err());

        let missing_time = r#"{
            "deviceIdentifier": {"vehicleId": 1, "mdn": 1234567890},
            "gpsInfo": {"gpsStatus": "LOST", "latitude": null, "longitude": null},
            "angle": 0,
            "speed": 0,
            "totalTripMeter": 0,
            "batteryVoltage": 120
        }"#;
        assert!(serde_json::from_str::<GpsLog>(missing_time).is_err());
    }

    #[test]
    fn power_log_round_trip() {
        let on_time = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let log = PowerLog::builder()
            .device(device())
            .gps(GpsInfo::fixed(37.5665, 126.9780).unwrap())
            .power_status(PowerStatus::Off)
            .power_time(time())
            .total_trip_meter(4200)
            .speed(30)
            .angle(180)
            .power_on_time(on_time)
            .build()
            .unwrap();

        assert_eq!(log.power_status(), PowerStatus::Off);
        assert_eq!(log.power_time(), time());
        assert_eq!(log.total_trip_meter(), Some(4200));
        assert_eq!(log.speed(), Some(30));
        assert_eq!(log.angle(), Some(180));
        assert_eq!(log.power_on_time(), Some(on_time));

        let minimal = PowerLog::builder()
            .device(device())
            .gps(GpsInfo::without_position(GpsStatus::Lost).unwrap())
            .power_status(PowerStatus::On)
            .power_time(time())
            .build()
            .unwrap();
        assert_eq!(minimal.total_trip_meter(), None);

        let missing = PowerLog::builder()
            .device(device())
            .gps(GpsInfo::without_position(GpsStatus::Lost).unwrap())
            .power_time(time())
            .build();
        assert_eq!(missing, Err(ValidationError::MissingField("powerStatus")));
    }

    #[test]
    fn geofence_log_round_trip() {
        let log = GeofenceLog::builder()
            .device(device())
            .geofence_group_id(7)
            .geofence_id(42)
            .event(GeofenceEvent::Exit)
            .gps(GpsInfo::fixed(37.5, 127.0).unwrap())
            .angle(270)
            .occurred_time(time())
            .build()
            .unwrap();

        assert_eq!(log.geofence_group_id(), 7);
        assert_eq!(log.geofence_id(), 42);
        assert!(!log.event_val());
        assert_eq!(log.event(), GeofenceEvent::Exit);
        assert_eq!(log.angle(), 270);
        assert_eq!(log.occurred_time(), time());
        assert_eq!(log.speed(), None);

        let missing = GeofenceLog::builder()
            .device(device())
            .geofence_group_id(7)
            .event(GeofenceEvent::Enter)
            .gps(GpsInfo::fixed(37.5, 127.0).unwrap())
            .angle(270)
            .occurred_time(time())
            .build();
        assert_eq!(missing, Err(ValidationError::MissingField("geofenceId")));
    }

    #[test]
    fn identifiers_must_fit_bigint() {
        let geofence = |group: u64, id: u64| {
            GeofenceLog::builder()
                .device(device())
                .geofence_group_id(group)
                .geofence_id(id)
                .event(GeofenceEvent::Enter)
                .gps(GpsInfo::fixed(37.5, 127.0).unwrap())
                .angle(0)
                .occurred_time(time())
                .build()
        };
        assert!(geofence(MAX_ID, MAX_ID).is_ok());
        assert_eq!(
            geofence(7, u64::MAX),
            Err(ValidationError::OutOfRange {
                field: "geofenceId",
                value: u64::MAX.to_string(),
            })
        );
        assert!(matches!(
            geofence(MAX_ID + 1, 1),
            Err(ValidationError::OutOfRange {
                field: "geofenceGroupId",
                ..
            })
        ));

        let mdn = Mdn::try_from(1234567890).unwrap();
        let gps = GpsLog::builder()
            .device(DeviceIdentifier::new(u64::MAX, mdn))
            .gps(GpsInfo::fixed(37.5665, 126.9780).unwrap())
            .angle(90)
            .speed(40)
            .total_trip_meter(1500)
            .battery_voltage(12)
            .occurred_time(time())
            .build();
        assert!(matches!(
            gps,
            Err(ValidationError::OutOfRange {
                field: "vehicleId",
                ..
            })
        ));

        let emulator = Emulator::builder()
            .mdn(mdn)
            .vehicle_id(MAX_ID + 1)
            .terminal_id("A001")
            .manufacture_id(6)
            .packet_version(5)
            .device_id(1)
            .device_firmware_version("1.0.0")
            .build();
        assert!(matches!(
            emulator,
            Err(ValidationError::OutOfRange {
                field: "vehicleId",
                ..
            })
        ));
    }

    #[test]
    fn geofence_event_parsing() {
        assert_eq!("enter".parse::<GeofenceEvent>().unwrap(), GeofenceEvent::Enter);
        assert_eq!("2".parse::<GeofenceEvent>().unwrap(), GeofenceEvent::Exit);
        assert!("sideways".parse::<GeofenceEvent>().is_err());
    }

    #[test]
    fn emulator_round_trip() {
        let mdn = Mdn::try_from(1234567890).unwrap();
        let emulator = Emulator::builder()
            .mdn(mdn)
            .vehicle_id(3)
            .terminal_id("A001")
            .manufacture_id(6)
            .packet_version(5)
            .device_id(1)
            .device_firmware_version("1.0.0")
            .build()
            .unwrap();

        assert_eq!(emulator.mdn(), mdn);
        assert_eq!(emulator.vehicle_id(), 3);
        assert_eq!(emulator.terminal_id(), "A001");
        assert_eq!(emulator.manufacture_id(), 6);
        assert_eq!(emulator.packet_version(), 5);
        assert_eq!(emulator.device_id(), 1);
        assert_eq!(emulator.device_firmware_version(), "1.0.0");
        assert_eq!(emulator.device_identifier(), DeviceIdentifier::new(3, mdn));
    }

    #[test]
    fn emulator_requires_all_fields() {
        let mdn = Mdn::try_from(1234567890).unwrap();
        let result = Emulator::builder()
            .mdn(mdn)
            .vehicle_id(3)
            .terminal_id("A001")
            .manufacture_id(6)
            .device_id(1)
            .device_firmware_version("1.0.0")
            .build();
        assert_eq!(result, Err(ValidationError::MissingField("packetVersion")));

        let blank = Emulator::builder()
            .mdn(mdn)
            .vehicle_id(3)
            .terminal_id("  ")
            .manufacture_id(6)
            .packet_version(5)
            .device_id(1)
            .device_firmware_version("1.0.0")
            .build();
        assert_eq!(blank, Err(ValidationError::EmptyField("terminalId")));
    }

    #[test]
    fn gps_cycle_requires_single_terminal() {
        assert!(GpsCycle::new(vec![]).is_err());

        let log = sample_gps_log();
        let other = GpsLog::builder()
            .device(DeviceIdentifier::new(2, Mdn::try_from(5550001111).unwrap()))
            .gps(GpsInfo::without_position(GpsStatus::Unknown).unwrap())
            .angle(0)
            .speed(0)
            .total_trip_meter(0)
            .battery_voltage(120)
            .occurred_time(time())
            .build()
            .unwrap();
        assert!(GpsCycle::new(vec![log.clone(), other]).is_err());

        let cycle = GpsCycle::new(vec![log.clone(), log]).unwrap();
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle.started_at(), time());

        let report = LogReport::GpsCycle(cycle);
        assert_eq!(report.kind(), LogKind::Gps);
        assert_eq!(report.mdn().value(), 1234567890);
        assert_eq!(report.record_count(), 2);
    }
}
