// src/database/models.rs
use chrono::{DateTime, Utc};

use super::types::{unsigned, DbMdn};
use crate::errors::ValidationError;
use crate::models::{
    DeviceIdentifier, Emulator, GeofenceEvent, GeofenceLog, GpsInfo, GpsLog, PowerLog, Stored,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EmulatorRow {
    mdn: DbMdn,
    vehicle_id: i64,
    terminal_id: String,
    manufacture_id: i64,
    packet_version: i64,
    device_id: i64,
    device_firmware_version: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GpsLogRow {
    id: i64,
    vehicle_id: i64,
    mdn: DbMdn,
    gps_status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    angle: i16,
    speed: i16,
    total_trip_meter: i32,
    battery_voltage: i16,
    occurred_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PowerLogRow {
    id: i64,
    vehicle_id: i64,
    mdn: DbMdn,
    gps_status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    power_status: String,
    power_time: DateTime<Utc>,
    total_trip_meter: Option<i32>,
    angle: Option<i16>,
    speed: Option<i16>,
    power_on_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GeofenceLogRow {
    id: i64,
    vehicle_id: i64,
    mdn: DbMdn,
    geofence_group_id: i64,
    geofence_id: i64,
    event_val: bool,
    gps_status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    angle: i16,
    speed: Option<i16>,
    total_trip_meter: Option<i32>,
    occurred_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn device(vehicle_id: i64, mdn: DbMdn) -> Result<DeviceIdentifier, ValidationError> {
    Ok(DeviceIdentifier::new(
        unsigned("vehicleId", vehicle_id)?,
        mdn.try_into()?,
    ))
}

fn gps(
    status: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<GpsInfo, ValidationError> {
    GpsInfo::new(status.parse()?, latitude, longitude)
}

impl TryFrom<EmulatorRow> for Stored<Emulator> {
    type Error = ValidationError;

    fn try_from(row: EmulatorRow) -> Result<Self, Self::Error> {
        let mdn = row.mdn.try_into()?;
        let record = Emulator::builder()
            .mdn(mdn)
            .vehicle_id(unsigned("vehicleId", row.vehicle_id)?)
            .terminal_id(row.terminal_id)
            .manufacture_id(unsigned("manufactureId", row.manufacture_id)?)
            .packet_version(unsigned("packetVersion", row.packet_version)?)
            .device_id(unsigned("deviceId", row.device_id)?)
            .device_firmware_version(row.device_firmware_version)
            .build()?;

        Ok(Stored {
            id: row.mdn.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            record,
        })
    }
}

impl TryFrom<GpsLogRow> for Stored<GpsLog> {
    type Error = ValidationError;

    fn try_from(row: GpsLogRow) -> Result<Self, Self::Error> {
        let record = GpsLog::builder()
            .device(device(row.vehicle_id, row.mdn)?)
            .gps(gps(&row.gps_status, row.latitude, row.longitude)?)
            .angle(unsigned("angle", row.angle)?)
            .speed(unsigned("speed", row.speed)?)
            .total_trip_meter(unsigned("totalTripMeter", row.total_trip_meter)?)
            .battery_voltage(unsigned("batteryVoltage", row.battery_voltage)?)
            .occurred_time(row.occurred_time)
            .build()?;

        Ok(Stored {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            record,
        })
    }
}

impl TryFrom<PowerLogRow> for Stored<PowerLog> {
    type Error = ValidationError;

    fn try_from(row: PowerLogRow) -> Result<Self, Self::Error> {
        let mut builder = PowerLog::builder()
            .device(device(row.vehicle_id, row.mdn)?)
            .gps(gps(&row.gps_status, row.latitude, row.longitude)?)
            .power_status(row.power_status.parse()?)
            .power_time(row.power_time);
        if let Some(meters) = row.total_trip_meter {
            builder = builder.total_trip_meter(unsigned("totalTripMeter", meters)?);
        }
        if let Some(angle) = row.angle {
            builder = builder.angle(unsigned("angle", angle)?);
        }
        if let Some(speed) = row.speed {
            builder = builder.speed(unsigned("speed", speed)?);
        }
        if let Some(on_time) = row.power_on_time {
            builder = builder.power_on_time(on_time);
        }

        Ok(Stored {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            record: builder.build()?,
        })
    }
}

impl TryFrom<GeofenceLogRow> for Stored<GeofenceLog> {
    type Error = ValidationError;

    fn try_from(row: GeofenceLogRow) -> Result<Self, Self::Error> {
        let mut builder = GeofenceLog::builder()
            .device(device(row.vehicle_id, row.mdn)?)
            .geofence_group_id(unsigned("geofenceGroupId", row.geofence_group_id)?)
            .geofence_id(unsigned("geofenceId", row.geofence_id)?)
            .event(GeofenceEvent::from_event_val(row.event_val))
            .gps(gps(&row.gps_status, row.latitude, row.longitude)?)
            .angle(unsigned("angle", row.angle)?)
            .occurred_time(row.occurred_time);
        if let Some(speed) = row.speed {
            builder = builder.speed(unsigned("speed", speed)?);
        }
        if let Some(meters) = row.total_trip_meter {
            builder = builder.total_trip_meter(unsigned("totalTripMeter", meters)?);
        }

        Ok(Stored {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            record: builder.build()?,
        })
    }
}
