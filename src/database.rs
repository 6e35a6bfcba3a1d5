// src/database.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info};

use crate::{
    errors::EmulatorError,
    models::{Emulator, GeofenceLog, GpsLog, LogReport, Mdn, PowerLog, Stored},
};

mod models;
mod types;

use self::models::{EmulatorRow, GeofenceLogRow, GpsLogRow, PowerLogRow};
use self::types::{signed, DbMdn};

/// Append-only store for emulators and their logs
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Wrap an existing pool and bring the schema up to date
    pub async fn new(pool: PgPool) -> Result<Self, EmulatorError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Connect to `url` and run migrations
    pub async fn connect(url: &str) -> Result<Self, EmulatorError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                EmulatorError::DatabaseConnectionError(e.to_string())
            })?;
        Self::new(pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or refresh an emulator's registration
    pub async fn register_emulator(
        &self,
        emulator: &Emulator,
    ) -> Result<Stored<Emulator>, EmulatorError> {
        let row: EmulatorRow = sqlx::query_as(
            "INSERT INTO emulator (
                mdn, vehicle_id, terminal_id, manufacture_id,
                packet_version, device_id, device_firmware_version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (mdn) DO UPDATE SET
                vehicle_id = EXCLUDED.vehicle_id,
                terminal_id = EXCLUDED.terminal_id,
                manufacture_id = EXCLUDED.manufacture_id,
                packet_version = EXCLUDED.packet_version,
                device_id = EXCLUDED.device_id,
                device_firmware_version = EXCLUDED.device_firmware_version,
                updated_at = now()
            RETURNING *",
        )
        .bind(DbMdn::from(emulator.mdn()))
        .bind(signed("vehicleId", emulator.vehicle_id())?)
        .bind(emulator.terminal_id())
        .bind(i64::from(emulator.manufacture_id()))
        .bind(i64::from(emulator.packet_version()))
        .bind(i64::from(emulator.device_id()))
        .bind(emulator.device_firmware_version())
        .fetch_one(&self.pool)
        .await?;

        debug!(mdn = %emulator.mdn(), "Registered emulator");
        Ok(row.try_into()?)
    }

    pub async fn find_emulator(
        &self,
        mdn: Mdn,
    ) -> Result<Option<Stored<Emulator>>, EmulatorError> {
        let row: Option<EmulatorRow> = sqlx::query_as("SELECT * FROM emulator WHERE mdn = $1")
            .bind(DbMdn::from(mdn))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Stored::<Emulator>::try_from).transpose()?)
    }

    /// Insert a batch of GPS logs in one transaction
    pub async fn insert_gps_logs(
        &self,
        logs: &[GpsLog],
    ) -> Result<Vec<Stored<GpsLog>>, EmulatorError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(logs.len());
        for log in logs {
            stored.push(Self::insert_gps_log(&mut tx, log).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn insert_gps_log(
        tx: &mut Transaction<'_, Postgres>,
        log: &GpsLog,
    ) -> Result<Stored<GpsLog>, EmulatorError> {
        let device = log.device_identifier();
        let gps = log.gps_info();
        let row: GpsLogRow = sqlx::query_as(
            "INSERT INTO gps_log (
                vehicle_id, mdn, gps_status, latitude, longitude, angle,
                speed, total_trip_meter, battery_voltage, occurred_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
        )
        .bind(signed("vehicleId", device.vehicle_id())?)
        .bind(DbMdn::from(device.mdn()))
        .bind(gps.gps_status().as_str())
        .bind(gps.latitude())
        .bind(gps.longitude())
        .bind(log.angle() as i16)
        .bind(log.speed() as i16)
        .bind(log.total_trip_meter() as i32)
        .bind(log.battery_voltage() as i16)
        .bind(log.occurred_time())
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.try_into()?)
    }

    pub async fn insert_power_log(
        &self,
        log: &PowerLog,
    ) -> Result<Stored<PowerLog>, EmulatorError> {
        let device = log.device_identifier();
        let gps = log.gps_info();
        let row: PowerLogRow = sqlx::query_as(
            "INSERT INTO power_log (
                vehicle_id, mdn, gps_status, latitude, longitude, power_status,
                power_time, total_trip_meter, angle, speed, power_on_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *",
        )
        .bind(signed("vehicleId", device.vehicle_id())?)
        .bind(DbMdn::from(device.mdn()))
        .bind(gps.gps_status().as_str())
        .bind(gps.latitude())
        .bind(gps.longitude())
        .bind(log.power_status().as_str())
        .bind(log.power_time())
        .bind(log.total_trip_meter().map(|m| m as i32))
        .bind(log.angle().map(|a| a as i16))
        .bind(log.speed().map(|s| s as i16))
        .bind(log.power_on_time())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_into()?)
    }

    pub async fn insert_geofence_log(
        &self,
        log: &GeofenceLog,
    ) -> Result<Stored<GeofenceLog>, EmulatorError> {
        let device = log.device_identifier();
        let gps = log.gps_info();
        let row: GeofenceLogRow = sqlx::query_as(
            "INSERT INTO geofence_log (
                vehicle_id, mdn, geofence_group_id, geofence_id, event_val,
                gps_status, latitude, longitude, angle, speed,
                total_trip_meter, occurred_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *",
        )
        .bind(signed("vehicleId", device.vehicle_id())?)
        .bind(DbMdn::from(device.mdn()))
        .bind(signed("geofenceGroupId", log.geofence_group_id())?)
        .bind(signed("geofenceId", log.geofence_id())?)
        .bind(log.event_val())
        .bind(gps.gps_status().as_str())
        .bind(gps.latitude())
        .bind(gps.longitude())
        .bind(log.angle() as i16)
        .bind(log.speed().map(|s| s as i16))
        .bind(log.total_trip_meter().map(|m| m as i32))
        .bind(log.occurred_time())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_into()?)
    }

    /// Persist every record of a report, returning how many rows were written
    pub async fn record(&self, report: &LogReport) -> Result<usize, EmulatorError> {
        let written = match report {
            LogReport::GpsCycle(cycle) => self.insert_gps_logs(cycle.logs()).await?.len(),
            LogReport::Power(log) => {
                self.insert_power_log(log).await?;
                1
            }
            LogReport::Geofence(log) => {
                self.insert_geofence_log(log).await?;
                1
            }
        };
        debug!(mdn = %report.mdn(), kind = %report.kind(), written, "Stored report");
        Ok(written)
    }

    /// Most recent GPS logs of `mdn`, newest first
    pub async fn gps_logs(
        &self,
        mdn: Mdn,
        limit: i64,
    ) -> Result<Vec<Stored<GpsLog>>, EmulatorError> {
        let rows: Vec<GpsLogRow> = sqlx::query_as(
            "SELECT * FROM gps_log WHERE mdn = $1 ORDER BY occurred_time DESC, id DESC LIMIT $2",
        )
        .bind(DbMdn::from(mdn))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Stored::<GpsLog>::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn power_logs(
        &self,
        mdn: Mdn,
        limit: i64,
    ) -> Result<Vec<Stored<PowerLog>>, EmulatorError> {
        let rows: Vec<PowerLogRow> = sqlx::query_as(
            "SELECT * FROM power_log WHERE mdn = $1 ORDER BY power_time DESC, id DESC LIMIT $2",
        )
        .bind(DbMdn::from(mdn))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Stored::<PowerLog>::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn geofence_logs(
        &self,
        mdn: Mdn,
        limit: i64,
    ) -> Result<Vec<Stored<GeofenceLog>>, EmulatorError> {
        let rows: Vec<GeofenceLogRow> = sqlx::query_as(
            "SELECT * FROM geofence_log WHERE mdn = $1 ORDER BY occurred_time DESC, id DESC LIMIT $2",
        )
        .bind(DbMdn::from(mdn))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Stored::<GeofenceLog>::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
