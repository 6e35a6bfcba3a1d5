use chrono::{Duration, Timelike, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::env;

use gps_emulator::{
    database::Database,
    models::{
        DeviceIdentifier, Emulator, GeofenceEvent, GeofenceLog, GpsCycle, GpsInfo, GpsLog,
        GpsStatus, LogReport, Mdn, PowerLog, PowerStatus,
    },
};

async fn setup_test_db() -> Pool<Postgres> {
    dotenvy::dotenv().ok();
    let database_url =
        env::var("DATABASE_URL").expect("Environment variable DATABASE_URL required");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database")
}

/// Unique MDN per test run so reruns against the same database do not collide
fn test_mdn(offset: u64) -> Mdn {
    let base = (Utc::now().timestamp_micros() as u64) % 1_000_000_000;
    Mdn::try_from(9_000_000_000 + base * 10 + offset).unwrap()
}

fn emulator(mdn: Mdn) -> Emulator {
    Emulator::builder()
        .mdn(mdn)
        .vehicle_id(1)
        .terminal_id("A001")
        .manufacture_id(6)
        .packet_version(5)
        .device_id(1)
        .device_firmware_version("1.0.0")
        .build()
        .unwrap()
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test]
async fn test_insert_gps_log() {
    let pool = setup_test_db().await;
    let db = Database::new(pool.clone()).await.unwrap();

    let mdn = test_mdn(1);
    let occurred_time = Utc::now().with_nanosecond(0).unwrap();
    let log = GpsLog::builder()
        .device(DeviceIdentifier::new(1, mdn))
        .gps(GpsInfo::fixed(37.5665, 126.9780).unwrap())
        .angle(90)
        .speed(40)
        .total_trip_meter(1500)
        .battery_voltage(12)
        .occurred_time(occurred_time)
        .build()
        .unwrap();

    let stored = db
        .insert_gps_logs(std::slice::from_ref(&log))
        .await
        .expect("Failed to insert GPS log");

    assert_eq!(stored.len(), 1);
    assert!(stored[0].id > 0);
    assert_eq!(stored[0].record, log);

    // Verify the insertion
    let (lat, lon): (f64, f64) =
        sqlx::query_as("SELECT latitude, longitude FROM gps_log WHERE id = $1")
            .bind(stored[0].id)
            .fetch_one(&pool)
            .await
            .expect("Failed to retrieve GPS log");
    assert_eq!(lat, 37.5665);
    assert_eq!(lon, 126.9780);

    let read_back = db.gps_logs(mdn, 10).await.unwrap();
    assert_eq!(read_back.len(), 1);
    assert_eq!(read_back[0].record, log);
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test]
async fn test_register_emulator_upserts() {
    let pool = setup_test_db().await;
    let db = Database::new(pool).await.unwrap();

    let mdn = test_mdn(2);
    let first = db.register_emulator(&emulator(mdn)).await.unwrap();
    assert_eq!(first.id, mdn.value() as i64);

    let updated = Emulator::builder()
        .mdn(mdn)
        .vehicle_id(2)
        .terminal_id("B002")
        .manufacture_id(6)
        .packet_version(5)
        .device_id(1)
        .device_firmware_version("1.1.0")
        .build()
        .unwrap();
    let second = db.register_emulator(&updated).await.unwrap();
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);

    let found = db.find_emulator(mdn).await.unwrap().unwrap();
    assert_eq!(found.record, updated);
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test]
async fn test_record_reports() {
    let pool = setup_test_db().await;
    let db = Database::new(pool).await.unwrap();

    let mdn = test_mdn(3);
    let emulator = emulator(mdn);
    let now = Utc::now().with_nanosecond(0).unwrap();

    let logs: Vec<GpsLog> = (0..3)
        .map(|sec| {
            GpsLog::builder()
                .device(emulator.device_identifier())
                .gps(GpsInfo::without_position(GpsStatus::Unknown).unwrap())
                .angle(0)
                .speed(0)
                .total_trip_meter(0)
                .battery_voltage(125)
                .occurred_time(now + Duration::seconds(sec))
                .build()
                .unwrap()
        })
        .collect();
    let cycle = GpsCycle::new(logs).unwrap();
    assert_eq!(db.record(&LogReport::GpsCycle(cycle)).await.unwrap(), 3);

    let off = PowerLog::builder()
        .device(emulator.device_identifier())
        .gps(GpsInfo::new(GpsStatus::Lost, Some(37.5), Some(127.0)).unwrap())
        .power_status(PowerStatus::Off)
        .power_time(now)
        .power_on_time(now - Duration::hours(1))
        .total_trip_meter(2500)
        .build()
        .unwrap();
    assert_eq!(db.record(&LogReport::Power(off.clone())).await.unwrap(), 1);

    let crossing = GeofenceLog::builder()
        .device(emulator.device_identifier())
        .geofence_group_id(7)
        .geofence_id(42)
        .event(GeofenceEvent::Enter)
        .gps(GpsInfo::fixed(37.5, 127.0).unwrap())
        .angle(180)
        .occurred_time(now)
        .build()
        .unwrap();
    let stored = db.insert_geofence_log(&crossing).await.unwrap();
    assert_eq!(stored.record, crossing);

    assert_eq!(db.gps_logs(mdn, 10).await.unwrap().len(), 3);
    let power = db.power_logs(mdn, 10).await.unwrap();
    assert_eq!(power.len(), 1);
    assert_eq!(power[0].record, off);
    assert_eq!(db.geofence_logs(mdn, 10).await.unwrap().len(), 1);
}
