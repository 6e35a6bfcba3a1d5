//! JSON bodies exchanged with the collection backend.
//!
//! Every value travels as a string. Coordinates are degrees scaled by
//! 1 000 000, and timestamps are rendered in the host's local time zone.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EmulatorError;
use crate::models::{
    Emulator, GeofenceEvent, GeofenceLog, GpsCycle, GpsInfo, LogReport, PowerLog, PowerStatus,
};

/// Result code the backend uses for an accepted log
pub const SUCCESS_CODE: &str = "000";

const MINUTE_FORMAT: &str = "%Y%m%d%H%M";
const SECOND_FORMAT: &str = "%Y%m%d%H%M%S";

/// Terminal fields shared by every request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalHeader {
    pub mdn: String,
    pub tid: String,
    pub mid: String,
    pub pv: String,
    pub did: String,
}

impl From<&Emulator> for TerminalHeader {
    fn from(emulator: &Emulator) -> Self {
        Self {
            mdn: emulator.mdn().to_string(),
            tid: emulator.terminal_id().to_string(),
            mid: emulator.manufacture_id().to_string(),
            pv: emulator.packet_version().to_string(),
            did: emulator.device_id().to_string(),
        }
    }
}

/// One second of a GPS cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsCycleItem {
    pub sec: String,
    pub gcd: String,
    pub lat: String,
    pub lon: String,
    pub ang: String,
    pub spd: String,
    pub sum: String,
    pub bat: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsCycleRequest {
    #[serde(flatten)]
    pub header: TerminalHeader,
    #[serde(rename = "oTime")]
    pub o_time: String,
    #[serde(rename = "cCnt")]
    pub c_cnt: String,
    #[serde(rename = "cList")]
    pub c_list: Vec<GpsCycleItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerRequest {
    #[serde(flatten)]
    pub header: TerminalHeader,
    #[serde(rename = "onTime")]
    pub on_time: String,
    #[serde(rename = "offTime")]
    pub off_time: String,
    pub gcd: String,
    pub lat: String,
    pub lon: String,
    pub ang: String,
    pub spd: String,
    pub sum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceRequest {
    #[serde(flatten)]
    pub header: TerminalHeader,
    #[serde(rename = "oTime")]
    pub o_time: String,
    #[serde(rename = "geoGrpId")]
    pub geo_grp_id: String,
    #[serde(rename = "geoPId")]
    pub geo_p_id: String,
    #[serde(rename = "evtVal")]
    pub evt_val: String,
    pub gcd: String,
    pub lat: String,
    pub lon: String,
    pub ang: String,
    pub spd: String,
    pub sum: String,
}

/// Scale decimal degrees to the integer micro-degree text the backend expects.
pub fn encode_coordinate(degrees: Option<f64>) -> String {
    match degrees {
        Some(value) => ((value * 1_000_000.0).round() as i64).to_string(),
        None => "0".to_string(),
    }
}

fn local(time: DateTime<Utc>, format: &str) -> String {
    time.with_timezone(&Local).format(format).to_string()
}

fn position(gps: &GpsInfo) -> (String, String) {
    (
        encode_coordinate(gps.latitude()),
        encode_coordinate(gps.longitude()),
    )
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "0".to_string())
}

impl GpsCycleRequest {
    pub fn new(emulator: &Emulator, cycle: &GpsCycle) -> Self {
        let c_list: Vec<GpsCycleItem> = cycle
            .logs()
            .iter()
            .enumerate()
            .map(|(sec, log)| {
                let gps = log.gps_info();
                let (lat, lon) = position(&gps);
                GpsCycleItem {
                    sec: sec.to_string(),
                    gcd: gps.gps_status().wire_code().to_string(),
                    lat,
                    lon,
                    ang: log.angle().to_string(),
                    spd: log.speed().to_string(),
                    sum: log.total_trip_meter().to_string(),
                    bat: log.battery_voltage().to_string(),
                }
            })
            .collect();

        Self {
            header: emulator.into(),
            o_time: local(cycle.started_at(), MINUTE_FORMAT),
            c_cnt: c_list.len().to_string(),
            c_list,
        }
    }
}

impl PowerRequest {
    pub fn new(emulator: &Emulator, log: &PowerLog) -> Self {
        let power_time = local(log.power_time(), SECOND_FORMAT);
        let (on_time, off_time) = match log.power_status() {
            PowerStatus::Off => (
                log.power_on_time()
                    .map(|t| local(t, SECOND_FORMAT))
                    .unwrap_or_default(),
                power_time,
            ),
            PowerStatus::On | PowerStatus::Unknown => (power_time, String::new()),
        };
        let gps = log.gps_info();
        let (lat, lon) = position(&gps);

        Self {
            header: emulator.into(),
            on_time,
            off_time,
            gcd: gps.gps_status().wire_code().to_string(),
            lat,
            lon,
            ang: optional(log.angle()),
            spd: optional(log.speed()),
            sum: optional(log.total_trip_meter()),
        }
    }
}

impl GeofenceRequest {
    pub fn new(emulator: &Emulator, log: &GeofenceLog) -> Self {
        let gps = log.gps_info();
        let (lat, lon) = position(&gps);

        Self {
            header: emulator.into(),
            o_time: local(log.occurred_time(), SECOND_FORMAT),
            geo_grp_id: log.geofence_group_id().to_string(),
            geo_p_id: log.geofence_id().to_string(),
            evt_val: match log.event() {
                GeofenceEvent::Enter => "1",
                GeofenceEvent::Exit => "2",
            }
            .to_string(),
            gcd: gps.gps_status().wire_code().to_string(),
            lat,
            lon,
            ang: log.angle().to_string(),
            spd: optional(log.speed()),
            sum: optional(log.total_trip_meter()),
        }
    }
}

/// Render the request body for a report
pub fn encode_report(
    emulator: &Emulator,
    report: &LogReport,
) -> Result<serde_json::Value, EmulatorError> {
    let value = match report {
        LogReport::GpsCycle(cycle) => serde_json::to_value(GpsCycleRequest::new(emulator, cycle))?,
        LogReport::Power(log) => serde_json::to_value(PowerRequest::new(emulator, log))?,
        LogReport::Geofence(log) => serde_json::to_value(GeofenceRequest::new(emulator, log))?,
    };
    Ok(value)
}

/// Backend reply; older deployments use `rstCd`/`rstMsg` instead of `code`/`message`.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct BackendResponse {
    pub code: Option<String>,
    #[serde(rename = "rstCd")]
    pub rst_cd: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "rstMsg")]
    pub rst_msg: Option<String>,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        self.code.as_deref() == Some(SUCCESS_CODE) || self.rst_cd.as_deref() == Some(SUCCESS_CODE)
    }

    pub fn into_result(self) -> Result<(), EmulatorError> {
        if self.is_success() {
            return Ok(());
        }
        Err(EmulatorError::BackendRejected {
            code: self.code.or(self.rst_cd).unwrap_or_else(|| "N/A".to_string()),
            message: self
                .message
                .or(self.rst_msg)
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceIdentifier, GpsLog, GpsStatus, Mdn};
    use chrono::{Local, TimeZone};

    fn emulator() -> Emulator {
        Emulator::builder()
            .mdn(Mdn::try_from(1012345678).unwrap())
            .vehicle_id(1)
            .terminal_id("A001")
            .manufacture_id(6)
            .packet_version(5)
            .device_id(1)
            .device_firmware_version("1.0.0")
            .build()
            .unwrap()
    }

    fn local_time(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 5, 1, h, m, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn coordinates_scale_to_micro_degrees() {
        assert_eq!(encode_coordinate(Some(37.5665)), "37566500");
        assert_eq!(encode_coordinate(Some(126.978)), "126978000");
        assert_eq!(encode_coordinate(Some(-33.8688197)), "-33868820");
        assert_eq!(encode_coordinate(None), "0");
    }

    #[test]
    fn gps_cycle_request() {
        let emulator = emulator();
        let logs: Vec<GpsLog> = (0..3)
            .map(|i| {
                GpsLog::builder()
                    .device(emulator.device_identifier())
                    .gps(GpsInfo::fixed(37.5665, 126.978).unwrap())
                    .angle(45)
                    .speed(30 + i)
                    .total_trip_meter(100 + i as u32)
                    .battery_voltage(125)
                    .occurred_time(local_time(9, 30, i as u32))
                    .build()
                    .unwrap()
            })
            .collect();
        let cycle = GpsCycle::new(logs).unwrap();

        let value = encode_report(&emulator, &LogReport::GpsCycle(cycle)).unwrap();
        assert_eq!(value["mdn"], "1012345678");
        assert_eq!(value["tid"], "A001");
        assert_eq!(value["mid"], "6");
        assert_eq!(value["pv"], "5");
        assert_eq!(value["did"], "1");
        assert_eq!(value["oTime"], "202405010930");
        assert_eq!(value["cCnt"], "3");
        assert_eq!(value["cList"][2]["sec"], "2");
        assert_eq!(value["cList"][2]["gcd"], "A");
        assert_eq!(value["cList"][2]["lat"], "37566500");
        assert_eq!(value["cList"][2]["spd"], "32");
        assert_eq!(value["cList"][2]["sum"], "102");
        assert_eq!(value["cList"][2]["bat"], "125");
    }

    #[test]
    fn power_off_request_carries_on_time() {
        let emulator = emulator();
        let log = PowerLog::builder()
            .device(emulator.device_identifier())
            .gps(GpsInfo::new(GpsStatus::Lost, Some(37.5), Some(127.0)).unwrap())
            .power_status(PowerStatus::Off)
            .power_time(local_time(18, 0, 5))
            .power_on_time(local_time(8, 15, 0))
            .total_trip_meter(2500)
            .speed(12)
            .angle(200)
            .build()
            .unwrap();

        let request = PowerRequest::new(&emulator, &log);
        assert_eq!(request.on_time, "20240501081500");
        assert_eq!(request.off_time, "20240501180005");
        assert_eq!(request.gcd, "V");
        assert_eq!(request.sum, "2500");
        assert_eq!(request.spd, "12");
        assert_eq!(request.ang, "200");
    }

    #[test]
    fn power_on_request_without_position() {
        let emulator = emulator();
        let log = PowerLog::builder()
            .device(DeviceIdentifier::new(1, emulator.mdn()))
            .gps(GpsInfo::without_position(GpsStatus::Lost).unwrap())
            .power_status(PowerStatus::On)
            .power_time(local_time(8, 15, 0))
            .build()
            .unwrap();

        let value = serde_json::to_value(PowerRequest::new(&emulator, &log)).unwrap();
        assert_eq!(value["onTime"], "20240501081500");
        assert_eq!(value["offTime"], "");
        assert_eq!(value["lat"], "0");
        assert_eq!(value["lon"], "0");
        assert_eq!(value["spd"], "0");
    }

    #[test]
    fn geofence_request() {
        let emulator = emulator();
        let log = GeofenceLog::builder()
            .device(emulator.device_identifier())
            .geofence_group_id(3)
            .geofence_id(11)
            .event(GeofenceEvent::Exit)
            .gps(GpsInfo::fixed(37.5, 127.0).unwrap())
            .angle(90)
            .speed(55)
            .total_trip_meter(800)
            .occurred_time(local_time(12, 1, 2))
            .build()
            .unwrap();

        let value = encode_report(&emulator, &LogReport::Geofence(log)).unwrap();
        assert_eq!(value["oTime"], "20240501120102");
        assert_eq!(value["geoGrpId"], "3");
        assert_eq!(value["geoPId"], "11");
        assert_eq!(value["evtVal"], "2");
        assert_eq!(value["lon"], "127000000");
        assert_eq!(value["spd"], "55");
        assert_eq!(value["sum"], "800");
    }

    #[test]
    fn backend_response_codes() {
        let ok: BackendResponse = serde_json::from_str(r#"{"code":"000","message":"ok"}"#).unwrap();
        assert!(ok.into_result().is_ok());

        let legacy: BackendResponse = serde_json::from_str(r#"{"rstCd":"000"}"#).unwrap();
        assert!(legacy.is_success());

        let rejected: BackendResponse =
            serde_json::from_str(r#"{"rstCd":"500","rstMsg":"server error"}"#).unwrap();
        match rejected.into_result() {
            Err(EmulatorError::BackendRejected { code, message }) => {
                assert_eq!(code, "500");
                assert_eq!(message, "server error");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(!BackendResponse::default().is_success());
    }
}
