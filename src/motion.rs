//! Vehicle motion helpers: distances, headings and speed smoothing.

use geo::{HaversineBearing, HaversineDistance, Point};

/// Steps longer than this, in metres per sample, are treated as GPS jumps.
pub const MAX_STEP_METERS: f64 = 80.0;

/// Upper bound for derived speed, km/h
pub const MAX_SPEED_KMH: f64 = 120.0;

/// Great-circle distance in metres between two `(latitude, longitude)` pairs.
pub fn distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    point(from).haversine_distance(&point(to))
}

/// Initial bearing from `from` to `to`, clockwise from north, in `[0, 360)`.
pub fn bearing_deg(from: (f64, f64), to: (f64, f64)) -> f64 {
    normalize_deg(point(from).haversine_bearing(point(to)))
}

pub fn normalize_deg(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Next speed estimate in km/h.
///
/// Blends 70 % of the previous speed with 30 % of the speed implied by
/// `distance_m` over `elapsed_secs`; without movement the previous speed
/// decays by 10 %.
pub fn smooth_speed(previous_kmh: f64, distance_m: f64, elapsed_secs: f64) -> f64 {
    let speed = if distance_m > 0.0 && elapsed_secs > 0.0 {
        let current = distance_m / elapsed_secs * 3.6;
        previous_kmh * 0.7 + current * 0.3
    } else {
        previous_kmh * 0.9
    };
    speed.clamp(0.0, MAX_SPEED_KMH)
}

/// Moves 20 % of the way from `previous` towards `current` along the shorter arc.
pub fn smooth_heading(previous: f64, current: f64) -> f64 {
    let mut delta = normalize_deg(current) - normalize_deg(previous);
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    normalize_deg(previous + delta * 0.2)
}

fn point((lat, lon): (f64, f64)) -> Point<f64> {
    Point::new(lon, lat)
}
