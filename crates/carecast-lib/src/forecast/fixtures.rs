//! Deterministic hourly hospital series for tests

use crate::models::{TimeSeriesRecord, DEFAULT_TOTAL_BEDS};
use chrono::{Datelike, Duration, TimeZone, Timelike, Utc};

fn next_noise(state: &mut u64, spread: i64) -> i64 {
    // xorshift64
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    (*state % (2 * spread as u64 + 1)) as i64 - spread
}

/// Series starting Monday 2024-03-04 00:00 UTC with day/night and weekend patterns
pub(crate) fn synthetic_series(hours: usize) -> Vec<TimeSeriesRecord> {
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let mut state = 42u64;
    let mut occupancy = 150i64;
    let mut oxygen = 2000.0f64;

    (0..hours)
        .map(|i| {
            let timestamp = start + Duration::hours(i as i64);
            let hour = timestamp.hour();
            let weekend = timestamp.weekday().num_days_from_monday() >= 5;

            let mut admission_base = if (8..=20).contains(&hour) { 10.5 } else { 7.0 };
            if weekend {
                admission_base *= 1.3;
            }
            let admissions = (admission_base as i64 + next_noise(&mut state, 3)).max(0);
            let discharge_base = if (9..=17).contains(&hour) { 11 } else { 8 };
            let discharges = (discharge_base + next_noise(&mut state, 2)).max(0);

            if i > 0 {
                occupancy = (occupancy + admissions - discharges)
                    .clamp(50, DEFAULT_TOTAL_BEDS as i64 - 10);
                let consumption = if (6..=22).contains(&hour) { 21.0 } else { 12.0 };
                oxygen -= consumption + next_noise(&mut state, 2) as f64;
                if oxygen < 500.0 {
                    oxygen = 2500.0;
                }
            }

            TimeSeriesRecord {
                timestamp,
                admissions: admissions as u32,
                discharges: discharges as u32,
                bed_occupancy: occupancy as u32,
                oxygen_level: oxygen,
                occupancy_rate: occupancy as f64 / DEFAULT_TOTAL_BEDS as f64 * 100.0,
            }
        })
        .collect()
}
