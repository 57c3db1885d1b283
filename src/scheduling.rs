use anyhow::{Result, anyhow};
use chrono::{Local, TimeZone};
use sunrise::{Coordinates, SolarDay, SolarEvent};

use crate::config::PeriodSetting;

/// Seconds between steps while inside a transition.
pub const TRANSITION_STEP: i64 = 10;

/// Where sunrise and sunset come from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SunSource {
    /// Seconds after local midnight.
    Manual { sunrise: i64, sunset: i64 },
    Location { lat: f64, lon: f64 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DayStops {
    pub dawn: i64,
    pub sunrise: i64,
    pub sunset: i64,
    pub night: i64,
    /// Start of the next day these stops were computed for.
    pub rollover: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayPhase {
    Night,
    Sunrise,
    Day,
    Sunset,
}

pub fn parse_hhmm(s: &str) -> Result<i64> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid time format `{s}', expected HH:MM"))?;
    let h: i64 = h.trim().parse()?;
    let m: i64 = m.trim().parse()?;
    if !(0..24).contains(&h) || !(0..60).contains(&m) {
        return Err(anyhow!("time `{s}' out of range"));
    }
    Ok(h * 3600 + m * 60)
}

/// Local midnight on or before `now`.
fn local_midnight(now: i64) -> i64 {
    let offset = Local
        .timestamp_opt(now, 0)
        .single()
        .map_or(0, |dt| i64::from(dt.offset().local_minus_utc()));
    now - (now + offset).rem_euclid(86400)
}

/// Offset of mean solar time at `lon` from UTC, in seconds.
fn solar_offset(lon: f64) -> i64 {
    (lon * 240.0).round() as i64
}

/// Manual times follow the local clock. Solar events belong to the date
/// of mean solar time at the location, so the day never flips between
/// the sunrise and sunset of the same place, whatever the system zone.
pub fn compute_day_stops(now: i64, source: SunSource, duration: i64) -> Result<DayStops> {
    let (sunrise_ts, sunset_ts, rollover) = match source {
        SunSource::Manual { sunrise, sunset } => {
            let midnight = local_midnight(now);
            (midnight + sunrise, midnight + sunset, midnight + 86400)
        }
        SunSource::Location { lat, lon } => {
            let coords =
                Coordinates::new(lat, lon).ok_or_else(|| anyhow!("invalid coordinates"))?;
            let offset = solar_offset(lon);
            let solar_now = now + offset;
            let date = chrono::DateTime::from_timestamp(solar_now, 0)
                .ok_or_else(|| anyhow!("invalid timestamp"))?
                .date_naive();
            let solar_day = SolarDay::new(coords, date);
            (
                solar_day.event_time(SolarEvent::Sunrise).timestamp(),
                solar_day.event_time(SolarEvent::Sunset).timestamp(),
                solar_now - solar_now.rem_euclid(86400) + 86400 - offset,
            )
        }
    };
    if sunset_ts <= sunrise_ts {
        return Err(anyhow!("sunset must come after sunrise"));
    }
    Ok(DayStops {
        dawn: sunrise_ts - duration,
        sunrise: sunrise_ts,
        sunset: sunset_ts,
        night: sunset_ts + duration,
        rollover,
    })
}

fn progress(now: i64, start: i64, stop: i64) -> f64 {
    if start == stop {
        return 1.0;
    }
    ((now - start) as f64 / (stop - start) as f64).clamp(0.0, 1.0)
}

/// Blend between night (`alpha` 0) and day (`alpha` 1).
pub fn interpolate(alpha: f64, night: PeriodSetting, day: PeriodSetting) -> PeriodSetting {
    let t = night.temperature as f64 + (day.temperature as f64 - night.temperature as f64) * alpha;
    let b = night.brightness as f64 + (day.brightness as f64 - night.brightness as f64) * alpha;
    let gamma = match (night.gamma, day.gamma) {
        (Some(n), Some(d)) => Some(std::array::from_fn(|i| {
            (n[i] as f64 + (d[i] as f64 - n[i] as f64) * alpha) as f32
        })),
        (n, d) => d.or(n),
    };
    PeriodSetting {
        temperature: t.round() as u32,
        brightness: b as f32,
        gamma,
    }
}

/// How far into the day `now` is: 0 at night, 1 during the day.
pub fn day_alpha(now: i64, stops: DayStops) -> f64 {
    match phase_for(now, stops) {
        DayPhase::Night => 0.0,
        DayPhase::Sunrise => progress(now, stops.dawn, stops.sunrise),
        DayPhase::Day => 1.0,
        DayPhase::Sunset => 1.0 - progress(now, stops.sunset, stops.night),
    }
}

pub fn setting_for(
    now: i64,
    stops: DayStops,
    night: PeriodSetting,
    day: PeriodSetting,
) -> PeriodSetting {
    interpolate(day_alpha(now, stops), night, day)
}

pub fn phase_for(now: i64, stops: DayStops) -> DayPhase {
    if now < stops.dawn {
        DayPhase::Night
    } else if now < stops.sunrise {
        DayPhase::Sunrise
    } else if now < stops.sunset {
        DayPhase::Day
    } else if now < stops.night {
        DayPhase::Sunset
    } else {
        DayPhase::Night
    }
}

/// When the setting next changes.
pub fn next_wakeup(now: i64, stops: DayStops) -> i64 {
    match phase_for(now, stops) {
        DayPhase::Sunrise | DayPhase::Sunset => now + TRANSITION_STEP,
        DayPhase::Day => stops.sunset,
        DayPhase::Night if now < stops.dawn => stops.dawn,
        DayPhase::Night => stops.rollover,
    }
}
