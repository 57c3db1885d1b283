//! Location lookup through the GeoClue2 service on the system bus.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::OwnedObjectPath;

use crate::scheduling::SunSource;

const SERVICE: &str = "org.freedesktop.GeoClue2";
const MANAGER_PATH: &str = "/org/freedesktop/GeoClue2/Manager";
/// Desktop file name GeoClue uses to look up permissions.
pub const DESKTOP_ID: &str = "gammashift";
/// GeoClue accuracy level `CITY`.
const CITY_ACCURACY: u32 = 4;
const POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

fn proxy<'a>(conn: &Connection, path: &'a str, interface: &'a str) -> Result<Proxy<'a>> {
    Proxy::new(conn, SERVICE, path, interface)
        .with_context(|| format!("create proxy for {interface}"))
}

fn is_unset(path: &OwnedObjectPath) -> bool {
    matches!(path.as_str(), "" | "/")
}

/// Asks GeoClue for the current position, waiting up to `timeout` for a
/// first fix.
pub fn locate(desktop_id: &str, timeout: Duration) -> Result<SunSource> {
    let conn = Connection::system().context("connect to system bus")?;
    let manager = proxy(&conn, MANAGER_PATH, "org.freedesktop.GeoClue2.Manager")?;
    let client_path: OwnedObjectPath = manager
        .call("GetClient", &())
        .context("GeoClue GetClient")?;
    let client = proxy(&conn, client_path.as_str(), "org.freedesktop.GeoClue2.Client")?;

    client.set_property("DesktopId", desktop_id)?;
    client.set_property("RequestedAccuracyLevel", CITY_ACCURACY)?;
    client
        .call::<_, (), ()>("Start", &())
        .context("GeoClue Start")?;

    let deadline = Instant::now() + timeout;
    let mut location_path: OwnedObjectPath = client.get_property("Location")?;
    while is_unset(&location_path) {
        if Instant::now() >= deadline {
            return Err(anyhow!("GeoClue did not provide a location"));
        }
        thread::sleep(POLL_INTERVAL);
        location_path = client.get_property("Location")?;
    }
    debug!(path = location_path.as_str(), "GeoClue location available");

    let location = proxy(
        &conn,
        location_path.as_str(),
        "org.freedesktop.GeoClue2.Location",
    )?;
    let lat: f64 = location.get_property("Latitude")?;
    let lon: f64 = location.get_property("Longitude")?;
    if let Err(err) = client.call::<_, (), ()>("Stop", &()) {
        debug!("GeoClue Stop failed: {err}");
    }
    to_source(lat, lon)
}

/// Rejects coordinates outside the valid ranges.
pub fn to_source(lat: f64, lon: f64) -> Result<SunSource> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(anyhow!("location {lat}, {lon} is out of range"));
    }
    Ok(SunSource::Location { lat, lon })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_valid_coordinates() {
        assert_eq!(
            to_source(52.5, -13.4).unwrap(),
            SunSource::Location {
                lat: 52.5,
                lon: -13.4
            }
        );
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(to_source(91.0, 0.0).is_err());
        assert!(to_source(0.0, -181.0).is_err());
        assert!(to_source(f64::NAN, 0.0).is_err());
    }
}
