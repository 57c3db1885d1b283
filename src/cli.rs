use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq, Default)]
pub enum ModeArg {
    #[default]
    Auto,
    Day,
    Night,
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum PrintFormat {
    Text,
    Binary,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gammashift",
    version,
    about = "Adjust display color temperature by time of day"
)]
pub struct Opts {
    /// Adjustment method (wayland, randr, dummy, auto). `list` shows them.
    #[arg(short = 'm', long = "method")]
    pub method: Option<String>,

    /// Configuration file (default: $XDG_CONFIG_HOME/gammashift/config.toml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Low color temperature at night (K)
    #[arg(short = 't', long = "low")]
    pub low_temp: Option<u32>,

    /// High color temperature at day (K)
    #[arg(short = 'T', long = "high")]
    pub high_temp: Option<u32>,

    /// Screen brightness, DAY[:NIGHT], between 0.1 and 1.0
    #[arg(short = 'b', long = "brightness")]
    pub brightness: Option<String>,

    /// Gamma correction, G or R:G:B
    #[arg(short = 'g', long = "gamma")]
    pub gamma: Option<String>,

    /// Display, compositor socket or device to adjust
    #[arg(long = "site")]
    pub site: Option<String>,

    /// Screens or graphics cards to adjust (`all`, or indices like `0,2`)
    #[arg(long = "partition")]
    pub partition: Option<String>,

    /// CRTCs to adjust (`all`, or indices like `0,2`)
    #[arg(long = "crtc")]
    pub crtc: Option<String>,

    /// Latitude (degrees)
    #[arg(short = 'l', long = "lat", allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    /// Longitude (degrees)
    #[arg(short = 'L', long = "lon", allow_negative_numbers = true)]
    pub longitude: Option<f64>,

    /// Manual sunrise time HH:MM (local). Disables lat/lon usage.
    #[arg(short = 'S', long = "sunrise")]
    pub sunrise: Option<String>,

    /// Manual sunset time HH:MM (local). Disables lat/lon usage.
    #[arg(short = 's', long = "sunset")]
    pub sunset: Option<String>,

    /// Transition duration in seconds around sunrise/sunset
    #[arg(short = 'd', long = "duration")]
    pub duration: Option<i64>,

    /// Operating mode override (auto/day/night)
    #[arg(long = "mode", value_enum, default_value_t = ModeArg::Auto)]
    pub mode: ModeArg,

    /// Apply the current setting once and exit
    #[arg(short = 'o', long = "oneshot", conflicts_with_all = ["set", "reset"])]
    pub oneshot: bool,

    /// Apply a fixed temperature (K) once and exit
    #[arg(short = 'O', long = "set", conflicts_with = "reset")]
    pub set: Option<u32>,

    /// Restore neutral colors once and exit
    #[arg(short = 'x', long = "reset")]
    pub reset: bool,

    /// Write the computed ramps to stdout instead of adjusting a display
    #[arg(short = 'p', long = "print", value_enum)]
    pub print: Option<PrintFormat>,

    /// Ramp size for --print and the dummy method
    #[arg(long = "ramp-size", default_value_t = 256)]
    pub ramp_size: usize,

    /// Accept JSON control commands on stdin
    #[arg(long = "stdin-control")]
    pub stdin_control: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let opts = Opts::try_parse_from([
            "gammashift", "-t", "3500", "-T", "6000", "-l", "-33.9", "-L", "18.4", "-d", "600",
        ])
        .unwrap();
        assert_eq!(opts.low_temp, Some(3500));
        assert_eq!(opts.high_temp, Some(6000));
        assert_eq!(opts.latitude, Some(-33.9));
        assert_eq!(opts.longitude, Some(18.4));
        assert_eq!(opts.duration, Some(600));
        assert_eq!(opts.mode, ModeArg::Auto);
    }

    #[test]
    fn one_shot_modes_are_exclusive() {
        assert!(Opts::try_parse_from(["gammashift", "--oneshot", "--reset"]).is_err());
        assert!(Opts::try_parse_from(["gammashift", "--set", "4000", "--reset"]).is_err());
        let opts = Opts::try_parse_from(["gammashift", "--set", "4000"]).unwrap();
        assert_eq!(opts.set, Some(4000));
    }

    #[test]
    fn counts_verbosity() {
        let opts = Opts::try_parse_from(["gammashift", "-vv", "--print", "binary"]).unwrap();
        assert_eq!(opts.verbose, 2);
        assert_eq!(opts.print, Some(PrintFormat::Binary));
        assert_eq!(opts.ramp_size, 256);
    }
}
