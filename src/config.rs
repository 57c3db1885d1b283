use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::cli::Opts;
use crate::color::{
    DEFAULT_BRIGHTNESS, parse_gamma, validate_brightness, validate_gamma, validate_temperature,
};
use crate::error::GammaError;
use crate::scheduling::{SunSource, parse_hhmm};
use crate::selection::{IndexSelector, Selection, SelectionList};

pub const DEFAULT_DAY_TEMP: u32 = 6500;
pub const DEFAULT_NIGHT_TEMP: u32 = 4000;
pub const DEFAULT_TRANSITION: i64 = 1800;

/// Contents of `config.toml`. Every field is optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub method: Option<String>,
    #[serde(default)]
    pub day: Period,
    #[serde(default)]
    pub night: Period,
    pub location: Option<Location>,
    #[serde(default)]
    pub times: Times,
    #[serde(default)]
    pub defaults: OutputSection,
    #[serde(default, rename = "output")]
    pub outputs: Vec<OutputSection>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Period {
    pub temperature: Option<u32>,
    pub brightness: Option<f32>,
    pub gamma: Option<GammaValue>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Times {
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    /// Seconds.
    pub transition: Option<i64>,
}

/// One `[[output]]` table, or `[defaults]`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OutputSection {
    pub site: Option<String>,
    pub partition: Option<SelectorValue>,
    pub crtc: Option<SelectorValue>,
    pub gamma: Option<GammaValue>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum SelectorValue {
    Index(i64),
    List(Vec<i64>),
    Text(String),
}

impl SelectorValue {
    pub fn to_selector(&self, name: &'static str) -> Result<IndexSelector, GammaError> {
        let malformed = |value: String| GammaError::MalformedSelector { name, value };
        match self {
            SelectorValue::Index(i) => usize::try_from(*i)
                .map(IndexSelector::one)
                .map_err(|_| malformed(i.to_string())),
            SelectorValue::List(list) => list
                .iter()
                .map(|&i| usize::try_from(i).map_err(|_| malformed(i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(IndexSelector::Indices),
            SelectorValue::Text(text) => IndexSelector::parse(text, name),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum GammaValue {
    Single(f32),
    Channels([f32; 3]),
    Text(String),
}

impl GammaValue {
    pub fn to_gamma(&self) -> Result<[f32; 3], GammaError> {
        let gamma = match self {
            GammaValue::Single(g) => [*g; 3],
            GammaValue::Channels(channels) => *channels,
            GammaValue::Text(text) => {
                parse_gamma(text).ok_or_else(|| GammaError::MalformedGamma(text.clone()))?
            }
        };
        Ok(gamma)
    }
}

impl Configuration {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path` if given, otherwise the first file found in the
    /// default locations. Only an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parse config file {}", path.display()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("gammashift/config.toml"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/gammashift/config.toml"))
}

/// What to apply at one end of the day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodSetting {
    pub temperature: u32,
    pub brightness: f32,
    /// Applied to every CRTC when set, replacing per-output gamma.
    pub gamma: Option<[f32; 3]>,
}

/// Configuration file and command line merged, with the command line
/// taking precedence.
#[derive(Debug, Clone)]
pub struct Settings {
    pub method: Option<String>,
    pub day: PeriodSetting,
    pub night: PeriodSetting,
    pub sun: Option<SunSource>,
    pub transition: i64,
    pub selections: SelectionList,
}

impl Settings {
    pub fn resolve(opts: &Opts, config: Configuration) -> Result<Self> {
        let day_temp = opts
            .high_temp
            .or(config.day.temperature)
            .unwrap_or(DEFAULT_DAY_TEMP);
        let night_temp = opts
            .low_temp
            .or(config.night.temperature)
            .unwrap_or(DEFAULT_NIGHT_TEMP);
        validate_temperature(day_temp)?;
        validate_temperature(night_temp)?;

        let (day_brightness, night_brightness) = match opts.brightness.as_deref() {
            Some(value) => parse_brightness(value)?,
            None => (
                config.day.brightness.unwrap_or(DEFAULT_BRIGHTNESS),
                config.night.brightness.unwrap_or(DEFAULT_BRIGHTNESS),
            ),
        };
        validate_brightness(day_brightness)?;
        validate_brightness(night_brightness)?;

        let selections = build_selections(opts, &config)?;
        let (day_gamma, night_gamma) =
            period_gammas(&config, selections.default_selection().settings.gamma)?;

        let sunrise = opts.sunrise.as_ref().or(config.times.sunrise.as_ref());
        let sunset = opts.sunset.as_ref().or(config.times.sunset.as_ref());
        let sun = match (sunrise, sunset) {
            (Some(a), Some(b)) => Some(SunSource::Manual {
                sunrise: parse_hhmm(a)?,
                sunset: parse_hhmm(b)?,
            }),
            (None, None) => {
                let lat = opts.latitude.or(config.location.map(|l| l.latitude));
                let lon = opts.longitude.or(config.location.map(|l| l.longitude));
                match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(SunSource::Location { lat, lon }),
                    (None, None) => None,
                    _ => return Err(anyhow!("Provide both latitude and longitude or neither")),
                }
            }
            _ => return Err(anyhow!("Provide both sunrise and sunset or neither")),
        };

        let transition = opts
            .duration
            .or(config.times.transition)
            .unwrap_or(DEFAULT_TRANSITION);
        if transition < 0 {
            return Err(anyhow!("Transition duration must not be negative"));
        }

        Ok(Self {
            method: opts.method.clone().or(config.method),
            day: PeriodSetting {
                temperature: day_temp,
                brightness: day_brightness,
                gamma: day_gamma,
            },
            night: PeriodSetting {
                temperature: night_temp,
                brightness: night_brightness,
                gamma: night_gamma,
            },
            sun,
            transition,
            selections,
        })
    }
}

/// Gamma of `[day]` and `[night]`. Setting either one makes both apply,
/// the missing side taking `fallback`.
fn period_gammas(
    config: &Configuration,
    fallback: [f32; 3],
) -> Result<(Option<[f32; 3]>, Option<[f32; 3]>)> {
    let day = config.day.gamma.as_ref().map(GammaValue::to_gamma).transpose()?;
    let night = config.night.gamma.as_ref().map(GammaValue::to_gamma).transpose()?;
    if day.is_none() && night.is_none() {
        return Ok((None, None));
    }
    let day = day.unwrap_or(fallback);
    let night = night.unwrap_or(fallback);
    validate_gamma(day)?;
    validate_gamma(night)?;
    Ok((Some(day), Some(night)))
}

/// `DAY` or `DAY:NIGHT`.
pub fn parse_brightness(value: &str) -> Result<(f32, f32)> {
    let parse = |s: &str| {
        s.trim()
            .parse::<f32>()
            .map_err(|_| anyhow!("Malformed brightness setting `{value}'"))
    };
    match value.split_once(':') {
        Some((day, night)) => Ok((parse(day)?, parse(night)?)),
        None => {
            let b = parse(value)?;
            Ok((b, b))
        }
    }
}

fn apply_section(selection: &mut Selection, section: &OutputSection) -> Result<(), GammaError> {
    if let Some(site) = &section.site {
        selection.site = Some(site.clone());
    }
    if let Some(partition) = &section.partition {
        selection.partitions = partition.to_selector("Partition")?;
    }
    if let Some(crtc) = &section.crtc {
        selection.crtcs = crtc.to_selector("CRTC")?;
    }
    if let Some(gamma) = &section.gamma {
        selection.settings.gamma = gamma.to_gamma()?;
    }
    Ok(())
}

fn build_selections(opts: &Opts, config: &Configuration) -> Result<SelectionList> {
    let mut selections = SelectionList::new();
    let default = selections.default_selection_mut();
    apply_section(default, &config.defaults)?;

    if let Some(site) = &opts.site {
        default.site = Some(site.clone());
    }
    if let Some(partition) = &opts.partition {
        default.partitions = IndexSelector::parse(partition, "Partition")?;
    }
    if let Some(crtc) = &opts.crtc {
        default.crtcs = IndexSelector::parse(crtc, "CRTC")?;
    }
    if let Some(gamma) = &opts.gamma {
        default.settings.gamma =
            parse_gamma(gamma).ok_or_else(|| GammaError::MalformedGamma(gamma.clone()))?;
    }
    validate_gamma(default.settings.gamma)?;

    for section in &config.outputs {
        let selection = selections.push();
        apply_section(selection, section)?;
        validate_gamma(selection.settings.gamma)?;
    }
    Ok(selections)
}
