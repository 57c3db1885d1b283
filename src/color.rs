use serde::{Deserialize, Serialize};

use crate::error::SettingError;
use crate::ramps::GammaRamps;

pub use tempergb::Color as Rgb;

pub const MIN_TEMP: u32 = 1000;
pub const MAX_TEMP: u32 = 25000;
/// The color temperature at which no tint is applied.
pub const NEUTRAL_TEMP: u32 = 6500;
/// Highest tabulated temperature; above it the white point is extrapolated.
pub const TABLE_MAX_TEMP: u32 = 10000;

pub const MIN_BRIGHTNESS: f32 = 0.1;
pub const MAX_BRIGHTNESS: f32 = 1.0;
pub const MIN_GAMMA: f32 = 0.1;
pub const MAX_GAMMA: f32 = 10.0;

pub const DEFAULT_BRIGHTNESS: f32 = 1.0;
pub const DEFAULT_GAMMA: f32 = 1.0;

const TABLE_STEP: u32 = 100;

/// Blackbody white points from 1000K to 10000K in 100K steps,
/// rescaled so that 6500K is full intensity on every channel.
/// Source: <http://www.vendian.org/mncharity/dir3/blackbody/>
static BLACKBODY: [[f32; 3]; 91] = [
    [1.0000, 0.0425, 0.0000], // 1000K
    [1.0000, 0.0668, 0.0000],
    [1.0000, 0.0911, 0.0000],
    [1.0000, 0.1149, 0.0000],
    [1.0000, 0.1380, 0.0000],
    [1.0000, 0.1604, 0.0000],
    [1.0000, 0.1819, 0.0000],
    [1.0000, 0.2024, 0.0000],
    [1.0000, 0.2220, 0.0000],
    [1.0000, 0.2406, 0.0000],
    [1.0000, 0.2630, 0.0062], // 2000K
    [1.0000, 0.2868, 0.0155],
    [1.0000, 0.3102, 0.0261],
    [1.0000, 0.3334, 0.0379],
    [1.0000, 0.3562, 0.0508],
    [1.0000, 0.3787, 0.0650],
    [1.0000, 0.4008, 0.0802],
    [1.0000, 0.4227, 0.0964],
    [1.0000, 0.4442, 0.1136],
    [1.0000, 0.4652, 0.1316],
    [1.0000, 0.4859, 0.1505], // 3000K
    [1.0000, 0.5062, 0.1702],
    [1.0000, 0.5262, 0.1907],
    [1.0000, 0.5458, 0.2118],
    [1.0000, 0.5650, 0.2335],
    [1.0000, 0.5839, 0.2558],
    [1.0000, 0.6023, 0.2786],
    [1.0000, 0.6204, 0.3018],
    [1.0000, 0.6382, 0.3255],
    [1.0000, 0.6557, 0.3495],
    [1.0000, 0.6727, 0.3739], // 4000K
    [1.0000, 0.6894, 0.3986],
    [1.0000, 0.7058, 0.4234],
    [1.0000, 0.7218, 0.4485],
    [1.0000, 0.7375, 0.4738],
    [1.0000, 0.7529, 0.4992],
    [1.0000, 0.7679, 0.5247],
    [1.0000, 0.7826, 0.5503],
    [1.0000, 0.7970, 0.5760],
    [1.0000, 0.8111, 0.6016],
    [1.0000, 0.8250, 0.6272], // 5000K
    [1.0000, 0.8384, 0.6529],
    [1.0000, 0.8517, 0.6785],
    [1.0000, 0.8647, 0.7040],
    [1.0000, 0.8773, 0.7294],
    [1.0000, 0.8897, 0.7548],
    [1.0000, 0.9019, 0.7801],
    [1.0000, 0.9137, 0.8051],
    [1.0000, 0.9254, 0.8301],
    [1.0000, 0.9367, 0.8550],
    [1.0000, 0.9478, 0.8795], // 6000K
    [1.0000, 0.9587, 0.9040],
    [1.0000, 0.9694, 0.9283],
    [1.0000, 0.9798, 0.9524],
    [1.0000, 0.9900, 0.9763],
    [1.0000, 1.0000, 1.0000], // 6500K
    [0.9771, 0.9867, 1.0000],
    [0.9554, 0.9740, 1.0000],
    [0.9349, 0.9618, 1.0000],
    [0.9154, 0.9500, 1.0000],
    [0.8968, 0.9389, 1.0000], // 7000K
    [0.8792, 0.9282, 1.0000],
    [0.8624, 0.9179, 1.0000],
    [0.8465, 0.9080, 1.0000],
    [0.8313, 0.8986, 1.0000],
    [0.8167, 0.8895, 1.0000],
    [0.8029, 0.8808, 1.0000],
    [0.7896, 0.8724, 1.0000],
    [0.7769, 0.8643, 1.0000],
    [0.7648, 0.8565, 1.0000],
    [0.7532, 0.8490, 1.0000], // 8000K
    [0.7420, 0.8418, 1.0000],
    [0.7314, 0.8348, 1.0000],
    [0.7212, 0.8281, 1.0000],
    [0.7113, 0.8216, 1.0000],
    [0.7018, 0.8153, 1.0000],
    [0.6927, 0.8092, 1.0000],
    [0.6839, 0.8032, 1.0000],
    [0.6755, 0.7975, 1.0000],
    [0.6674, 0.7921, 1.0000],
    [0.6595, 0.7867, 1.0000], // 9000K
    [0.6520, 0.7816, 1.0000],
    [0.6447, 0.7765, 1.0000],
    [0.6376, 0.7717, 1.0000],
    [0.6308, 0.7670, 1.0000],
    [0.6242, 0.7623, 1.0000],
    [0.6179, 0.7579, 1.0000],
    [0.6117, 0.7536, 1.0000],
    [0.6058, 0.7493, 1.0000],
    [0.6000, 0.7453, 1.0000],
    [0.5944, 0.7414, 1.0000], // 10000K
];

/// Target adjustment for one CRTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorSetting {
    /// Kelvin, within [`MIN_TEMP`, `MAX_TEMP`].
    pub temperature: u32,
    /// Per-channel gamma correction (red, green, blue).
    pub gamma: [f32; 3],
    pub brightness: f32,
}

impl Default for ColorSetting {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ColorSetting {
    pub const fn neutral() -> Self {
        Self {
            temperature: NEUTRAL_TEMP,
            gamma: [DEFAULT_GAMMA; 3],
            brightness: DEFAULT_BRIGHTNESS,
        }
    }

    pub fn new(temperature: u32, brightness: f32, gamma: [f32; 3]) -> Result<Self, SettingError> {
        let setting = Self {
            temperature,
            gamma,
            brightness,
        };
        setting.validate()?;
        Ok(setting)
    }

    pub fn validate(&self) -> Result<(), SettingError> {
        validate_temperature(self.temperature)?;
        validate_brightness(self.brightness)?;
        validate_gamma(self.gamma)
    }
}

pub fn validate_temperature(value: u32) -> Result<(), SettingError> {
    if (MIN_TEMP..=MAX_TEMP).contains(&value) {
        Ok(())
    } else {
        Err(SettingError::Temperature {
            value,
            min: MIN_TEMP,
            max: MAX_TEMP,
        })
    }
}

pub fn validate_brightness(value: f32) -> Result<(), SettingError> {
    if (MIN_BRIGHTNESS..=MAX_BRIGHTNESS).contains(&value) {
        Ok(())
    } else {
        Err(SettingError::Brightness {
            value,
            min: MIN_BRIGHTNESS,
            max: MAX_BRIGHTNESS,
        })
    }
}

pub fn validate_gamma(gamma: [f32; 3]) -> Result<(), SettingError> {
    match gamma
        .into_iter()
        .find(|g| !(MIN_GAMMA..=MAX_GAMMA).contains(g))
    {
        Some(value) => Err(SettingError::Gamma {
            value,
            min: MIN_GAMMA,
            max: MAX_GAMMA,
        }),
        None => Ok(()),
    }
}

/// Parses either a single value for all channels or `R:G:B`.
pub fn parse_gamma(value: &str) -> Option<[f32; 3]> {
    let parts: Vec<&str> = value.split(':').map(str::trim).collect();
    match parts.as_slice() {
        [g] => {
            let g = g.parse().ok()?;
            Some([g; 3])
        }
        [r, g, b] => Some([r.parse().ok()?, g.parse().ok()?, b.parse().ok()?]),
        _ => None,
    }
}

fn table_row(temperature: u32) -> [f64; 3] {
    let index = ((temperature - MIN_TEMP) / TABLE_STEP) as usize;
    BLACKBODY[index].map(f64::from)
}

/// White point for `temperature`, as linear intensities per channel.
///
/// Inside the table range the two bracketing rows are interpolated.
/// Above 10000K the last row is scaled by the ratio of the tempergb
/// approximation at the requested and the tabulated temperature.
pub fn blackbody_whitepoint(temperature: u32) -> [f64; 3] {
    let temperature = temperature.clamp(MIN_TEMP, MAX_TEMP);
    if temperature >= TABLE_MAX_TEMP {
        let last = table_row(TABLE_MAX_TEMP);
        if temperature == TABLE_MAX_TEMP {
            return last;
        }
        let at = rgb_channels(tempergb::rgb_from_temperature(temperature as i32));
        let base = rgb_channels(tempergb::rgb_from_temperature(TABLE_MAX_TEMP as i32));
        return [0, 1, 2].map(|c| {
            if base[c] == 0.0 {
                last[c]
            } else {
                (last[c] * at[c] / base[c]).min(1.0)
            }
        });
    }

    let alpha = f64::from(temperature % TABLE_STEP) / f64::from(TABLE_STEP);
    let low = table_row(temperature);
    if alpha == 0.0 {
        return low;
    }
    let high = table_row(temperature + TABLE_STEP);
    [0, 1, 2].map(|c| (1.0 - alpha) * low[c] + alpha * high[c])
}

fn rgb_channels(rgb: Rgb) -> [f64; 3] {
    [rgb.r(), rgb.g(), rgb.b()].map(|v| f64::from(v) / 255.0)
}

/// Fills one channel: `(i/N)^(1/gamma) * 2^16 * brightness * white`,
/// saturating at `u16::MAX`.
pub fn fill_channel(buf: &mut [u16], white: f64, gamma: f32, brightness: f32) {
    let size = buf.len() as f64;
    let exponent = 1.0 / f64::from(gamma);
    let scale = 65536.0 * f64::from(brightness) * white;
    for (i, out) in buf.iter_mut().enumerate() {
        let value = (i as f64 / size).powf(exponent) * scale;
        *out = value.min(f64::from(u16::MAX)) as u16;
    }
}

/// Computes the ramp for `setting` into three caller-owned buffers.
/// The buffers may differ in length.
pub fn fill_ramps(red: &mut [u16], green: &mut [u16], blue: &mut [u16], setting: &ColorSetting) {
    let white = blackbody_whitepoint(setting.temperature);
    fill_channel(red, white[0], setting.gamma[0], setting.brightness);
    fill_channel(green, white[1], setting.gamma[1], setting.brightness);
    fill_channel(blue, white[2], setting.gamma[2], setting.brightness);
}

pub fn colorramp_fill(ramps: &mut GammaRamps, setting: &ColorSetting) {
    let [red, green, blue] = ramps.channels_mut();
    fill_ramps(red, green, blue, setting);
}
