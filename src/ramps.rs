use crate::error::GammaError;

/// Smallest ramp a CRTC may report.
pub const MIN_RAMP_SIZE: usize = 2;

/// Red, green and blue lookup tables. The three sizes are usually equal
/// but nothing here depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GammaRamps {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

impl GammaRamps {
    /// Zeroed ramps with `size` stops per channel.
    pub fn new(size: usize) -> Self {
        Self {
            red: vec![0; size],
            green: vec![0; size],
            blue: vec![0; size],
        }
    }

    /// Zeroed ramps, reporting allocation failure instead of aborting.
    pub fn with_sizes(red: usize, green: usize, blue: usize) -> Result<Self, GammaError> {
        Ok(Self {
            red: try_zeroed(red)?,
            green: try_zeroed(green)?,
            blue: try_zeroed(blue)?,
        })
    }

    /// Linear ramps from 0 to `u16::MAX`, i.e. no adjustment.
    pub fn identity(size: usize) -> Self {
        let channel: Vec<u16> = (0..size)
            .map(|i| {
                if size < 2 {
                    0
                } else {
                    (i as f64 / (size - 1) as f64 * f64::from(u16::MAX)) as u16
                }
            })
            .collect();
        Self {
            red: channel.clone(),
            green: channel.clone(),
            blue: channel,
        }
    }

    pub fn red_size(&self) -> usize {
        self.red.len()
    }

    pub fn green_size(&self) -> usize {
        self.green.len()
    }

    pub fn blue_size(&self) -> usize {
        self.blue.len()
    }

    pub fn sizes(&self) -> [usize; 3] {
        [self.red.len(), self.green.len(), self.blue.len()]
    }

    pub fn channels(&self) -> [&[u16]; 3] {
        [&self.red, &self.green, &self.blue]
    }

    pub fn channels_mut(&mut self) -> [&mut [u16]; 3] {
        [&mut self.red, &mut self.green, &mut self.blue]
    }
}

fn try_zeroed(len: usize) -> Result<Vec<u16>, GammaError> {
    let mut channel = Vec::new();
    channel.try_reserve_exact(len)?;
    channel.resize(len, 0);
    Ok(channel)
}
