//! Ramp output for `--print`, without touching any display.

use std::io::Write;

use anyhow::Result;

use crate::cli::PrintFormat;
use crate::color::{ColorSetting, colorramp_fill};
use crate::error::GammaError;
use crate::ramps::{GammaRamps, MIN_RAMP_SIZE};

pub fn compute(size: usize, setting: &ColorSetting) -> Result<GammaRamps, GammaError> {
    if size < MIN_RAMP_SIZE {
        return Err(GammaError::RampSizeTooSmall { size });
    }
    let mut ramps = GammaRamps::with_sizes(size, size, size)?;
    colorramp_fill(&mut ramps, setting);
    Ok(ramps)
}

pub fn write_ramps(out: &mut impl Write, ramps: &GammaRamps, format: PrintFormat) -> Result<()> {
    match format {
        PrintFormat::Text => {
            for (i, ((r, g), b)) in ramps
                .red
                .iter()
                .zip(&ramps.green)
                .zip(&ramps.blue)
                .enumerate()
            {
                writeln!(out, "{i} {r} {g} {b}")?;
            }
        }
        PrintFormat::Binary => {
            for channel in ramps.channels() {
                out.write_all(bytemuck::cast_slice(channel))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_has_one_line_per_stop() {
        let ramps = compute(4, &ColorSetting::neutral()).unwrap();
        let mut out = Vec::new();
        write_ramps(&mut out, &ramps, PrintFormat::Text).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "0 0 0 0");
        assert_eq!(lines[2], "2 32768 32768 32768");
    }

    #[test]
    fn binary_is_channels_in_order() {
        let setting = ColorSetting::new(3000, 1.0, [1.0; 3]).unwrap();
        let ramps = compute(8, &setting).unwrap();
        let mut out = Vec::new();
        write_ramps(&mut out, &ramps, PrintFormat::Binary).unwrap();
        assert_eq!(out.len(), 8 * 3 * 2);
        let red_last = u16::from_ne_bytes([out[14], out[15]]);
        let blue_last = u16::from_ne_bytes([out[46], out[47]]);
        assert_eq!(red_last, ramps.red[7]);
        assert_eq!(blue_last, ramps.blue[7]);
    }

    #[test]
    fn rejects_tiny_ramps() {
        assert!(matches!(
            compute(1, &ColorSetting::neutral()),
            Err(GammaError::RampSizeTooSmall { size: 1 })
        ));
    }
}
