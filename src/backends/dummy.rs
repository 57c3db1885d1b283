use anyhow::Result;
use tracing::{info, warn};

use super::{Backend, CrtcInfo, PartitionInfo, SiteInfo};
use crate::error::SetRampsError;
use crate::ramps::GammaRamps;

pub const DEFAULT_RAMP_SIZE: usize = 256;

/// One site with one partition holding one CRTC. Ramps are logged
/// instead of reaching a display.
pub struct Dummy {
    ramp_size: usize,
}

impl Dummy {
    pub fn new(ramp_size: usize) -> Self {
        Self { ramp_size }
    }
}

pub struct DummyCrtc {
    pub last_applied: Option<GammaRamps>,
}

impl Backend for Dummy {
    type Site = ();
    type Partition = ();
    type Crtc = DummyCrtc;

    fn name(&self) -> &'static str {
        "dummy"
    }

    fn open_site(&mut self, identifier: Option<&str>) -> Result<SiteInfo<()>> {
        warn!("Using dummy gamma method! Display will not be affected by this gamma method.");
        if let Some(identifier) = identifier {
            info!(site = identifier, "Ignoring site identifier");
        }
        Ok(SiteInfo {
            data: (),
            partitions_available: 1,
        })
    }

    fn open_partition(&mut self, _site: &mut (), _index: usize) -> Result<PartitionInfo<()>> {
        Ok(PartitionInfo {
            data: (),
            crtcs_available: 1,
        })
    }

    fn open_crtc(
        &mut self,
        _site: &mut (),
        _partition: &mut (),
        _index: usize,
    ) -> Result<CrtcInfo<DummyCrtc>> {
        Ok(CrtcInfo::with_saved(
            DummyCrtc { last_applied: None },
            GammaRamps::identity(self.ramp_size),
        ))
    }

    fn set_ramps(&mut self, crtc: &mut DummyCrtc, ramps: &GammaRamps) -> Result<(), SetRampsError> {
        let last = ramps.red_size().saturating_sub(1);
        info!(
            red = ramps.red.get(last).copied().unwrap_or_default(),
            green = ramps.green.get(last).copied().unwrap_or_default(),
            blue = ramps.blue.get(last).copied().unwrap_or_default(),
            size = ramps.red_size(),
            "Ramp white point"
        );
        crtc.last_applied = Some(ramps.clone());
        Ok(())
    }
}
