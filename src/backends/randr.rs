use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use x11rb::{
    connection::Connection as _,
    errors::ReplyError,
    protocol::{ErrorKind as X11ErrorKind, randr::ConnectionExt as _},
    rust_connection::RustConnection,
};

use super::{Backend, CrtcInfo, PartitionInfo, SiteInfo};
use crate::error::SetRampsError;
use crate::ramps::GammaRamps;

const RANDR_VERSION_MAJOR: u32 = 1;
const RANDR_VERSION_MINOR: u32 = 3;

/// X RandR: sites are X displays, partitions are X screens.
pub struct Randr;

impl Randr {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Randr {
    fn default() -> Self {
        Self::new()
    }
}

/// CRTC ids listed by a screen's resources.
pub struct RandrScreen {
    crtcs: Vec<u32>,
}

pub struct RandrCrtc {
    conn: Rc<RustConnection>,
    id: u32,
}

impl Backend for Randr {
    type Site = Rc<RustConnection>;
    type Partition = RandrScreen;
    type Crtc = RandrCrtc;

    fn name(&self) -> &'static str {
        "randr"
    }

    fn partition_noun(&self) -> &'static str {
        "screen"
    }

    /// `None` falls back to `$DISPLAY`.
    fn open_site(&mut self, identifier: Option<&str>) -> Result<SiteInfo<Self::Site>> {
        let (conn, _) = x11rb::connect(identifier).context("connect to X server")?;

        let version = conn
            .randr_query_version(RANDR_VERSION_MAJOR, RANDR_VERSION_MINOR)?
            .reply()
            .context("RANDR Query Version")?;
        if version.major_version != RANDR_VERSION_MAJOR
            || version.minor_version < RANDR_VERSION_MINOR
        {
            return Err(anyhow!(
                "Unsupported RANDR version ({}.{})",
                version.major_version,
                version.minor_version
            ));
        }

        let partitions_available = conn.setup().roots.len();
        Ok(SiteInfo {
            data: Rc::new(conn),
            partitions_available,
        })
    }

    fn open_partition(
        &mut self,
        site: &mut Self::Site,
        index: usize,
    ) -> Result<PartitionInfo<RandrScreen>> {
        let root = site
            .setup()
            .roots
            .get(index)
            .map(|screen| screen.root)
            .ok_or_else(|| anyhow!("Screen {index} could not be found"))?;

        let resources = site
            .randr_get_screen_resources_current(root)?
            .reply()
            .context("RANDR Get Screen Resources Current")?;
        Ok(PartitionInfo {
            crtcs_available: resources.crtcs.len(),
            data: RandrScreen {
                crtcs: resources.crtcs,
            },
        })
    }

    fn open_crtc(
        &mut self,
        site: &mut Self::Site,
        partition: &mut RandrScreen,
        index: usize,
    ) -> Result<CrtcInfo<RandrCrtc>> {
        let id = *partition
            .crtcs
            .get(index)
            .ok_or_else(|| anyhow!("CRTC {index} could not be found"))?;

        let size = site
            .randr_get_crtc_gamma_size(id)?
            .reply()
            .context("RANDR Get CRTC Gamma Size")?
            .size;
        let gamma = site
            .randr_get_crtc_gamma(id)?
            .reply()
            .context("RANDR Get CRTC Gamma")?;
        debug!(crtc = id, size, "Read RANDR gamma ramps");

        let saved = GammaRamps {
            red: gamma.red,
            green: gamma.green,
            blue: gamma.blue,
        };
        if saved.sizes().iter().any(|&s| s != usize::from(size)) {
            return Err(anyhow!(
                "RANDR reported gamma size {size} but returned {:?} stops",
                saved.sizes()
            ));
        }

        Ok(CrtcInfo::with_saved(
            RandrCrtc {
                conn: Rc::clone(site),
                id,
            },
            saved,
        ))
    }

    fn set_ramps(&mut self, crtc: &mut RandrCrtc, ramps: &GammaRamps) -> Result<(), SetRampsError> {
        let cookie = crtc
            .conn
            .randr_set_crtc_gamma(crtc.id, &ramps.red, &ramps.green, &ramps.blue)
            .map_err(|e| SetRampsError::Other(e.into()))?;
        cookie.check().map_err(classify)
    }
}

fn classify(err: ReplyError) -> SetRampsError {
    match err {
        ReplyError::X11Error(e) if e.error_kind == X11ErrorKind::RandrBadCrtc => {
            SetRampsError::DeviceRemoved
        }
        ReplyError::X11Error(e) if e.error_kind == X11ErrorKind::Access => {
            SetRampsError::PermissionDenied
        }
        other => SetRampsError::Other(anyhow::Error::new(other).context("RANDR Set CRTC Gamma")),
    }
}
