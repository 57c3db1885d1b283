use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use memmap2::MmapMut;
use tracing::{debug, warn};
use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle, delegate_noop,
    backend::WaylandError,
    protocol::{wl_output, wl_registry},
};
use wayland_protocols_wlr::gamma_control::v1::client::{
    zwlr_gamma_control_manager_v1, zwlr_gamma_control_v1,
};

use super::{Backend, CrtcInfo, PartitionInfo, SiteInfo};
use crate::error::SetRampsError;
use crate::ramps::GammaRamps;

#[derive(Clone, Copy)]
pub struct OutputData {
    pub id: u32,
}

#[derive(Clone, Copy)]
pub struct GammaData {
    pub id: u32,
}

pub struct OutputState {
    pub name: Option<String>,
    pub wl_output: wl_output::WlOutput,
    pub gamma: Option<zwlr_gamma_control_v1::ZwlrGammaControlV1>,
    pub ramp_size: u32,
    pub table: Option<(File, MmapMut)>,
    /// Set when the compositor revoked gamma control or the output left.
    pub failed: bool,
}

pub struct AppState {
    pub outputs: HashMap<u32, OutputState>,
    pub gamma_mgr: Option<zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1>,
    pub gamma_mgr_name: Option<u32>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            gamma_mgr: None,
            gamma_mgr_name: None,
        }
    }

    pub fn ensure_gamma_for(&mut self, qh: &QueueHandle<Self>, id: u32) {
        let Some(mgr) = self.gamma_mgr.clone() else {
            return;
        };
        let Some(output) = self.outputs.get_mut(&id) else {
            return;
        };
        if output.gamma.is_some() {
            return;
        }
        let gamma = mgr.get_gamma_control(&output.wl_output, qh, GammaData { id });
        output.gamma = Some(gamma);
    }

    pub fn ensure_gamma_all(&mut self, qh: &QueueHandle<Self>) {
        let ids: Vec<u32> = self.outputs.keys().copied().collect();
        for id in ids {
            self.ensure_gamma_for(qh, id);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for AppState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if interface == wl_output::WlOutput::interface().name {
                    let wl_output = registry.bind::<wl_output::WlOutput, _, _>(
                        name,
                        version.min(4),
                        qh,
                        OutputData { id: name },
                    );
                    state.outputs.insert(
                        name,
                        OutputState {
                            name: None,
                            wl_output,
                            gamma: None,
                            ramp_size: 0,
                            table: None,
                            failed: false,
                        },
                    );
                    state.ensure_gamma_for(qh, name);
                } else if interface
                    == zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1::interface().name
                {
                    let mgr = registry
                        .bind::<zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1, _, _>(
                            name,
                            1,
                            qh,
                            (),
                        );
                    state.gamma_mgr = Some(mgr);
                    state.gamma_mgr_name = Some(name);
                    state.ensure_gamma_all(qh);
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                if state.gamma_mgr_name == Some(name) {
                    warn!("The gamma control manager was removed");
                    state.gamma_mgr = None;
                    state.gamma_mgr_name = None;
                }
                // Keep the entry so the owning CRTC can see it is gone.
                if let Some(output) = state.outputs.get_mut(&name) {
                    output.failed = true;
                    output.table = None;
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, OutputData> for AppState {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        data: &OutputData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_output::Event::Name { name } => {
                if let Some(output) = state.outputs.get_mut(&data.id) {
                    output.name = Some(name);
                }
            }
            wl_output::Event::Description { description } => {
                if let Some(output) = state.outputs.get_mut(&data.id) {
                    output.name.get_or_insert(description);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<zwlr_gamma_control_v1::ZwlrGammaControlV1, GammaData> for AppState {
    fn event(
        state: &mut Self,
        _: &zwlr_gamma_control_v1::ZwlrGammaControlV1,
        event: zwlr_gamma_control_v1::Event,
        data: &GammaData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_gamma_control_v1::Event::GammaSize { size } => {
                if let Some(output) = state.outputs.get_mut(&data.id) {
                    output.ramp_size = size;
                    let table_bytes = size as usize * 3 * std::mem::size_of::<u16>();
                    output.table = match create_anonymous_file(data.id, table_bytes) {
                        Ok(file) => match unsafe { MmapMut::map_mut(&file) } {
                            Ok(mmap) => Some((file, mmap)),
                            Err(err) => {
                                warn!(output = ?output.name, "mmap failed: {err}");
                                None
                            }
                        },
                        Err(err) => {
                            warn!(output = ?output.name, "Failed to allocate gamma table: {err}");
                            None
                        }
                    };
                }
            }
            zwlr_gamma_control_v1::Event::Failed => {
                if let Some(output) = state.outputs.get_mut(&data.id) {
                    output.failed = true;
                    output.table = None;
                }
            }
            _ => {}
        }
    }
}

delegate_noop!(AppState: ignore zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1);

fn create_anonymous_file(id: u32, size: usize) -> Result<File> {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    let path = dir.join(format!("gammashift-{}-{id}", std::process::id()));
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)?;
    f.set_len(size as u64)?;
    let _ = std::fs::remove_file(&path);
    Ok(f)
}

/// One compositor connection.
pub struct Display {
    conn: Connection,
    queue: EventQueue<AppState>,
    state: AppState,
}

impl Display {
    fn connect(identifier: Option<&str>) -> Result<Self> {
        let conn = match identifier {
            None => Connection::connect_to_env().context("connect wayland display")?,
            Some(name) => {
                let path = if name.starts_with('/') {
                    PathBuf::from(name)
                } else {
                    let runtime = std::env::var_os("XDG_RUNTIME_DIR")
                        .ok_or_else(|| anyhow!("XDG_RUNTIME_DIR is not set"))?;
                    PathBuf::from(runtime).join(name)
                };
                let stream = UnixStream::connect(&path)
                    .with_context(|| format!("connect to {}", path.display()))?;
                Connection::from_socket(stream).context("connect wayland display")?
            }
        };

        let mut queue = conn.new_event_queue();
        let qh = queue.handle();
        conn.display().get_registry(&qh, ());

        let mut state = AppState::new();
        queue
            .roundtrip(&mut state)
            .context("initial wayland roundtrip")?;
        if state.gamma_mgr.is_none() {
            return Err(anyhow!("Compositor lacks wlr-gamma-control-unstable-v1"));
        }
        state.ensure_gamma_all(&qh);
        queue
            .roundtrip(&mut state)
            .context("gamma setup roundtrip")?;

        Ok(Self { conn, queue, state })
    }

    /// Reads whatever the compositor sent since the last call, without
    /// blocking, and dispatches it.
    fn dispatch_pending(&mut self) -> Result<()> {
        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(err)) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => return Err(anyhow!("Failed to read wayland events: {err}")),
            }
        }
        self.queue
            .dispatch_pending(&mut self.state)
            .context("dispatch pending")?;
        Ok(())
    }
}

/// wlr-gamma-control: a site is a compositor, which exposes a single
/// partition whose CRTCs are its outputs.
pub struct Wayland;

impl Wayland {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Wayland {
    fn default() -> Self {
        Self::new()
    }
}

/// Output ids in a stable order.
pub struct WaylandOutputs {
    ids: Vec<u32>,
}

pub struct WaylandCrtc {
    display: Rc<RefCell<Display>>,
    id: u32,
}

impl Backend for Wayland {
    type Site = Rc<RefCell<Display>>;
    type Partition = WaylandOutputs;
    type Crtc = WaylandCrtc;

    fn name(&self) -> &'static str {
        "wayland"
    }

    fn open_site(&mut self, identifier: Option<&str>) -> Result<SiteInfo<Self::Site>> {
        let display = Display::connect(identifier)?;
        Ok(SiteInfo {
            data: Rc::new(RefCell::new(display)),
            partitions_available: 1,
        })
    }

    fn open_partition(
        &mut self,
        site: &mut Self::Site,
        _index: usize,
    ) -> Result<PartitionInfo<WaylandOutputs>> {
        let display = site.borrow();
        let mut ids: Vec<u32> = display
            .state
            .outputs
            .iter()
            .filter(|(_, output)| output.gamma.is_some() && !output.failed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(PartitionInfo {
            crtcs_available: ids.len(),
            data: WaylandOutputs { ids },
        })
    }

    fn open_crtc(
        &mut self,
        site: &mut Self::Site,
        partition: &mut WaylandOutputs,
        index: usize,
    ) -> Result<CrtcInfo<WaylandCrtc>> {
        let id = *partition
            .ids
            .get(index)
            .ok_or_else(|| anyhow!("output {index} could not be found"))?;
        let display = site.borrow();
        let output = display
            .state
            .outputs
            .get(&id)
            .ok_or_else(|| anyhow!("output {id} went away"))?;
        if output.table.is_none() {
            return Err(anyhow!("no gamma table for output {:?}", output.name));
        }
        debug!(output = ?output.name, ramp_size = output.ramp_size, "Opened wayland output");

        // The protocol has no way to read ramps back; dropping the gamma
        // control hands the output back to the compositor instead.
        Ok(CrtcInfo::without_saved(
            WaylandCrtc {
                display: Rc::clone(site),
                id,
            },
            output.ramp_size as usize,
        ))
    }

    fn set_ramps(&mut self, crtc: &mut WaylandCrtc, ramps: &GammaRamps) -> Result<(), SetRampsError> {
        let mut display = crtc.display.borrow_mut();
        display.dispatch_pending()?;
        let Display { conn, state, .. } = &mut *display;

        let Some(output) = state.outputs.get_mut(&crtc.id) else {
            return Err(SetRampsError::DeviceRemoved);
        };
        if output.failed {
            return Err(SetRampsError::DeviceRemoved);
        }
        let (Some(gamma), Some((file, mmap))) = (output.gamma.as_ref(), output.table.as_mut())
        else {
            return Err(SetRampsError::Busy);
        };

        let size = output.ramp_size as usize;
        if ramps.sizes() != [size; 3] {
            return Err(SetRampsError::Other(anyhow!(
                "ramp sizes {:?} do not match output size {size}",
                ramps.sizes()
            )));
        }
        let table = bytemuck::cast_slice_mut::<u8, u16>(mmap);
        for (dst, src) in table.chunks_exact_mut(size).zip(ramps.channels()) {
            dst.copy_from_slice(src);
        }
        file.seek(SeekFrom::Start(0))
            .map_err(|e| SetRampsError::Other(e.into()))?;
        gamma.set_gamma(file.as_fd());
        conn.flush()
            .map_err(|e| SetRampsError::Other(anyhow!("flush wayland connection: {e}")))?;
        Ok(())
    }

    fn close_crtc(&mut self, crtc: WaylandCrtc) {
        let mut display = crtc.display.borrow_mut();
        if let Some(output) = display.state.outputs.remove(&crtc.id) {
            if let Some(gamma) = output.gamma {
                gamma.destroy();
            }
        }
        let _ = display.conn.flush();
    }

    fn close_site(&mut self, site: Self::Site) {
        let display = site.borrow();
        if let Some(mgr) = display.state.gamma_mgr.as_ref() {
            mgr.destroy();
        }
        let _ = display.conn.flush();
    }
}
