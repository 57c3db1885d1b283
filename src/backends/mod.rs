//! Display backends and the method table used to pick one.
//!
//! A backend only knows how to open its own sites, partitions and CRTCs
//! and how to write a ramp to a CRTC. Everything else (selection
//! resolution, saving and restoring ramps, ramp computation) lives in
//! [`crate::session`].

pub mod dummy;
pub mod randr;
pub mod wayland;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::{GammaError, SetRampsError};
use crate::ramps::GammaRamps;
use crate::selection::SelectionList;
use crate::session::{Adjuster, Session};

/// A freshly opened site (display server, device).
pub struct SiteInfo<S> {
    pub data: S,
    pub partitions_available: usize,
}

/// A freshly opened partition (screen, graphics card).
pub struct PartitionInfo<P> {
    pub data: P,
    pub crtcs_available: usize,
}

/// A freshly opened CRTC.
pub struct CrtcInfo<C> {
    pub data: C,
    pub ramp_sizes: [usize; 3],
    /// Ramps found on the CRTC, restored at shutdown. Backends that
    /// cannot read ramps back leave this empty.
    pub saved_ramps: Option<GammaRamps>,
}

impl<C> CrtcInfo<C> {
    pub fn with_saved(data: C, saved_ramps: GammaRamps) -> Self {
        Self {
            data,
            ramp_sizes: saved_ramps.sizes(),
            saved_ramps: Some(saved_ramps),
        }
    }

    pub fn without_saved(data: C, ramp_size: usize) -> Self {
        Self {
            data,
            ramp_sizes: [ramp_size; 3],
            saved_ramps: None,
        }
    }
}

/// Platform half of gamma adjustment.
///
/// Handles returned by the `open_*` calls are owned by the session and
/// handed back through the `close_*` calls during teardown, leaf to
/// root, exactly once each.
pub trait Backend {
    type Site;
    type Partition;
    type Crtc;

    fn name(&self) -> &'static str;

    /// What this backend calls a partition, used in error messages.
    fn partition_noun(&self) -> &'static str {
        "partition"
    }

    fn open_site(&mut self, identifier: Option<&str>) -> Result<SiteInfo<Self::Site>>;

    fn open_partition(
        &mut self,
        site: &mut Self::Site,
        index: usize,
    ) -> Result<PartitionInfo<Self::Partition>>;

    fn open_crtc(
        &mut self,
        site: &mut Self::Site,
        partition: &mut Self::Partition,
        index: usize,
    ) -> Result<CrtcInfo<Self::Crtc>>;

    fn set_ramps(&mut self, crtc: &mut Self::Crtc, ramps: &GammaRamps)
    -> Result<(), SetRampsError>;

    fn close_crtc(&mut self, crtc: Self::Crtc) {
        drop(crtc);
    }

    fn close_partition(&mut self, partition: Self::Partition) {
        drop(partition);
    }

    fn close_site(&mut self, site: Self::Site) {
        drop(site);
    }

    /// Releases backend-wide state after every site is closed.
    fn close(&mut self) {}
}

/// Options shared by every method constructor.
#[derive(Debug, Clone, Default)]
pub struct MethodOptions {
    /// Ramp size reported by the dummy backend.
    pub dummy_ramp_size: Option<usize>,
}

pub struct Method {
    pub name: &'static str,
    /// Tried when no method is named explicitly.
    pub autostart: bool,
    pub help: &'static str,
    construct: fn(&MethodOptions) -> Result<Box<dyn Adjuster>>,
}

impl Method {
    /// Builds the backend, resolves `selections` against it and returns
    /// the ready session.
    pub fn start(
        &self,
        options: &MethodOptions,
        selections: SelectionList,
    ) -> Result<Box<dyn Adjuster>, GammaError> {
        let mut adjuster = (self.construct)(options).map_err(|source| {
            GammaError::BackendOpenFailed {
                resource: crate::error::Resource::Site(None),
                source,
            }
        })?;
        *adjuster.selections_mut() = selections;
        // A failed resolve leaves a partial tree behind; teardown runs
        // when the boxed session is dropped.
        adjuster.resolve()?;
        Ok(adjuster)
    }
}

fn boxed<B: Backend + 'static>(backend: B) -> Result<Box<dyn Adjuster>> {
    Ok(Box::new(Session::new(backend)))
}

pub static METHODS: &[Method] = &[
    Method {
        name: "wayland",
        autostart: true,
        help: "Adjust gamma ramps with the wlr-gamma-control Wayland protocol",
        construct: |_| boxed(wayland::Wayland::new()),
    },
    Method {
        name: "randr",
        autostart: true,
        help: "Adjust gamma ramps with the X RANDR extension",
        construct: |_| boxed(randr::Randr::new()),
    },
    Method {
        name: "dummy",
        autostart: false,
        help: "Does not affect the display, logs the ramps instead",
        construct: |options| {
            boxed(dummy::Dummy::new(
                options.dummy_ramp_size.unwrap_or(dummy::DEFAULT_RAMP_SIZE),
            ))
        },
    },
];

fn lookup<'a>(methods: &'a [Method], name: &str) -> Option<&'a Method> {
    methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

pub fn find_method(name: &str) -> Option<&'static Method> {
    lookup(METHODS, name)
}

/// Starts the named method, or every autostart method in table order
/// until one resolves.
pub fn start_method(
    name: Option<&str>,
    options: &MethodOptions,
    selections: SelectionList,
) -> Result<Box<dyn Adjuster>, GammaError> {
    start_from(METHODS, name, options, selections)
}

fn start_from(
    methods: &[Method],
    name: Option<&str>,
    options: &MethodOptions,
    selections: SelectionList,
) -> Result<Box<dyn Adjuster>, GammaError> {
    match name {
        Some(name) if !name.eq_ignore_ascii_case("auto") => {
            let method =
                lookup(methods, name).ok_or_else(|| GammaError::UnknownMethod(name.to_string()))?;
            let adjuster = method.start(options, selections)?;
            info!(method = method.name, "Using method");
            Ok(adjuster)
        }
        _ => {
            for method in methods.iter().filter(|m| m.autostart) {
                match method.start(options, selections.clone()) {
                    Ok(adjuster) => {
                        info!(method = method.name, "Using method");
                        return Ok(adjuster);
                    }
                    Err(err) => {
                        warn!(method = method.name, "{err}");
                        warn!("Trying next method...");
                    }
                }
            }
            Err(GammaError::NoMethodAvailable)
        }
    }
}
