//! Site → partition → CRTC tree and the save / apply / restore lifecycle.

use std::fmt;

use tracing::{debug, warn};

use crate::backends::Backend;
use crate::color::{
    ColorSetting, MAX_BRIGHTNESS, MAX_GAMMA, MAX_TEMP, MIN_BRIGHTNESS, MIN_GAMMA, MIN_TEMP,
    colorramp_fill,
};
use crate::error::{GammaError, Resource, SetRampsError};
use crate::ramps::{GammaRamps, MIN_RAMP_SIZE};
use crate::selection::{Selection, SelectionList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Selections may still be edited.
    Created,
    /// Resolution failed; only teardown is meaningful.
    Failed,
    /// Resolved; updates may be applied.
    Ready,
    /// Saved ramps were written back.
    Restored,
    TornDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "not yet resolved",
            SessionState::Failed => "failed",
            SessionState::Ready => "ready",
            SessionState::Restored => "restored",
            SessionState::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

pub struct Crtc<C> {
    /// Index of the CRTC within its partition.
    pub index: usize,
    pub partition: usize,
    pub site: usize,
    pub settings: ColorSetting,
    data: C,
    saved_ramps: Option<GammaRamps>,
    current_ramps: Option<GammaRamps>,
}

impl<C> Crtc<C> {
    pub fn saved_ramps(&self) -> Option<&GammaRamps> {
        self.saved_ramps.as_ref()
    }

    pub fn current_ramps(&self) -> Option<&GammaRamps> {
        self.current_ramps.as_ref()
    }

    pub fn data(&self) -> &C {
        &self.data
    }

    /// False once the backend reported the device gone.
    pub fn is_active(&self) -> bool {
        self.current_ramps.is_some()
    }
}

pub struct Partition<B: Backend> {
    pub crtcs_available: usize,
    data: B::Partition,
    crtcs: Vec<Crtc<B::Crtc>>,
}

impl<B: Backend> Partition<B> {
    pub fn crtcs(&self) -> &[Crtc<B::Crtc>] {
        &self.crtcs
    }
}

pub struct Site<B: Backend> {
    pub identifier: Option<String>,
    data: B::Site,
    /// One slot per available partition, filled when first used.
    partitions: Vec<Option<Partition<B>>>,
}

impl<B: Backend> Site<B> {
    pub fn partitions_available(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition(&self, index: usize) -> Option<&Partition<B>> {
        self.partitions.get(index).and_then(Option::as_ref)
    }
}

/// Subset of open CRTCs; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrtcTarget {
    pub site: Option<usize>,
    pub partition: Option<usize>,
    pub crtc: Option<usize>,
}

impl CrtcTarget {
    pub const ALL: CrtcTarget = CrtcTarget {
        site: None,
        partition: None,
        crtc: None,
    };

    pub fn matches<C>(&self, crtc: &Crtc<C>) -> bool {
        self.site.is_none_or(|s| s == crtc.site)
            && self.partition.is_none_or(|p| p == crtc.partition)
            && self.crtc.is_none_or(|c| c == crtc.index)
    }
}

/// Read-only view of one open CRTC, for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CrtcSummary {
    pub site: usize,
    pub site_identifier: Option<String>,
    pub partition: usize,
    pub crtc: usize,
    pub ramp_size: usize,
    pub active: bool,
    pub settings: ColorSetting,
}

/// Owns the resource tree of one backend.
pub struct Session<B: Backend> {
    backend: B,
    sites: Vec<Site<B>>,
    selections: SelectionList,
    state: SessionState,
}

impl<B: Backend> Session<B> {
    /// New session holding only the neutral default selection.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sites: Vec::new(),
            selections: SelectionList::new(),
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sites(&self) -> &[Site<B>] {
        &self.sites
    }

    pub fn selections_mut(&mut self) -> &mut SelectionList {
        &mut self.selections
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), GammaError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(GammaError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Opens every CRTC the selections name. The selections are consumed
    /// whatever the outcome; on failure the partial tree stays owned by
    /// the session until [`Session::teardown`].
    pub fn resolve(&mut self) -> Result<(), GammaError> {
        self.expect_state("resolve", &[SessionState::Created])?;
        let selections = std::mem::take(&mut self.selections);

        let result = selections
            .effective()
            .iter()
            .try_for_each(|selection| self.resolve_selection(selection));

        self.state = match result {
            Ok(()) => SessionState::Ready,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn resolve_selection(&mut self, selection: &Selection) -> Result<(), GammaError> {
        let site_index = self.find_or_open_site(selection.site.as_deref())?;
        let Self { backend, sites, .. } = self;
        let site = &mut sites[site_index];

        let partitions = selection
            .partitions
            .resolve(site.partitions.len())
            .map_err(|index| GammaError::InvalidPartitionIndex {
                noun: backend.partition_noun(),
                index,
                available: site.partitions.len(),
            })?;

        for &partition_index in &partitions {
            if site.partitions[partition_index].is_some() {
                continue;
            }
            let info = backend
                .open_partition(&mut site.data, partition_index)
                .map_err(|source| GammaError::BackendOpenFailed {
                    resource: Resource::Partition {
                        site: site_index,
                        partition: partition_index,
                    },
                    source,
                })?;
            debug!(
                site = site_index,
                partition = partition_index,
                crtcs = info.crtcs_available,
                "Opened partition"
            );
            site.partitions[partition_index] = Some(Partition {
                crtcs_available: info.crtcs_available,
                data: info.data,
                crtcs: Vec::new(),
            });
        }

        for &partition_index in &partitions {
            open_crtcs(backend, site, site_index, partition_index, selection)?;
        }
        Ok(())
    }

    fn find_or_open_site(&mut self, identifier: Option<&str>) -> Result<usize, GammaError> {
        if let Some(index) = self
            .sites
            .iter()
            .position(|site| site.identifier.as_deref() == identifier)
        {
            return Ok(index);
        }

        let info = self.backend.open_site(identifier).map_err(|source| {
            GammaError::BackendOpenFailed {
                resource: Resource::Site(identifier.map(str::to_string)),
                source,
            }
        })?;
        let mut partitions = Vec::new();
        if let Err(err) = partitions.try_reserve_exact(info.partitions_available) {
            self.backend.close_site(info.data);
            return Err(err.into());
        }
        partitions.resize_with(info.partitions_available, || None);

        debug!(
            site = identifier.unwrap_or("<default>"),
            partitions = info.partitions_available,
            "Opened site"
        );
        self.sites.push(Site {
            identifier: identifier.map(str::to_string),
            data: info.data,
            partitions,
        });
        Ok(self.sites.len() - 1)
    }

    /// Every open CRTC, in site, partition, CRTC order.
    pub fn crtcs(&self) -> CrtcIter<'_, B> {
        CrtcIter::new(&self.sites)
    }

    pub fn crtc_count(&self) -> usize {
        self.crtcs().count()
    }

    pub fn summaries(&self) -> Vec<CrtcSummary> {
        self.crtcs()
            .map(|crtc| CrtcSummary {
                site: crtc.site,
                site_identifier: self.sites[crtc.site].identifier.clone(),
                partition: crtc.partition,
                crtc: crtc.index,
                ramp_size: crtc
                    .current_ramps
                    .as_ref()
                    .map_or(0, GammaRamps::red_size),
                active: crtc.is_active(),
                settings: crtc.settings,
            })
            .collect()
    }

    /// Recomputes and writes the ramps of every active CRTC.
    ///
    /// Transient backend failures are logged and skipped. A CRTC whose
    /// device went away is dropped from later updates. Any other failure
    /// stops the pass; CRTCs already written keep their new ramps.
    pub fn update(&mut self) -> Result<(), GammaError> {
        self.expect_state("update", &[SessionState::Ready])?;
        let Self { backend, sites, .. } = self;

        for crtc in crtcs_mut(sites) {
            let Some(ramps) = crtc.current_ramps.as_mut() else {
                continue;
            };
            colorramp_fill(ramps, &crtc.settings);
            match backend.set_ramps(&mut crtc.data, ramps) {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    warn!(
                        site = crtc.site,
                        partition = crtc.partition,
                        crtc = crtc.index,
                        "Failed to set gamma ramps: {err}"
                    );
                }
                Err(SetRampsError::DeviceRemoved) => {
                    warn!(
                        site = crtc.site,
                        partition = crtc.partition,
                        crtc = crtc.index,
                        "CRTC went away, no longer adjusting it"
                    );
                    crtc.current_ramps = None;
                }
                Err(source) => {
                    return Err(GammaError::SetRamps {
                        site: crtc.site,
                        partition: crtc.partition,
                        crtc: crtc.index,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Writes the saved ramps back to every CRTC that has them. Failures
    /// are logged and the remaining CRTCs are still restored.
    pub fn restore(&mut self) {
        if self.state != SessionState::Ready {
            debug!(state = %self.state, "Nothing to restore");
            return;
        }
        let Self { backend, sites, .. } = self;

        for crtc in crtcs_mut(sites) {
            let Some(saved) = crtc.saved_ramps.as_ref() else {
                continue;
            };
            if let Err(err) = backend.set_ramps(&mut crtc.data, saved) {
                warn!(
                    site = crtc.site,
                    partition = crtc.partition,
                    crtc = crtc.index,
                    "Unable to restore CRTC: {err}"
                );
            }
        }
        self.state = SessionState::Restored;
    }

    /// Releases every backend handle, leaf to root. Safe on a partially
    /// resolved session and on repeated calls.
    pub fn teardown(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        self.selections = SelectionList::new();

        for site in self.sites.drain(..) {
            for partition in site.partitions.into_iter().flatten() {
                for crtc in partition.crtcs {
                    self.backend.close_crtc(crtc.data);
                }
                self.backend.close_partition(partition.data);
            }
            self.backend.close_site(site.data);
        }
        self.backend.close();
        self.state = SessionState::TornDown;
        debug!(method = self.backend.name(), "Session torn down");
    }

    fn for_each_target(&mut self, target: CrtcTarget, mut f: impl FnMut(&mut ColorSetting)) {
        for crtc in crtcs_mut(&mut self.sites) {
            if target.matches(crtc) {
                f(&mut crtc.settings);
            }
        }
    }

    pub fn set_temperature(&mut self, target: CrtcTarget, temperature: u32) {
        let temperature = temperature.clamp(MIN_TEMP, MAX_TEMP);
        self.for_each_target(target, |s| s.temperature = temperature);
    }

    pub fn set_brightness(&mut self, target: CrtcTarget, brightness: f32) {
        let brightness = brightness.clamp(MIN_BRIGHTNESS, MAX_BRIGHTNESS);
        self.for_each_target(target, |s| s.brightness = brightness);
    }

    pub fn set_gamma(&mut self, target: CrtcTarget, gamma: [f32; 3]) {
        let gamma = gamma.map(|g| g.clamp(MIN_GAMMA, MAX_GAMMA));
        self.for_each_target(target, |s| s.gamma = gamma);
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn open_crtcs<B: Backend>(
    backend: &mut B,
    site: &mut Site<B>,
    site_index: usize,
    partition_index: usize,
    selection: &Selection,
) -> Result<(), GammaError> {
    let Some(partition) = site.partitions[partition_index].as_mut() else {
        return Ok(());
    };
    let indices = selection
        .crtcs
        .resolve(partition.crtcs_available)
        .map_err(|index| GammaError::InvalidCrtcIndex {
            index,
            available: partition.crtcs_available,
        })?;

    for crtc_index in indices {
        if partition.crtcs.iter().any(|c| c.index == crtc_index) {
            continue;
        }
        let info = backend
            .open_crtc(&mut site.data, &mut partition.data, crtc_index)
            .map_err(|source| GammaError::BackendOpenFailed {
                resource: Resource::Crtc {
                    site: site_index,
                    partition: partition_index,
                    crtc: crtc_index,
                },
                source,
            })?;

        let smallest = info.ramp_sizes.into_iter().min().unwrap_or(0);
        if smallest < MIN_RAMP_SIZE {
            backend.close_crtc(info.data);
            return Err(GammaError::RampSizeTooSmall { size: smallest });
        }
        let [red, green, blue] = info.ramp_sizes;
        let current = match GammaRamps::with_sizes(red, green, blue) {
            Ok(ramps) => ramps,
            Err(err) => {
                backend.close_crtc(info.data);
                return Err(err);
            }
        };

        debug!(
            site = site_index,
            partition = partition_index,
            crtc = crtc_index,
            ramp_size = red,
            "Opened CRTC"
        );
        let at = partition.crtcs.partition_point(|c| c.index < crtc_index);
        partition.crtcs.insert(at, Crtc {
            index: crtc_index,
            partition: partition_index,
            site: site_index,
            settings: selection.settings,
            data: info.data,
            saved_ramps: info.saved_ramps,
            current_ramps: Some(current),
        });
    }
    Ok(())
}

fn crtcs_mut<B: Backend>(sites: &mut [Site<B>]) -> impl Iterator<Item = &mut Crtc<B::Crtc>> {
    sites
        .iter_mut()
        .flat_map(|site| site.partitions.iter_mut().flatten())
        .flat_map(|partition| partition.crtcs.iter_mut())
}

/// Lazy walk over the open CRTCs of a session. Creating a new one
/// always yields the same sequence.
pub struct CrtcIter<'a, B: Backend> {
    sites: &'a [Site<B>],
    site: usize,
    partition: usize,
    crtc: usize,
}

impl<'a, B: Backend> CrtcIter<'a, B> {
    fn new(sites: &'a [Site<B>]) -> Self {
        Self {
            sites,
            site: 0,
            partition: 0,
            crtc: 0,
        }
    }
}

impl<'a, B: Backend> Iterator for CrtcIter<'a, B> {
    type Item = &'a Crtc<B::Crtc>;

    fn next(&mut self) -> Option<Self::Item> {
        let sites = self.sites;
        while let Some(site) = sites.get(self.site) {
            while let Some(slot) = site.partitions.get(self.partition) {
                if let Some(crtc) = slot.as_ref().and_then(|p| p.crtcs.get(self.crtc)) {
                    self.crtc += 1;
                    return Some(crtc);
                }
                self.partition += 1;
                self.crtc = 0;
            }
            self.site += 1;
            self.partition = 0;
        }
        None
    }
}

/// Object-safe face of a session, so the driver can hold any backend.
pub trait Adjuster {
    fn method_name(&self) -> &'static str;
    fn state(&self) -> SessionState;
    fn selections_mut(&mut self) -> &mut SelectionList;
    fn resolve(&mut self) -> Result<(), GammaError>;
    fn update(&mut self) -> Result<(), GammaError>;
    fn restore(&mut self);
    fn teardown(&mut self);
    fn set_temperature(&mut self, target: CrtcTarget, temperature: u32);
    fn set_brightness(&mut self, target: CrtcTarget, brightness: f32);
    fn set_gamma(&mut self, target: CrtcTarget, gamma: [f32; 3]);
    fn crtc_count(&self) -> usize;
    fn summaries(&self) -> Vec<CrtcSummary>;
}

impl<B: Backend> Adjuster for Session<B> {
    fn method_name(&self) -> &'static str {
        self.backend.name()
    }

    fn state(&self) -> SessionState {
        Session::state(self)
    }

    fn selections_mut(&mut self) -> &mut SelectionList {
        Session::selections_mut(self)
    }

    fn resolve(&mut self) -> Result<(), GammaError> {
        Session::resolve(self)
    }

    fn update(&mut self) -> Result<(), GammaError> {
        Session::update(self)
    }

    fn restore(&mut self) {
        Session::restore(self)
    }

    fn teardown(&mut self) {
        Session::teardown(self)
    }

    fn set_temperature(&mut self, target: CrtcTarget, temperature: u32) {
        Session::set_temperature(self, target, temperature)
    }

    fn set_brightness(&mut self, target: CrtcTarget, brightness: f32) {
        Session::set_brightness(self, target, brightness)
    }

    fn set_gamma(&mut self, target: CrtcTarget, gamma: [f32; 3]) {
        Session::set_gamma(self, target, gamma)
    }

    fn crtc_count(&self) -> usize {
        Session::crtc_count(self)
    }

    fn summaries(&self) -> Vec<CrtcSummary> {
        Session::summaries(self)
    }
}
