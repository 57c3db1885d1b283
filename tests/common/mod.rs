//! In-memory backend for session tests.
//!
//! Each test file compiles its own copy of this module, so items may appear
//! unused from the perspective of a single test file.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use gammashift::backends::{Backend, CrtcInfo, PartitionInfo, SiteInfo};
use gammashift::{GammaRamps, IndexSelector, Selection, SelectionList, Session, SetRampsError};

/// (site ordinal, partition, CRTC)
pub type CrtcKey = (usize, usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    OpenSite(Option<String>),
    OpenPartition(usize, usize),
    OpenCrtc(CrtcKey),
    SetRamps(CrtcKey),
    CloseCrtc(CrtcKey),
    ClosePartition(usize, usize),
    CloseSite(usize),
    Close,
}

#[derive(Debug, Clone, Copy)]
pub enum Fail {
    Busy,
    PermissionDenied,
    Removed,
    Other,
}

impl Fail {
    fn to_error(self) -> SetRampsError {
        match self {
            Fail::Busy => SetRampsError::Busy,
            Fail::PermissionDenied => SetRampsError::PermissionDenied,
            Fail::Removed => SetRampsError::DeviceRemoved,
            Fail::Other => SetRampsError::Other(anyhow!("injected failure")),
        }
    }
}

/// What the fake hardware looks like, plus everything the backend saw.
#[derive(Debug, Default)]
pub struct World {
    pub events: Vec<Event>,
    /// Ramps currently "on the screen".
    pub device_ramps: HashMap<CrtcKey, GammaRamps>,
    pub ramp_sizes: HashMap<CrtcKey, usize>,
    pub fail_open_crtc: HashSet<CrtcKey>,
    pub fail_set: HashMap<CrtcKey, Fail>,
    pub fail_sites: HashSet<String>,
}

impl World {
    pub fn count(&self, wanted: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| wanted(e)).count()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    pub fn set_count(&self, key: CrtcKey) -> usize {
        self.count(|e| *e == Event::SetRamps(key))
    }
}

pub type Shared = Rc<RefCell<World>>;

pub struct MockBackend {
    pub partitions: usize,
    pub crtcs: usize,
    pub ramp_size: usize,
    world: Shared,
    sites_opened: usize,
}

impl MockBackend {
    pub fn new(partitions: usize, crtcs: usize, ramp_size: usize) -> (Self, Shared) {
        let world = Shared::default();
        let backend = Self {
            partitions,
            crtcs,
            ramp_size,
            world: Rc::clone(&world),
            sites_opened: 0,
        };
        (backend, world)
    }
}

pub struct MockSite {
    pub ordinal: usize,
}

pub struct MockPartition {
    pub site: usize,
    pub index: usize,
}

pub struct MockCrtc {
    pub key: CrtcKey,
}

/// Ramps a CRTC starts with; distinct per CRTC so restores can be told apart.
pub fn initial_ramps(key: CrtcKey, size: usize) -> GammaRamps {
    let mut ramps = GammaRamps::identity(size);
    let marker = (key.0 * 100 + key.1 * 10 + key.2) as u16;
    ramps.red[0] = marker;
    ramps.green[0] = marker + 1;
    ramps.blue[0] = marker + 2;
    ramps
}

impl Backend for MockBackend {
    type Site = MockSite;
    type Partition = MockPartition;
    type Crtc = MockCrtc;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn open_site(&mut self, identifier: Option<&str>) -> Result<SiteInfo<MockSite>> {
        let mut world = self.world.borrow_mut();
        world.events.push(Event::OpenSite(identifier.map(str::to_string)));
        if identifier.is_some_and(|id| world.fail_sites.contains(id)) {
            return Err(anyhow!("cannot reach site"));
        }
        let ordinal = self.sites_opened;
        self.sites_opened += 1;
        Ok(SiteInfo {
            data: MockSite { ordinal },
            partitions_available: self.partitions,
        })
    }

    fn open_partition(
        &mut self,
        site: &mut MockSite,
        index: usize,
    ) -> Result<PartitionInfo<MockPartition>> {
        self.world
            .borrow_mut()
            .events
            .push(Event::OpenPartition(site.ordinal, index));
        Ok(PartitionInfo {
            data: MockPartition {
                site: site.ordinal,
                index,
            },
            crtcs_available: self.crtcs,
        })
    }

    fn open_crtc(
        &mut self,
        site: &mut MockSite,
        partition: &mut MockPartition,
        index: usize,
    ) -> Result<CrtcInfo<MockCrtc>> {
        let key = (site.ordinal, partition.index, index);
        let mut world = self.world.borrow_mut();
        world.events.push(Event::OpenCrtc(key));
        if world.fail_open_crtc.contains(&key) {
            return Err(anyhow!("injected open failure"));
        }
        let size = world.ramp_sizes.get(&key).copied().unwrap_or(self.ramp_size);
        let saved = world
            .device_ramps
            .entry(key)
            .or_insert_with(|| initial_ramps(key, size))
            .clone();
        Ok(CrtcInfo::with_saved(MockCrtc { key }, saved))
    }

    fn set_ramps(&mut self, crtc: &mut MockCrtc, ramps: &GammaRamps) -> Result<(), SetRampsError> {
        let mut world = self.world.borrow_mut();
        world.events.push(Event::SetRamps(crtc.key));
        if let Some(fail) = world.fail_set.get(&crtc.key) {
            return Err(fail.to_error());
        }
        world.device_ramps.insert(crtc.key, ramps.clone());
        Ok(())
    }

    fn close_crtc(&mut self, crtc: MockCrtc) {
        self.world
            .borrow_mut()
            .events
            .push(Event::CloseCrtc(crtc.key));
    }

    fn close_partition(&mut self, partition: MockPartition) {
        self.world
            .borrow_mut()
            .events
            .push(Event::ClosePartition(partition.site, partition.index));
    }

    fn close_site(&mut self, site: MockSite) {
        self.world
            .borrow_mut()
            .events
            .push(Event::CloseSite(site.ordinal));
    }

    fn close(&mut self) {
        self.world.borrow_mut().events.push(Event::Close);
    }
}

pub fn session_with(
    partitions: usize,
    crtcs: usize,
    ramp_size: usize,
    selections: SelectionList,
) -> (Session<MockBackend>, Shared) {
    let (backend, world) = MockBackend::new(partitions, crtcs, ramp_size);
    let mut session = Session::new(backend);
    *session.selections_mut() = selections;
    (session, world)
}

pub fn selection(site: Option<&str>, partitions: IndexSelector, crtcs: IndexSelector) -> Selection {
    Selection {
        site: site.map(str::to_string),
        partitions,
        crtcs,
        ..Selection::default()
    }
}

pub fn list(selections: Vec<Selection>) -> SelectionList {
    let mut list = SelectionList::new();
    for selection in selections {
        list.push_selection(selection);
    }
    list
}
