mod common;

use common::{Event, Fail, initial_ramps, list, selection, session_with};
use gammashift::color::{MAX_TEMP, colorramp_fill};
use gammashift::error::Resource;
use gammashift::{
    ColorSetting, CrtcTarget, GammaError, GammaRamps, IndexSelector, SelectionList, SessionState,
};

fn keys(session: &gammashift::Session<common::MockBackend>) -> Vec<(usize, usize, usize)> {
    session
        .crtcs()
        .map(|c| (c.site, c.partition, c.index))
        .collect()
}

#[test]
fn resolves_every_crtc_on_every_site() {
    let (mut session, world) = session_with(
        2,
        3,
        16,
        list(vec![
            selection(Some(":0"), IndexSelector::All, IndexSelector::All),
            selection(Some(":1"), IndexSelector::All, IndexSelector::All),
        ]),
    );
    session.resolve().unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.sites().len(), 2);
    assert_eq!(session.crtc_count(), 12);
    let keys = keys(&session);
    assert_eq!(keys[0], (0, 0, 0));
    assert_eq!(keys[3], (0, 1, 0));
    assert_eq!(keys[6], (1, 0, 0));
    assert_eq!(keys[11], (1, 1, 2));
    assert_eq!(world.borrow().count(|e| matches!(e, Event::OpenSite(_))), 2);
}

#[test]
fn default_selection_covers_default_site() {
    let (mut session, world) = session_with(2, 3, 16, SelectionList::new());
    session.resolve().unwrap();

    assert_eq!(session.crtc_count(), 6);
    assert_eq!(world.borrow().events[0], Event::OpenSite(None));
    for crtc in session.crtcs() {
        assert_eq!(crtc.settings, ColorSetting::neutral());
    }
}

#[test]
fn out_of_range_crtc_cites_valid_range() {
    let (mut session, world) = session_with(
        1,
        2,
        16,
        list(vec![selection(None, IndexSelector::All, IndexSelector::one(5))]),
    );
    let err = session.resolve().unwrap_err();

    assert!(matches!(
        err,
        GammaError::InvalidCrtcIndex {
            index: 5,
            available: 2
        }
    ));
    assert_eq!(err.to_string(), "CRTC 5 does not exist. Valid CRTCs are [0-1].");
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(world.borrow().count(|e| matches!(e, Event::OpenCrtc(_))), 0);
}

#[test]
fn out_of_range_partition_is_rejected_before_opening() {
    let (mut session, world) = session_with(
        2,
        1,
        16,
        list(vec![selection(
            None,
            IndexSelector::Indices(vec![0, 3]),
            IndexSelector::All,
        )]),
    );
    let err = session.resolve().unwrap_err();

    assert_eq!(
        err.to_string(),
        "Partition 3 does not exist. Valid partitions are [0-1]."
    );
    assert_eq!(world.borrow().events, vec![Event::OpenSite(None)]);
}

#[test]
fn overlapping_selections_open_each_crtc_once() {
    let mut first = selection(None, IndexSelector::All, IndexSelector::Indices(vec![0, 1]));
    first.settings.gamma = [0.8; 3];
    let mut second = selection(None, IndexSelector::All, IndexSelector::Indices(vec![1, 2]));
    second.settings.gamma = [1.2; 3];

    let (mut session, world) = session_with(1, 3, 16, list(vec![first, second]));
    session.resolve().unwrap();

    assert_eq!(session.crtc_count(), 3);
    let world = world.borrow();
    assert_eq!(world.count(|e| matches!(e, Event::OpenSite(_))), 1);
    assert_eq!(world.count(|e| matches!(e, Event::OpenPartition(..))), 1);
    assert_eq!(world.count(|e| *e == Event::OpenCrtc((0, 0, 1))), 1);

    let gammas: Vec<[f32; 3]> = session.crtcs().map(|c| c.settings.gamma).collect();
    assert_eq!(gammas, vec![[0.8; 3], [0.8; 3], [1.2; 3]]);
}

#[test]
fn update_writes_computed_ramps_and_is_idempotent() {
    let (mut session, world) = session_with(1, 2, 32, SelectionList::new());
    session.resolve().unwrap();
    session.set_temperature(CrtcTarget::ALL, 3500);

    session.update().unwrap();
    let first = world.borrow().device_ramps[&(0, 0, 1)].clone();
    session.update().unwrap();
    let second = world.borrow().device_ramps[&(0, 0, 1)].clone();

    let mut expected = GammaRamps::new(32);
    colorramp_fill(
        &mut expected,
        &ColorSetting::new(3500, 1.0, [1.0; 3]).unwrap(),
    );
    assert_eq!(first, expected);
    assert_eq!(first, second);
    assert_eq!(world.borrow().set_count((0, 0, 1)), 2);
}

#[test]
fn restore_puts_back_the_original_ramps() {
    let (mut session, world) = session_with(2, 2, 16, SelectionList::new());
    session.resolve().unwrap();
    session.set_temperature(CrtcTarget::ALL, 2500);
    session.update().unwrap();
    assert_ne!(world.borrow().device_ramps[&(0, 1, 0)], initial_ramps((0, 1, 0), 16));

    session.restore();

    assert_eq!(session.state(), SessionState::Restored);
    let world = world.borrow();
    for key in [(0, 0, 0), (0, 0, 1), (0, 1, 0), (0, 1, 1)] {
        assert_eq!(world.device_ramps[&key], initial_ramps(key, 16));
    }
}

#[test]
fn restore_keeps_going_after_a_failure() {
    let (mut session, world) = session_with(1, 3, 16, SelectionList::new());
    session.resolve().unwrap();
    session.update().unwrap();
    world.borrow_mut().fail_set.insert((0, 0, 0), Fail::Other);

    session.restore();

    assert_eq!(session.state(), SessionState::Restored);
    let world = world.borrow();
    assert_eq!(world.device_ramps[&(0, 0, 2)], initial_ramps((0, 0, 2), 16));
    assert_ne!(world.device_ramps[&(0, 0, 0)], initial_ramps((0, 0, 0), 16));
}

#[test]
fn transient_failures_do_not_stop_an_update() {
    let (mut session, world) = session_with(1, 3, 16, SelectionList::new());
    session.resolve().unwrap();
    world.borrow_mut().fail_set.insert((0, 0, 0), Fail::Busy);
    world
        .borrow_mut()
        .fail_set
        .insert((0, 0, 1), Fail::PermissionDenied);

    session.update().unwrap();

    let world = world.borrow();
    assert_eq!(world.set_count((0, 0, 2)), 1);
    assert!(session.crtcs().all(|c| c.is_active()));
}

#[test]
fn removed_devices_are_skipped_afterwards() {
    let (mut session, world) = session_with(1, 2, 16, SelectionList::new());
    session.resolve().unwrap();
    world.borrow_mut().fail_set.insert((0, 0, 0), Fail::Removed);

    session.update().unwrap();
    session.update().unwrap();

    assert_eq!(world.borrow().set_count((0, 0, 0)), 1);
    assert_eq!(world.borrow().set_count((0, 0, 1)), 2);
    let summaries = session.summaries();
    assert!(!summaries[0].active);
    assert!(summaries[1].active);
}

#[test]
fn hard_failure_stops_the_update() {
    let (mut session, world) = session_with(1, 3, 16, SelectionList::new());
    session.resolve().unwrap();
    world.borrow_mut().fail_set.insert((0, 0, 1), Fail::Other);

    let err = session.update().unwrap_err();

    assert!(matches!(
        err,
        GammaError::SetRamps {
            site: 0,
            partition: 0,
            crtc: 1,
            ..
        }
    ));
    let world = world.borrow();
    assert_eq!(world.set_count((0, 0, 0)), 1);
    assert_eq!(world.set_count((0, 0, 2)), 0);
}

#[test]
fn partial_resolve_is_torn_down_leaf_to_root() {
    let (mut session, world) = session_with(
        2,
        2,
        16,
        list(vec![
            selection(Some(":0"), IndexSelector::All, IndexSelector::All),
            selection(Some(":1"), IndexSelector::All, IndexSelector::All),
        ]),
    );
    world.borrow_mut().fail_open_crtc.insert((1, 1, 0));

    let err = session.resolve().unwrap_err();
    assert!(matches!(
        err,
        GammaError::BackendOpenFailed {
            resource: Resource::Crtc {
                site: 1,
                partition: 1,
                crtc: 0
            },
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Failed);

    session.teardown();
    session.teardown();
    assert_eq!(session.state(), SessionState::TornDown);

    let world = world.borrow();
    let opened: Vec<_> = world
        .events
        .iter()
        .filter_map(|e| match e {
            Event::OpenCrtc(key) if *key != (1, 1, 0) => Some(*key),
            _ => None,
        })
        .collect();
    assert_eq!(opened.len(), 6);
    for key in &opened {
        assert_eq!(world.count(|e| *e == Event::CloseCrtc(*key)), 1);
        let crtc_closed = world.position(&Event::CloseCrtc(*key)).unwrap();
        let partition_closed = world
            .position(&Event::ClosePartition(key.0, key.1))
            .unwrap();
        let site_closed = world.position(&Event::CloseSite(key.0)).unwrap();
        assert!(crtc_closed < partition_closed);
        assert!(partition_closed < site_closed);
    }
    assert_eq!(world.count(|e| matches!(e, Event::CloseCrtc(_))), 6);
    assert_eq!(world.count(|e| matches!(e, Event::ClosePartition(..))), 4);
    assert_eq!(world.count(|e| matches!(e, Event::CloseSite(_))), 2);
    assert_eq!(world.events.last(), Some(&Event::Close));
}

#[test]
fn unreachable_site_is_reported_by_name() {
    let (mut session, world) = session_with(
        1,
        1,
        16,
        list(vec![selection(Some("wayland-9"), IndexSelector::All, IndexSelector::All)]),
    );
    world.borrow_mut().fail_sites.insert("wayland-9".into());

    let err = session.resolve().unwrap_err();
    assert!(err.to_string().starts_with("Failed to open site `wayland-9'"));
    session.teardown();
    assert_eq!(world.borrow().count(|e| matches!(e, Event::CloseSite(_))), 0);
}

#[test]
fn tiny_ramps_are_refused_and_released() {
    let (mut session, world) = session_with(1, 2, 16, SelectionList::new());
    world.borrow_mut().ramp_sizes.insert((0, 0, 1), 1);

    let err = session.resolve().unwrap_err();

    assert!(matches!(err, GammaError::RampSizeTooSmall { size: 1 }));
    let world = world.borrow();
    let opened = world.position(&Event::OpenCrtc((0, 0, 1))).unwrap();
    assert_eq!(world.events[opened + 1], Event::CloseCrtc((0, 0, 1)));
}

#[test]
fn operations_check_the_session_state() {
    let (mut session, _world) = session_with(1, 1, 16, SelectionList::new());
    assert!(matches!(
        session.update(),
        Err(GammaError::InvalidState {
            operation: "update",
            state: SessionState::Created
        })
    ));

    session.resolve().unwrap();
    assert!(matches!(
        session.resolve(),
        Err(GammaError::InvalidState {
            operation: "resolve",
            ..
        })
    ));

    session.teardown();
    assert!(matches!(
        session.update(),
        Err(GammaError::InvalidState {
            state: SessionState::TornDown,
            ..
        })
    ));
}

#[test]
fn targeted_settings_touch_only_matching_crtcs() {
    let (mut session, _world) = session_with(2, 2, 16, SelectionList::new());
    session.resolve().unwrap();

    session.set_temperature(
        CrtcTarget {
            partition: Some(1),
            crtc: Some(0),
            ..CrtcTarget::ALL
        },
        50_000,
    );
    session.set_brightness(CrtcTarget::ALL, 0.0);

    let temps: Vec<u32> = session.crtcs().map(|c| c.settings.temperature).collect();
    assert_eq!(temps, vec![6500, 6500, MAX_TEMP, 6500]);
    assert!(session.crtcs().all(|c| c.settings.brightness == 0.1));
}

#[test]
fn iteration_is_stable_and_restartable() {
    let (mut session, _world) = session_with(
        2,
        2,
        16,
        list(vec![
            selection(None, IndexSelector::one(1), IndexSelector::All),
            selection(None, IndexSelector::one(0), IndexSelector::one(1)),
        ]),
    );
    session.resolve().unwrap();

    let first = keys(&session);
    assert_eq!(first, vec![(0, 0, 1), (0, 1, 0), (0, 1, 1)]);
    assert_eq!(keys(&session), first);

    let mut iter = session.crtcs();
    iter.next();
    assert_eq!(iter.count(), 2);
}

#[test]
fn dropping_a_session_releases_everything() {
    let (mut session, world) = session_with(1, 1, 16, SelectionList::new());
    session.resolve().unwrap();
    drop(session);

    let world = world.borrow();
    assert_eq!(world.count(|e| matches!(e, Event::CloseCrtc(_))), 1);
    assert_eq!(world.events.last(), Some(&Event::Close));
}

#[test]
fn reselecting_an_open_crtc_leaves_the_tree_alone() {
    let (mut session, world) = session_with(
        2,
        3,
        16,
        list(vec![
            selection(None, IndexSelector::All, IndexSelector::All),
            selection(None, IndexSelector::one(0), IndexSelector::one(0)),
        ]),
    );
    session.resolve().unwrap();

    assert_eq!(session.crtc_count(), 6);
    assert_eq!(world.borrow().count(|e| *e == Event::OpenCrtc((0, 0, 0))), 1);
    assert_eq!(session.sites()[0].partition(0).unwrap().crtcs().len(), 3);
}

#[test]
fn crtcs_iterate_in_index_order_whatever_the_selection_order() {
    let (mut session, world) = session_with(
        1,
        3,
        16,
        list(vec![
            selection(None, IndexSelector::one(0), IndexSelector::one(2)),
            selection(None, IndexSelector::one(0), IndexSelector::one(0)),
            selection(None, IndexSelector::one(0), IndexSelector::one(1)),
        ]),
    );
    session.resolve().unwrap();

    assert_eq!(keys(&session), vec![(0, 0, 0), (0, 0, 1), (0, 0, 2)]);
    let world = world.borrow();
    assert!(
        world.position(&Event::OpenCrtc((0, 0, 2))) < world.position(&Event::OpenCrtc((0, 0, 0)))
    );
}
