use std::sync::Once;

use bookhub_core::{update, LifecycleEffect, LifecycleMsg, LifecycleTable, SurfaceRecord};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(bookhub_logging::initialize_for_tests);
}

fn opened(tab_id: u64, window_id: Option<u64>) -> LifecycleTable {
    let (table, effects) = update(
        LifecycleTable::new(),
        LifecycleMsg::SurfaceOpened(SurfaceRecord { tab_id, window_id }),
    );
    assert!(effects.is_empty());
    table
}

#[test]
fn finished_tracked_surface_closes_its_window() {
    init_logging();
    let table = opened(7, Some(70));

    let (table, effects) = update(
        table,
        LifecycleMsg::SyncFinished {
            tab_id: Some(7),
            auto_close: None,
        },
    );

    assert_eq!(effects, vec![LifecycleEffect::CloseWindow(70)]);
    assert!(table.is_empty());
}

#[test]
fn finished_tracked_surface_without_window_closes_the_tab() {
    init_logging();
    let table = opened(7, None);

    let (_table, effects) = update(
        table,
        LifecycleMsg::SyncFinished {
            tab_id: Some(7),
            auto_close: None,
        },
    );

    assert_eq!(effects, vec![LifecycleEffect::CloseTab(7)]);
}

#[test]
fn finished_untracked_surface_is_a_noop() {
    init_logging();
    let before = opened(1, Some(10));

    let (after, effects) = update(
        before.clone(),
        LifecycleMsg::SyncFinished {
            tab_id: Some(99),
            auto_close: None,
        },
    );

    assert_eq!(after, before);
    assert!(effects.is_empty());
}

#[test]
fn explicit_auto_close_applies_to_untracked_tab() {
    init_logging();
    let (_table, effects) = update(
        LifecycleTable::new(),
        LifecycleMsg::SyncFinished {
            tab_id: Some(5),
            auto_close: Some(true),
        },
    );
    assert_eq!(effects, vec![LifecycleEffect::CloseTab(5)]);
}

#[test]
fn explicit_keep_open_still_forgets_the_surface() {
    init_logging();
    let (table, effects) = update(
        opened(3, Some(30)),
        LifecycleMsg::SyncFinished {
            tab_id: Some(3),
            auto_close: Some(false),
        },
    );
    assert!(effects.is_empty());
    assert!(!table.is_tracked(3));
}

#[test]
fn finished_without_sender_tab_changes_nothing() {
    init_logging();
    let before = opened(3, Some(30));
    let (after, effects) = update(
        before.clone(),
        LifecycleMsg::SyncFinished {
            tab_id: None,
            auto_close: Some(true),
        },
    );
    assert_eq!(after, before);
    assert!(effects.is_empty());
}

#[test]
fn removal_and_completion_commute() {
    init_logging();
    let finished = LifecycleMsg::SyncFinished {
        tab_id: Some(4),
        auto_close: None,
    };
    let removed = LifecycleMsg::SurfaceRemoved { tab_id: 4 };

    let (a, _) = update(opened(4, Some(40)), finished.clone());
    let (a, late_effects) = update(a, removed.clone());
    assert!(late_effects.is_empty());

    let (b, _) = update(opened(4, Some(40)), removed.clone());
    let (b, effects) = update(b, finished);
    // Already gone: nothing left to close.
    assert!(effects.is_empty());

    assert_eq!(a, b);
    assert!(a.is_empty());

    let (c, effects) = update(b, removed);
    assert!(effects.is_empty());
    assert!(c.is_empty());
}
