use std::cell::Cell;
use std::rc::Rc;

use weft_core::{on_cleanup, DuplicateKeyPolicy, RenderConfig, RenderContext};
use weft_testing::prelude::*;

#[test]
fn dropping_rule_unmounts_and_disposes() {
    let cleaned = Rc::new(Cell::new(false));
    let id = {
        let mut rule = RenderTestRule::new();
        let cleaned = Rc::clone(&cleaned);
        rule.set_content(move || {
            on_cleanup(move || cleaned.set(true)).expect("inside a unit");
            "content"
        })
        .expect("mount");
        rule.context().id()
    };
    assert!(cleaned.get());
    assert_eq!(RenderContext::lookup(id), None);
}

#[test]
fn rules_are_isolated_from_each_other() {
    let mut first = RenderTestRule::new();
    let mut second = RenderTestRule::new();
    first.set_content(|| "one").expect("mount");
    second.set_content(|| "two").expect("mount");

    assert_ne!(first.context().id(), second.context().id());
    assert_eq!(first.text(), "one");
    assert_eq!(second.text(), "two");
}

#[test]
fn mutation_counter_tracks_list_updates() {
    let mut rule = RenderTestRule::new();
    let items = Signal::new(vec![1u32, 2, 3]);
    {
        let items = items.clone();
        rule.set_content(move || {
            keyed_list(&items, |id: &u32| *id, |id: &u32| weft_core::text(&id.to_string()))
        })
        .expect("mount");
    }
    rule.reset_mutations();
    items.set(vec![1, 2, 3]);
    assert_eq!(rule.mutation_count(), 0);

    items.set(vec![1, 2]);
    assert_eq!(rule.mutation_count(), 1);
    assert_eq!(rule.text(), "12");
}

#[test]
fn configured_rule_passes_policy_to_lists() {
    let mut rule = RenderTestRule::with_config(
        RenderConfig::default().with_duplicate_keys(DuplicateKeyPolicy::KeepFirst),
    );
    let items = Signal::new(vec![5u32, 5, 6]);
    {
        let items = items.clone();
        rule.set_content(move || {
            keyed_list(&items, |id: &u32| *id, |id: &u32| weft_core::text(&id.to_string()))
        })
        .expect("mount");
    }
    assert_eq!(rule.text(), "56");
    assert_eq!(
        rule.context().config().duplicate_keys,
        DuplicateKeyPolicy::KeepFirst
    );
}

#[test]
fn show_through_prelude() {
    run_test_render(|rule| {
        let open = Signal::new(false);
        {
            let open = open.clone();
            rule.set_content(move || show(&open, || "open")).expect("mount");
        }
        assert_eq!(rule.text(), "");
        open.set(true);
        assert_eq!(rule.text(), "open");
        assert!(rule.root().is_some());
    });
}
