use super::*;
use crate::test_support::{container, setup, texts};
use crate::{append_child, element, on_cleanup, text, NodeId};

fn labelled(label: &'static str) -> NodeId {
    let node = element("p");
    append_child(node, text(label)).expect("append label");
    node
}

#[test]
fn switching_unmounts_previous_case_before_mounting_next() {
    let (document, context) = setup();
    let root = container(&document);
    let driver = Signal::new("A".to_string());
    let events = Rc::new(RefCell::new(Vec::new()));

    let case = |label: &'static str| {
        let events = Rc::clone(&events);
        move || {
            events.borrow_mut().push(format!("build {label}"));
            let events = Rc::clone(&events);
            on_cleanup(move || events.borrow_mut().push(format!("cleanup {label}")))
                .expect("inside a unit");
            labelled(label)
        }
    };
    let switch = Switch::new(&driver, |value: &String| value.clone())
        .case("A".to_string(), case("A"))
        .case("B".to_string(), case("B"))
        .build_in(&context);
    switch.mount(root, None).expect("mount switch");
    assert_eq!(texts(&document, root), vec!["A"]);

    driver.set("B".to_string());

    assert_eq!(texts(&document, root), vec!["B"]);
    assert_eq!(
        *events.borrow(),
        vec!["build A", "cleanup A", "build B"]
    );
}

#[test]
fn unmatched_value_leaves_empty_slot_with_markers() {
    let (document, context) = setup();
    let root = container(&document);
    let driver = Signal::new(1u8);
    let switch = Switch::new(&driver, |value: &u8| *value)
        .case(1, || labelled("one"))
        .build_in(&context);
    switch.mount(root, None).expect("mount switch");

    driver.set(2);

    let markers = switch.markers().expect("switch markers");
    assert_eq!(
        document.borrow().children(root),
        vec![markers.start, markers.end]
    );
    assert_eq!(switch.content(), Content::Sequence(Vec::new()));
    assert_eq!(switch.scope().child_count(), 0);
}

#[test]
fn default_case_covers_unmatched_values() {
    let (document, context) = setup();
    let root = container(&document);
    let driver = Signal::new(0i32);
    let switch = Switch::new(&driver, |value: &i32| value.signum())
        .case(1, || labelled("positive"))
        .case(-1, || labelled("negative"))
        .default(|| labelled("zero"))
        .build_in(&context);
    switch.mount(root, None).expect("mount switch");
    assert_eq!(texts(&document, root), vec!["zero"]);

    driver.set(-4);
    assert_eq!(texts(&document, root), vec!["negative"]);
    driver.set(9);
    assert_eq!(texts(&document, root), vec!["positive"]);
}

#[test]
fn same_discriminant_still_rebuilds() {
    let (document, context) = setup();
    let root = container(&document);
    let driver = Signal::new(true);
    let builds = Rc::new(Cell::new(0));
    let switch = {
        let builds = Rc::clone(&builds);
        context.enter(|| {
            show(&driver, move || {
                builds.set(builds.get() + 1);
                labelled("visible")
            })
        })
    };
    switch.mount(root, None).expect("mount switch");

    driver.set(true);

    assert_eq!(builds.get(), 2);
    assert_eq!(texts(&document, root), vec!["visible"]);
}

#[test]
fn show_toggles_content() {
    let (document, context) = setup();
    let root = container(&document);
    let visible = Signal::new(false);
    let switch = context.enter(|| show(&visible, || labelled("hello")));
    switch.mount(root, None).expect("mount switch");
    assert!(texts(&document, root).is_empty());

    visible.set(true);
    assert_eq!(texts(&document, root), vec!["hello"]);

    visible.set(false);
    assert!(texts(&document, root).is_empty());
}

#[test]
fn new_case_is_attached_when_switch_is_live() {
    let (document, context) = setup();
    let root = container(&document);
    let visible = Signal::new(false);
    let switch = context.enter(|| show(&visible, || labelled("late")));
    switch.mount(root, None).expect("mount switch");

    visible.set(true);

    let case = switch.content().units().pop().expect("case unit");
    assert_eq!(case.scope().attached_node(), Some(root));
    assert_eq!(case.parent(), Some(switch.clone()));
}

#[test]
fn unmounting_switch_releases_driver_and_case() {
    let (document, context) = setup();
    let root = container(&document);
    let driver = Signal::new(true);
    let cleaned = Rc::new(Cell::new(false));
    let switch = {
        let cleaned = Rc::clone(&cleaned);
        context.enter(|| {
            show(&driver, move || {
                let cleaned = Rc::clone(&cleaned);
                on_cleanup(move || cleaned.set(true)).expect("inside a unit");
                labelled("x")
            })
        })
    };
    switch.mount(root, None).expect("mount switch");

    switch.unmount();

    assert!(cleaned.get());
    assert_eq!(driver.observer_count(), 0);
    assert!(document.borrow().children(root).is_empty());
    driver.set(false);
    driver.set(true);
    assert!(document.borrow().children(root).is_empty());
}

#[test]
fn case_rewriting_its_driver_is_followed_by_the_latest_value() {
    let (document, context) = setup();
    let root = container(&document);
    let driver = Signal::new(0u8);
    let redirect = driver.clone();
    let switch = Switch::new(&driver, |value: &u8| *value)
        .case(0, || labelled("zero"))
        .case(1, move || {
            redirect.set(2);
            labelled("one")
        })
        .case(2, || labelled("two"))
        .build_in(&context);
    switch.mount(root, None).expect("mount switch");

    driver.set(1);

    assert_eq!(driver.get(), 2);
    assert_eq!(texts(&document, root), vec!["two"]);
    assert_eq!(switch.scope().child_count(), 1);
}
