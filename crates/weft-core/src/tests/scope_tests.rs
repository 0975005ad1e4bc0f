use super::*;
use crate::test_support::setup;
use crate::View;
use std::cell::RefCell;

fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let handle = Rc::clone(&log);
    let push = move |label: &'static str| -> Box<dyn FnOnce()> {
        let log = Rc::clone(&handle);
        Box::new(move || log.borrow_mut().push(label))
    };
    (log, push)
}

#[test]
fn cleanups_run_in_insertion_order_past_a_panic() {
    let (log, push) = recorder();
    let scope = Scope::new();
    scope.track(push("c1"));
    scope.track(|| panic!("c2 failed"));
    scope.track(push("c3"));

    scope.destroy();

    assert_eq!(*log.borrow(), vec!["c1", "c3"]);
    assert!(scope.is_destroyed());
    assert_eq!(scope.cleanup_count(), 0);
}

#[test]
fn destroy_twice_is_a_no_op() {
    let (log, push) = recorder();
    let scope = Scope::new();
    scope.track(push("once"));

    scope.destroy();
    scope.destroy();

    assert_eq!(*log.borrow(), vec!["once"]);
}

#[test]
fn late_tracking_runs_immediately() {
    let (log, push) = recorder();
    let scope = Scope::new();
    scope.destroy();

    scope.track(push("late"));

    assert_eq!(*log.borrow(), vec!["late"]);
    assert_eq!(scope.cleanup_count(), 0);
}

#[test]
fn child_is_unmounted_with_parent_scope() {
    let (_document, context) = setup();
    let scope = Scope::new();
    let unit = context.component(|| View::Empty);

    let returned = scope.child(&unit);

    assert_eq!(returned, unit);
    assert_eq!(scope.child_count(), 1);
    scope.destroy();
    assert!(unit.is_unmounted());
    assert_eq!(scope.child_count(), 0);
}

#[test]
fn remove_child_does_not_unmount() {
    let (_document, context) = setup();
    let scope = Scope::new();
    let unit = scope.child(&context.component(|| View::Empty));

    assert_eq!(scope.remove_child(&unit), Some(unit.clone()));
    assert_eq!(scope.child_count(), 0);
    assert!(!unit.is_unmounted());
}

#[test]
fn removed_children_leave_no_cleanup_behind() {
    let (_document, context) = setup();
    let scope = Scope::new();
    scope.track(|| {});
    for _ in 0..100 {
        let unit = scope.child(&context.component(|| View::Empty));
        assert_eq!(scope.cleanup_count(), 2);
        unit.unmount();
        scope.remove_child(&unit);
    }
    assert_eq!(scope.cleanup_count(), 1);
    assert_eq!(scope.child_count(), 0);
}

#[test]
fn child_teardown_keeps_its_registration_slot() {
    let (log, push) = recorder();
    let (_document, context) = setup();
    let scope = Scope::new();
    scope.track(push("before"));
    let unit = scope.child(&context.component(|| View::Empty));
    {
        let log = Rc::clone(&log);
        let unit = unit.clone();
        scope.track(move || {
            assert!(unit.is_unmounted());
            log.borrow_mut().push("after");
        });
    }

    scope.destroy();

    assert_eq!(*log.borrow(), vec!["before", "after"]);
    assert!(unit.is_unmounted());
}

#[test]
fn remove_child_of_unknown_unit_returns_none() {
    let (_document, context) = setup();
    let scope = Scope::new();
    let stranger = context.component(|| View::Empty);
    assert_eq!(scope.remove_child(&stranger), None);
}

#[test]
fn child_on_destroyed_scope_is_unmounted_immediately() {
    let (_document, context) = setup();
    let scope = Scope::new();
    scope.destroy();
    let unit = context.component(|| View::Empty);

    scope.child(&unit);

    assert!(unit.is_unmounted());
    assert_eq!(scope.child_count(), 0);
}

#[test]
fn attachment_broadcasts_parent_before_children() {
    let (_document, context) = setup();
    let order = Rc::new(RefCell::new(Vec::new()));
    let parent = Scope::new();

    let record = |scope: &Scope, label: &'static str| {
        let order = Rc::clone(&order);
        scope.set_on_attached(move |node| order.borrow_mut().push((label, node)));
    };
    record(&parent, "parent");
    let first = parent.child(&context.component(|| View::Empty));
    let second = parent.child(&context.component(|| View::Empty));
    let grandchild = first.scope().child(&context.component(|| View::Empty));
    record(first.scope(), "first");
    record(grandchild.scope(), "grandchild");
    record(second.scope(), "second");

    parent.attached(9);

    assert_eq!(
        *order.borrow(),
        vec![("parent", 9), ("first", 9), ("grandchild", 9), ("second", 9)]
    );
    assert_eq!(grandchild.scope().attached_node(), Some(9));
}

#[test]
fn second_attachment_is_ignored() {
    let hits = Rc::new(RefCell::new(Vec::new()));
    let scope = Scope::new();
    {
        let hits = Rc::clone(&hits);
        scope.set_on_attached(move |node| hits.borrow_mut().push(node));
    }

    scope.attached(1);
    scope.attached(2);

    assert_eq!(*hits.borrow(), vec![1]);
    assert_eq!(scope.attached_node(), Some(1));
}

#[test]
fn child_of_attached_scope_is_attached_on_registration() {
    let (_document, context) = setup();
    let scope = Scope::new();
    scope.attached(4);

    let unit = scope.child(&context.component(|| View::Empty));

    assert_eq!(unit.scope().attached_node(), Some(4));
}

#[test]
fn on_attached_after_attachment_runs_right_away() {
    let scope = Scope::new();
    scope.attached(3);
    let seen = Rc::new(RefCell::new(None));
    {
        let seen = Rc::clone(&seen);
        scope.set_on_attached(move |node| *seen.borrow_mut() = Some(node));
    }
    assert_eq!(*seen.borrow(), Some(3));
}

#[test]
fn destroy_clears_attachment() {
    let scope = Scope::new();
    scope.attached(5);
    scope.destroy();
    assert!(!scope.is_attached());
}
