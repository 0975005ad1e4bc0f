//! Single-slot reconciler: at most one case unit is mounted at a time,
//! chosen from the driver signal by a selector. A case factory that writes
//! the driver while it is being built gets its value rendered right after
//! the current change completes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::unit::infallible;
use crate::{Content, Piece, RenderContext, Signal, Unit, View, WeakUnit};

type CaseFactory = Rc<dyn Fn() -> View>;

pub struct Switch<T, D> {
    driver: Signal<T>,
    selector: Box<dyn Fn(&T) -> D>,
    cases: HashMap<D, CaseFactory>,
    default: Option<CaseFactory>,
}

impl<T, D> Switch<T, D>
where
    T: Clone + 'static,
    D: Eq + Hash + fmt::Debug + 'static,
{
    pub fn new(driver: &Signal<T>, selector: impl Fn(&T) -> D + 'static) -> Self {
        Self {
            driver: driver.clone(),
            selector: Box::new(selector),
            cases: HashMap::default(),
            default: None,
        }
    }

    /// Renders `factory` while the selector yields `discriminant`. A later
    /// case for the same discriminant replaces the earlier one.
    pub fn case<V: Into<View>>(mut self, discriminant: D, factory: impl Fn() -> V + 'static) -> Self {
        self.cases.insert(discriminant, case_factory(factory));
        self
    }

    /// Fallback for discriminants without a case.
    pub fn default<V: Into<View>>(mut self, factory: impl Fn() -> V + 'static) -> Self {
        self.default = Some(case_factory(factory));
        self
    }

    /// Builds the switch unit in the active render context.
    ///
    /// # Panics
    ///
    /// When no render context is active.
    #[track_caller]
    pub fn build(self) -> Unit {
        self.build_in(&RenderContext::expect_current())
    }

    pub fn build_in(self, context: &RenderContext) -> Unit {
        let Switch {
            driver,
            selector,
            cases,
            default,
        } = self;
        infallible(context.build(|owner| {
            let slot = Rc::new(SwitchSlot {
                owner: owner.downgrade(),
                selector,
                cases,
                default,
                current: RefCell::new(None),
                updating: Cell::new(false),
                deferred: RefCell::new(None),
            });
            let initial = slot
                .factory_for(&driver.get())
                .map(|factory| context.component(|| factory()));
            *slot.current.borrow_mut() = initial.clone();

            let observer = Rc::clone(&slot);
            let subscription = driver.observe(move |value| observer.on_change(value));
            owner.scope().track(move || subscription.unsubscribe());
            Ok(View::List(initial.into_iter().map(View::Unit).collect()))
        }))
    }
}

fn case_factory<V: Into<View>>(factory: impl Fn() -> V + 'static) -> CaseFactory {
    Rc::new(move || -> View { factory().into() })
}

struct SwitchSlot<T, D> {
    owner: WeakUnit,
    selector: Box<dyn Fn(&T) -> D>,
    cases: HashMap<D, CaseFactory>,
    default: Option<CaseFactory>,
    current: RefCell<Option<Unit>>,
    updating: Cell<bool>,
    deferred: RefCell<Option<T>>,
}

/// Follow-up changes allowed after one emission before the switch stops
/// chasing a case that keeps rewriting its driver.
const MAX_DEFERRED_CHANGES: usize = 32;

struct UpdateGuard<'a>(&'a Cell<bool>);

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T, D> SwitchSlot<T, D>
where
    T: Clone,
    D: Eq + Hash + fmt::Debug,
{
    fn factory_for(&self, value: &T) -> Option<CaseFactory> {
        let discriminant = (self.selector)(value);
        let factory = self.cases.get(&discriminant).or(self.default.as_ref()).cloned();
        if factory.is_none() {
            log::trace!("switch: no case for {discriminant:?}");
        }
        factory
    }

    fn on_change(&self, value: &T) {
        if self.updating.replace(true) {
            log::debug!("switch driver changed while switching; deferring the latest value");
            *self.deferred.borrow_mut() = Some(value.clone());
            return;
        }
        let _update = UpdateGuard(&self.updating);
        self.switch_to(value);
        let mut reruns = 0;
        while let Some(latest) = self.deferred.take() {
            reruns += 1;
            if reruns > MAX_DEFERRED_CHANGES {
                log::error!(
                    "switch driver rewritten {MAX_DEFERRED_CHANGES} times in a row; \
                     dropping further changes"
                );
                break;
            }
            self.switch_to(&latest);
        }
    }

    fn switch_to(&self, value: &T) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        if owner.is_unmounted() {
            return;
        }

        let previous = self.current.borrow_mut().take();
        if let Some(previous) = previous {
            previous.unmount();
        }
        owner.set_content(Content::Sequence(Vec::new()));

        let Some(factory) = self.factory_for(value) else {
            return;
        };
        let context = owner.context().clone();
        let unit = context.component_in(&owner, || factory());
        owner.set_content(Content::Sequence(vec![Piece::Unit(unit.clone())]));
        *self.current.borrow_mut() = Some(unit.clone());

        let Some(markers) = owner.markers() else {
            return;
        };
        let parent = context.with_document(|document| document.parent_node(markers.end));
        if let Some(parent) = parent {
            match unit.insert_before(parent, Some(markers.end)) {
                Ok(()) => {
                    if owner.scope().is_attached() {
                        unit.scope().attached(parent);
                    }
                }
                Err(err) => log::error!("switch {}: mounting case unit failed: {err}", owner.id()),
            }
        }
        log::trace!("switch {} now shows unit {}", owner.id(), unit.id());
    }
}

/// Renders `factory` while `when` is true, nothing otherwise.
#[track_caller]
pub fn show<V: Into<View>>(when: &Signal<bool>, factory: impl Fn() -> V + 'static) -> Unit {
    Switch::new(when, |visible: &bool| *visible)
        .case(true, factory)
        .build()
}

#[cfg(test)]
#[path = "tests/switch_tests.rs"]
mod tests;
