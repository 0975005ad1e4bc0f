//! Keyed list reconciler.
//!
//! Item units live between the list unit's own boundary markers. On every
//! emission stale keys are unmounted, then the new items are walked back to
//! front against a moving anchor that starts at the end marker. A unit whose
//! last node already sits right before the anchor is left alone, so an
//! unchanged sequence costs no document mutations.
//!
//! An item factory that writes the list's own signal cannot be honoured
//! mid-pass. The latest such value is kept and rendered by a follow-up pass
//! once the current one ends.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::collections::map::{HashMap, HashSet};
use crate::config::DuplicateKeyPolicy;
use crate::unit::infallible;
use crate::{Content, Piece, RenderContext, Signal, Unit, View, WeakUnit};

type KeyFn<T, K> = Box<dyn Fn(&T) -> K>;
type ItemFactory<T> = Box<dyn Fn(&T) -> View>;

struct KeyedList<T, K> {
    owner: WeakUnit,
    key: KeyFn<T, K>,
    factory: ItemFactory<T>,
    tracked: RefCell<HashMap<K, Unit>>,
    reconciling: Cell<bool>,
    deferred: RefCell<Option<Vec<T>>>,
    policy: DuplicateKeyPolicy,
    debug: bool,
}

#[derive(Default)]
struct PassStats {
    removed: usize,
    created: usize,
    moved: usize,
    kept: usize,
}

/// Clears the re-entrancy flag when a pass ends, including by panic.
struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Renders one unit per item of `items`, keyed by `key`, using the active
/// render context.
///
/// # Panics
///
/// When no render context is active.
#[track_caller]
pub fn keyed_list<T, K, V>(
    items: &Signal<Vec<T>>,
    key: impl Fn(&T) -> K + 'static,
    factory: impl Fn(&T) -> V + 'static,
) -> Unit
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Into<View>,
{
    RenderContext::expect_current().keyed_list(items, key, factory)
}

impl RenderContext {
    pub fn keyed_list<T, K, V>(
        &self,
        items: &Signal<Vec<T>>,
        key: impl Fn(&T) -> K + 'static,
        factory: impl Fn(&T) -> V + 'static,
    ) -> Unit
    where
        T: Clone + 'static,
        K: Eq + Hash + Clone + fmt::Debug + 'static,
        V: Into<View>,
    {
        let config = self.config();
        let (policy, debug) = (config.duplicate_keys, config.debug);
        infallible(self.build(|owner| {
            let list = Rc::new(KeyedList {
                owner: owner.downgrade(),
                key: Box::new(key),
                factory: Box::new(move |item: &T| -> View { factory(item).into() }),
                tracked: RefCell::new(HashMap::default()),
                reconciling: Cell::new(false),
                deferred: RefCell::new(None),
                policy,
                debug,
            });
            let initial = list.initial(self, owner, &items.get());

            let observer = Rc::clone(&list);
            let subscription = items.observe(move |items| observer.reconcile(items));
            owner.scope().track(move || subscription.unsubscribe());
            Ok(View::List(initial.into_iter().map(View::Unit).collect()))
        }))
    }
}

/// Follow-up passes allowed after one emission before the list gives up on a
/// factory that keeps writing its own signal.
const MAX_DEFERRED_PASSES: usize = 32;

impl<T, K> KeyedList<T, K>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + fmt::Debug + 'static,
{
    fn unique<'a>(&self, items: &'a [T]) -> Vec<(K, &'a T)> {
        let mut seen = HashSet::default();
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let key = (self.key)(item);
            if !seen.insert(key.clone()) {
                match self.policy {
                    DuplicateKeyPolicy::KeepFirst => {
                        log::warn!("duplicate list key {key:?}; keeping the first occurrence");
                        continue;
                    }
                    DuplicateKeyPolicy::Panic => panic!("duplicate list key {key:?}"),
                }
            }
            entries.push((key, item));
        }
        entries
    }

    fn create(&self, context: &RenderContext, owner: &Unit, item: &T) -> Unit {
        context.component_in(owner, || (self.factory)(item))
    }

    fn initial(&self, context: &RenderContext, owner: &Unit, items: &[T]) -> Vec<Unit> {
        let entries = self.unique(items);
        let mut units = Vec::with_capacity(entries.len());
        for (key, item) in entries {
            let unit = self.create(context, owner, item);
            self.tracked.borrow_mut().insert(key, unit.clone());
            units.push(unit);
        }
        units
    }

    fn reconcile(&self, items: &[T]) {
        if self.reconciling.replace(true) {
            log::debug!("keyed list updated while reconciling; deferring the latest value");
            *self.deferred.borrow_mut() = Some(items.to_vec());
            return;
        }
        let _pass = PassGuard(&self.reconciling);
        self.pass(items);
        let mut reruns = 0;
        while let Some(latest) = self.deferred.take() {
            reruns += 1;
            if reruns > MAX_DEFERRED_PASSES {
                log::error!(
                    "keyed list rewrote its own items {MAX_DEFERRED_PASSES} times in a row; \
                     dropping further updates"
                );
                break;
            }
            self.pass(&latest);
        }
    }

    fn pass(&self, items: &[T]) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        if owner.is_unmounted() {
            return;
        }
        let context = owner.context().clone();
        let mut stats = PassStats::default();

        let entries = self.unique(items);
        let live: HashSet<&K> = entries.iter().map(|(key, _)| key).collect();
        let mut stale: Vec<Unit> = {
            let mut tracked = self.tracked.borrow_mut();
            let keys: Vec<K> = tracked
                .keys()
                .filter(|key| !live.contains(key))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| tracked.remove(key)).collect()
        };
        drop(live);
        stale.sort_by_key(Unit::id);
        for unit in stale {
            unit.unmount();
            stats.removed += 1;
        }

        let Some(markers) = owner.markers() else {
            log::error!("keyed list {} has no boundary markers", owner.id());
            return;
        };
        let parent = context.with_document(|document| document.parent_node(markers.end));
        let attached = owner.scope().is_attached();
        let mut anchor = markers.end;
        let mut ordered = Vec::with_capacity(entries.len());

        for (key, item) in entries.into_iter().rev() {
            let existing = self.tracked.borrow().get(&key).cloned();
            let (unit, fresh) = match existing {
                Some(unit) => (unit, false),
                None => {
                    let unit = self.create(&context, &owner, item);
                    self.tracked.borrow_mut().insert(key, unit.clone());
                    stats.created += 1;
                    (unit, true)
                }
            };

            if let Some(parent) = parent {
                let in_place = !fresh
                    && unit.last_node().is_some_and(|last| {
                        context.with_document(|document| {
                            document.parent_node(last) == Some(parent)
                                && document.next_sibling(last) == Some(anchor)
                        })
                    });
                if in_place {
                    stats.kept += 1;
                } else {
                    match unit.insert_before(parent, Some(anchor)) {
                        Ok(()) if !fresh => stats.moved += 1,
                        Ok(()) => {}
                        Err(err) => log::error!(
                            "keyed list {}: placing unit {} failed: {err}",
                            owner.id(),
                            unit.id()
                        ),
                    }
                }
                if fresh && attached {
                    unit.scope().attached(parent);
                }
            }
            if let Some(first) = unit.first_node() {
                anchor = first;
            }
            ordered.push(Piece::Unit(unit));
        }
        ordered.reverse();
        owner.set_content(Content::Sequence(ordered));

        if self.debug {
            log::debug!(
                "keyed list {}: {} removed, {} created, {} moved, {} in place",
                owner.id(),
                stats.removed,
                stats.created,
                stats.moved,
                stats.kept
            );
        } else {
            log::trace!("keyed list {} reconciled", owner.id());
        }
    }
}

#[cfg(test)]
#[path = "tests/list_tests.rs"]
mod tests;
