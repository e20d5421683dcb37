//! Rule chains: ordered animation layers over a root rule.
//!
//! A [`RuleChain`] holds the per-item list of links. Each link wraps a root
//! rule and zero or more animations whose overrides shadow it; the link's
//! [`AnimatedRule`] is what consumers read. `transition` appends a new link
//! rooted on the next rule and retargets every in-flight animation toward
//! it; links whose animations have all finished splice themselves out, so
//! the chain always converges back to a single link.
//!
//! All state lives behind one `RefCell`. Whenever control leaves the chain —
//! animation methods, rule listeners, link listeners, root-rule lookups — the
//! borrow is dropped first; animations are additionally taken out of their
//! slot while they run so they can re-enter the chain through their context.

mod animated;
mod link;

pub use self::animated::AnimatedRule;
pub use self::link::LinkId;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use slotmap::SlotMap;

use crate::animation::{Animation, AnimationContext, DURATION_SEGMENT};
use crate::event::{emit, LinkEvent, Listeners, RuleEvent};
use crate::key::PropertyKey;
use crate::rule::{EmptyRule, Rule, SharedRule};
use crate::scheduler::{next_subject_id, Scheduler, Subject, SubjectId};
use crate::value::PropertyValue;

use self::link::{AnimationSlot, Link};

pub(crate) type ChainRef = Rc<RefCell<ChainState>>;

pub(crate) struct ChainState {
    links: SlotMap<LinkId, Link>,
    head: Option<LinkId>,
    tail: Option<LinkId>,
    scheduler: Rc<dyn Scheduler>,
}

impl ChainState {
    pub(crate) fn contains(&self, link: LinkId) -> bool {
        self.links.contains_key(link)
    }

    pub(crate) fn root_of(&self, link: LinkId) -> Option<SharedRule> {
        self.links.get(link).and_then(|entry| entry.root.clone())
    }

    /// Override keys of `link` and of every predecessor it can defer to.
    pub(crate) fn override_keys_through(&self, link: LinkId) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        let mut cursor = Some(link);
        while let Some(id) = cursor {
            let Some(entry) = self.links.get(id) else {
                break;
            };
            for slot in entry.animations.iter().filter(|slot| !slot.destroyed) {
                keys.extend(slot.overrides.keys().cloned());
            }
            cursor = entry.previous;
        }
        keys
    }

    pub(crate) fn rule_listeners_mut(
        &mut self,
        link: LinkId,
    ) -> Option<&mut Listeners<RuleEvent>> {
        self.links.get_mut(link).map(|entry| &mut entry.rule_listeners)
    }

    pub(crate) fn link_listeners_mut(
        &mut self,
        link: LinkId,
    ) -> Option<&mut Listeners<LinkEvent>> {
        self.links.get_mut(link).map(|entry| &mut entry.link_listeners)
    }
}

// ---------------------------------------------------------------------------
// RuleChain
// ---------------------------------------------------------------------------

/// The ordered list of animation layers for one item.
///
/// Cheap to clone; clones share the same chain.
#[derive(Clone)]
pub struct RuleChain {
    inner: ChainRef,
}

impl RuleChain {
    /// Create an empty chain. The first link appears on the first call to
    /// [`RuleChain::rule`], [`RuleChain::animate`] or
    /// [`RuleChain::transition`].
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChainState {
                links: SlotMap::with_key(),
                head: None,
                tail: None,
                scheduler,
            })),
        }
    }

    /// Create a chain whose sole link roots on `root`.
    pub fn with_root(scheduler: Rc<dyn Scheduler>, root: SharedRule) -> Self {
        let chain = Self::new(scheduler);
        let id = {
            let mut state = chain.inner.borrow_mut();
            let id = state.links.insert(Link::new(None, Some(root.clone())));
            state.head = Some(id);
            state.tail = Some(id);
            id
        };
        attach_root_listener(&chain.inner, id, root);
        chain
    }

    /// The item's current effective rule: the tail link's animated rule.
    ///
    /// Creates the very first (root-less) link if the chain is empty.
    pub fn rule(&self) -> AnimatedRule {
        let id = ensure_tail(&self.inner);
        AnimatedRule::new(Rc::downgrade(&self.inner), id)
    }

    /// Bind `animation` to the current tail link and initialize it.
    ///
    /// If that link is already mid-transition, the animation is immediately
    /// retargeted to the pending next root so it animates toward the same
    /// destination as its siblings. Returns the effective rule.
    pub fn animate(&self, animation: Box<dyn Animation>) -> AnimatedRule {
        let id = ensure_tail(&self.inner);
        animate_on(&self.inner, id, animation);
        AnimatedRule::new(Rc::downgrade(&self.inner), id)
    }

    /// Append a new link rooted on `next` and retarget every in-flight
    /// animation toward it.
    ///
    /// Links that carry no animations splice themselves out immediately, so
    /// an idle chain collapses straight to the new link. Returns the new
    /// effective rule.
    pub fn transition(&self, next: SharedRule) -> AnimatedRule {
        let (new_link, sweep, old_tail_snapshot) = {
            let mut state = self.inner.borrow_mut();
            match state.tail {
                None => {
                    let id = state.links.insert(Link::new(None, Some(next.clone())));
                    state.head = Some(id);
                    state.tail = Some(id);
                    (id, Vec::new(), Vec::new())
                }
                Some(old_tail) => {
                    let id = state
                        .links
                        .insert(Link::new(Some(old_tail), Some(next.clone())));
                    state.links[old_tail].next = Some(id);
                    state.tail = Some(id);

                    // Every link before the new tail, front to back.
                    let mut sweep = Vec::new();
                    let mut cursor = state.head;
                    while let Some(current) = cursor {
                        if current == id {
                            break;
                        }
                        sweep.push(current);
                        cursor = state.links[current].next;
                    }

                    let snapshot = state.links[old_tail].link_listeners.snapshot();
                    (id, sweep, snapshot)
                }
            }
        };

        attach_root_listener(&self.inner, new_link, next.clone());
        emit(&old_tail_snapshot, &LinkEvent::NextChanged);
        for link in sweep {
            link_transition(&self.inner, link, next.clone());
        }
        AnimatedRule::new(Rc::downgrade(&self.inner), new_link)
    }

    /// Number of links currently in the chain.
    pub fn len(&self) -> usize {
        self.inner.borrow().links.len()
    }

    /// Whether the chain has no links yet.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().links.is_empty()
    }
}

impl std::fmt::Debug for RuleChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("RuleChain")
            .field("links", &state.links.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Chain operations (free functions over ChainRef so animation contexts and
// rule handles can share them)
// ---------------------------------------------------------------------------

fn ensure_tail(chain: &ChainRef) -> LinkId {
    let mut state = chain.borrow_mut();
    if let Some(tail) = state.tail {
        return tail;
    }
    let id = state.links.insert(Link::new(None, None));
    state.head = Some(id);
    state.tail = Some(id);
    id
}

pub(crate) fn scheduler_of(chain: &ChainRef) -> Rc<dyn Scheduler> {
    chain.borrow().scheduler.clone()
}

/// Register `animation` on `link` and run `init` (plus `transition` if the
/// link is already mid-transition).
pub(crate) fn animate_on(chain: &ChainRef, link: LinkId, animation: Box<dyn Animation>) {
    let id = next_subject_id();
    let (source, pending) = {
        let mut state = chain.borrow_mut();
        let weak = Rc::downgrade(chain);
        let entry = state
            .links
            .get_mut(link)
            .expect("animate on a removed link");
        let key = animation.key().clone();
        entry
            .animations
            .push(AnimationSlot::new(id, key, animation));

        let source: SharedRule = match entry.previous {
            // The pre-animation view: the predecessor's animated rule...
            Some(previous) => Rc::new(AnimatedRule::new(weak, previous)),
            // ...or the root; never this link's own forming override state.
            None => entry
                .root
                .clone()
                .unwrap_or_else(|| Rc::new(EmptyRule) as SharedRule),
        };
        (source, entry.pending.clone())
    };

    invoke(chain, link, id, |animation, ctx| animation.init(source, ctx));
    if let Some(next_root) = pending {
        invoke(chain, link, id, |animation, ctx| {
            animation.transition(next_root, ctx)
        });
    }
}

/// Put `link` into transition toward `next`: remember the destination and
/// forward to every animation — or, with no animations, splice the link out.
pub(crate) fn link_transition(chain: &ChainRef, link: LinkId, next: SharedRule) {
    let animations = {
        let mut state = chain.borrow_mut();
        let Some(entry) = state.links.get_mut(link) else {
            return;
        };
        entry.pending = Some(next.clone());
        entry
            .animations
            .iter()
            .filter(|slot| !slot.destroyed)
            .map(|slot| slot.id)
            .collect::<Vec<_>>()
    };

    if animations.is_empty() {
        // No visual state to animate away.
        remove_link(chain, link);
        return;
    }
    for id in animations {
        let destination = next.clone();
        invoke(chain, link, id, |animation, ctx| {
            animation.transition(destination, ctx)
        });
    }
}

/// Run one animation method with the animation taken out of its slot.
///
/// No-ops for stale targets: a removed link, an unknown or destroyed
/// animation, or an animation that is already running further up the stack.
pub(crate) fn invoke(
    chain: &ChainRef,
    link: LinkId,
    animation: SubjectId,
    f: impl FnOnce(&mut dyn Animation, &mut AnimationContext<'_>),
) {
    let mut boxed = {
        let mut state = chain.borrow_mut();
        let Some(entry) = state.links.get_mut(link) else {
            return;
        };
        let Some(slot) = entry.slot_mut(animation) else {
            return;
        };
        if slot.destroyed {
            return;
        }
        match slot.animation.take() {
            Some(boxed) => boxed,
            None => return,
        }
    };

    let mut ctx = AnimationContext::new(chain, link, animation);
    f(&mut *boxed, &mut ctx);
    let destroy = ctx.destroy_requested();

    {
        let mut state = chain.borrow_mut();
        if let Some(slot) = state
            .links
            .get_mut(link)
            .and_then(|entry| entry.slot_mut(animation))
        {
            if destroy {
                slot.destroyed = true;
                // The boxed animation is dropped here and never touched again.
            } else {
                slot.animation = Some(boxed);
            }
        }
    }

    if destroy {
        finish_destroy(chain, link, animation);
    }
}

/// Unregister a destroyed animation: drop its overrides (one
/// `PropertyChanged` per key), then remove the link if it was the last
/// animation on a mid-transition link.
fn finish_destroy(chain: &ChainRef, link: LinkId, animation: SubjectId) {
    let (keys, snapshot) = {
        let mut state = chain.borrow_mut();
        let Some(entry) = state.links.get_mut(link) else {
            return;
        };
        let Some(position) = entry
            .animations
            .iter()
            .position(|slot| slot.id == animation)
        else {
            return;
        };
        let slot = entry.animations.remove(position);
        let mut keys: Vec<PropertyKey> = slot.overrides.into_keys().collect();
        keys.sort();
        for key in &keys {
            if !entry.overrides_key(key) {
                let _ = entry.override_types.remove(key);
            }
        }
        (keys, rule_listener_snapshot(&state, link))
    };

    for key in keys {
        emit(&snapshot, &RuleEvent::PropertyChanged(key));
    }

    let collapse = {
        let state = chain.borrow();
        state
            .links
            .get(link)
            .is_some_and(|entry| entry.pending.is_some() && entry.animations.is_empty())
    };
    if collapse {
        remove_link(chain, link);
    }
}

/// Splice `link` out of the chain and fire the removal events.
///
/// # Panics
///
/// Panics when asked to remove the sole remaining link — the chain must
/// always keep at least one.
fn remove_link(chain: &ChainRef, link: LinkId) {
    let (root_subscription, removed, previous, next) = {
        let mut state = chain.borrow_mut();
        let Some(entry) = state.links.get(link) else {
            return;
        };
        let previous = entry.previous;
        let next = entry.next;
        assert!(
            previous.is_some() || next.is_some(),
            "cannot remove the only link of a rule chain"
        );

        if let Some(previous) = previous {
            state.links[previous].next = next;
        }
        if let Some(next) = next {
            state.links[next].previous = previous;
        }
        if state.head == Some(link) {
            state.head = next;
        }
        if state.tail == Some(link) {
            state.tail = previous;
        }

        let mut removed = state.links.remove(link).expect("link present");
        let root_subscription = removed.root_subscription.take();
        let removed_snapshot = removed.link_listeners.snapshot();
        let previous_snapshot =
            previous.map(|id| state.links[id].link_listeners.snapshot());
        let next_snapshot = next.map(|id| state.links[id].link_listeners.snapshot());
        (
            root_subscription,
            removed_snapshot,
            previous_snapshot,
            next_snapshot,
        )
    };

    if let Some((root, handle)) = root_subscription {
        root.unsubscribe(handle);
    }
    emit(&removed, &LinkEvent::Removed);
    if let Some(snapshot) = previous {
        emit(&snapshot, &LinkEvent::NextChanged);
    }
    if let Some(snapshot) = next {
        emit(&snapshot, &LinkEvent::PreviousChanged);
    }
}

// ---------------------------------------------------------------------------
// Property resolution
// ---------------------------------------------------------------------------

/// Resolve `key` as seen from `link`: own overrides first (registration
/// order), then the predecessor if it reports the key as animated, then the
/// root of whichever link the walk stopped at.
pub(crate) fn resolve_property(
    chain: &ChainRef,
    link: LinkId,
    key: &PropertyKey,
) -> Option<PropertyValue> {
    enum Outcome {
        Value(PropertyValue),
        Root(SharedRule),
        Nothing,
    }

    let outcome = {
        let state = chain.borrow();
        let mut current = link;
        loop {
            let Some(entry) = state.links.get(current) else {
                break Outcome::Nothing;
            };
            if let Some(value) = entry.override_value(key) {
                break Outcome::Value(value);
            }
            match entry.previous {
                Some(previous) if is_animated_in(&state, previous, key) => {
                    current = previous;
                }
                _ => {
                    break match entry.root.clone() {
                        Some(root) => Outcome::Root(root),
                        None => Outcome::Nothing,
                    };
                }
            }
        }
    };

    match outcome {
        Outcome::Value(value) => Some(value),
        // Borrow already dropped: the root rule may call back in.
        Outcome::Root(root) => root.property(key),
        Outcome::Nothing => None,
    }
}

fn is_animated_in(state: &ChainState, link: LinkId, key: &PropertyKey) -> bool {
    let mut current = Some(link);
    while let Some(id) = current {
        let Some(entry) = state.links.get(id) else {
            return false;
        };
        if entry.overrides_key(key) {
            return true;
        }
        current = entry.previous;
    }
    false
}

pub(crate) fn is_animated(chain: &ChainRef, link: LinkId, key: &PropertyKey) -> bool {
    is_animated_in(&chain.borrow(), link, key)
}

/// Whether `key` is currently driven by an animation on `link` itself:
/// a duration input, an override, or a declared dependency.
pub(crate) fn is_input(chain: &ChainRef, link: LinkId, key: &PropertyKey) -> bool {
    let state = chain.borrow();
    let Some(entry) = state.links.get(link) else {
        return false;
    };
    entry.animations.iter().filter(|slot| !slot.destroyed).any(|slot| {
        slot.key.append(DURATION_SEGMENT) == *key
            || slot.overrides.contains_key(key)
            || slot.dependencies.contains(key)
    })
}

// ---------------------------------------------------------------------------
// Override writes (called from animation contexts)
// ---------------------------------------------------------------------------

/// Write one override. Notifies listeners of `link` and of every later link
/// before returning.
///
/// # Panics
///
/// Panics if the key already carries an override under a different declared
/// type on this link.
pub(crate) fn set_override(
    chain: &ChainRef,
    link: LinkId,
    animation: SubjectId,
    key: PropertyKey,
    value: PropertyValue,
) {
    let snapshot = {
        let mut state = chain.borrow_mut();
        let Some(entry) = state.links.get_mut(link) else {
            return;
        };
        if let Some(stored) = entry.override_types.get(&key) {
            assert!(
                *stored == value.type_name(),
                "type mismatch for `{key}`: overridden as `{stored}`, now written as `{}`",
                value.type_name()
            );
        }
        let Some(slot) = entry.slot_mut(animation) else {
            return;
        };
        if slot.destroyed {
            return;
        }
        slot.overrides.insert(key.clone(), value.clone());
        entry.override_types.insert(key.clone(), value.type_name());
        rule_listener_snapshot(&state, link)
    };
    emit(&snapshot, &RuleEvent::PropertyChanged(key));
}

/// Remove one override, if present. Fires `PropertyChanged` when it was.
pub(crate) fn clear_override(
    chain: &ChainRef,
    link: LinkId,
    animation: SubjectId,
    key: &PropertyKey,
) {
    let snapshot = {
        let mut state = chain.borrow_mut();
        let Some(entry) = state.links.get_mut(link) else {
            return;
        };
        let Some(slot) = entry.slot_mut(animation) else {
            return;
        };
        if slot.overrides.remove(key).is_none() {
            return;
        }
        if !entry.overrides_key(key) {
            let _ = entry.override_types.remove(key);
        }
        rule_listener_snapshot(&state, link)
    };
    emit(&snapshot, &RuleEvent::PropertyChanged(key.clone()));
}

pub(crate) fn declare_dependency(
    chain: &ChainRef,
    link: LinkId,
    animation: SubjectId,
    sub_key: PropertyKey,
) {
    let mut state = chain.borrow_mut();
    let Some(slot) = state
        .links
        .get_mut(link)
        .and_then(|entry| entry.slot_mut(animation))
    else {
        return;
    };
    let scoped = slot.key.join(&sub_key);
    let _ = slot.dependencies.insert(scoped);
}

/// Listeners of `link` and of every link after it (their resolution may read
/// through this one).
fn rule_listener_snapshot(
    state: &ChainState,
    link: LinkId,
) -> Vec<Rc<dyn Fn(&RuleEvent)>> {
    let mut snapshot = Vec::new();
    let mut cursor = Some(link);
    while let Some(id) = cursor {
        let Some(entry) = state.links.get(id) else {
            break;
        };
        snapshot.extend(entry.rule_listeners.snapshot());
        cursor = entry.next;
    }
    snapshot
}

// ---------------------------------------------------------------------------
// Root rule forwarding
// ---------------------------------------------------------------------------

/// Subscribe `link` to its root rule: events are re-fired to the link's own
/// listeners, and property changes poke every animation with an out-of-band
/// step.
fn attach_root_listener(chain: &ChainRef, link: LinkId, root: SharedRule) {
    let weak = Rc::downgrade(chain);
    let listener: Rc<dyn Fn(&RuleEvent)> = Rc::new(move |event| {
        let Some(chain) = weak.upgrade() else {
            return;
        };
        on_root_event(&chain, link, event);
    });
    let handle = root.subscribe(listener);
    let mut state = chain.borrow_mut();
    if let Some(entry) = state.links.get_mut(link) {
        entry.root_subscription = Some((root, handle));
    }
}

fn on_root_event(chain: &ChainRef, link: LinkId, event: &RuleEvent) {
    let (snapshot, animations, scheduler) = {
        let state = chain.borrow();
        let Some(entry) = state.links.get(link) else {
            return;
        };
        let animations: Vec<SubjectId> = entry
            .animations
            .iter()
            .filter(|slot| !slot.destroyed)
            .map(|slot| slot.id)
            .collect();
        (
            rule_listener_snapshot(&state, link),
            animations,
            state.scheduler.clone(),
        )
    };

    emit(&snapshot, event);
    if matches!(
        event,
        RuleEvent::PropertyChanged(_) | RuleEvent::PropertiesChanged
    ) {
        for id in animations {
            scheduler.step(step_handle(chain, link, id));
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler subjects
// ---------------------------------------------------------------------------

struct StepHandle {
    chain: Weak<RefCell<ChainState>>,
    link: LinkId,
    animation: SubjectId,
}

impl Subject for StepHandle {
    fn subject_id(&self) -> SubjectId {
        self.animation
    }

    fn step(&self, delay: Option<Duration>) {
        // Requests for a destroyed animation (or a dropped chain) fire into
        // the void by design.
        let Some(chain) = self.chain.upgrade() else {
            return;
        };
        invoke(&chain, self.link, self.animation, |animation, ctx| {
            animation.step(delay, ctx)
        });
    }
}

pub(crate) fn step_handle(
    chain: &ChainRef,
    link: LinkId,
    animation: SubjectId,
) -> Rc<dyn Subject> {
    Rc::new(StepHandle {
        chain: Rc::downgrade(chain),
        link,
        animation,
    })
}

// ---------------------------------------------------------------------------
// Tests (chain structure; behavior is covered by tests/chain.rs)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::style_rule::StyleRule;
    use crate::scheduler::TickScheduler;
    use crate::value::PropertyType;

    const LENGTH: PropertyType<f32> = PropertyType::named("length");

    fn chain() -> RuleChain {
        RuleChain::new(Rc::new(TickScheduler::new()))
    }

    fn rule_with(key: &str, value: f32) -> StyleRule {
        let rule = StyleRule::new("Item".parse().unwrap());
        rule.set(LENGTH, key, value);
        rule
    }

    #[test]
    fn new_chain_is_empty() {
        let chain = chain();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn rule_creates_first_link() {
        let chain = chain();
        let rule = chain.rule();
        assert_eq!(chain.len(), 1);
        assert!(!rule.is_removed());
        // Root-less link resolves nothing.
        assert!(rule.property(&"width".into()).is_none());
    }

    #[test]
    fn with_root_resolves_root_values() {
        use crate::rule::RuleExt;
        let root = rule_with("width", 10.0);
        let chain = RuleChain::with_root(Rc::new(TickScheduler::new()), root.shared());
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.rule().get(LENGTH, &"width".into()), Ok(Some(10.0)));
    }

    #[test]
    fn transition_on_idle_chain_collapses() {
        use crate::rule::RuleExt;
        let chain = RuleChain::with_root(
            Rc::new(TickScheduler::new()),
            rule_with("width", 1.0).shared(),
        );
        let rule = chain.transition(rule_with("width", 2.0).shared());
        // The animation-less old link went away at once.
        assert_eq!(chain.len(), 1);
        assert_eq!(rule.get(LENGTH, &"width".into()), Ok(Some(2.0)));
    }

    #[test]
    fn transition_on_empty_chain_adopts_root() {
        use crate::rule::RuleExt;
        let chain = chain();
        let rule = chain.transition(rule_with("width", 5.0).shared());
        assert_eq!(chain.len(), 1);
        assert_eq!(rule.get(LENGTH, &"width".into()), Ok(Some(5.0)));
    }

    #[test]
    fn chain_clones_share_state() {
        let a = chain();
        let b = a.clone();
        let _ = a.rule();
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn selector_forwards_to_root() {
        let root = StyleRule::new("Button.primary".parse().unwrap());
        let chain = RuleChain::with_root(Rc::new(TickScheduler::new()), root.shared());
        assert_eq!(chain.rule().selector().to_string(), "Button.primary");
    }
}
