//! AnimatedRule: the consumer-facing rule of one chain link.
//!
//! A cheap handle (weak chain reference + link key) that resolves properties
//! through the link's animation overrides, falls back through predecessor
//! links, and bottoms out at the root rule. Consumers treat it as a normal
//! [`Rule`]; its selector simply forwards to the current root.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::chain::{self, ChainState, LinkId};
use crate::event::{ListenerHandle, LinkEvent, RuleEvent};
use crate::key::PropertyKey;
use crate::rule::selector::Selector;
use crate::rule::{Rule, SharedRule};
use crate::value::PropertyValue;

use crate::animation::Animation;

/// The effective rule of one link in a [`crate::chain::RuleChain`].
#[derive(Clone)]
pub struct AnimatedRule {
    chain: Weak<RefCell<ChainState>>,
    link: LinkId,
}

impl AnimatedRule {
    pub(crate) fn new(chain: Weak<RefCell<ChainState>>, link: LinkId) -> Self {
        Self { chain, link }
    }

    fn upgrade(&self) -> Option<Rc<RefCell<ChainState>>> {
        self.chain.upgrade()
    }

    /// Whether the underlying link has been removed from its chain (or the
    /// chain itself is gone). A removed link resolves nothing.
    pub fn is_removed(&self) -> bool {
        match self.upgrade() {
            Some(chain) => !chain.borrow().contains(self.link),
            None => true,
        }
    }

    /// Whether `key` is overridden on this link or, recursively, reported as
    /// animated by a predecessor link.
    pub fn is_animated(&self, key: &PropertyKey) -> bool {
        match self.upgrade() {
            Some(chain) => chain::is_animated(&chain, self.link, key),
            None => false,
        }
    }

    /// Whether `key` is currently an input of an animation on this link: a
    /// duration sub-key, an override, or a declared dependency. Pure
    /// predicate; upstream cascades use it to ignore external writes to keys
    /// an animation drives.
    pub fn is_input(&self, key: &PropertyKey) -> bool {
        match self.upgrade() {
            Some(chain) => chain::is_input(&chain, self.link, key),
            None => false,
        }
    }

    /// Register and initialize an animation on this rule.
    ///
    /// The animation's source view is the predecessor link (or the root when
    /// there is none) — never this rule's own forming override state. If
    /// this rule is already mid-transition the animation is retargeted to
    /// the pending root right away.
    ///
    /// # Panics
    ///
    /// Panics if the link was removed or its chain dropped.
    pub fn animate(&self, animation: Box<dyn Animation>) {
        let chain = self.upgrade().expect("rule chain dropped");
        chain::animate_on(&chain, self.link, animation);
    }

    /// Begin transitioning this link toward `next`: remember the destination
    /// and forward it to every attached animation. With no animations the
    /// link removes itself from the chain immediately — the only path by
    /// which a link self-removes.
    pub fn transition(&self, next: SharedRule) {
        let Some(chain) = self.upgrade() else {
            return;
        };
        chain::link_transition(&chain, self.link, next);
    }

    /// Listen for link lifecycle events (removal, neighbor changes).
    pub fn subscribe_link(&self, listener: Rc<dyn Fn(&LinkEvent)>) -> ListenerHandle {
        match self.upgrade() {
            Some(chain) => chain
                .borrow_mut()
                .link_listeners_mut(self.link)
                .map(|listeners| listeners.subscribe(listener))
                .unwrap_or(ListenerHandle::DEAD),
            None => ListenerHandle::DEAD,
        }
    }

    /// Remove a link event listener.
    pub fn unsubscribe_link(&self, handle: ListenerHandle) {
        if let Some(chain) = self.upgrade() {
            if let Some(listeners) = chain.borrow_mut().link_listeners_mut(self.link) {
                listeners.unsubscribe(handle);
            }
        }
    }
}

impl Rule for AnimatedRule {
    fn selector(&self) -> Selector {
        let root = match self.upgrade() {
            Some(chain) => chain.borrow().root_of(self.link),
            None => None,
        };
        match root {
            Some(root) => root.selector(),
            None => Selector::default(),
        }
    }

    fn property(&self, key: &PropertyKey) -> Option<PropertyValue> {
        let chain = self.upgrade()?;
        chain::resolve_property(&chain, self.link, key)
    }

    fn properties(&self) -> Vec<PropertyKey> {
        let Some(chain) = self.upgrade() else {
            return Vec::new();
        };
        let (mut keys, root) = {
            let state = chain.borrow();
            (state.override_keys_through(self.link), state.root_of(self.link))
        };
        if let Some(root) = root {
            keys.extend(root.properties());
        }
        keys.sort();
        keys.dedup();
        keys
    }

    fn subscribe(&self, listener: Rc<dyn Fn(&RuleEvent)>) -> ListenerHandle {
        match self.upgrade() {
            Some(chain) => chain
                .borrow_mut()
                .rule_listeners_mut(self.link)
                .map(|listeners| listeners.subscribe(listener))
                .unwrap_or(ListenerHandle::DEAD),
            None => ListenerHandle::DEAD,
        }
    }

    fn unsubscribe(&self, handle: ListenerHandle) {
        if let Some(chain) = self.upgrade() {
            if let Some(listeners) = chain.borrow_mut().rule_listeners_mut(self.link) {
                listeners.unsubscribe(handle);
            }
        }
    }
}

impl PartialEq for AnimatedRule {
    /// Two handles are equal when they name the same link of the same chain.
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link && Weak::ptr_eq(&self.chain, &other.chain)
    }
}
impl Eq for AnimatedRule {}

impl std::fmt::Debug for AnimatedRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedRule")
            .field("link", &self.link)
            .field("removed", &self.is_removed())
            .finish()
    }
}
