//! Arena types for the rule chain.
//!
//! Links live in a single `SlotMap`; `previous`/`next` are plain keys, so
//! removal is a pure rewire and a removed link's key can never be confused
//! with a live one (slotmap keys are versioned and never reused).

use std::collections::{HashMap, HashSet};

use crate::animation::Animation;
use crate::event::{ListenerHandle, Listeners, LinkEvent, RuleEvent};
use crate::key::PropertyKey;
use crate::rule::SharedRule;
use crate::scheduler::SubjectId;
use crate::value::PropertyValue;

slotmap::new_key_type! {
    /// Stable handle of one link in a chain's arena.
    pub struct LinkId;
}

/// One registered animation on a link: the boxed policy object plus the
/// override map and dependency set it has built up.
pub(crate) struct AnimationSlot {
    /// Scheduler subject identity; unique per animation registration.
    pub(crate) id: SubjectId,
    /// The animation's own key (dependency scope, duration input).
    pub(crate) key: PropertyKey,
    /// Taken out while one of the animation's methods runs, so the method
    /// can re-enter the chain through its context without a standing borrow.
    pub(crate) animation: Option<Box<dyn Animation>>,
    /// Overridden, already-computed values keyed by property.
    pub(crate) overrides: HashMap<PropertyKey, PropertyValue>,
    /// Declared dependencies, already scoped under the animation's key.
    pub(crate) dependencies: HashSet<PropertyKey>,
    /// Set once the animation reported `destroyed()`; never cleared.
    pub(crate) destroyed: bool,
}

impl AnimationSlot {
    pub(crate) fn new(id: SubjectId, key: PropertyKey, animation: Box<dyn Animation>) -> Self {
        Self {
            id,
            key,
            animation: Some(animation),
            overrides: HashMap::new(),
            dependencies: HashSet::new(),
            destroyed: false,
        }
    }
}

/// One animation layer stacked on top of a root rule.
pub(crate) struct Link {
    pub(crate) previous: Option<LinkId>,
    pub(crate) next: Option<LinkId>,
    /// The pre-animation source of truth. `None` only for the very first
    /// link of a chain that was started by `animate` rather than a root.
    pub(crate) root: Option<SharedRule>,
    /// Keeps the root listener alive so it can be detached on removal.
    pub(crate) root_subscription: Option<(SharedRule, ListenerHandle)>,
    /// The destination root while this link is mid-transition.
    pub(crate) pending: Option<SharedRule>,
    /// Animations in registration order; resolution takes the first match.
    pub(crate) animations: Vec<AnimationSlot>,
    /// Declared type per overridden key (type stability is per key, per
    /// link). Entries are dropped when the last override for a key goes.
    pub(crate) override_types: HashMap<PropertyKey, &'static str>,
    /// Listeners on this link's animated rule.
    pub(crate) rule_listeners: Listeners<RuleEvent>,
    /// Listeners on the link itself (removal, neighbor changes).
    pub(crate) link_listeners: Listeners<LinkEvent>,
}

impl Link {
    pub(crate) fn new(previous: Option<LinkId>, root: Option<SharedRule>) -> Self {
        Self {
            previous,
            next: None,
            root,
            root_subscription: None,
            pending: None,
            animations: Vec::new(),
            override_types: HashMap::new(),
            rule_listeners: Listeners::new(),
            link_listeners: Listeners::new(),
        }
    }

    pub(crate) fn slot_mut(&mut self, id: SubjectId) -> Option<&mut AnimationSlot> {
        self.animations.iter_mut().find(|slot| slot.id == id)
    }

    /// Whether any live animation on this link overrides `key`.
    pub(crate) fn overrides_key(&self, key: &PropertyKey) -> bool {
        self.animations
            .iter()
            .any(|slot| !slot.destroyed && slot.overrides.contains_key(key))
    }

    /// First-registered live override for `key`, if any.
    pub(crate) fn override_value(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.animations
            .iter()
            .filter(|slot| !slot.destroyed)
            .find_map(|slot| slot.overrides.get(key).cloned())
    }
}
