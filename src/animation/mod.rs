//! Animations: policy objects that overlay transitional values on a rule.
//!
//! An [`Animation`] is bound to one link of a rule chain and one declared
//! property type. The chain owns the animation and calls back into it; the
//! animation talks back exclusively through the [`AnimationContext`] it is
//! handed on every call — writing overrides, reading the resolved state,
//! requesting future steps, and eventually reporting its own destruction.
//!
//! Lifecycle: Uninitialized → Active (`init`) → Transitioning (`transition`)
//! → Destroyed (`AnimationContext::destroyed`, called by the animation
//! itself — the framework never forces destruction).

pub mod interpolate;
pub mod transition;

use std::time::Duration;

use crate::chain::{self, ChainRef, LinkId};
use crate::key::PropertyKey;
use crate::rule::SharedRule;
use crate::scheduler::SubjectId;
use crate::value::{PropertyType, PropertyValue, ValueError};

/// Reserved sub-key under an animation's own key naming its duration input.
///
/// `transition` + `duration` = `transition.duration`; the owning rule reports
/// that key as an input (see `AnimatedRule::is_input`).
pub const DURATION_SEGMENT: &str = "duration";

/// A policy object computing transitional property values over time.
///
/// All methods receive an [`AnimationContext`] scoped to this call; contexts
/// must not be stored. Methods may re-enter the chain through the context
/// (including destroying the animation from within `step`).
pub trait Animation: 'static {
    /// The key this animation was declared under (e.g. `transition`).
    /// Dependency declarations and the duration input are scoped below it.
    fn key(&self) -> &PropertyKey;

    /// Bind to a source rule and push initial overrides.
    ///
    /// `source` is the pre-animation view: the predecessor link if there is
    /// one, otherwise the root rule. It never reflects this animation's own
    /// overrides, so an animation cannot seed itself from its own output.
    fn init(&mut self, source: SharedRule, ctx: &mut AnimationContext<'_>);

    /// Advance. `delay` is `None` for an out-of-band recompute (e.g. a root
    /// property changed) and `Some(elapsed)` for a scheduled tick.
    fn step(&mut self, delay: Option<Duration>, ctx: &mut AnimationContext<'_>);

    /// Retarget: keep the original source, start interpolating toward
    /// `destination`. May be called again while already transitioning.
    fn transition(&mut self, destination: SharedRule, ctx: &mut AnimationContext<'_>);
}

/// The private callback surface between one animation and its owning rule.
///
/// Created by the chain for the duration of a single `Animation` method call.
pub struct AnimationContext<'a> {
    chain: &'a ChainRef,
    link: LinkId,
    animation: SubjectId,
    destroy_requested: bool,
}

impl<'a> AnimationContext<'a> {
    pub(crate) fn new(chain: &'a ChainRef, link: LinkId, animation: SubjectId) -> Self {
        Self {
            chain,
            link,
            animation,
            destroy_requested: false,
        }
    }

    pub(crate) fn destroy_requested(&self) -> bool {
        self.destroy_requested
    }

    /// Write an override for `key`. Listeners of the owning rule (and of
    /// every later link reading through it) are notified before this
    /// returns.
    ///
    /// # Panics
    ///
    /// Panics if `key` already carries an override stored under a different
    /// declared type on this link (type stability is per key, per link).
    pub fn set_property<T: 'static>(&mut self, ty: PropertyType<T>, key: PropertyKey, value: T) {
        chain::set_override(
            self.chain,
            self.link,
            self.animation,
            key,
            PropertyValue::new(ty, value),
        );
    }

    /// Remove this animation's override for `key`, if present.
    pub fn remove_property(&mut self, key: &PropertyKey) {
        chain::clear_override(self.chain, self.link, self.animation, key);
    }

    /// Resolve `key` through the owning rule — overrides of *all* animations
    /// on the link are visible, so one animation can read another's output.
    pub fn property(&self, key: &PropertyKey) -> Option<PropertyValue> {
        chain::resolve_property(self.chain, self.link, key)
    }

    /// Typed variant of [`AnimationContext::property`].
    pub fn get<T: Clone + 'static>(
        &self,
        ty: PropertyType<T>,
        key: &PropertyKey,
    ) -> Result<Option<T>, ValueError> {
        match self.property(key) {
            Some(value) => value.get(ty).map(Some),
            None => Ok(None),
        }
    }

    /// Declare that `sub_key` (scoped under this animation's own key) is
    /// also driven by this animation. Only affects `is_input` queries.
    pub fn declare_dependency(&mut self, sub_key: PropertyKey) {
        chain::declare_dependency(self.chain, self.link, self.animation, sub_key);
    }

    /// Request an out-of-band step at the next scheduler opportunity.
    pub fn step(&mut self) {
        let handle = chain::step_handle(self.chain, self.link, self.animation);
        chain::scheduler_of(self.chain).step(handle);
    }

    /// Request a step no sooner than `delay` from now.
    pub fn step_after(&mut self, delay: Duration) {
        let handle = chain::step_handle(self.chain, self.link, self.animation);
        chain::scheduler_of(self.chain).step_after(handle, delay);
    }

    /// Report that this animation is finished.
    ///
    /// The chain unregisters the animation once the current call returns:
    /// overrides are dropped (with one `PropertyChanged` per overridden
    /// key), and if this was the last animation on a link that is mid
    /// transition, the link removes itself. Calling this more than once is
    /// a no-op.
    pub fn destroyed(&mut self) {
        self.destroy_requested = true;
    }
}

impl std::fmt::Debug for AnimationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationContext")
            .field("link", &self.link)
            .field("animation", &self.animation)
            .field("destroy_requested", &self.destroy_requested)
            .finish()
    }
}

/// Shorthand for boxing an animation for [`crate::chain::RuleChain::animate`].
pub fn boxed(animation: impl Animation) -> Box<dyn Animation> {
    Box::new(animation)
}

// Re-export the stock animation where users look for it.
pub use self::interpolate::{Color, Interpolate, Timing};
pub use self::transition::PropertyTransition;
