//! PropertyTransition: the stock time-bounded animation.
//!
//! Tracks every property of its declared type on the source rule (optionally
//! narrowed by a filter), mirrors them while idle, and once retargeted
//! interpolates each tracked property from its current value toward the
//! destination rule's value. At the configured duration every property
//! collapses to exactly the destination value and the animation destroys
//! itself.

use std::time::Duration;

use crate::animation::interpolate::{Interpolate, Timing};
use crate::animation::{Animation, AnimationContext};
use crate::key::PropertyKey;
use crate::rule::{RuleExt, SharedRule};
use crate::value::PropertyType;

/// Interval between self-scheduled frames.
const FRAME: Duration = Duration::from_millis(16);

struct Track<T> {
    key: PropertyKey,
    from: Option<T>,
    to: Option<T>,
}

/// A time-bounded transition over all properties of one declared type.
pub struct PropertyTransition<T: Interpolate> {
    key: PropertyKey,
    ty: PropertyType<T>,
    duration: Duration,
    timing: Timing,
    frame: Duration,
    filter: Option<Box<dyn Fn(&PropertyKey) -> bool>>,
    source: Option<SharedRule>,
    destination: Option<SharedRule>,
    elapsed: Duration,
    tracks: Vec<Track<T>>,
}

impl<T: Interpolate> PropertyTransition<T> {
    /// Create a transition declared under `key` for properties of type `ty`,
    /// with a 500 ms linear default.
    pub fn new(key: impl Into<PropertyKey>, ty: PropertyType<T>) -> Self {
        Self {
            key: key.into(),
            ty,
            duration: Duration::from_millis(500),
            timing: Timing::Linear,
            frame: FRAME,
            filter: None,
            source: None,
            destination: None,
            elapsed: Duration::ZERO,
            tracks: Vec::new(),
        }
    }

    /// Set the duration (builder).
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the timing function (builder).
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Set the self-scheduling frame interval (builder).
    pub fn with_frame(mut self, frame: Duration) -> Self {
        self.frame = frame;
        self
    }

    /// Restrict tracking to keys accepted by `filter` (builder).
    pub fn with_filter(mut self, filter: impl Fn(&PropertyKey) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// The configured duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The configured timing function.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    fn accepts(&self, key: &PropertyKey) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(key))
    }

    /// Keys of the declared type on `rule`, filtered, in stable order.
    fn tracked_keys(&self, rule: &SharedRule) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = rule
            .properties_of(self.ty)
            .into_iter()
            .filter(|key| self.accepts(key))
            .collect();
        keys.sort();
        keys
    }

    /// Mirror the source rule: one track and one override per tracked key.
    fn mirror_source(&mut self, ctx: &mut AnimationContext<'_>) {
        let Some(source) = self.source.clone() else {
            return;
        };
        let keys = self.tracked_keys(&source);
        // Drop overrides for keys the source no longer has.
        for track in &self.tracks {
            if !keys.contains(&track.key) {
                ctx.remove_property(&track.key);
            }
        }
        self.tracks.clear();
        for key in keys {
            if let Ok(Some(value)) = source.get(self.ty, &key) {
                ctx.set_property(self.ty, key.clone(), value.clone());
                self.tracks.push(Track {
                    key,
                    from: Some(value),
                    to: None,
                });
            }
        }
    }

    /// Write the final state and self-destruct.
    fn finish(&mut self, ctx: &mut AnimationContext<'_>) {
        for track in &self.tracks {
            match &track.to {
                Some(value) => ctx.set_property(self.ty, track.key.clone(), value.clone()),
                None => ctx.remove_property(&track.key),
            }
        }
        ctx.destroyed();
    }
}

impl<T: Interpolate> Animation for PropertyTransition<T> {
    fn key(&self) -> &PropertyKey {
        &self.key
    }

    fn init(&mut self, source: SharedRule, ctx: &mut AnimationContext<'_>) {
        self.source = Some(source);
        self.mirror_source(ctx);
    }

    fn step(&mut self, delay: Option<Duration>, ctx: &mut AnimationContext<'_>) {
        if self.destination.is_none() {
            // Not retargeted yet: keep mirroring the source.
            self.mirror_source(ctx);
            return;
        }

        if let Some(elapsed) = delay {
            self.elapsed += elapsed;
        }

        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };

        if progress >= 1.0 {
            self.finish(ctx);
            return;
        }

        let eased = self.timing.apply(progress);
        for track in &self.tracks {
            match (&track.from, &track.to) {
                (Some(from), Some(to)) => {
                    ctx.set_property(self.ty, track.key.clone(), from.interpolate(to, eased));
                }
                // Value disappears at the destination: hold until the end.
                (Some(from), None) => {
                    ctx.set_property(self.ty, track.key.clone(), from.clone());
                }
                // Value appears at the destination: materializes at the end.
                (None, _) => {}
            }
        }
        // Clamp the last frame so the finishing step lands exactly on the
        // duration boundary.
        let remaining = self.duration.saturating_sub(self.elapsed);
        ctx.step_after(self.frame.min(remaining));
    }

    fn transition(&mut self, destination: SharedRule, ctx: &mut AnimationContext<'_>) {
        self.elapsed = Duration::ZERO;

        // Track the union of what we animate now and what the destination
        // declares; blending starts from the currently shown value.
        let mut keys: Vec<PropertyKey> =
            self.tracks.iter().map(|track| track.key.clone()).collect();
        for key in self.tracked_keys(&destination) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys.sort();

        let mut tracks = Vec::with_capacity(keys.len());
        for key in keys {
            let from = match ctx.get(self.ty, &key) {
                Ok(current @ Some(_)) => current,
                _ => self
                    .source
                    .as_ref()
                    .and_then(|source| source.get(self.ty, &key).ok().flatten()),
            };
            let to = destination.get(self.ty, &key).ok().flatten();
            tracks.push(Track { key, from, to });
        }
        self.tracks = tracks;
        self.destination = Some(destination);
        ctx.step_after(self.frame.min(self.duration));
    }
}

impl<T: Interpolate> std::fmt::Debug for PropertyTransition<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyTransition")
            .field("key", &self.key)
            .field("type", &self.ty.name())
            .field("duration", &self.duration)
            .field("timing", &self.timing)
            .field("transitioning", &self.destination.is_some())
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENGTH: PropertyType<f32> = PropertyType::named("length");

    #[test]
    fn builder_defaults() {
        let transition = PropertyTransition::new("transition", LENGTH);
        assert_eq!(transition.duration(), Duration::from_millis(500));
        assert_eq!(transition.timing(), Timing::Linear);
        assert_eq!(transition.key(), &"transition".into());
    }

    #[test]
    fn builder_overrides() {
        let transition = PropertyTransition::new("transition", LENGTH)
            .with_duration(Duration::from_millis(200))
            .with_timing(Timing::EaseInOut)
            .with_frame(Duration::from_millis(8));
        assert_eq!(transition.duration(), Duration::from_millis(200));
        assert_eq!(transition.timing(), Timing::EaseInOut);
    }

    #[test]
    fn filter_narrows_tracking() {
        let transition = PropertyTransition::new("transition", LENGTH)
            .with_filter(|key| key.starts_with(&PropertyKey::new("border")));
        assert!(transition.accepts(&"border.width".into()));
        assert!(!transition.accepts(&"width".into()));
    }
}
