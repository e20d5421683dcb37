//! # glisten
//!
//! A styling rule resolution and animation pipeline: resolve named, typed
//! properties for a visual item from a cascading rule, and transparently
//! overlay time-based transitions on top of that rule while it changes —
//! without ever losing track of which rule is authoritative for which
//! property.
//!
//! The surrounding framework (cascade, widgets, rendering) stays outside:
//! it supplies root rules, asks for transitions, and reads resolved values
//! back through [`chain::AnimatedRule`] like any other [`rule::Rule`].
//!
//! ## Core Systems
//!
//! - **[`key`]** — Hierarchical, dot-addressed property keys
//! - **[`value`]** — Type witnesses and tagged property values
//! - **[`rule`]** — The `Rule` trait, selectors, and the stock `StyleRule`
//! - **[`chain`]** — Per-item rule chains: animation layers over a root rule
//! - **[`animation`]** — The `Animation` contract and the stock
//!   `PropertyTransition`
//! - **[`scheduler`]** — Cooperative delay-based stepping with a
//!   deterministic tick clock
//! - **[`event`]** — Rule/link events and snapshot-before-dispatch listeners
//!
//! ## Threading
//!
//! Single-threaded cooperative: rules, chains, animations, and the scheduler
//! all live on one logical thread. Nothing here blocks; waiting is expressed
//! through scheduler delays (pump them with [`scheduler::drive`] under tokio,
//! or advance the clock by hand in tests).

// Foundation
pub mod event;
pub mod key;
pub mod value;

// Rules and resolution
pub mod chain;
pub mod rule;

// Animation pipeline
pub mod animation;
pub mod scheduler;
