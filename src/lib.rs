//! Deterministic, rewindable space-physics simulation core.
//!
//! A scene of point-mass bodies advances through discrete steps of a fixed
//! pipeline: closed-form Kepler orbits, rocket thrust, gravity and
//! acceleration integration, continuous collision detection over a
//! bounding-volume hierarchy, rule-based collision effects, and a two-phase
//! position commit. Everything that happens is an [`events::Event`], and the
//! [`timeline::Timeline`] stores them all in an interval tree alongside
//! periodic key-frame snapshots. Injecting an input into a past frame
//! truncates the history after it; any frame can then be re-derived on
//! demand by replaying recorded events forward from the nearest key-frame,
//! which yields the same state as the original simulation did.
//!
//! The crate is single-threaded and synchronous; hosts drive it through
//! [`timeline::Timeline`] directly or through the flat handle API in
//! [`capi`].

use std::fmt;

pub mod bvh;
pub mod capi;
pub mod collision;
pub mod effects;
pub mod events;
pub mod geometry;
pub mod glue;
pub mod interval_tree;
pub mod motion;
pub mod orbit;
pub mod pipeline;
pub mod pool;
pub mod rocket;
pub mod rules;
pub mod scene;
pub mod timeline;

pub use events::{Event, EventKind, Payload};
pub use geometry::{Aabb, LayerMatrix, Quaternion, Vec3};
pub use motion::Integrator;
pub use pipeline::Pipeline;
pub use rules::{CollisionEffect, EffectKind, RuleSet};
pub use scene::{Entity, Frame};
pub use timeline::{Timeline, Trajectory};

/// Error kinds surfaced by the public API. Event conversions that fail
/// (rocket burns, refuels, spawn attempts) are handled locally by skipping
/// the offending event; these errors reach callers only through the outer
/// entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A component lookup on an entity that lacks the component.
    NotFound(&'static str),
    /// An index outside its domain, like a fuel tank or collider layer.
    OutOfRange(&'static str),
    /// A depleted fuel tank or object pool.
    ResourceExhausted(&'static str),
    /// A request the timeline cannot satisfy.
    InvalidArgument(&'static str),
    /// A data-structure invariant violation; only produced by validation.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Error::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
