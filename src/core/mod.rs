//! Core primitives.
//!
//! Seeded randomness shared by the game engine and its tests.

pub mod rng;

pub use rng::DeterministicRng;
