//! Reference derivation: scanning, resolved view and fixed-point engine.
//!
//! # Responsibility
//! - Recognize `@KEY` reference tokens inside text values.
//! - Keep the in-memory resolved view consistent with raw values.
//! - Propagate changes through dependents until a fixed point or a stall.
//!
//! # Invariants
//! - Values without references resolve to themselves.
//! - Resolution never fails; unresolvable chains are reported, not raised.

pub mod engine;
pub mod scanner;
pub mod view;
