//! End-to-end federation scenarios.
//!
//! Every test builds its own in-process authorities; no network or external
//! store is involved.

mod login;
mod metadata;
mod relay_state;
mod roles;
