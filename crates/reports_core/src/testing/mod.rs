//! Test isolation harness.
//!
//! # Responsibility
//! - Give every test a live connection whose effects are rolled back when the
//!   test ends, including commits made by the code under test.
//! - Prepare the shared test database once per process.
//! - Provide per-test message bus connections.
//!
//! # See also
//! - [`crate::db::reset`] for the once-per-process schema reset.

pub mod bus;
mod database;
mod scope;

pub use database::{ScopeGuard, TestDatabase};
pub use scope::{
    acquire_scope, on_commit_boundary, release_scope, run_isolated, IsolationScope, ScopeState,
};

const CLIENT_ID_BITS: u32 = 88;

/// Unique client id for bus connections: `client-` plus 88 random bits.
pub fn unique_client_id() -> String {
    format!("client-{}", random_client_bits(uuid::Uuid::new_v4().as_u128()))
}

// A v4 UUID is random except for the version nibble (bits 76..80) and the
// variant bits (62..64). Take the 48 bits above the version and the low 40.
fn random_client_bits(uuid: u128) -> u128 {
    const LOW_BITS: u32 = CLIENT_ID_BITS - 48;
    const LOW_MASK: u128 = (1 << LOW_BITS) - 1;
    ((uuid >> 80) << LOW_BITS) | (uuid & LOW_MASK)
}
