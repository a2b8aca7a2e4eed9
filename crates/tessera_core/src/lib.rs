//! Tessera Engine Core
//!
//! Contains the fundamental simulation systems:
//! - Entity Component System (ECS) with deferred, queue-based mutation
//! - Chunked slot pools backing component storage
//! - Deterministic simulation time

pub mod ecs;
pub mod pool;
pub mod time;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[doc(hidden)]
pub mod __private {
    pub use serde;
    pub use serde_json;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
