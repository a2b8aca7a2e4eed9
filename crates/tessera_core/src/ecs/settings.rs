//! ECS tuning knobs

use serde::{Deserialize, Serialize};

/// Storage and drain parameters shared by every container of a [`World`](crate::ecs::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsSettings {
    /// Slots per pool chunk. Must be a power of two.
    pub pool_chunk_size: usize,
    /// Deletions pulled from the queue per batch.
    pub deletion_batch: usize,
    /// Insertions pulled from the queue per batch.
    pub insertion_batch: usize,
    /// Unpaired deletions tolerated before storage is compacted.
    pub compaction_threshold: usize,
}

impl Default for EcsSettings {
    fn default() -> Self {
        Self {
            pool_chunk_size: crate::pool::DEFAULT_CHUNK_SIZE,
            deletion_batch: 16,
            insertion_batch: 8,
            compaction_threshold: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: EcsSettings =
            serde_json::from_str(r#"{ "deletion_batch": 4 }"#).expect("valid settings");
        assert_eq!(settings.deletion_batch, 4);
        assert_eq!(settings.pool_chunk_size, 256);
        assert_eq!(settings.insertion_batch, 8);
        assert_eq!(settings.compaction_threshold, 32);
    }
}
