//! Table engines
//!
//! Only the properties the query builder needs are modeled.

use std::fmt;

/// ClickHouse table engine of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    MergeTree,
    ReplacingMergeTree,
    SummingMergeTree,
    AggregatingMergeTree,
    CollapsingMergeTree,
    VersionedCollapsingMergeTree,
    Memory,
    Log,
    Buffer,
    Distributed,
}

impl Engine {
    /// Whether `SELECT ... FINAL` is meaningful for this engine
    pub fn supports_final(&self) -> bool {
        matches!(
            self,
            Engine::CollapsingMergeTree
                | Engine::VersionedCollapsingMergeTree
                | Engine::ReplacingMergeTree
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::MergeTree => "MergeTree",
            Engine::ReplacingMergeTree => "ReplacingMergeTree",
            Engine::SummingMergeTree => "SummingMergeTree",
            Engine::AggregatingMergeTree => "AggregatingMergeTree",
            Engine::CollapsingMergeTree => "CollapsingMergeTree",
            Engine::VersionedCollapsingMergeTree => "VersionedCollapsingMergeTree",
            Engine::Memory => "Memory",
            Engine::Log => "Log",
            Engine::Buffer => "Buffer",
            Engine::Distributed => "Distributed",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_final() {
        assert!(Engine::CollapsingMergeTree.supports_final());
        assert!(Engine::VersionedCollapsingMergeTree.supports_final());
        assert!(Engine::ReplacingMergeTree.supports_final());
        assert!(!Engine::MergeTree.supports_final());
        assert!(!Engine::Memory.supports_final());
    }

    #[test]
    fn test_default_is_merge_tree() {
        assert_eq!(Engine::default(), Engine::MergeTree);
        assert_eq!(Engine::default().to_string(), "MergeTree");
    }
}
