/// Tuning knobs for the entity store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Read-only connections opened next to the writer. 0 routes reads
    /// through the writer.
    pub reader_pool_size: usize,
    /// Maximum cached query results. 0 disables the cache.
    pub cache_capacity: usize,
    /// Deepest reply level `assemble_thread` will follow below the root.
    /// Any thread that goes deeper fails with `ThreadTooDeep`, including a
    /// well-formed reply chain, not just a corrupted cycle.
    pub max_thread_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reader_pool_size: 4,
            cache_capacity: 1024,
            max_thread_depth: 1000,
        }
    }
}
