//! Configuration for stores and the runtime.

/// How a newly mounted consumer picks its starting value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Start from the most recently published value.
    #[default]
    Latest,
    /// Start from the static initial value the store was created with.
    ///
    /// A late joiner then publishes that initial value on mount, which
    /// resets every other mount to it.
    Initial,
}

/// Per-store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Starting value policy for mounts after the first.
    pub seed: SeedPolicy,
    /// Skip broadcasting a value equal to the last published one.
    pub dedupe_publishes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            seed: SeedPolicy::Latest,
            dedupe_publishes: true,
        }
    }
}

impl StoreConfig {
    /// Set the seed policy.
    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable publish deduplication.
    pub fn with_dedupe_publishes(mut self, dedupe: bool) -> Self {
        self.dedupe_publishes = dedupe;
        self
    }
}

/// Settings for a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on tasks executed by a single `flush()`.
    ///
    /// A pass that keeps producing work past this bound is reported as
    /// [`Error::Unsettled`](crate::Error::Unsettled) rather than spinning
    /// forever.
    pub max_tasks_per_pass: usize,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_TASKS_PER_PASS: usize = 10_000;

    /// Set the per-pass task limit.
    pub fn with_max_tasks_per_pass(mut self, limit: usize) -> Self {
        self.max_tasks_per_pass = limit;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_pass: Self::DEFAULT_MAX_TASKS_PER_PASS,
        }
    }
}
