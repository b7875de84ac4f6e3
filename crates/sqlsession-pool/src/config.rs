//! Pool configuration.

/// Default cap on idle slots kept per value type.
pub const DEFAULT_MAX_IDLE_VALUES: usize = 4096;

/// Default cap on idle session and cursor states.
pub const DEFAULT_MAX_IDLE_OBJECTS: usize = 256;

/// Default initial capacity of an arena's in-use list.
pub const DEFAULT_ARENA_CAPACITY: usize = 1024;

/// Configuration for the value and object pools.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Whether closed session states are recycled.
    pub session_pool: bool,

    /// Whether closed cursor states are recycled.
    pub cursor_pool: bool,

    /// Maximum idle slots kept on each typed free list.
    ///
    /// Slots released beyond this are dropped.
    pub max_idle_values: usize,

    /// Maximum idle session or cursor states kept.
    pub max_idle_objects: usize,

    /// Initial capacity of each arena's in-use list.
    pub arena_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            session_pool: true,
            cursor_pool: true,
            max_idle_values: DEFAULT_MAX_IDLE_VALUES,
            max_idle_objects: DEFAULT_MAX_IDLE_OBJECTS,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable session state recycling.
    #[must_use]
    pub fn session_pool(mut self, enabled: bool) -> Self {
        self.session_pool = enabled;
        self
    }

    /// Enable or disable cursor state recycling.
    #[must_use]
    pub fn cursor_pool(mut self, enabled: bool) -> Self {
        self.cursor_pool = enabled;
        self
    }

    /// Set the idle cap per value type.
    #[must_use]
    pub fn max_idle_values(mut self, count: usize) -> Self {
        self.max_idle_values = count;
        self
    }

    /// Set the idle cap for session and cursor states.
    #[must_use]
    pub fn max_idle_objects(mut self, count: usize) -> Self {
        self.max_idle_objects = count;
        self
    }

    /// Set the initial arena capacity.
    #[must_use]
    pub fn arena_capacity(mut self, capacity: usize) -> Self {
        self.arena_capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::error::PoolError> {
        if self.arena_capacity == 0 {
            return Err(crate::error::PoolError::Configuration(
                "arena_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
