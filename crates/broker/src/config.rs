//! Broker configuration

use pond_protocol::DEFAULT_PORT;

/// Default record capacity of the database ring
pub const DEFAULT_CAPACITY: usize = 65_536;

/// Default high-water mark for a connection's outbound buffer
pub const DEFAULT_HIGH_WATER: usize = 256 * 1024;

/// Default read buffer size per connection
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Maximum number of records kept in memory; the oldest record is
    /// evicted once the ring is full
    pub capacity: usize,

    /// Outbound buffer high-water mark; draining pauses above this
    pub high_water: usize,

    /// Read buffer size per connection
    pub read_buffer_size: usize,

    /// Heartbeat interval in seconds (0 disables heartbeats)
    pub heartbeat_interval_secs: u64,

    /// Maximum concurrent queries per connection
    pub max_queries_per_connection: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            high_water: DEFAULT_HIGH_WATER,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            heartbeat_interval_secs: 30,
            max_queries_per_connection: 64,
        }
    }
}

impl BrokerConfig {
    /// Create config with a custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the record capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
