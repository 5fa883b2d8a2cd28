use std::time::Duration;

/// Per-session tuning. The defaults match what stock servers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Budget handed to the [Connector](crate::transport::Connector).
    pub connect_timeout: Duration,
    /// Deadline applied to every single send and every single receive.
    pub io_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(2),
        }
    }
}

impl Options {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}
