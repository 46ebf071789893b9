//! Loopback endpoint addressing.
//!
//! The spawned bridge process listens and the client dials. Each create cycle
//! draws a fresh port from a fixed half-open range so a stale listener from a
//! previous process is never mistaken for the new one.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Host the bridge process listens on.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// First port of the default range (inclusive).
pub const DEFAULT_PORT_START: u16 = 1337;

/// End of the default range (exclusive).
pub const DEFAULT_PORT_END: u16 = 2337;

/// Half-open range `[start, end)` of ports a bridge process may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_START,
            end: DEFAULT_PORT_END,
        }
    }
}

impl PortRange {
    /// Creates a validated range. `start` must be strictly below `end`.
    pub fn new(start: u16, end: u16) -> DomainResult<Self> {
        if start >= end {
            return Err(DomainError::InvalidFieldValue {
                field: "port_range".to_string(),
                value: format!("{start}..{end}"),
                expected: "start < end".to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns true if `port` lies inside the range.
    pub fn contains(&self, port: u16) -> bool {
        (self.start..self.end).contains(&port)
    }

    /// Draws a port uniformly from the range.
    ///
    /// A degenerate range (deserialized without validation) yields `start`.
    pub fn pick(&self) -> u16 {
        if self.start >= self.end {
            return self.start;
        }
        rand::thread_rng().gen_range(self.start..self.end)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A concrete host/port pair for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Loopback endpoint on the given port.
    pub fn loopback(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range() {
        let range = PortRange::default();
        assert_eq!(range.start, 1337);
        assert_eq!(range.end, 2337);
        assert!(range.contains(1337));
        assert!(range.contains(2336));
        assert!(!range.contains(2337));
    }

    #[test]
    fn test_pick_stays_in_range() {
        let range = PortRange::default();
        for _ in 0..500 {
            assert!(range.contains(range.pick()));
        }
    }

    #[test]
    fn test_single_port_range() {
        let range = PortRange::new(4000, 4001).unwrap();
        assert_eq!(range.pick(), 4000);
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(PortRange::new(2000, 2000).is_err());
        assert!(PortRange::new(2001, 2000).is_err());
    }

    #[test]
    fn test_degenerate_range_pick_does_not_panic() {
        let range = PortRange { start: 9, end: 3 };
        assert_eq!(range.pick(), 9);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::loopback(1500).to_string(), "127.0.0.1:1500");
    }
}
