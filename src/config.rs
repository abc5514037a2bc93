//! Per-connection parameters exchanged in the SYN segment.

use crate::segment::SYN_HEADER_LENGTH;
use std::time::Duration;
use thiserror::Error as ThisError;

/// The tunable parameters of one end of a connection. Each side sends its
/// own copy in its SYN and adopts the remote copy for the traffic it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConnectionConfiguration {
    /// Option bits. Reserved and carried opaquely.
    pub options: u16,
    /// Milliseconds before an unacknowledged segment is sent again.
    pub retransmission_timeout: u16,
    /// Milliseconds of idleness after which a NUL keep-alive is sent.
    pub null_segment_timeout: u16,
    /// Largest datagram, header included, this side accepts.
    pub max_segment_size: u16,
    /// How many times a segment is retransmitted before the connection is
    /// considered broken.
    pub max_retransmissions: u8,
    /// Receive window, in segments.
    pub max_outstanding_segments: u8,
}

impl ConnectionConfiguration {
    pub fn with_retransmission_timeout(mut self, millis: u16) -> Self {
        self.retransmission_timeout = millis;
        self
    }

    pub fn with_null_segment_timeout(mut self, millis: u16) -> Self {
        self.null_segment_timeout = millis;
        self
    }

    pub fn with_max_segment_size(mut self, size: u16) -> Self {
        self.max_segment_size = size;
        self
    }

    pub fn with_max_retransmissions(mut self, count: u8) -> Self {
        self.max_retransmissions = count;
        self
    }

    pub fn with_max_outstanding_segments(mut self, count: u8) -> Self {
        self.max_outstanding_segments = count;
        self
    }

    pub fn with_options(mut self, options: u16) -> Self {
        self.options = options;
        self
    }

    /// Checks that a connection could actually run with these parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_outstanding_segments == 0 {
            Err(ConfigError::ZeroWindow)?
        }
        if self.max_segment_size < SYN_HEADER_LENGTH as u16 {
            Err(ConfigError::SegmentSizeTooSmall(self.max_segment_size))?
        }
        if self.retransmission_timeout == 0 {
            Err(ConfigError::ZeroRetransmissionTimeout)?
        }
        Ok(())
    }

    pub fn retransmission_duration(&self) -> Duration {
        Duration::from_millis(self.retransmission_timeout as u64)
    }

    pub fn null_segment_duration(&self) -> Duration {
        Duration::from_millis(self.null_segment_timeout as u64)
    }
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self {
            options: 0,
            retransmission_timeout: 600,
            null_segment_timeout: 2000,
            max_segment_size: 1400,
            max_retransmissions: 5,
            max_outstanding_segments: 32,
        }
    }
}

/// A connection configuration that cannot be used.
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    #[error("The maximum number of outstanding segments must be at least one")]
    ZeroWindow,
    #[error("A maximum segment size of {0} bytes cannot hold a SYN segment")]
    SegmentSizeTooSmall(u16),
    #[error("The retransmission timeout must be nonzero")]
    ZeroRetransmissionTimeout,
}
