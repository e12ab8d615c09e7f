use std::time::Duration;

use cobslink_frame::intake::{DEFAULT_CAPACITY, DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK};
use cobslink_frame::{max_frame_len, FrameConfig, IntakeConfig, DEFAULT_MAX_PAYLOAD};

use crate::error::{ChannelError, Result};

/// Default bound on a single blocking link read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Default number of bytes requested per link read.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Channel tuning. Each channel carries its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Intake buffer capacity in bytes.
    pub capacity: usize,
    /// Occupancy at which the remote is asked to pause.
    pub high_watermark: usize,
    /// Occupancy at which the remote may resume.
    pub low_watermark: usize,
    /// Upper bound on one blocking read. Also bounds how long stop takes.
    pub read_timeout: Duration,
    /// Bytes requested per read.
    pub read_chunk: usize,
    /// Largest payload accepted in either direction.
    pub max_payload: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_chunk: DEFAULT_READ_CHUNK,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ChannelConfig {
    /// Override capacity and set the watermarks to 75% and 25% of it.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self.high_watermark = capacity / 4 * 3;
        self.low_watermark = capacity / 4;
        self
    }

    pub fn with_watermarks(mut self, high: usize, low: usize) -> Self {
        self.high_watermark = high;
        self.low_watermark = low;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Check that the values can work together.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(invalid("capacity must be non-zero"));
        }
        if self.low_watermark >= self.high_watermark {
            return Err(invalid(format!(
                "low watermark {} must be below high watermark {}",
                self.low_watermark, self.high_watermark
            )));
        }
        if self.high_watermark > self.capacity {
            return Err(invalid(format!(
                "high watermark {} exceeds capacity {}",
                self.high_watermark, self.capacity
            )));
        }
        if self.read_timeout.is_zero() {
            return Err(invalid("read timeout must be non-zero"));
        }
        if self.read_chunk == 0 {
            return Err(invalid("read chunk must be non-zero"));
        }
        if self.max_payload > DEFAULT_MAX_PAYLOAD {
            return Err(invalid(format!(
                "max payload {} exceeds the one-byte length field",
                self.max_payload
            )));
        }
        let frame_len = max_frame_len(self.max_payload);
        if self.capacity < frame_len {
            return Err(invalid(format!(
                "capacity {} cannot hold a {frame_len} byte frame",
                self.capacity
            )));
        }
        Ok(())
    }

    /// Intake buffer settings derived from this config.
    pub fn intake(&self) -> IntakeConfig {
        IntakeConfig {
            capacity: self.capacity,
            high_watermark: self.high_watermark,
            low_watermark: self.low_watermark,
        }
    }

    /// Frame writer settings derived from this config.
    pub fn frame(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload,
            ..FrameConfig::default()
        }
    }
}

fn invalid(reason: impl Into<String>) -> ChannelError {
    ChannelError::InvalidConfig(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.capacity, 1024);
        assert_eq!(cfg.high_watermark, 768);
        assert_eq!(cfg.low_watermark, 256);
        assert_eq!(cfg.read_timeout, Duration::from_millis(100));
        assert_eq!(cfg.max_payload, 255);
        cfg.validate().expect("defaults should validate");
    }

    #[test]
    fn with_capacity_scales_watermarks() {
        let cfg = ChannelConfig::default().with_capacity(2048);
        assert_eq!(cfg.high_watermark, 1536);
        assert_eq!(cfg.low_watermark, 512);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let cfg = ChannelConfig::default().with_watermarks(256, 768);
        assert!(matches!(cfg.validate(), Err(ChannelError::InvalidConfig(_))));

        let cfg = ChannelConfig::default().with_watermarks(500, 500);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_high_watermark_above_capacity() {
        let cfg = ChannelConfig::default().with_watermarks(2000, 10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_values() {
        let cfg = ChannelConfig::default().with_read_timeout(Duration::ZERO);
        assert!(cfg.validate().is_err());

        let cfg = ChannelConfig {
            read_chunk: 0,
            ..ChannelConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ChannelConfig {
            capacity: 0,
            ..ChannelConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_capacity_below_one_frame() {
        let cfg = ChannelConfig::default().with_capacity(128);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("cannot hold"));
    }

    #[test]
    fn derived_configs() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.intake(), IntakeConfig::default());
        assert_eq!(cfg.frame().max_payload_size, 255);
    }
}
