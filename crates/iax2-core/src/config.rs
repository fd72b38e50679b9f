//! Processor configuration
//!
//! Durations are written in milliseconds when serialized, so a TOML file looks
//! like:
//!
//! ```toml
//! no_response_timeout = 30000
//! status_check_interval = 10000
//! max_missed_pings = 3
//! reorder_window = 32
//! local_number = "100"
//!
//! [codecs]
//! preferred = 4
//! supported = 14
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Iax2Error, Result};
use crate::frame::CodecPreferences;
use crate::reliability::MAX_EARLY_DISTANCE;

/// Shortest no-response window that still makes sense on the wire
pub const MIN_NO_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default no-response window
pub const DEFAULT_NO_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default period of the status check (PING + LAGRQ)
pub const DEFAULT_STATUS_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Per-call processor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// How long to wait for a reply to a setup frame before giving up
    #[serde(with = "duration_ms")]
    pub no_response_timeout: Duration,

    /// How long the remote phone may ring before we abort
    #[serde(with = "duration_ms")]
    pub ringing_timeout: Duration,

    /// Period of the liveness probes once the call is established
    #[serde(with = "duration_ms")]
    pub status_check_interval: Duration,

    /// Consecutive unanswered status checks before the peer is unreachable
    pub max_missed_pings: u32,

    /// Early frames held while waiting for a gap to fill
    pub reorder_window: u8,

    /// Minimum distance between timestamps of consecutive control frames
    pub min_timestamp_step_ms: u32,

    /// Formats advertised in NEW
    pub codecs: CodecPreferences,

    /// Calling number placed in NEW
    pub local_number: Option<String>,

    /// Calling name placed in NEW
    pub local_name: Option<String>,

    /// Username placed in NEW and REGREQ
    pub local_username: Option<String>,

    /// Whether AES encryption may be switched on when the peer offers it
    pub encryption: bool,

    /// Capacity of the processor's command channel
    pub channel_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            no_response_timeout: DEFAULT_NO_RESPONSE_TIMEOUT,
            ringing_timeout: Duration::from_secs(60),
            status_check_interval: DEFAULT_STATUS_CHECK_INTERVAL,
            max_missed_pings: 3,
            reorder_window: 32,
            min_timestamp_step_ms: 3,
            codecs: CodecPreferences::default(),
            local_number: None,
            local_name: None,
            local_username: None,
            encryption: false,
            channel_capacity: 256,
        }
    }
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_no_response_timeout(mut self, timeout: Duration) -> Self {
        self.no_response_timeout = timeout;
        self
    }

    pub fn with_ringing_timeout(mut self, timeout: Duration) -> Self {
        self.ringing_timeout = timeout;
        self
    }

    pub fn with_status_check_interval(mut self, interval: Duration) -> Self {
        self.status_check_interval = interval;
        self
    }

    pub fn with_max_missed_pings(mut self, count: u32) -> Self {
        self.max_missed_pings = count;
        self
    }

    pub fn with_reorder_window(mut self, window: u8) -> Self {
        self.reorder_window = window;
        self
    }

    pub fn with_codecs(mut self, codecs: CodecPreferences) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_local_number(mut self, number: impl Into<String>) -> Self {
        self.local_number = Some(number.into());
        self
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_local_username(mut self, username: impl Into<String>) -> Self {
        self.local_username = Some(username.into());
        self
    }

    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encryption = enabled;
        self
    }

    /// Check the settings against the protocol limits
    pub fn validate(&self) -> Result<()> {
        if self.no_response_timeout < MIN_NO_RESPONSE_TIMEOUT {
            return Err(Iax2Error::config(format!(
                "no_response_timeout must be at least {} ms",
                MIN_NO_RESPONSE_TIMEOUT.as_millis()
            )));
        }
        if self.ringing_timeout.is_zero() {
            return Err(Iax2Error::config("ringing_timeout must be non-zero"));
        }
        if self.status_check_interval.is_zero() {
            return Err(Iax2Error::config("status_check_interval must be non-zero"));
        }
        if self.max_missed_pings == 0 {
            return Err(Iax2Error::config("max_missed_pings must be at least 1"));
        }
        if self.reorder_window == 0 || self.reorder_window > MAX_EARLY_DISTANCE {
            return Err(Iax2Error::config(format!(
                "reorder_window must be between 1 and {}",
                MAX_EARLY_DISTANCE
            )));
        }
        if !self.codecs.supported.contains(self.codecs.preferred) {
            return Err(Iax2Error::config(
                "preferred codec is not in the supported set",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(Iax2Error::config("channel_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: ProcessorConfig = toml::from_str(input)
            .map_err(|e| Iax2Error::config(format!("Invalid processor config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
