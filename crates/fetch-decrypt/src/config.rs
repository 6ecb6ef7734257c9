use crate::resolver::METADATA_VERSION_SUPPORTING_TOPIC_IDS;
use std::time::Duration;

/// Configuration of the fetch decryption filter. It may be flattened into
/// the command line of a proxy, or deserialized from its configuration file.
#[derive(Debug, Clone, clap::Args, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FilterConfig {
    /// Maximum time to wait on a cached topic name while processing a fetch response.
    #[arg(
        long,
        default_value = "5s",
        value_parser = humantime::parse_duration,
        env = "TOPIC_CACHE_WAIT_TIMEOUT"
    )]
    #[serde(default = "default_cache_wait_timeout", with = "humantime_serde")]
    pub cache_wait_timeout: Duration,

    /// Maximum time to wait on the broker's reply to a topic id lookup.
    #[arg(
        long,
        default_value = "30s",
        value_parser = humantime::parse_duration,
        env = "TOPIC_LOOKUP_TIMEOUT"
    )]
    #[serde(default = "default_lookup_timeout", with = "humantime_serde")]
    pub lookup_timeout: Duration,

    /// Metadata API version used to look up topic ids.
    #[arg(long, default_value_t = METADATA_VERSION_SUPPORTING_TOPIC_IDS, env = "TOPIC_LOOKUP_METADATA_VERSION")]
    #[serde(default = "default_metadata_version")]
    pub metadata_version: i16,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cache_wait_timeout: default_cache_wait_timeout(),
            lookup_timeout: default_lookup_timeout(),
            metadata_version: default_metadata_version(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.metadata_version < METADATA_VERSION_SUPPORTING_TOPIC_IDS {
            anyhow::bail!(
                "metadata version {} cannot look up topics by id (requires at least {METADATA_VERSION_SUPPORTING_TOPIC_IDS})",
                self.metadata_version,
            );
        }
        if self.cache_wait_timeout.is_zero() || self.lookup_timeout.is_zero() {
            anyhow::bail!("timeouts must be greater than zero");
        }
        Ok(())
    }
}

fn default_cache_wait_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_metadata_version() -> i16 {
    METADATA_VERSION_SUPPORTING_TOPIC_IDS
}
