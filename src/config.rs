//! Types for the one-time configuration of the runtime parameters used by the
//! global RCU runtime.

use std::time::Duration;

use thiserror::Error;

// generated by the build script from the `RCU_BATCH_THRESHOLD` env variable
include!(concat!(env!("OUT_DIR"), "/build_constants.rs"));

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_BACKGROUND_RECLAIM: bool = true;

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Error type for invalid configuration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// The batch threshold was set to 0.
    #[error("batch threshold must be greater than 0")]
    ZeroBatchThreshold,
    /// The flush interval was set to zero.
    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Runtime configuration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    batch_threshold: u32,
    flush_interval: Duration,
    background_reclaim: bool,
}

/********** impl Default **************************************************************************/

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

/********** impl inherent *************************************************************************/

impl Config {
    /// Creates a new [`Config`] with the given parameters.
    ///
    /// # Panics
    ///
    /// This function panics, if `batch_threshold` is 0 or `flush_interval` is
    /// zero.
    #[inline]
    pub fn with_params(
        batch_threshold: u32,
        flush_interval: Duration,
        background_reclaim: bool,
    ) -> Self {
        assert!(batch_threshold > 0, "batch threshold must be greater than 0");
        assert!(flush_interval > Duration::from_secs(0), "flush interval must be greater than zero");
        Self { batch_threshold, flush_interval, background_reclaim }
    }

    /// Returns the batch threshold.
    ///
    /// Every time this many records have been retired, an attempt is made to
    /// reclaim all pending records.
    #[inline]
    pub fn batch_threshold(&self) -> u32 {
        self.batch_threshold
    }

    /// Returns the interval in which the background reclaimer thread checks
    /// for pending records, regardless of the batch threshold.
    #[inline]
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Returns `true` if records are reclaimed by a dedicated background
    /// thread instead of the retiring threads.
    #[inline]
    pub fn background_reclaim(&self) -> bool {
        self.background_reclaim
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
///
/// This is mainly useful for keeping stability, in case the internal structure
/// of the [`Config`] type changes in the future, e.g. because further
/// parameters are added.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    batch_threshold: Option<u32>,
    flush_interval: Option<Duration>,
    background_reclaim: Option<bool>,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch threshold.
    #[inline]
    pub fn batch_threshold(mut self, batch_threshold: u32) -> Self {
        self.batch_threshold = Some(batch_threshold);
        self
    }

    /// Sets the flush interval of the background reclaimer.
    #[inline]
    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = Some(flush_interval);
        self
    }

    /// Enables or disables the background reclaimer thread.
    ///
    /// When disabled, pending records are reclaimed by the retiring thread
    /// once the batch threshold is reached, unless that thread is currently
    /// inside a read-side critical section.
    #[inline]
    pub fn background_reclaim(mut self, background_reclaim: bool) -> Self {
        self.background_reclaim = Some(background_reclaim);
        self
    }

    /// Consumes the [`ConfigBuilder`] and returns an initialized [`Config`].
    ///
    /// Unspecified parameters are initialized with their default values.
    ///
    /// # Errors
    ///
    /// Fails if the batch threshold or the flush interval are zero.
    #[inline]
    pub fn try_build(self) -> Result<Config, ConfigError> {
        let batch_threshold = self.batch_threshold.unwrap_or(DEFAULT_BATCH_THRESHOLD);
        if batch_threshold == 0 {
            return Err(ConfigError::ZeroBatchThreshold);
        }

        let flush_interval = self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL);
        if flush_interval == Duration::from_secs(0) {
            return Err(ConfigError::ZeroFlushInterval);
        }

        Ok(Config {
            batch_threshold,
            flush_interval,
            background_reclaim: self.background_reclaim.unwrap_or(DEFAULT_BACKGROUND_RECLAIM),
        })
    }

    /// Consumes the [`ConfigBuilder`] and returns an initialized [`Config`].
    ///
    /// # Panics
    ///
    /// This function panics, if any parameter is invalid (see
    /// [`try_build`][ConfigBuilder::try_build]).
    #[inline]
    pub fn build(self) -> Config {
        match self.try_build() {
            Ok(config) => config,
            Err(err) => panic!("invalid configuration: {}", err),
        }
    }
}
