//! Tunables of the hash joiner.
//!
//! The bucket count and load factor are empirical knobs, not correctness
//! constraints; any positive load factor and power-of-two bucket count
//! produce the same join result.

use serde::{Deserialize, Serialize};
use vecjoin_error::{Result, VecJoinError};
use vecjoin_types::{DEFAULT_BATCH_ROW_CAPACITY, MAX_BATCH_ROW_CAPACITY};

/// Initial number of hash buckets.
pub const DEFAULT_INITIAL_NUM_BUCKETS: usize = 256;

/// Rows per bucket before the bucket count doubles.
pub const DEFAULT_LOAD_FACTOR: f64 = 1.0;

/// Smallest accepted load factor: at most eight buckets per build row.
pub const MIN_LOAD_FACTOR: f64 = 0.125;

/// Hash joiner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashJoinConfig {
    /// Bucket count the table starts from, rounded up to a power of two.
    pub initial_num_buckets: usize,
    pub load_factor: f64,
    /// Upper bound on rows per output batch.
    pub max_batch_size: usize,
    /// Budget for the build side. `None` means unbounded.
    pub build_memory_limit_bytes: Option<usize>,
}

impl Default for HashJoinConfig {
    fn default() -> Self {
        Self {
            initial_num_buckets: DEFAULT_INITIAL_NUM_BUCKETS,
            load_factor: DEFAULT_LOAD_FACTOR,
            max_batch_size: DEFAULT_BATCH_ROW_CAPACITY,
            build_memory_limit_bytes: None,
        }
    }
}

impl HashJoinConfig {
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    #[must_use]
    pub fn with_initial_num_buckets(mut self, initial_num_buckets: usize) -> Self {
        self.initial_num_buckets = initial_num_buckets;
        self
    }

    #[must_use]
    pub fn with_build_memory_limit(mut self, limit: usize) -> Self {
        self.build_memory_limit_bytes = Some(limit);
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`VecJoinError::InvalidSpec`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.initial_num_buckets == 0 {
            return Err(VecJoinError::invalid_spec(
                "initial_num_buckets must be positive",
            ));
        }
        if self.initial_num_buckets.checked_next_power_of_two().is_none() {
            return Err(VecJoinError::invalid_spec(format!(
                "initial_num_buckets {} cannot be rounded to a power of two",
                self.initial_num_buckets
            )));
        }
        if !(self.load_factor.is_finite() && self.load_factor >= MIN_LOAD_FACTOR) {
            return Err(VecJoinError::invalid_spec(format!(
                "load_factor must be a finite number of at least {MIN_LOAD_FACTOR}, got {}",
                self.load_factor
            )));
        }
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_ROW_CAPACITY {
            return Err(VecJoinError::invalid_spec(format!(
                "max_batch_size must be within 1..={MAX_BATCH_ROW_CAPACITY}, got {}",
                self.max_batch_size
            )));
        }
        Ok(())
    }

    /// `initial_num_buckets` rounded up to a power of two.
    #[must_use]
    pub fn normalized_initial_buckets(&self) -> usize {
        self.initial_num_buckets
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or(DEFAULT_INITIAL_NUM_BUCKETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HashJoinConfig::default();
        config.validate().unwrap();
        assert_eq!(config.normalized_initial_buckets(), 256);
        assert_eq!(config.max_batch_size, DEFAULT_BATCH_ROW_CAPACITY);
    }

    #[test]
    fn bucket_count_rounds_up() {
        let config = HashJoinConfig::default().with_initial_num_buckets(100);
        assert_eq!(config.normalized_initial_buckets(), 128);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(HashJoinConfig::default().with_max_batch_size(0).validate().is_err());
        assert!(
            HashJoinConfig::default()
                .with_max_batch_size(MAX_BATCH_ROW_CAPACITY + 1)
                .validate()
                .is_err()
        );
        assert!(
            HashJoinConfig::default()
                .with_initial_num_buckets(0)
                .validate()
                .is_err()
        );
        let config = HashJoinConfig {
            load_factor: 0.0,
            ..HashJoinConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VecJoinError::InvalidSpec(_))
        ));
    }

    #[test]
    fn rejects_tiny_load_factor() {
        for load_factor in [1e-30, MIN_LOAD_FACTOR / 2.0, f64::NAN, f64::INFINITY] {
            let config = HashJoinConfig {
                load_factor,
                ..HashJoinConfig::default()
            };
            assert!(config.validate().is_err(), "{load_factor}");
        }
        let config = HashJoinConfig {
            load_factor: MIN_LOAD_FACTOR,
            ..HashJoinConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let config: HashJoinConfig = toml::from_str(
            r"
            max_batch_size = 64
            build_memory_limit_bytes = 1048576
            ",
        )
        .unwrap();
        assert_eq!(config.max_batch_size, 64);
        assert_eq!(config.build_memory_limit_bytes, Some(1_048_576));
        assert_eq!(config.initial_num_buckets, DEFAULT_INITIAL_NUM_BUCKETS);
        config.validate().unwrap();
    }
}
