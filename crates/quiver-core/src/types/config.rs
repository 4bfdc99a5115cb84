//! Index configuration for a library.
//!
//! Each library carries exactly one [`IndexConfig`] describing the ANN
//! strategy used for its chunks. The enum serializes with an external
//! `type` tag so the wire format is `{"type": "lsh", "num_tables": 4, ...}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of LSH hash tables.
pub const DEFAULT_LSH_TABLES: usize = 8;
/// Default number of hyperplanes per LSH table.
pub const DEFAULT_LSH_HYPERPLANES: usize = 16;
/// Default number of IVF centroids.
pub const DEFAULT_IVF_CENTROIDS: usize = 64;
/// Default number of IVF lists probed per query.
pub const DEFAULT_IVF_NPROBE: usize = 4;

/// Upper bound on LSH tables and hyperplanes per table.
///
/// Signatures are packed into a `u64`, so hyperplanes per table must not
/// exceed 64.
pub const MAX_LSH_PARAM: usize = 64;

/// Configuration for a library's vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexConfig {
    /// Exact brute-force index.
    Flat,
    /// Random-hyperplane locality-sensitive hashing.
    Lsh {
        /// Number of hash tables (L).
        num_tables: usize,
        /// Hyperplanes (signature bits) per table (H).
        hyperplanes_per_table: usize,
    },
    /// Inverted file over k-means centroids.
    Ivf {
        /// Number of centroids (k).
        num_centroids: usize,
        /// Number of posting lists scanned per query.
        nprobe: usize,
    },
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::Flat
    }
}

impl IndexConfig {
    /// LSH configuration with default parameters.
    #[must_use]
    pub const fn lsh_default() -> Self {
        Self::Lsh {
            num_tables: DEFAULT_LSH_TABLES,
            hyperplanes_per_table: DEFAULT_LSH_HYPERPLANES,
        }
    }

    /// IVF configuration with default parameters.
    #[must_use]
    pub const fn ivf_default() -> Self {
        Self::Ivf { num_centroids: DEFAULT_IVF_CENTROIDS, nprobe: DEFAULT_IVF_NPROBE }
    }

    /// A short name for the strategy, used in logs.
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Lsh { .. } => "lsh",
            Self::Ivf { .. } => "ivf",
        }
    }

    /// Validate parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a parameter is zero, exceeds its bound,
    /// or `nprobe` exceeds `num_centroids`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Flat => Ok(()),
            Self::Lsh { num_tables, hyperplanes_per_table } => {
                if num_tables == 0 || num_tables > MAX_LSH_PARAM {
                    return Err(ConfigError::OutOfRange {
                        field: "num_tables",
                        value: num_tables,
                        max: MAX_LSH_PARAM,
                    });
                }
                if hyperplanes_per_table == 0 || hyperplanes_per_table > MAX_LSH_PARAM {
                    return Err(ConfigError::OutOfRange {
                        field: "hyperplanes_per_table",
                        value: hyperplanes_per_table,
                        max: MAX_LSH_PARAM,
                    });
                }
                Ok(())
            }
            Self::Ivf { num_centroids, nprobe } => {
                if num_centroids == 0 {
                    return Err(ConfigError::Zero { field: "num_centroids" });
                }
                if nprobe == 0 {
                    return Err(ConfigError::Zero { field: "nprobe" });
                }
                if nprobe > num_centroids {
                    return Err(ConfigError::NprobeExceedsCentroids { nprobe, num_centroids });
                }
                Ok(())
            }
        }
    }
}

/// Errors from index configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A parameter that must be positive was zero.
    #[error("{field} must be at least 1")]
    Zero {
        /// The offending field.
        field: &'static str,
    },

    /// A parameter fell outside its allowed range.
    #[error("{field} must be between 1 and {max}, got {value}")]
    OutOfRange {
        /// The offending field.
        field: &'static str,
        /// The rejected value.
        value: usize,
        /// The inclusive upper bound.
        max: usize,
    },

    /// `nprobe` cannot exceed the centroid count.
    #[error("nprobe {nprobe} exceeds num_centroids {num_centroids}")]
    NprobeExceedsCentroids {
        /// The rejected nprobe.
        nprobe: usize,
        /// The configured centroid count.
        num_centroids: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_tagged() {
        let config = IndexConfig::Lsh { num_tables: 4, hyperplanes_per_table: 8 };
        let encoded = serde_json::to_string(&config).expect("serialize");
        assert_eq!(encoded, r#"{"type":"lsh","num_tables":4,"hyperplanes_per_table":8}"#);

        let decoded: IndexConfig = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, config);
    }

    #[test]
    fn flat_wire_format() {
        let encoded = serde_json::to_string(&IndexConfig::Flat).expect("serialize");
        assert_eq!(encoded, r#"{"type":"flat"}"#);
    }

    #[test]
    fn ivf_wire_format_roundtrip() {
        let decoded: IndexConfig =
            serde_json::from_str(r#"{"type":"ivf","num_centroids":16,"nprobe":2}"#)
                .expect("deserialize");
        assert_eq!(decoded, IndexConfig::Ivf { num_centroids: 16, nprobe: 2 });
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(IndexConfig::Flat.validate().is_ok());
        assert!(IndexConfig::lsh_default().validate().is_ok());
        assert!(IndexConfig::ivf_default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_tables() {
        let config = IndexConfig::Lsh { num_tables: 0, hyperplanes_per_table: 8 };
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn validate_rejects_oversized_signature() {
        let config = IndexConfig::Lsh { num_tables: 2, hyperplanes_per_table: 65 };
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn validate_rejects_nprobe_above_centroids() {
        let config = IndexConfig::Ivf { num_centroids: 4, nprobe: 8 };
        assert!(matches!(config.validate(), Err(ConfigError::NprobeExceedsCentroids { .. })));
    }
}
