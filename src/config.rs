//! Run configuration for a traversal.
//!
//! Everything here is validated before any record is read, so a bad
//! downsampling target or partition count fails fast with
//! [`TraversalError::Config`].

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TraversalError};
use crate::interval::GenomicInterval;

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 47_382_911;

/// Default soft cap on records per shard.
pub const DEFAULT_SHARD_CAP: usize = 100_000;

/// How records are thinned before they reach the walker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DownsamplingMethod {
    #[default]
    None,
    /// Keep each record with this probability.
    Fraction(f64),
    /// Keep at most this many records per position.
    Positional(usize),
    /// Keep at most this many records per position within each group.
    PerGroup(usize),
    /// Keep exactly this many records from the whole stream.
    Reservoir(usize),
}

impl DownsamplingMethod {
    pub fn validate(&self) -> Result<()> {
        match *self {
            DownsamplingMethod::None | DownsamplingMethod::Reservoir(_) => Ok(()),
            DownsamplingMethod::Fraction(p) => {
                if (0.0..=1.0).contains(&p) {
                    Ok(())
                } else {
                    Err(TraversalError::Config(format!(
                        "downsampling fraction must be between 0.0 and 1.0, got {}",
                        p
                    )))
                }
            }
            DownsamplingMethod::Positional(0) | DownsamplingMethod::PerGroup(0) => Err(
                TraversalError::Config("downsampling target must be positive".to_string()),
            ),
            DownsamplingMethod::Positional(_) | DownsamplingMethod::PerGroup(_) => Ok(()),
        }
    }
}

/// Parses `none`, `fraction:P`, `positional:T`, `per-group:T` and `reservoir:N`.
impl FromStr for DownsamplingMethod {
    type Err = TraversalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(DownsamplingMethod::None);
        }
        let (kind, value) = s.split_once(':').ok_or_else(|| {
            TraversalError::Config(format!(
                "Invalid downsampling '{}': expected none, fraction:P, positional:T, per-group:T or reservoir:N",
                s
            ))
        })?;

        let method = match kind.to_lowercase().as_str() {
            "fraction" => DownsamplingMethod::Fraction(parse_value(value, s)?),
            "positional" | "coverage" => DownsamplingMethod::Positional(parse_value(value, s)?),
            "per-group" | "per_group" | "pergroup" => {
                DownsamplingMethod::PerGroup(parse_value(value, s)?)
            }
            "reservoir" => DownsamplingMethod::Reservoir(parse_value(value, s)?),
            _ => {
                return Err(TraversalError::Config(format!(
                    "Unknown downsampling method '{}'",
                    kind
                )))
            }
        };
        method.validate()?;
        Ok(method)
    }
}

impl fmt::Display for DownsamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownsamplingMethod::None => write!(f, "none"),
            DownsamplingMethod::Fraction(p) => write!(f, "fraction:{}", p),
            DownsamplingMethod::Positional(t) => write!(f, "positional:{}", t),
            DownsamplingMethod::PerGroup(t) => write!(f, "per-group:{}", t),
            DownsamplingMethod::Reservoir(n) => write!(f, "reservoir:{}", n),
        }
    }
}

/// How an interval list is divided between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// `n` groups of whole intervals.
    IntervalCount(usize),
    /// `n` groups with equal base counts, cutting intervals as needed.
    BaseCount(usize),
    /// As many equal groups as needed so each holds about this many bases.
    TargetBases(u64),
    /// One group per contig run.
    Contig(usize),
}

impl PartitionStrategy {
    pub fn validate(&self) -> Result<()> {
        let positive = match *self {
            PartitionStrategy::IntervalCount(n)
            | PartitionStrategy::BaseCount(n)
            | PartitionStrategy::Contig(n) => n > 0,
            PartitionStrategy::TargetBases(b) => b > 0,
        };
        if positive {
            Ok(())
        } else {
            Err(TraversalError::Config(format!(
                "partition strategy {} needs a positive value",
                self
            )))
        }
    }
}

/// Parses `count:N`, `bases:N`, `target:BP` and `contig:N`.
impl FromStr for PartitionStrategy {
    type Err = TraversalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, value) = s.split_once(':').ok_or_else(|| {
            TraversalError::Config(format!(
                "Invalid partitioning '{}': expected count:N, bases:N, target:BP or contig:N",
                s
            ))
        })?;
        let strategy = match kind.to_lowercase().as_str() {
            "count" | "intervals" => PartitionStrategy::IntervalCount(parse_value(value, s)?),
            "bases" => PartitionStrategy::BaseCount(parse_value(value, s)?),
            "target" => PartitionStrategy::TargetBases(parse_value(value, s)?),
            "contig" => PartitionStrategy::Contig(parse_value(value, s)?),
            _ => {
                return Err(TraversalError::Config(format!(
                    "Unknown partition strategy '{}'",
                    kind
                )))
            }
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionStrategy::IntervalCount(n) => write!(f, "count:{}", n),
            PartitionStrategy::BaseCount(n) => write!(f, "bases:{}", n),
            PartitionStrategy::TargetBases(b) => write!(f, "target:{}", b),
            PartitionStrategy::Contig(n) => write!(f, "contig:{}", n),
        }
    }
}

/// One entry of the filter chain, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    ExcludeUnmapped,
    ExcludeGroups(Vec<String>),
    /// Reject records outside these sorted intervals.
    WithinIntervals(Vec<GenomicInterval>),
}

/// Traversal configuration.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    pub downsampling: DownsamplingMethod,
    pub seed: u64,
    /// Soft cap on records per shard.
    pub shard_cap: usize,
    /// `None` traverses each interval list as a single unit.
    pub partitioning: Option<PartitionStrategy>,
    pub filters: Vec<FilterSpec>,
    /// Worker threads for parallel traversal; 0 runs on the global rayon pool.
    pub threads: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TraversalConfig {
    pub fn new() -> Self {
        Self {
            downsampling: DownsamplingMethod::None,
            seed: DEFAULT_SEED,
            shard_cap: DEFAULT_SHARD_CAP,
            partitioning: None,
            filters: Vec::new(),
            threads: 0,
        }
    }

    pub fn with_downsampling(mut self, method: DownsamplingMethod) -> Self {
        self.downsampling = method;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shard_cap(mut self, cap: usize) -> Self {
        self.shard_cap = cap;
        self
    }

    pub fn with_partitioning(mut self, strategy: PartitionStrategy) -> Self {
        self.partitioning = Some(strategy);
        self
    }

    /// Append a filter; filters run in the order they were added.
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        self.downsampling.validate()?;
        if self.shard_cap == 0 {
            return Err(TraversalError::Config(
                "shard cap must be positive".to_string(),
            ));
        }
        if let Some(strategy) = &self.partitioning {
            strategy.validate()?;
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(value: &str, whole: &str) -> Result<T> {
    value.trim().replace(',', "").parse().map_err(|_| {
        TraversalError::Config(format!("Invalid number in '{}'", whole))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_downsampling() {
        assert_eq!("none".parse::<DownsamplingMethod>().unwrap(), DownsamplingMethod::None);
        assert_eq!(
            "fraction:0.25".parse::<DownsamplingMethod>().unwrap(),
            DownsamplingMethod::Fraction(0.25)
        );
        assert_eq!(
            "positional:1,000".parse::<DownsamplingMethod>().unwrap(),
            DownsamplingMethod::Positional(1000)
        );
        assert_eq!(
            "per-group:50".parse::<DownsamplingMethod>().unwrap(),
            DownsamplingMethod::PerGroup(50)
        );
        assert_eq!(
            "reservoir:10".parse::<DownsamplingMethod>().unwrap(),
            DownsamplingMethod::Reservoir(10)
        );
    }

    #[test]
    fn test_parse_downsampling_rejects_bad_values() {
        assert!("fraction:1.5".parse::<DownsamplingMethod>().is_err());
        assert!("positional:0".parse::<DownsamplingMethod>().is_err());
        assert!("positional:abc".parse::<DownsamplingMethod>().is_err());
        assert!("magic:3".parse::<DownsamplingMethod>().is_err());
        assert!("fraction".parse::<DownsamplingMethod>().is_err());
    }

    #[test]
    fn test_downsampling_display_round_trips() {
        let method = DownsamplingMethod::PerGroup(7);
        assert_eq!(method.to_string().parse::<DownsamplingMethod>().unwrap(), method);
    }

    #[test]
    fn test_parse_partition_strategy() {
        assert_eq!(
            "count:4".parse::<PartitionStrategy>().unwrap(),
            PartitionStrategy::IntervalCount(4)
        );
        assert_eq!(
            "target:1000000".parse::<PartitionStrategy>().unwrap(),
            PartitionStrategy::TargetBases(1_000_000)
        );
        assert!("bases:0".parse::<PartitionStrategy>().is_err());
        assert!("slices:3".parse::<PartitionStrategy>().is_err());
    }

    #[test]
    fn test_builder_and_validate() {
        let config = TraversalConfig::new()
            .with_downsampling(DownsamplingMethod::Positional(100))
            .with_seed(7)
            .with_shard_cap(500)
            .with_partitioning(PartitionStrategy::Contig(2))
            .with_filter(FilterSpec::ExcludeUnmapped)
            .with_threads(4);
        assert!(config.validate().is_ok());
        assert_eq!(config.seed, 7);
        assert_eq!(config.filters.len(), 1);

        assert!(TraversalConfig::new().with_shard_cap(0).validate().is_err());
        assert!(TraversalConfig::new()
            .with_downsampling(DownsamplingMethod::Fraction(-1.0))
            .validate()
            .is_err());
    }
}
