//! Dispatch thresholds and process configuration.
//!
//! The length thresholds were measured on one hardware generation and are
//! not architectural truths. They live here as plain data so they can be
//! re-tuned through `FASTMEM_*` environment variables or an explicit
//! [`Config`] without touching the kernels.

use log::warn;

use crate::error::{Error, Result};

// =============================================================================
// DEFAULT THRESHOLDS
// =============================================================================

/// Below this length realignment setup is never amortized.
pub const VECTOR_MIN: usize = 1024;

/// Above this length the cache capacity is consulted.
pub const CACHE_CHECK_ABOVE: usize = 32000;

/// Minimum length for a misaligned destination.
pub const MISALIGNED_DST_MIN: usize = 4000;

/// Minimum remaining length for the odd-shift composite strategies.
pub const ODD_SHIFT_MIN: usize = 16000;

/// Minimum length for an aligned destination with a misaligned source.
pub const MISALIGNED_SRC_MIN: usize = 32000;

/// Fully aligned lengths strictly inside this window take the scalar path.
pub const ALIGNED_SCALAR_WINDOW: (usize, usize) = (12000, 32000);

/// Length thresholds used by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub vector_min: usize,
    pub cache_check_above: usize,
    pub misaligned_dst_min: usize,
    pub odd_shift_min: usize,
    pub misaligned_src_min: usize,
    pub aligned_scalar_window: (usize, usize),
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            vector_min: VECTOR_MIN,
            cache_check_above: CACHE_CHECK_ABOVE,
            misaligned_dst_min: MISALIGNED_DST_MIN,
            odd_shift_min: ODD_SHIFT_MIN,
            misaligned_src_min: MISALIGNED_SRC_MIN,
            aligned_scalar_window: ALIGNED_SCALAR_WINDOW,
        }
    }
}

impl Thresholds {
    /// Thresholds that send every eligible transfer to the vector loop.
    /// Used by tests and benches to exercise realignment on short buffers.
    pub fn eager() -> Self {
        Self {
            vector_min: 0,
            cache_check_above: usize::MAX,
            misaligned_dst_min: 0,
            odd_shift_min: 0,
            misaligned_src_min: 0,
            aligned_scalar_window: (0, 0),
        }
    }
}

/// Which wide-register implementation the dispatcher should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Best backend the CPU supports.
    #[default]
    Auto,
    Portable,
    Avx512,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub thresholds: Thresholds,
    /// Overrides the detected last-level cache capacity.
    pub cache_capacity: Option<usize>,
    pub backend: BackendChoice,
    /// Allow the AVX2 fill/dualcast/reverse-move loops when detected.
    pub avx2: bool,
    /// Route transfers larger than a known cache capacity to the scalar
    /// kernel instead of the streaming vector loop.
    pub scalar_beyond_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            cache_capacity: None,
            backend: BackendChoice::Auto,
            avx2: true,
            scalar_beyond_cache: true,
        }
    }
}

impl Config {
    /// Reads `FASTMEM_*` overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let t = &mut config.thresholds;

        read_usize(&lookup, "FASTMEM_VECTOR_MIN", &mut t.vector_min)?;
        read_usize(&lookup, "FASTMEM_CACHE_CHECK_ABOVE", &mut t.cache_check_above)?;
        read_usize(&lookup, "FASTMEM_MISALIGNED_DST_MIN", &mut t.misaligned_dst_min)?;
        read_usize(&lookup, "FASTMEM_ODD_SHIFT_MIN", &mut t.odd_shift_min)?;
        read_usize(&lookup, "FASTMEM_MISALIGNED_SRC_MIN", &mut t.misaligned_src_min)?;
        read_usize(
            &lookup,
            "FASTMEM_ALIGNED_SCALAR_LO",
            &mut t.aligned_scalar_window.0,
        )?;
        read_usize(
            &lookup,
            "FASTMEM_ALIGNED_SCALAR_HI",
            &mut t.aligned_scalar_window.1,
        )?;

        if let Some(raw) = lookup("FASTMEM_CACHE_SIZE") {
            config.cache_capacity = Some(parse_usize("FASTMEM_CACHE_SIZE", &raw)?);
        }

        if let Some(raw) = lookup("FASTMEM_BACKEND") {
            config.backend = match raw.trim().to_ascii_lowercase().as_str() {
                "auto" => BackendChoice::Auto,
                "portable" => BackendChoice::Portable,
                "avx512" => BackendChoice::Avx512,
                _ => {
                    return Err(Error::InvalidConfig {
                        key: "FASTMEM_BACKEND",
                        value: raw,
                    });
                }
            };
        }

        read_bool(&lookup, "FASTMEM_AVX2", &mut config.avx2)?;
        read_bool(
            &lookup,
            "FASTMEM_SCALAR_BEYOND_CACHE",
            &mut config.scalar_beyond_cache,
        )?;

        Ok(config)
    }

    /// Environment config, or defaults if any override is malformed.
    pub fn from_env_or_default() -> Self {
        Self::from_env().unwrap_or_else(|err| {
            warn!("ignoring environment overrides: {err}");
            Config::default()
        })
    }
}

fn parse_usize(key: &'static str, raw: &str) -> Result<usize> {
    let trimmed = raw.trim();
    let (digits, scale) = match trimmed.as_bytes().last() {
        Some(b'k' | b'K') => (&trimmed[..trimmed.len() - 1], 1024),
        Some(b'm' | b'M') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        _ => (trimmed, 1),
    };
    digits
        .parse::<usize>()
        .ok()
        .and_then(|v| v.checked_mul(scale))
        .ok_or_else(|| Error::InvalidConfig {
            key,
            value: raw.to_string(),
        })
}

fn read_usize<F>(lookup: &F, key: &'static str, slot: &mut usize) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_usize(key, &raw)?;
    }
    Ok(())
}

fn read_bool<F>(lookup: &F, key: &'static str, slot: &mut bool) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => true,
            "0" | "false" | "off" | "no" => false,
            _ => return Err(Error::InvalidConfig { key, value: raw }),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_measured_constants() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.thresholds.vector_min, 1024);
        assert_eq!(config.thresholds.aligned_scalar_window, (12000, 32000));
        assert_eq!(config.cache_capacity, None);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("FASTMEM_VECTOR_MIN", "2048"),
            ("FASTMEM_CACHE_SIZE", "32M"),
            ("FASTMEM_BACKEND", "Portable"),
            ("FASTMEM_AVX2", "off"),
            ("FASTMEM_ODD_SHIFT_MIN", " 8k "),
        ]))
        .unwrap();
        assert_eq!(config.thresholds.vector_min, 2048);
        assert_eq!(config.thresholds.odd_shift_min, 8 * 1024);
        assert_eq!(config.cache_capacity, Some(32 * 1024 * 1024));
        assert_eq!(config.backend, BackendChoice::Portable);
        assert!(!config.avx2);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("FASTMEM_VECTOR_MIN", "lots")])).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidConfig {
                key: "FASTMEM_VECTOR_MIN",
                value: "lots".to_string()
            }
        );

        assert!(Config::from_lookup(lookup_from(&[("FASTMEM_BACKEND", "gpu")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("FASTMEM_AVX2", "maybe")])).is_err());
    }
}
