// Utility functions for recommendation-engine

use std::hash::{Hash, Hasher};

/// Normalize a raw counter against a ceiling into [0, 1]
pub fn normalize_ratio(value: f32, ceiling: f32) -> f32 {
    if ceiling <= f32::EPSILON {
        0.0
    } else {
        (value / ceiling).clamp(0.0, 1.0)
    }
}

/// Exponential decay for time-based scoring: `exp(-age / time_constant)`
pub fn exponential_decay(age_days: f32, time_constant_days: f32) -> f32 {
    if time_constant_days <= f32::EPSILON {
        return 0.0;
    }
    (-age_days.max(0.0) / time_constant_days).exp()
}

/// Stable in-process hash for cache fingerprints and jitter seeding.
/// `DefaultHasher::new()` uses fixed keys, so the value is reproducible
/// across calls within a process and across runs of the same binary.
pub fn stable_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ratio() {
        assert!((normalize_ratio(5.0, 10.0) - 0.5).abs() < 0.001);
        assert!((normalize_ratio(20.0, 10.0) - 1.0).abs() < 0.001);
        assert!((normalize_ratio(0.0, 10.0) - 0.0).abs() < 0.001);
        assert_eq!(normalize_ratio(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_exponential_decay() {
        // Fresh content decays to 1.0
        assert!((exponential_decay(0.0, 7.0) - 1.0).abs() < 0.001);

        // One time constant down to ~0.37
        let decayed = exponential_decay(7.0, 7.0);
        assert!((decayed - 0.3679).abs() < 0.01);

        // Negative ages are treated as fresh
        assert!((exponential_decay(-3.0, 7.0) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash(&"item-1"), stable_hash(&"item-1"));
        assert_ne!(stable_hash(&"item-1"), stable_hash(&"item-2"));
    }
}
