// Utility functions for personalization-service

/// Clamp a utilization reading to [0, 100]; non-finite readings fall back
pub fn clamp_percent(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        fallback
    }
}

/// Case-insensitive substring test
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(150.0, 50.0), 100.0);
        assert_eq!(clamp_percent(-3.0, 50.0), 0.0);
        assert_eq!(clamp_percent(f32::NAN, 50.0), 50.0);
        assert_eq!(clamp_percent(f32::INFINITY, 50.0), 50.0);
        assert_eq!(clamp_percent(42.0, 50.0), 42.0);
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Brake Pad Set", "brake pad"));
        assert!(!contains_ignore_case("Oil filter", "brake"));
    }
}
