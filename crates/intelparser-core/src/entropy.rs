use std::collections::HashMap;

/// Shannon entropy of `data`, in bits per character.
///
/// `-sum(p * log2(p))` over character frequencies. Higher entropy means
/// more randomness, i.e. more bits needed on average to encode the data.
pub fn shannon_entropy(data: &str) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in data.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }

    let len = data.chars().count() as f64;
    let mut entropy = 0.0;
    for count in counts.values() {
        let freq = *count as f64 / len;
        entropy -= freq * freq.log2();
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_string_has_zero_entropy() {
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn single_repeated_char_has_zero_entropy() {
        assert_eq!(shannon_entropy("aaaaaa"), 0.0);
    }

    #[test]
    fn mixed_characters_have_positive_entropy() {
        let e = shannon_entropy("S3cret!");
        assert!(e > 0.0);
    }

    #[test]
    fn higher_diversity_increases_entropy() {
        let low = shannon_entropy("aaaaaaaaab");
        let high = shannon_entropy("a1B2c3D4e5");
        assert!(high > low);
    }

    proptest! {
        #[test]
        fn entropy_is_never_negative_or_nan(s in "\\PC{0,200}") {
            let e = shannon_entropy(&s);
            prop_assert!(e >= 0.0);
            prop_assert!(!e.is_nan());
        }

        #[test]
        fn entropy_never_exceeds_log2_of_char_count(s in "\\PC{1,200}") {
            let e = shannon_entropy(&s);
            let upper_bound = (s.chars().count() as f64).log2();
            prop_assert!(e <= upper_bound + 1e-9);
        }

        #[test]
        fn doubling_a_string_leaves_entropy_unchanged(s in "\\PC{1,100}") {
            let once = shannon_entropy(&s);
            let twice = shannon_entropy(&format!("{s}{s}"));
            prop_assert!((once - twice).abs() < 1e-9);
        }
    }
}
