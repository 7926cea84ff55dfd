//! Uncertainty scoring of predicted class distributions.

/// Shannon entropy `-Σ p·ln(p)` of a class-probability vector.
///
/// Zero-probability classes contribute nothing. A one-hot vector scores 0 and
/// a uniform vector over K classes scores `ln K`, the maximum. Rounding noise
/// that would push the sum below zero is clamped.
#[must_use]
pub fn entropy(probabilities: &[f64]) -> f64 {
    let h: f64 = probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum();
    h.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_one_hot_is_zero() {
        assert!(entropy(&[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(entropy(&[0.0, 1.0]).abs() < f64::EPSILON);
        assert!(entropy(&[0.0, 0.0, 1.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entropy_uniform_is_log_k() {
        for k in 2..=6_u32 {
            let p = vec![1.0 / f64::from(k); k as usize];
            let expected = f64::from(k).ln();
            assert!(
                (entropy(&p) - expected).abs() < 1e-12,
                "k = {k}: {} vs {expected}",
                entropy(&p)
            );
        }
    }

    #[test]
    fn test_entropy_non_negative_and_bounded() {
        for i in 0..=100 {
            let p = f64::from(i) / 100.0;
            let h = entropy(&[p, 1.0 - p]);
            assert!(h >= 0.0);
            assert!(h <= 2.0_f64.ln() + 1e-12);
        }
    }

    #[test]
    fn test_entropy_positive_unless_one_hot() {
        assert!(entropy(&[0.999, 0.001]) > 0.0);
        assert!(entropy(&[0.5, 0.3, 0.2]) > 0.0);
    }

    #[test]
    fn test_entropy_orders_by_uncertainty() {
        let confident = entropy(&[0.95, 0.05]);
        let unsure = entropy(&[0.55, 0.45]);
        let coin_flip = entropy(&[0.5, 0.5]);
        assert!(confident < unsure);
        assert!(unsure < coin_flip);
    }

    #[test]
    fn test_entropy_symmetric() {
        assert!((entropy(&[0.2, 0.8]) - entropy(&[0.8, 0.2])).abs() < f64::EPSILON);
    }
}
