/// Log of the class prior `doc_count / total_documents`.
///
/// With no documents at all every class is equally likely, which keeps the
/// score finite for stores populated through the raw counter operations.
pub(crate) fn log_prior(doc_count: u64, total_documents: u64, num_classes: usize) -> f64 {
    if total_documents == 0 {
        return -(num_classes.max(1) as f64).ln();
    }
    (doc_count as f64 / total_documents as f64).ln()
}

/// Log of the Laplace-smoothed likelihood
/// `(count + alpha) / (total_tokens + alpha * vocabulary_size)`.
///
/// The vocabulary is floored at one so a class whose counts are all zero still
/// gets a finite denominator.
pub(crate) fn log_likelihood(count: u64, total_tokens: u64, alpha: f64, vocabulary_size: usize) -> f64 {
    let numerator = count as f64 + alpha;
    let denominator = total_tokens as f64 + alpha * vocabulary_size.max(1) as f64;
    numerator.ln() - denominator.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_prior() {
        assert!((log_prior(1, 4, 2) - 0.25f64.ln()).abs() < 1e-12);
        assert!((log_prior(0, 0, 4) - 0.25f64.ln()).abs() < 1e-12);
        assert_eq!(log_prior(0, 3, 2), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_likelihood_unseen_token_is_finite() {
        let value = log_likelihood(0, 10, 1.0, 5);
        assert!(value.is_finite());
        assert!((value - (1.0f64 / 15.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_likelihood_empty_vocabulary() {
        assert!(log_likelihood(0, 0, 1.0, 0).is_finite());
    }
}
