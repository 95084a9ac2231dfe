//! Custom validation functions for configuration.

use std::borrow::Cow;

use validator::ValidationError;

use crate::pool::PoolConfig;

const LINK_SIZE: usize = std::mem::size_of::<*const u8>();

/// A free chunk stores a pointer in place, so without rounding the
/// requested size must already hold one.
pub fn validate_chunk_fits_link(config: &PoolConfig) -> Result<(), ValidationError> {
    if !config.align_chunks && config.chunk_size < LINK_SIZE {
        let mut err = ValidationError::new("chunk_too_small");
        err.message = Some(Cow::Owned(format!(
            "chunk_size {} is below the pointer size {} and align_chunks is off",
            config.chunk_size, LINK_SIZE
        )));
        return Err(err);
    }
    Ok(())
}

/// Validate the shape of a log filter directive: non-empty, no whitespace,
/// no empty comma-separated parts, and balanced `[..]` / `{..}` span
/// filters. The full grammar is only checked when the subscriber is built.
pub fn validate_filter_directive(directive: &str) -> Result<(), ValidationError> {
    let invalid = || Err(ValidationError::new("invalid_log_filter"));
    if directive.is_empty() || directive.chars().any(char::is_whitespace) {
        return invalid();
    }
    if directive.split(',').any(str::is_empty) {
        return invalid();
    }

    let mut open = Vec::new();
    for c in directive.chars() {
        match c {
            '[' | '{' => open.push(c),
            ']' if open.pop() != Some('[') => return invalid(),
            '}' if open.pop() != Some('{') => return invalid(),
            _ => {}
        }
    }
    if !open.is_empty() {
        return invalid();
    }
    Ok(())
}

/// Validate a Prometheus metric name prefix (`[a-zA-Z_][a-zA-Z0-9_]*`).
pub fn validate_metric_prefix(prefix: &str) -> Result<(), ValidationError> {
    let mut chars = prefix.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_metric_prefix"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_prefix() {
        assert!(validate_metric_prefix("fixpool").is_ok());
        assert!(validate_metric_prefix("_pool_2").is_ok());
        assert!(validate_metric_prefix("").is_err());
        assert!(validate_metric_prefix("2pool").is_err());
        assert!(validate_metric_prefix("fix-pool").is_err());
    }

    #[test]
    fn test_filter_directive() {
        assert!(validate_filter_directive("info").is_ok());
        assert!(validate_filter_directive("fixpool_core=trace,warn").is_ok());
        assert!(validate_filter_directive("").is_err());
        assert!(validate_filter_directive("info debug").is_err());
        assert!(validate_filter_directive("foo[[").is_err());
        assert!(validate_filter_directive("foo]").is_err());
        assert!(validate_filter_directive("info,,debug").is_err());
        assert!(validate_filter_directive("fixpool_core[resize{pool}]=trace").is_ok());
    }
}
