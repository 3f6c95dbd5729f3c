//! Result type alias for pgmask

use super::errors::PgMaskError;

/// Result type alias for pgmask operations
///
/// # Examples
///
/// ```
/// use pgmask::domain::result::Result;
/// use pgmask::domain::errors::PgMaskError;
///
/// fn failing_function() -> Result<()> {
///     Err(PgMaskError::Configuration("batch_size must be positive".to_string()))
/// }
/// assert!(failing_function().is_err());
/// ```
pub type Result<T> = std::result::Result<T, PgMaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
