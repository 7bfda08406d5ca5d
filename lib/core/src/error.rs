//! Error handling foundation for canvasflow.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and wraps them in a rootcause `Report` where failures cross an
//! I/O boundary (remote engine, persistence).

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Unreachable;

    impl std::fmt::Display for Unreachable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "engine unreachable")
        }
    }

    impl std::error::Error for Unreachable {}

    fn fail() -> Result<(), Unreachable> {
        Err(Unreachable.into())
    }

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }

    #[test]
    fn typed_report_keeps_context() {
        let err = fail().unwrap_err();
        assert_eq!(err.current_context().to_string(), "engine unreachable");
    }
}
