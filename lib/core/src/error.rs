//! Error handling foundation for portcullis.
//!
//! Only the `Result` alias lives here. Each crate defines its own error
//! enums in its own `error` module and reports them through rootcause.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
