//! Utility Functions
//!
//! User-friendly error formatting for the binary.
//!
//! ```rust
//! use cliprdr_bridge::utils::format_user_error;
//!
//! let error = anyhow::anyhow!("Failed to bind 127.0.0.1:19595");
//! eprintln!("{}", format_user_error(&error));
//! ```

pub mod errors;

pub use errors::format_user_error;
