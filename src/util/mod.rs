//! Utility functions for common operations.
//!
//! - **URL validation**: vetting the configured feed service URL
//! - **Text processing**: width-aware truncation and sanitizing of user text
//!
//! # Examples
//!
//! ```
//! use reelsync::util::{sanitize_line, truncate_to_width, validate_url};
//!
//! let url = validate_url("https://feed.example.com", false).unwrap();
//! assert_eq!(url.host_str(), Some("feed.example.com"));
//!
//! let caption = sanitize_line("sunset\n\x1b[31mat the pier");
//! assert_eq!(truncate_to_width(&caption, 12), "sunset at...");
//! ```

mod text;
mod url_validator;

pub use text::{
    display_width, format_count, relative_time, sanitize_line, strip_control_chars,
    truncate_to_width,
};
pub use url_validator::{validate_url, UrlValidationError};
