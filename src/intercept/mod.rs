//! Terminal-transparent paste interception: recognizes bracketed paste,
//! inline graphics dialects, and the clipboard shortcut in the host stdin
//! stream, and rewrites image content into handler references.

mod interceptor;
pub mod scanner;


pub use interceptor::{Dialect, Interceptor, CAPTURE_CAP};
