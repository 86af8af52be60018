//! Sandboxed C-style macro preprocessor.
//!
//! Query templates may use `#define`, `#undef` and conditional blocks. Any
//! other directive, and any attempt to pull in outside text, is rejected
//! before expansion starts. Expansion never touches the filesystem.

mod cond;
pub mod context;
mod error;
mod expand;
mod lexer;

pub use context::MacroContext;
pub use error::MacroError;
pub use expand::{Preprocessor, MAX_ARGUMENT_DEPTH, MAX_REPLACEMENT_TOKENS};

/// The only directives a template may use.
pub const DIRECTIVE_WHITELIST: [&str; 8] =
    ["define", "undef", "ifdef", "ifndef", "if", "elif", "else", "endif"];

pub(crate) const INCLUSION_DIRECTIVES: [&str; 3] = ["include", "include_next", "import"];

pub(crate) const HAS_INCLUDE_OPERATORS: [&str; 2] = ["__has_include", "__has_include_next"];

/// Expand `text` with a fresh macro table.
pub fn expand(text: &str) -> Result<String, MacroError> {
    Preprocessor::new().run(text)
}
