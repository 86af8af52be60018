//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 10-19   | macros           | Template expansion refused or malformed  |
//! | 20-29   | query            | Statement or snapshot failures           |
//! | 30-39   | internal         | Unexpected failures (trace written)      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use zoopeek_macros::MacroError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Macros (10-19)
// =============================================================================

/// Template used a directive outside the whitelist, or tried to include text.
/// Nothing was executed.
pub const EXIT_MACRO_FORBIDDEN: u8 = 10;

/// Template is malformed (bad #define, unbalanced #if, wrong argument count).
pub const EXIT_MACRO_SYNTAX: u8 = 11;

// =============================================================================
// Query (20-29)
// =============================================================================

/// The engine rejected the statement. The error block was printed to stdout.
pub const EXIT_QUERY: u8 = 20;

/// The user's snapshot could not be opened read-only.
pub const EXIT_STORAGE: u8 = 21;

// =============================================================================
// Internal (30-39)
// =============================================================================

/// Unexpected failure. An internal-error block was printed and a trace written.
pub const EXIT_INTERNAL: u8 = 30;

/// The interactive pager could not drive the terminal.
pub const EXIT_TERMINAL: u8 = 31;

/// Map a macro failure to its exit code.
pub fn macro_exit_code(err: &MacroError) -> u8 {
    if err.is_forbidden() {
        EXIT_MACRO_FORBIDDEN
    } else {
        EXIT_MACRO_SYNTAX
    }
}
