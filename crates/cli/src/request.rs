//! One query request: expand, execute, render.

use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use zoopeek_engine::pager::{DEFAULT_PAGE_SIZE, IDLE_TIMEOUT};
use zoopeek_engine::{bypass_text, Pager, MESSAGE_MAX_LEN};
use zoopeek_io::{ChannelRegistry, QueryError, StorageError, UserId};
use zoopeek_macros::{MacroContext, MacroError};

/// Budget kept free for the error block's framing.
const INTERNAL_ERROR_MARGIN: usize = 100;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub budget: usize,
    /// Echo the expanded query instead of what the user typed
    pub show_expanded: bool,
    pub page_size: NonZeroUsize,
    pub idle_timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            budget: MESSAGE_MAX_LEN,
            show_expanded: false,
            page_size: NonZeroUsize::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN),
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

/// What to show the user.
#[derive(Debug)]
pub enum Reply {
    /// Plain text result (single `magic_lines` column)
    Text(String),
    /// The engine rejected the statement; formatted error block
    QueryFailed(String),
    /// Tabular result behind interactive controls
    Table(Pager),
}

/// Failures that abort the request before anything is rendered.
#[derive(Debug)]
pub enum RequestError {
    Macro(MacroError),
    Storage(StorageError),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Macro(e) => write!(f, "forbidden or malformed macro usage: {}", e),
            RequestError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Macro(e) => Some(e),
            RequestError::Storage(e) => Some(e),
        }
    }
}

impl From<MacroError> for RequestError {
    fn from(e: MacroError) -> Self {
        RequestError::Macro(e)
    }
}

impl From<StorageError> for RequestError {
    fn from(e: StorageError) -> Self {
        RequestError::Storage(e)
    }
}

/// Run `query` for `user`: expand it under the caller's macro context, execute
/// on the user's channel and wrap the result for display. Macro error lines
/// count from the first line of `query`.
pub fn handle_query(
    registry: &ChannelRegistry,
    context: &MacroContext,
    opts: &QueryOptions,
    user: &UserId,
    user_name: &str,
    query: &str,
) -> Result<Reply, RequestError> {
    let expanded = context.expand(user_name, query)?;
    log::info!("query from {} ({} chars expanded)", user, expanded.len());

    let channel = registry.channel(user)?;
    let shown = if opts.show_expanded { expanded.as_str() } else { query };

    match channel.execute(&expanded) {
        Err(e) => {
            log::debug!("query failed for {}: {}", user, e);
            Ok(Reply::QueryFailed(format_query_error(&e, shown, opts.budget)))
        }
        Ok(result) => {
            if let Some(text) = bypass_text(&result, opts.budget) {
                return Ok(Reply::Text(text));
            }
            let pager = Pager::new(shown, result)
                .with_budget(opts.budget)
                .with_page_size(opts.page_size)
                .with_idle_timeout(opts.idle_timeout);
            Ok(Reply::Table(pager))
        }
    }
}

/// Error block for a failed statement. The query fence is appended only when
/// it fits; the block is cut to `budget` characters.
pub fn format_query_error(err: &QueryError, query: &str, budget: usize) -> String {
    let title = match &err.code {
        Some(code) => format!("-Error ({})-", code),
        None => "-Error-".to_string(),
    };
    let mut msg = format!("```diff\n{}\n``````\n{}\n```", title, err.message);
    let frag_query = format!("```sql\n{}\n```", query);
    if msg.chars().count() + frag_query.chars().count() <= budget {
        msg.push_str(&frag_query);
    }
    truncate_chars(&msg, budget)
}

/// Generic internal-error block. The description is cut to leave room for
/// the framing.
pub fn format_internal_error(description: &str, budget: usize) -> String {
    let description = truncate_chars(description, budget.saturating_sub(INTERNAL_ERROR_MARGIN));
    format!("```diff\n-Internal error-\n``````\n{}\n```", description)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
