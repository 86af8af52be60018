//! Interactive pagination over one materialized result.
//!
//! A [`Pager`] owns the result for the lifetime of one rendered response.
//! Every scroll or resize re-runs layout and fitting on the new window.
//! Mutation goes through `&mut self`, so actions on one view are serialized
//! by whoever owns it.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use zoopeek_core::ResultSet;

use crate::fit::{char_len, fit, PagingInfo, MESSAGE_MAX_LEN};
use crate::layout::layout;

/// Scroll controls offered to the user, in display order.
pub const SCROLL_STEPS: [i64; 6] = [-50, -10, -1, 1, 10, 50];

/// Page-size menu.
pub const PAGE_SIZE_CHOICES: [usize; 5] = [1, 5, 10, 20, 50];

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Controls detach after this long without interaction.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// A single-column result under this name is sent as plain text.
pub const BYPASS_COLUMN: &str = "magic_lines";

/// One user action on a rendered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerControl {
    ScrollBy(i64),
    SetPageSize(NonZeroUsize),
    Dismiss,
}

/// What the surface should do with the message after a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerUpdate {
    /// Replace the message text
    Render(String),
    /// Remove the message outright
    Delete,
    /// Controls already expired; nothing changes
    Detached,
}

#[derive(Debug, Clone)]
pub struct Pager {
    query: String,
    result: ResultSet,
    offset: usize,
    page_size: NonZeroUsize,
    budget: usize,
    idle_timeout: Duration,
    last_interaction: Instant,
    controls_attached: bool,
}

impl Pager {
    /// `query` is the text echoed above the table.
    pub fn new(query: impl Into<String>, result: ResultSet) -> Self {
        Self {
            query: query.into(),
            result,
            offset: 0,
            page_size: NonZeroUsize::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN),
            budget: MESSAGE_MAX_LEN,
            idle_timeout: IDLE_TIMEOUT,
            last_interaction: Instant::now(),
            controls_attached: true,
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_page_size(mut self, page_size: NonZeroUsize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    pub fn total_rows(&self) -> usize {
        self.result.len()
    }

    pub fn result(&self) -> &ResultSet {
        &self.result
    }

    pub fn controls_attached(&self) -> bool {
        self.controls_attached
    }

    /// Render the current window. Does not touch pager state.
    pub fn render(&self) -> String {
        let window = self.result.window(self.offset, self.page_size.get());
        let plan = layout(self.result.columns(), window);
        let paging = PagingInfo {
            offset: self.offset,
            shown: window.len(),
            total: self.result.len(),
        };
        fit(&self.query, &plan, paging, self.budget)
    }

    /// Move the window by `delta` rows, pinned to `0..=max(0, total - 1)`.
    pub fn scroll_by(&mut self, delta: i64) {
        let last = self.result.len().saturating_sub(1);
        let target = if delta < 0 {
            self.offset.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            self.offset.saturating_add(delta as usize)
        };
        self.offset = target.min(last);
    }

    /// Change the window height. The offset stays where it is.
    pub fn set_page_size(&mut self, n: NonZeroUsize) {
        self.page_size = n;
    }

    /// Record an interaction, restarting the idle clock.
    pub fn touch(&mut self, now: Instant) {
        self.last_interaction = now;
    }

    /// Detach the controls. The rendered text stays.
    pub fn expire(&mut self) {
        if self.controls_attached {
            log::debug!("pager controls detached at offset {}", self.offset);
        }
        self.controls_attached = false;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_interaction) >= self.idle_timeout
    }

    /// Expire the controls if the idle timeout has passed. Returns true when
    /// this call detached them.
    pub fn poll_expiry(&mut self, now: Instant) -> bool {
        if self.controls_attached && self.is_expired(now) {
            self.expire();
            true
        } else {
            false
        }
    }

    /// Time left before the controls detach.
    pub fn time_left(&self, now: Instant) -> Duration {
        self.idle_timeout
            .saturating_sub(now.saturating_duration_since(self.last_interaction))
    }

    /// Apply one control action.
    pub fn handle(&mut self, control: PagerControl, now: Instant) -> PagerUpdate {
        if self.poll_expiry(now) || !self.controls_attached {
            return PagerUpdate::Detached;
        }
        self.touch(now);
        match control {
            PagerControl::ScrollBy(delta) => self.scroll_by(delta),
            PagerControl::SetPageSize(n) => self.set_page_size(n),
            PagerControl::Dismiss => return PagerUpdate::Delete,
        }
        PagerUpdate::Render(self.render())
    }
}

/// Plain-text shortcut for single-column results named [`BYPASS_COLUMN`].
///
/// The cells are joined with newlines. The text is used only when it is
/// non-empty and within `budget`; trailing line breaks are dropped from what
/// is returned, as the chat host does when posting.
pub fn bypass_text(result: &ResultSet, budget: usize) -> Option<String> {
    if result.columns() != [BYPASS_COLUMN] {
        return None;
    }
    let text = result
        .rows()
        .iter()
        .map(|row| row.first().map(|c| c.to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() || char_len(&text) > budget {
        return None;
    }
    let text = text.trim_end_matches('\n');
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}
