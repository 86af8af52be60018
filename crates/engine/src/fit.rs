//! Squeezing a rendered table into one message.

use crate::layout::LayoutPlan;

/// Hard ceiling on the length of one message, in characters.
pub const MESSAGE_MAX_LEN: usize = 2000;

/// Paging fragment used when the result has no rows.
pub const NO_RESULTS: &str = "```(no results)```";

/// Returned when not even a single data line fits.
pub const CANNOT_DISPLAY: &str = "Can't fit even one line of the result in a message";

const TABLE_PRE: &str = "```\n";
const TABLE_SUF: &str = "```";

/// Position of the visible window within the whole result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingInfo {
    /// Index of the first visible row
    pub offset: usize,
    /// Rows in the visible window
    pub shown: usize,
    /// Rows in the whole result
    pub total: usize,
}

impl PagingInfo {
    /// Paging fragment: a fenced `start-end / total` line, 1-based and
    /// inclusive, or [`NO_RESULTS`] for an empty window.
    pub fn fragment(&self) -> String {
        if self.shown == 0 {
            NO_RESULTS.to_string()
        } else {
            format!(
                "```\n{}-{} / {}\n```",
                self.offset + 1,
                self.offset + self.shown,
                self.total
            )
        }
    }

    fn truncated(&self, shown: usize) -> Self {
        Self { shown, ..*self }
    }
}

/// Richest combination of fragments that fits in `budget` characters.
///
/// Tried in order: query + header + data + paging, header + data + paging,
/// query + data + paging, data + paging, data alone. If none fits, the data
/// lines are cut from the bottom (with the paging line recomputed) until one
/// does; if not even one line fits, [`CANNOT_DISPLAY`] is returned.
pub fn fit(query: &str, plan: &LayoutPlan, paging: PagingInfo, budget: usize) -> String {
    let q = format!("```sql\n{}\n```", query);
    let header = plan.header_block();
    let data = plan.data_block(plan.data_lines.len());
    let pos = paging.fragment();
    let (q, header, data, pos) = (q.as_str(), header.as_str(), data.as_str(), pos.as_str());

    let combinations: [&[&str]; 5] = [
        &[q, TABLE_PRE, header, data, TABLE_SUF, pos],
        &[TABLE_PRE, header, data, TABLE_SUF, pos],
        &[q, TABLE_PRE, data, TABLE_SUF, pos],
        &[TABLE_PRE, data, TABLE_SUF, pos],
        &[TABLE_PRE, data, TABLE_SUF],
    ];

    for parts in combinations {
        if total_len(parts) <= budget {
            return parts.concat();
        }
    }

    for n in (1..=plan.data_lines.len()).rev() {
        let data = plan.data_block(n);
        let pos = paging.truncated(n).fragment();
        let parts = [TABLE_PRE, data.as_str(), TABLE_SUF, pos.as_str()];
        if total_len(&parts) <= budget {
            return parts.concat();
        }
    }

    log::debug!(
        "{} data line(s) do not fit in {} characters even one at a time",
        plan.data_lines.len(),
        budget
    );
    CANNOT_DISPLAY.to_string()
}

/// Length in characters, the unit the message ceiling is counted in.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn total_len(parts: &[&str]) -> usize {
    parts.iter().map(|p| char_len(p)).sum()
}
