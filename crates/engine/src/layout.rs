//! Fixed-width table layout.
//!
//! Data rows are rendered as `|`-separated cells padded to their column's
//! display width. Column labels go above the data; a label wider than its
//! column is staggered onto a higher header line and connected down to its
//! column with `|` marks ending in a `v`:
//!
//! ```text
//! animal_name
//! |      amount
//! v      v  score
//! Bat   |12|60
//! Dragon|3 |15
//! ```

use zoopeek_core::width::{display_width, pad_right};
use zoopeek_core::Row;

/// Minimum rendered width of any column.
pub const MIN_COL_WIDTH: usize = 1;

/// One render's worth of layout. Recomputed from the visible window on every
/// render, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub col_widths: Vec<usize>,
    pub header_lines: Vec<String>,
    pub data_lines: Vec<String>,
}

impl LayoutPlan {
    /// Header block: each header line followed by a newline.
    pub fn header_block(&self) -> String {
        self.header_lines.iter().map(|l| format!("{}\n", l)).collect()
    }

    /// Data block for the first `n` data lines, each followed by a newline.
    pub fn data_block(&self, n: usize) -> String {
        self.data_lines
            .iter()
            .take(n)
            .map(|l| format!("{}\n", l))
            .collect()
    }
}

/// Lay out `rows` under `columns`. Every row must have one cell per column.
pub fn layout(columns: &[String], rows: &[Row]) -> LayoutPlan {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect();

    let col_widths = column_widths(columns.len(), &cells);
    let starts = column_starts(&col_widths);
    let label_widths: Vec<usize> = columns.iter().map(|c| display_width(c)).collect();
    let placement = header_placement(&starts, &label_widths);
    let header_lines = render_header(columns, &starts, &placement);

    let data_lines = cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(&col_widths)
                .map(|(cell, &w)| pad_right(cell, w))
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect();

    LayoutPlan {
        col_widths,
        header_lines,
        data_lines,
    }
}

fn column_widths(n_cols: usize, cells: &[Vec<String>]) -> Vec<usize> {
    (0..n_cols)
        .map(|c| {
            cells
                .iter()
                .filter_map(|row| row.get(c))
                .map(|s| display_width(s))
                .max()
                .unwrap_or(MIN_COL_WIDTH)
                .max(MIN_COL_WIDTH)
        })
        .collect()
}

/// Start position of each column: preceding widths plus one separator each.
pub fn column_starts(col_widths: &[usize]) -> Vec<usize> {
    let mut pos = 0;
    col_widths
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let start = pos + i;
            pos += w;
            start
        })
        .collect()
}

/// Assign each column label to a header line.
///
/// Returns the header lines top to bottom, each holding its column indices
/// left to right. Columns are placed right to left. A label occupies
/// `start..start + width + 1` (one cell of spacing); it goes on the lowest
/// line where it ends at or before the leftmost label of that line and of
/// every line above it, since those labels' connectors pass through. When no
/// line qualifies a new top line is created.
pub fn header_placement(starts: &[usize], label_widths: &[usize]) -> Vec<Vec<usize>> {
    let n = starts.len().min(label_widths.len());
    if n == 0 {
        return Vec::new();
    }

    let mut lines: Vec<Vec<usize>> = vec![vec![n - 1]];
    for col in (0..n - 1).rev() {
        let end = starts[col] + label_widths[col] + 1;

        // Leftmost start on lines 0..=t, for the lowest t that still fits
        let mut target = None;
        let mut leftmost = usize::MAX;
        for (t, line) in lines.iter().enumerate() {
            leftmost = leftmost.min(starts[line[0]]);
            if end <= leftmost {
                target = Some(t);
            } else {
                break;
            }
        }

        match target {
            Some(t) => lines[t].insert(0, col),
            None => lines.insert(0, vec![col]),
        }
    }
    lines
}

fn render_header(columns: &[String], starts: &[usize], placement: &[Vec<usize>]) -> Vec<String> {
    let n_lines = placement.len();
    let mut line_of = vec![0; columns.len()];
    for (i, cols) in placement.iter().enumerate() {
        for &c in cols {
            line_of[c] = i;
        }
    }

    let mut lines = vec![String::new(); n_lines];
    for (col, name) in columns.iter().enumerate() {
        let start = starts[col];
        let home = line_of[col];
        pad_to(&mut lines[home], start);
        lines[home].push_str(name);

        for (j, line) in lines.iter_mut().enumerate().skip(home + 1) {
            pad_to(line, start);
            line.push(if j + 1 == n_lines { 'v' } else { '|' });
        }
    }
    lines
}

fn pad_to(line: &mut String, pos: usize) {
    let w = display_width(line);
    if w < pos {
        line.push_str(&" ".repeat(pos - w));
    }
}
