//! Monospace display width as rendered by the host chat platform.
//!
//! The platform draws pictographic clusters (emoji, flags, keycaps, ZWJ
//! sequences) two cells wide and everything else one cell wide. CJK text is
//! deliberately NOT doubled: the platform's code blocks don't do it either.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

const ZWJ: char = '\u{200D}';
const VS16: char = '\u{FE0F}';
const KEYCAP: char = '\u{20E3}';

/// Width of `s` in monospace cells.
///
/// `display_width("abc") == 3`, `display_width("🐲") == 2`.
pub fn display_width(s: &str) -> usize {
    s.graphemes(true)
        .map(|g| if is_pictographic_cluster(g) { 2 } else { 1 })
        .sum()
}

/// Right-pad `s` with spaces up to `width` display cells.
/// Strings already at or past `width` are returned unchanged.
pub fn pad_right(s: &str, width: usize) -> String {
    let sw = display_width(s);
    if sw >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - sw))
    }
}

/// Whether one extended grapheme cluster renders as a double-width pictograph.
pub fn is_pictographic_cluster(g: &str) -> bool {
    let mut chars = g.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    // Flags are pairs of regional indicators
    if is_regional_indicator(first) {
        return true;
    }

    let rest: Vec<char> = chars.collect();

    // Keycaps: 1️⃣ #️⃣ *️⃣
    if rest.contains(&KEYCAP) {
        return true;
    }

    if !in_pictographic_block(first) {
        return false;
    }

    // Emoji presentation either by default (wide) or forced with VS16,
    // or a ZWJ sequence built from pictographs.
    UnicodeWidthChar::width(first) == Some(2) || rest.contains(&VS16) || rest.contains(&ZWJ)
}

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn in_pictographic_block(c: char) -> bool {
    matches!(c as u32,
        0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139
        | 0x2194..=0x21AA
        | 0x231A..=0x23FF
        | 0x24C2
        | 0x25AA..=0x25FE
        | 0x2600..=0x27BF
        | 0x2934 | 0x2935
        | 0x2B05..=0x2B55
        | 0x3030 | 0x303D | 0x3297 | 0x3299
        | 0x1F000..=0x1FAFF
    )
}
