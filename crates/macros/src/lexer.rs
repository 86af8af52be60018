// Macro-language tokenizer
// Works one logical line at a time; comments and line splices are removed
// beforehand by `strip_comments` / `splice_lines`.

use std::collections::BTreeSet;

use crate::error::MacroError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Number,
    /// "double quoted"
    Str,
    /// 'single quoted' (C character constants, SQL string literals)
    Char,
    Punct,
    Other,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Whitespace preceded this token in the source
    pub space: bool,
    /// Logical source line (1-based)
    pub line: usize,
    /// Macros that must not be re-expanded from this token
    pub hide: BTreeSet<String>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, space: bool, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            space,
            line,
            hide: BTreeSet::new(),
        }
    }

    pub fn newline(line: usize) -> Self {
        Self::new(TokenKind::Newline, "\n", false, line)
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }
}

// Longest match first
const MULTI_PUNCT: &[&str] = &[
    "...", "<<=", ">>=", "##", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "->", "++",
    "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "::",
];

/// Join lines ending in a backslash with the next line.
pub(crate) fn splice_lines(text: &str) -> String {
    text.replace("\r\n", "\n").replace("\\\n", "")
}

/// Replace `/* */` comments with a space (keeping their newlines) and drop
/// `//` comments. Quote-aware: comment markers inside '...' or "..." are text.
pub(crate) fn strip_comments(text: &str) -> Result<String, MacroError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start_line = line;
                out.push(' ');
                i += 2;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(MacroError::Syntax {
                                line: start_line,
                                message: "unterminated comment".to_string(),
                            })
                        }
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => {
                            out.push('\n');
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' | '\'' => {
                // Copy the literal verbatim; an unterminated one ends at the newline
                out.push(c);
                i += 1;
                while i < chars.len() && chars[i] != '\n' {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == '\\' {
                        if let Some(&next) = chars.get(i) {
                            if next != '\n' {
                                out.push(next);
                                i += 1;
                            }
                        }
                    } else if ch == c {
                        break;
                    }
                }
            }
            '\n' => {
                out.push('\n');
                line += 1;
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Tokenize one logical line.
pub(crate) fn lex(text: &str, line: usize) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            space = true;
            i += 1;
            continue;
        }

        let start = i;
        let kind = if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            TokenKind::Ident
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            i = scan_number(&chars, i);
            TokenKind::Number
        } else if c == '"' || c == '\'' {
            i = scan_quoted(&chars, i);
            if c == '"' {
                TokenKind::Str
            } else {
                TokenKind::Char
            }
        } else if c.is_ascii_punctuation() {
            i += punct_len(&chars[i..]);
            TokenKind::Punct
        } else {
            i += 1;
            TokenKind::Other
        };

        let text: String = chars[start..i].iter().collect();
        tokens.push(Token::new(kind, text, space, line));
        space = false;
    }

    tokens
}

// pp-number: digits, letters, '_', '.', and exponent signs (1e+5, 0x1p-3)
fn scan_number(chars: &[char], mut i: usize) -> usize {
    i += 1;
    while i < chars.len() {
        let c = chars[i];
        if matches!(c, 'e' | 'E' | 'p' | 'P') && matches!(chars.get(i + 1), Some('+' | '-')) {
            i += 2;
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            i += 1;
        } else {
            break;
        }
    }
    i
}

fn scan_quoted(chars: &[char], mut i: usize) -> usize {
    let quote = chars[i];
    i += 1;
    while i < chars.len() {
        if chars[i] == '\\' {
            i = (i + 2).min(chars.len());
            continue;
        }
        if chars[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    // Unterminated: the rest of the line is one literal
    chars.len()
}

fn punct_len(rest: &[char]) -> usize {
    MULTI_PUNCT
        .iter()
        .find(|p| {
            let n = p.chars().count();
            rest.len() >= n && p.chars().zip(rest.iter()).all(|(a, &b)| a == b)
        })
        .map(|p| p.chars().count())
        .unwrap_or(1)
}
