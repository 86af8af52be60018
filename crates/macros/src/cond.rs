// #if / #elif expression evaluator
// Input tokens have already had `defined` resolved and macros expanded.
// Grammar (lowest to highest): ?: || && | ^ & (== !=) (< <= > >=) (<< >>) (+ -) (* / %) unary

use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone)]
enum Expr {
    Num(i64),
    Unary(UnOp, Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnOp {
    Plus,
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Deepest parser recursion (parentheses, unary operators, nested `?:`) an
/// `#if` expression may need.
pub(crate) const MAX_EXPR_DEPTH: usize = 128;

/// Tallest expression tree the evaluator accepts. Long operator chains such
/// as `A || B || ...` count one level per operator.
pub(crate) const MAX_EXPR_HEIGHT: usize = 1024;

/// Evaluate a controlling expression to its integer value.
pub(crate) fn evaluate(tokens: &[Token]) -> Result<i64, String> {
    if tokens.is_empty() {
        return Err("#if with no expression".to_string());
    }
    let parsed = parse_ternary(tokens, 0, 0)?;
    if let Some(extra) = tokens.get(parsed.pos) {
        return Err(format!("unexpected \"{}\" in #if expression", extra.text));
    }
    eval(&parsed.expr)
}

/// A parsed subexpression, its tree height and the position after it.
struct Parsed {
    expr: Expr,
    height: usize,
    pos: usize,
}

fn too_deep() -> String {
    "#if expression nested too deeply".to_string()
}

fn node(expr: Expr, children: &[usize], pos: usize) -> Result<Parsed, String> {
    let height = children.iter().copied().max().unwrap_or(0) + 1;
    if height > MAX_EXPR_HEIGHT {
        return Err(too_deep());
    }
    Ok(Parsed { expr, height, pos })
}

fn binary_op(tok: &Token) -> Option<(BinOp, u8)> {
    if tok.kind != TokenKind::Punct {
        return None;
    }
    let op = match tok.text.as_str() {
        "||" => (BinOp::Or, 1),
        "&&" => (BinOp::And, 2),
        "|" => (BinOp::BitOr, 3),
        "^" => (BinOp::BitXor, 4),
        "&" => (BinOp::BitAnd, 5),
        "==" => (BinOp::Eq, 6),
        "!=" => (BinOp::NotEq, 6),
        "<" => (BinOp::Lt, 7),
        "<=" => (BinOp::LtEq, 7),
        ">" => (BinOp::Gt, 7),
        ">=" => (BinOp::GtEq, 7),
        "<<" => (BinOp::Shl, 8),
        ">>" => (BinOp::Shr, 8),
        "+" => (BinOp::Add, 9),
        "-" => (BinOp::Sub, 9),
        "*" => (BinOp::Mul, 10),
        "/" => (BinOp::Div, 10),
        "%" => (BinOp::Rem, 10),
        _ => return None,
    };
    Some(op)
}

fn parse_ternary(tokens: &[Token], pos: usize, depth: usize) -> Result<Parsed, String> {
    if depth > MAX_EXPR_DEPTH {
        return Err(too_deep());
    }
    let cond = parse_binary(tokens, pos, 1, depth)?;
    match tokens.get(cond.pos) {
        Some(t) if t.is_punct("?") => {
            let then = parse_ternary(tokens, cond.pos + 1, depth + 1)?;
            match tokens.get(then.pos) {
                Some(t) if t.is_punct(":") => {}
                _ => return Err("expected ':' in #if expression".to_string()),
            }
            let otherwise = parse_ternary(tokens, then.pos + 1, depth + 1)?;
            let heights = [cond.height, then.height, otherwise.height];
            let pos = otherwise.pos;
            node(
                Expr::Ternary(Box::new(cond.expr), Box::new(then.expr), Box::new(otherwise.expr)),
                &heights,
                pos,
            )
        }
        _ => Ok(cond),
    }
}

// Precedence climbing; all binary operators are left-associative
fn parse_binary(tokens: &[Token], pos: usize, min_prec: u8, depth: usize) -> Result<Parsed, String> {
    let mut left = parse_unary(tokens, pos, depth)?;

    while let Some((op, prec)) = tokens.get(left.pos).and_then(binary_op) {
        if prec < min_prec {
            break;
        }
        let right = parse_binary(tokens, left.pos + 1, prec + 1, depth)?;
        let heights = [left.height, right.height];
        left = node(
            Expr::Binary {
                op,
                left: Box::new(left.expr),
                right: Box::new(right.expr),
            },
            &heights,
            right.pos,
        )?;
    }

    Ok(left)
}

fn parse_unary(tokens: &[Token], pos: usize, depth: usize) -> Result<Parsed, String> {
    if depth > MAX_EXPR_DEPTH {
        return Err(too_deep());
    }
    let op = match tokens.get(pos) {
        Some(t) if t.is_punct("+") => UnOp::Plus,
        Some(t) if t.is_punct("-") => UnOp::Neg,
        Some(t) if t.is_punct("~") => UnOp::BitNot,
        Some(t) if t.is_punct("!") => UnOp::Not,
        _ => return parse_primary(tokens, pos, depth),
    };
    let operand = parse_unary(tokens, pos + 1, depth + 1)?;
    let height = operand.height;
    node(Expr::Unary(op, Box::new(operand.expr)), &[height], operand.pos)
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Result<Parsed, String> {
    let Some(tok) = tokens.get(pos) else {
        return Err("unexpected end of #if expression".to_string());
    };

    let leaf = |value: i64| node(Expr::Num(value), &[], pos + 1);
    match tok.kind {
        TokenKind::Number => leaf(parse_int(&tok.text)?),
        TokenKind::Char => leaf(parse_char(&tok.text)?),
        // Identifiers left after expansion are 0
        TokenKind::Ident => leaf(0),
        TokenKind::Punct if tok.text == "(" => {
            let inner = parse_ternary(tokens, pos + 1, depth + 1)?;
            match tokens.get(inner.pos) {
                Some(t) if t.is_punct(")") => Ok(Parsed { pos: inner.pos + 1, ..inner }),
                _ => Err("missing ')' in #if expression".to_string()),
            }
        }
        _ => Err(format!("unexpected \"{}\" in #if expression", tok.text)),
    }
}

fn parse_int(text: &str) -> Result<i64, String> {
    let lower = text.to_ascii_lowercase();
    let digits = lower.trim_end_matches(['u', 'l']);

    let parsed = if let Some(hex) = digits.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<u64>()
    };

    match parsed {
        Ok(n) => Ok(n as i64),
        Err(_) if digits.contains(['.', 'e', 'p']) && !digits.starts_with("0x") => {
            Err(format!("floating constant \"{}\" in #if expression", text))
        }
        Err(_) => Err(format!("invalid integer constant \"{}\" in #if expression", text)),
    }
}

fn parse_char(text: &str) -> Result<i64, String> {
    let inner = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("invalid character constant {}", text))?;

    let mut chars = inner.chars();
    let value = match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => '\n' as i64,
            Some('t') => '\t' as i64,
            Some('r') => '\r' as i64,
            Some('0') => 0,
            Some('\\') => '\\' as i64,
            Some('\'') => '\'' as i64,
            Some('"') => '"' as i64,
            Some(c) => c as i64,
            None => return Err(format!("invalid character constant {}", text)),
        },
        Some(c) => c as i64,
        None => return Err(format!("invalid character constant {}", text)),
    };
    Ok(value)
}

fn eval(expr: &Expr) -> Result<i64, String> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Unary(op, inner) => {
            let v = eval(inner)?;
            Ok(match op {
                UnOp::Plus => v,
                UnOp::Neg => v.wrapping_neg(),
                UnOp::BitNot => !v,
                UnOp::Not => (v == 0) as i64,
            })
        }
        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond)? != 0 {
                eval(then)
            } else {
                eval(otherwise)
            }
        }
        Expr::Binary { op: BinOp::And, left, right } => {
            Ok((eval(left)? != 0 && eval(right)? != 0) as i64)
        }
        Expr::Binary { op: BinOp::Or, left, right } => {
            Ok((eval(left)? != 0 || eval(right)? != 0) as i64)
        }
        Expr::Binary { op, left, right } => {
            let l = eval(left)?;
            let r = eval(right)?;
            let v = match op {
                BinOp::BitOr => l | r,
                BinOp::BitXor => l ^ r,
                BinOp::BitAnd => l & r,
                BinOp::Eq => (l == r) as i64,
                BinOp::NotEq => (l != r) as i64,
                BinOp::Lt => (l < r) as i64,
                BinOp::LtEq => (l <= r) as i64,
                BinOp::Gt => (l > r) as i64,
                BinOp::GtEq => (l >= r) as i64,
                BinOp::Shl => l.wrapping_shl(r as u32),
                BinOp::Shr => l.wrapping_shr(r as u32),
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div | BinOp::Rem if r == 0 => {
                    return Err("division by zero in #if expression".to_string())
                }
                BinOp::Div => l.wrapping_div(r),
                BinOp::Rem => l.wrapping_rem(r),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            };
            Ok(v)
        }
    }
}
