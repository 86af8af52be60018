//! Directive processing and macro expansion.
//!
//! Expansion follows the usual hide-set algorithm: every token remembers the
//! macros it was produced by, and a macro name is never re-expanded from a
//! token whose hide set already contains it. That keeps self-referential
//! definitions (`#define x x + 1`) finite.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::cond;
use crate::error::MacroError;
use crate::lexer::{lex, splice_lines, strip_comments, Token, TokenKind};
use crate::{DIRECTIVE_WHITELIST, HAS_INCLUDE_OPERATORS, INCLUSION_DIRECTIVES};

/// Upper bound on tokens produced by macro replacement in one run, argument
/// copies included.
pub const MAX_REPLACEMENT_TOKENS: usize = 1_000_000;

/// Deepest chain of macro invocations nested inside arguments, as in
/// `F(F(F(x)))`.
pub const MAX_ARGUMENT_DEPTH: usize = 128;

#[derive(Debug, Clone)]
enum Macro {
    Object(Vec<Token>),
    Function {
        params: Vec<String>,
        variadic: bool,
        body: Vec<Token>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Cond {
    /// Enclosing region is being emitted
    parent_active: bool,
    /// Some branch of this group was already taken
    taken: bool,
    /// Current branch is being emitted
    active: bool,
    seen_else: bool,
    line: usize,
}

/// A macro table plus the driver that runs text through it.
///
/// Definitions persist across [`Preprocessor::run`] calls on the same value.
#[derive(Debug, Default)]
pub struct Preprocessor {
    macros: HashMap<String, Macro>,
    produced: Cell<usize>,
    arg_depth: Cell<usize>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Expand `text`. Every directive is checked against the whitelist before
    /// anything is expanded.
    pub fn run(&mut self, text: &str) -> Result<String, MacroError> {
        let spliced = splice_lines(text);
        let cleaned = strip_comments(&spliced)?;
        let lines: Vec<&str> = cleaned.lines().collect();

        gate_directives(&lines)?;
        self.produced.set(0);
        self.arg_depth.set(0);

        let mut out_lines: Vec<String> = Vec::new();
        let mut pending: Vec<Token> = Vec::new();
        let mut conds: Vec<Cond> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let lineno = idx + 1;
            match directive_body(line) {
                Some(body) => {
                    self.flush(&mut pending, &mut out_lines)?;
                    self.directive(body, lineno, &mut conds)?;
                }
                None => {
                    if is_active(&conds) {
                        pending.extend(lex(line, lineno));
                        pending.push(Token::newline(lineno));
                    }
                }
            }
        }

        if let Some(open) = conds.last() {
            return Err(MacroError::Syntax {
                line: open.line,
                message: "unterminated conditional directive".to_string(),
            });
        }
        self.flush(&mut pending, &mut out_lines)?;

        let mut out = out_lines.join("\n");
        if cleaned.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }

    fn flush(&self, pending: &mut Vec<Token>, out_lines: &mut Vec<String>) -> Result<(), MacroError> {
        if pending.is_empty() {
            return Ok(());
        }
        let expanded = self.expand_tokens(std::mem::take(pending))?;
        let mut current = String::new();
        for tok in expanded {
            if tok.kind == TokenKind::Newline {
                out_lines.push(std::mem::take(&mut current));
                continue;
            }
            if tok.space && !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&tok.text);
        }
        if !current.is_empty() {
            out_lines.push(current);
        }
        Ok(())
    }

    fn directive(&mut self, body: &str, line: usize, conds: &mut Vec<Cond>) -> Result<(), MacroError> {
        let toks = lex(body, line);
        let Some((head, args)) = toks.split_first() else {
            // Null directive
            return Ok(());
        };

        match head.text.as_str() {
            "ifdef" | "ifndef" => {
                let parent_active = is_active(conds);
                let value = if parent_active {
                    let name = leading_ident(args, line, &head.text)?;
                    self.is_defined(name) == (head.text == "ifdef")
                } else {
                    false
                };
                conds.push(Cond::open(parent_active, value, line));
            }
            "if" => {
                let parent_active = is_active(conds);
                let value = parent_active && self.eval_condition(args, line)?;
                conds.push(Cond::open(parent_active, value, line));
            }
            "elif" => {
                let frame = conds.last_mut().ok_or_else(|| syntax(line, "#elif without #if"))?;
                if frame.seen_else {
                    return Err(syntax(line, "#elif after #else"));
                }
                if frame.parent_active && !frame.taken {
                    let value = self.eval_condition(args, line)?;
                    frame.active = value;
                    frame.taken = value;
                } else {
                    frame.active = false;
                }
            }
            "else" => {
                let frame = conds.last_mut().ok_or_else(|| syntax(line, "#else without #if"))?;
                if frame.seen_else {
                    return Err(syntax(line, "#else after #else"));
                }
                frame.active = frame.parent_active && !frame.taken;
                frame.taken = true;
                frame.seen_else = true;
            }
            "endif" => {
                conds.pop().ok_or_else(|| syntax(line, "#endif without #if"))?;
            }
            "define" => {
                if is_active(conds) {
                    self.define(args, line)?;
                }
            }
            "undef" => {
                if is_active(conds) {
                    let name = leading_ident(args, line, "undef")?.to_string();
                    self.macros.remove(&name);
                }
            }
            other => {
                // gate_directives already rejected these
                return Err(MacroError::ForbiddenDirective {
                    name: other.to_string(),
                    line,
                });
            }
        }
        Ok(())
    }

    fn define(&mut self, args: &[Token], line: usize) -> Result<(), MacroError> {
        let (name_tok, rest) = args
            .split_first()
            .ok_or_else(|| syntax(line, "macro name missing"))?;
        if !name_tok.is_ident() {
            return Err(syntax(line, "macro names must be identifiers"));
        }
        if name_tok.text == "defined" {
            return Err(syntax(line, "\"defined\" cannot be used as a macro name"));
        }
        let name = name_tok.text.clone();

        let function_like = rest.first().is_some_and(|t| t.is_punct("(") && !t.space);
        let mac = if function_like {
            let (params, variadic, body_start) = parse_params(rest, line)?;
            let body = normalize_body(&rest[body_start..]);
            validate_body(&body, Some(&params), line)?;
            Macro::Function { params, variadic, body }
        } else {
            let body = normalize_body(rest);
            validate_body(&body, None, line)?;
            Macro::Object(body)
        };

        if self.macros.insert(name.clone(), mac).is_some() {
            log::debug!("macro \"{}\" redefined on line {}", name, line);
        }
        Ok(())
    }

    fn eval_condition(&self, args: &[Token], line: usize) -> Result<bool, MacroError> {
        // Resolve `defined X` / `defined(X)` before expansion
        let mut toks = Vec::with_capacity(args.len());
        let mut i = 0;
        while i < args.len() {
            let t = &args[i];
            if t.is_ident() && t.text == "defined" {
                let (name, next) = match (args.get(i + 1), args.get(i + 2), args.get(i + 3)) {
                    (Some(n), _, _) if n.is_ident() => (n.text.as_str(), i + 2),
                    (Some(open), Some(n), Some(close))
                        if open.is_punct("(") && n.is_ident() && close.is_punct(")") =>
                    {
                        (n.text.as_str(), i + 4)
                    }
                    _ => return Err(syntax(line, "operator \"defined\" requires an identifier")),
                };
                let value = if self.is_defined(name) { "1" } else { "0" };
                toks.push(Token::new(TokenKind::Number, value, t.space, line));
                i = next;
                continue;
            }
            toks.push(t.clone());
            i += 1;
        }

        let expanded = self.expand_tokens(toks)?;
        if let Some(t) = expanded
            .iter()
            .find(|t| t.is_ident() && HAS_INCLUDE_OPERATORS.contains(&t.text.as_str()))
        {
            return Err(MacroError::ForbiddenInclusion {
                directive: t.text.clone(),
                line,
            });
        }

        cond::evaluate(&expanded)
            .map(|v| v != 0)
            .map_err(|message| MacroError::Syntax { line, message })
    }

    fn expand_tokens(&self, tokens: Vec<Token>) -> Result<Vec<Token>, MacroError> {
        let mut input: VecDeque<Token> = tokens.into();
        let mut out = Vec::new();

        while let Some(tok) = input.pop_front() {
            if !tok.is_ident() || tok.hide.contains(&tok.text) {
                out.push(tok);
                continue;
            }
            let Some(mac) = self.macros.get(&tok.text) else {
                out.push(tok);
                continue;
            };

            let replacement = match mac {
                Macro::Object(body) => {
                    let mut hide = tok.hide.clone();
                    hide.insert(tok.text.clone());
                    self.substitute(body, &[], &[], &hide, false)?
                }
                Macro::Function { params, variadic, body } => {
                    if !invocation_follows(&input) {
                        out.push(tok);
                        continue;
                    }
                    let (args, rparen) = collect_args(&mut input, &tok)?;
                    let args = match_args(args, params, *variadic, &tok)?;
                    let mut hide: BTreeSet<String> =
                        tok.hide.intersection(&rparen.hide).cloned().collect();
                    hide.insert(tok.text.clone());
                    self.substitute(body, params, &args, &hide, true)?
                }
            };

            self.charge(replacement.len(), tok.line)?;

            let mut replacement = replacement;
            if let Some(first) = replacement.first_mut() {
                first.space = tok.space;
            }
            for t in replacement.into_iter().rev() {
                input.push_front(t);
            }
        }

        Ok(out)
    }

    fn substitute(
        &self,
        body: &[Token],
        params: &[String],
        args: &[Vec<Token>],
        hide: &BTreeSet<String>,
        function_like: bool,
    ) -> Result<Vec<Token>, MacroError> {
        let mut out = Vec::with_capacity(body.len());
        let mut i = 0;

        while i < body.len() {
            let (mut piece, mut next) = self.operand(body, i, params, args, function_like)?;
            while next + 1 < body.len() && body[next].is_punct("##") {
                let (rhs, after) = self.operand(body, next + 1, params, args, function_like)?;
                piece = paste(piece, rhs);
                next = after;
            }
            out.extend(piece);
            i = next;
        }

        for t in &mut out {
            t.hide.extend(hide.iter().cloned());
        }
        Ok(out)
    }

    /// One replacement-list operand starting at `i`: a stringified parameter,
    /// a parameter (raw next to `##`, fully expanded otherwise), or a plain token.
    fn operand(
        &self,
        body: &[Token],
        i: usize,
        params: &[String],
        args: &[Vec<Token>],
        function_like: bool,
    ) -> Result<(Vec<Token>, usize), MacroError> {
        let tok = &body[i];

        if function_like && tok.is_punct("#") {
            if let Some(p) = body.get(i + 1).and_then(|t| param_index(params, t)) {
                return Ok((vec![stringify(&args[p], tok.space, tok.line)], i + 2));
            }
        }

        if let Some(p) = param_index(params, tok) {
            let raw = body.get(i + 1).is_some_and(|t| t.is_punct("##"))
                || (i > 0 && body[i - 1].is_punct("##"));
            self.charge(args[p].len(), tok.line)?;
            let mut toks = if raw {
                args[p].clone()
            } else {
                self.expand_argument(&args[p], tok.line)?
            };
            if let Some(first) = toks.first_mut() {
                first.space = tok.space;
            }
            return Ok((toks, i + 1));
        }

        Ok((vec![tok.clone()], i + 1))
    }

    /// Fully expand one argument before it is substituted.
    fn expand_argument(&self, arg: &[Token], line: usize) -> Result<Vec<Token>, MacroError> {
        let depth = self.arg_depth.get() + 1;
        if depth > MAX_ARGUMENT_DEPTH {
            return Err(syntax(line, "macro arguments nested too deeply"));
        }
        self.arg_depth.set(depth);
        let expanded = self.expand_tokens(arg.to_vec());
        self.arg_depth.set(depth - 1);
        expanded
    }

    /// Count `n` more tokens against the per-run replacement budget.
    fn charge(&self, n: usize, line: usize) -> Result<(), MacroError> {
        let produced = self.produced.get() + n;
        if produced > MAX_REPLACEMENT_TOKENS {
            return Err(syntax(line, "macro expansion too large"));
        }
        self.produced.set(produced);
        Ok(())
    }
}

impl Cond {
    fn open(parent_active: bool, value: bool, line: usize) -> Self {
        Self {
            parent_active,
            taken: value,
            active: parent_active && value,
            seen_else: false,
            line,
        }
    }
}

/// Reject inclusion attempts and non-whitelisted directives anywhere in the
/// input, skipped conditional blocks included.
fn gate_directives(lines: &[&str]) -> Result<(), MacroError> {
    for (idx, line) in lines.iter().enumerate() {
        let lineno = idx + 1;
        let Some(body) = directive_body(line) else {
            continue;
        };
        let toks = lex(body, lineno);
        let Some(head) = toks.first() else {
            continue;
        };
        let name = head.text.as_str();

        if INCLUSION_DIRECTIVES.contains(&name) {
            return Err(MacroError::ForbiddenInclusion {
                directive: name.to_string(),
                line: lineno,
            });
        }
        if !DIRECTIVE_WHITELIST.contains(&name) {
            return Err(MacroError::ForbiddenDirective {
                name: name.to_string(),
                line: lineno,
            });
        }
        if !matches!(name, "if" | "elif") {
            continue;
        }
        if let Some(op) = toks
            .iter()
            .find(|t| t.is_ident() && HAS_INCLUDE_OPERATORS.contains(&t.text.as_str()))
        {
            return Err(MacroError::ForbiddenInclusion {
                directive: op.text.clone(),
                line: lineno,
            });
        }
    }
    Ok(())
}

fn directive_body(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix('#')
}

fn is_active(conds: &[Cond]) -> bool {
    conds.last().map_or(true, |c| c.active)
}

fn syntax(line: usize, message: impl Into<String>) -> MacroError {
    MacroError::Syntax {
        line,
        message: message.into(),
    }
}

fn leading_ident<'a>(args: &'a [Token], line: usize, directive: &str) -> Result<&'a str, MacroError> {
    match args.first() {
        Some(t) if t.is_ident() => Ok(&t.text),
        _ => Err(syntax(line, format!("#{} requires a macro name", directive))),
    }
}

/// Parse `(a, b, ...)` right after the macro name. Returns the parameter
/// names (with `__VA_ARGS__` last for variadics) and the body start index.
fn parse_params(rest: &[Token], line: usize) -> Result<(Vec<String>, bool, usize), MacroError> {
    let mut params: Vec<String> = Vec::new();
    let mut variadic = false;
    let mut i = 1;

    if rest.get(i).is_some_and(|t| t.is_punct(")")) {
        return Ok((params, variadic, i + 1));
    }

    loop {
        let tok = rest
            .get(i)
            .ok_or_else(|| syntax(line, "missing ')' in macro parameter list"))?;
        if tok.is_punct("...") {
            variadic = true;
            params.push("__VA_ARGS__".to_string());
            i += 1;
            return match rest.get(i) {
                Some(t) if t.is_punct(")") => Ok((params, variadic, i + 1)),
                _ => Err(syntax(line, "missing ')' after \"...\"")),
            };
        }
        if !tok.is_ident() {
            return Err(syntax(line, format!("expected parameter name, found \"{}\"", tok.text)));
        }
        if params.contains(&tok.text) {
            return Err(syntax(line, format!("duplicate macro parameter \"{}\"", tok.text)));
        }
        params.push(tok.text.clone());
        i += 1;

        match rest.get(i) {
            Some(t) if t.is_punct(",") => i += 1,
            Some(t) if t.is_punct(")") => return Ok((params, variadic, i + 1)),
            _ => return Err(syntax(line, "expected ',' or ')' in macro parameter list")),
        }
    }
}

fn normalize_body(body: &[Token]) -> Vec<Token> {
    let mut body = body.to_vec();
    if let Some(first) = body.first_mut() {
        first.space = false;
    }
    body
}

fn validate_body(body: &[Token], params: Option<&[String]>, line: usize) -> Result<(), MacroError> {
    if body.first().is_some_and(|t| t.is_punct("##")) || body.last().is_some_and(|t| t.is_punct("##")) {
        return Err(syntax(line, "'##' cannot appear at either end of a macro expansion"));
    }
    if let Some(params) = params {
        for (i, t) in body.iter().enumerate() {
            if t.is_punct("#") && !body.get(i + 1).is_some_and(|n| param_index(params, n).is_some()) {
                return Err(syntax(line, "'#' is not followed by a macro parameter"));
            }
        }
    }
    Ok(())
}

fn param_index(params: &[String], tok: &Token) -> Option<usize> {
    if tok.is_ident() {
        params.iter().position(|p| *p == tok.text)
    } else {
        None
    }
}

/// Whether the next non-newline token is `(`.
fn invocation_follows(input: &VecDeque<Token>) -> bool {
    input
        .iter()
        .find(|t| t.kind != TokenKind::Newline)
        .is_some_and(|t| t.is_punct("("))
}

/// Consume `( ... )` and split it on top-level commas. Returns the raw
/// arguments and the closing parenthesis token.
fn collect_args(input: &mut VecDeque<Token>, name: &Token) -> Result<(Vec<Vec<Token>>, Token), MacroError> {
    while input.front().is_some_and(|t| t.kind == TokenKind::Newline) {
        input.pop_front();
    }
    input.pop_front(); // '('

    let mut args: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0usize;
    let mut newline_seen = false;

    loop {
        let Some(mut tok) = input.pop_front() else {
            return Err(syntax(
                name.line,
                format!("unterminated argument list invoking macro \"{}\"", name.text),
            ));
        };
        if tok.kind == TokenKind::Newline {
            newline_seen = true;
            continue;
        }
        if newline_seen {
            tok.space = true;
            newline_seen = false;
        }

        if tok.is_punct("(") {
            depth += 1;
        } else if tok.is_punct(")") {
            if depth == 0 {
                return Ok((args, tok));
            }
            depth -= 1;
        } else if tok.is_punct(",") && depth == 0 {
            args.push(Vec::new());
            continue;
        }

        if let Some(current) = args.last_mut() {
            current.push(tok);
        }
    }
}

fn match_args(
    mut args: Vec<Vec<Token>>,
    params: &[String],
    variadic: bool,
    name: &Token,
) -> Result<Vec<Vec<Token>>, MacroError> {
    if params.is_empty() && args.len() == 1 && args[0].is_empty() {
        args.clear();
    }

    if variadic {
        let named = params.len() - 1;
        if args.len() > named {
            // Everything past the named parameters is __VA_ARGS__, commas included
            let extra = args.split_off(named);
            let mut va = Vec::new();
            for (k, arg) in extra.into_iter().enumerate() {
                if k > 0 {
                    va.push(Token::new(TokenKind::Punct, ",", false, name.line));
                }
                va.extend(arg);
            }
            args.push(va);
        } else if args.len() == named {
            args.push(Vec::new());
        }
    }

    if args.len() != params.len() {
        return Err(syntax(
            name.line,
            format!(
                "macro \"{}\" requires {} argument(s), but {} given",
                name.text,
                params.len(),
                args.len()
            ),
        ));
    }
    Ok(args)
}

fn stringify(arg: &[Token], space: bool, line: usize) -> Token {
    let mut s = String::from("\"");
    for (k, t) in arg.iter().enumerate() {
        if k > 0 && t.space {
            s.push(' ');
        }
        if matches!(t.kind, TokenKind::Str | TokenKind::Char) {
            for ch in t.text.chars() {
                if ch == '"' || ch == '\\' {
                    s.push('\\');
                }
                s.push(ch);
            }
        } else {
            s.push_str(&t.text);
        }
    }
    s.push('"');
    Token::new(TokenKind::Str, s, space, line)
}

/// Glue the last token of `lhs` to the first of `rhs`. An empty side acts as
/// a placemarker.
fn paste(mut lhs: Vec<Token>, mut rhs: Vec<Token>) -> Vec<Token> {
    let Some(left) = lhs.pop() else {
        return rhs;
    };
    if rhs.is_empty() {
        lhs.push(left);
        return lhs;
    }
    let right = rhs.remove(0);
    let mut glued = lex(&format!("{}{}", left.text, right.text), left.line);
    if let Some(first) = glued.first_mut() {
        first.space = left.space;
    }
    lhs.extend(glued);
    lhs.extend(rhs);
    lhs
}
