use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroError {
    /// A directive outside the whitelist (e.g. `#pragma`).
    ForbiddenDirective { name: String, line: usize },
    /// An attempt to pull in external text (`#include`, `__has_include`, ...).
    ForbiddenInclusion { directive: String, line: usize },
    /// Malformed but permitted input: bad `#define`, unbalanced conditionals,
    /// wrong argument count, invalid `#if` expression.
    Syntax { line: usize, message: String },
    /// Any of the above raised by the caller's macro context rather than the
    /// query itself. Its line counts from the start of the context.
    InContext(Box<MacroError>),
}

impl MacroError {
    /// True for the two sandbox violations, false for plain syntax errors.
    pub fn is_forbidden(&self) -> bool {
        match self {
            Self::ForbiddenDirective { .. } | Self::ForbiddenInclusion { .. } => true,
            Self::Syntax { .. } => false,
            Self::InContext(inner) => inner.is_forbidden(),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::ForbiddenDirective { line, .. }
            | Self::ForbiddenInclusion { line, .. }
            | Self::Syntax { line, .. } => *line,
            Self::InContext(inner) => inner.line(),
        }
    }

    /// Renumber lines for text that had `offset` lines prepended.
    pub(crate) fn relative_to(self, offset: usize) -> Self {
        if self.line() <= offset {
            return Self::InContext(Box::new(self));
        }
        match self {
            Self::ForbiddenDirective { name, line } => Self::ForbiddenDirective {
                name,
                line: line - offset,
            },
            Self::ForbiddenInclusion { directive, line } => Self::ForbiddenInclusion {
                directive,
                line: line - offset,
            },
            Self::Syntax { line, message } => Self::Syntax {
                line: line - offset,
                message,
            },
            other @ Self::InContext(_) => other,
        }
    }
}

impl fmt::Display for MacroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForbiddenDirective { name, line } => {
                write!(f, "line {line}: unknown directive #{name}")
            }
            Self::ForbiddenInclusion { directive, line } if directive.starts_with("__") => {
                write!(f, "line {line}: {directive} is forbidden")
            }
            Self::ForbiddenInclusion { directive, line } => {
                write!(f, "line {line}: #{directive} is forbidden")
            }
            Self::Syntax { line, message } => write!(f, "line {line}: {message}"),
            Self::InContext(inner) => write!(f, "macro context {inner}"),
        }
    }
}

impl std::error::Error for MacroError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_directive() {
        let e = MacroError::ForbiddenDirective { name: "pragma".into(), line: 3 };
        assert_eq!(e.to_string(), "line 3: unknown directive #pragma");
        let e = MacroError::ForbiddenInclusion { directive: "include".into(), line: 1 };
        assert_eq!(e.to_string(), "line 1: #include is forbidden");
        let e = MacroError::ForbiddenInclusion { directive: "__has_include".into(), line: 2 };
        assert_eq!(e.to_string(), "line 2: __has_include is forbidden");
        assert!(e.is_forbidden());
        assert_eq!(e.line(), 2);
    }

    #[test]
    fn relative_lines() {
        let e = MacroError::Syntax { line: 7, message: "bad".into() };
        assert_eq!(e.relative_to(5), MacroError::Syntax { line: 2, message: "bad".into() });

        let e = MacroError::ForbiddenDirective { name: "line".into(), line: 3 }.relative_to(5);
        assert!(matches!(e, MacroError::InContext(_)));
        assert!(e.is_forbidden());
        assert_eq!(e.line(), 3);
        assert_eq!(e.to_string(), "macro context line 3: unknown directive #line");
    }
}
