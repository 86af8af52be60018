//! Per-caller macro context prepended to every query before expansion.

use std::path::Path;

use crate::error::MacroError;

/// Placeholder replaced by the caller's name.
pub const USER_PLACEHOLDER: &str = "{user_name}";

/// Built-in context: shorthands for the zoo snapshot schema.
pub const DEFAULT_CONTEXT: &str = r#"#define ME '{user_name}'
#define MY_USER (SELECT user_id FROM users WHERE user_name = ME)
#define MY_PROFILES (SELECT profile_id FROM profiles WHERE user_id = MY_USER)
#define ZOO zoos JOIN animals USING(animal_id) JOIN profiles USING(profile_id)
#define SCORE (CASE is_rare WHEN TRUE THEN 5 * amount ELSE amount END)"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroContext {
    template: String,
}

impl MacroContext {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(DEFAULT_CONTEXT)
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        std::fs::read_to_string(path)
            .map(Self::new)
            .map_err(|e| format!("Failed to read macro context {}: {}", path.display(), e))
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Context text for one caller. The name lands inside SQL string
    /// literals, so single quotes are doubled.
    pub fn for_user(&self, user_name: &str) -> String {
        self.template
            .replace(USER_PLACEHOLDER, &user_name.replace('\'', "''"))
    }

    /// Full preprocessor input: context, a newline, then the query.
    pub fn prepend(&self, user_name: &str, query: &str) -> String {
        let mut text = self.for_user(user_name);
        text.push('\n');
        text.push_str(query);
        text
    }

    /// Expand `query` under this context. Error lines count from the start
    /// of the query; errors inside the context come back as
    /// [`MacroError::InContext`].
    pub fn expand(&self, user_name: &str, query: &str) -> Result<String, MacroError> {
        let text = self.prepend(user_name, query);
        let offset = text.len() - query.len();
        let context_lines = text[..offset].matches('\n').count();
        crate::expand(&text).map_err(|e| e.relative_to(context_lines))
    }
}

impl Default for MacroContext {
    fn default() -> Self {
        Self::builtin()
    }
}
