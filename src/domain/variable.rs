//! Textual variable references embedded in string values, e.g. `${host}`.

use std::ops::Range;

use regex::{NoExpand, Regex};

use crate::domain::error::{DomainError, DomainResult};

pub const DEFAULT_VARIABLE_PREFIX: &str = "${";
pub const DEFAULT_VARIABLE_SUFFIX: &str = "}";

/// Escape all regex metacharacters in `pattern`.
pub fn escape_regexp(pattern: &str) -> String {
    regex::escape(pattern)
}

/// One reference found in a text: byte ranges of the whole marker and of
/// the name inside it.
struct Reference {
    whole: Range<usize>,
    name: Range<usize>,
}

/// Surface syntax of a variable reference: `<prefix>name<suffix>`.
///
/// A name is the shortest non-empty run of characters, within one line,
/// that is followed by the suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSyntax {
    prefix: String,
    suffix: String,
}

impl Default for VariableSyntax {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_VARIABLE_PREFIX.to_string(),
            suffix: DEFAULT_VARIABLE_SUFFIX.to_string(),
        }
    }
}

impl VariableSyntax {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> DomainResult<Self> {
        let prefix = prefix.into();
        let suffix = suffix.into();
        if prefix.is_empty() || suffix.is_empty() {
            return Err(DomainError::InvalidVariableSyntax(format!(
                "prefix and suffix must not be empty (got {:?} / {:?})",
                prefix, suffix
            )));
        }
        Ok(Self { prefix, suffix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Build the reference marker for `name`.
    pub fn construct_variable(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, name, self.suffix)
    }

    fn scan(&self, text: &str) -> Vec<Reference> {
        let mut found = Vec::new();
        let mut pos = 0;
        while let Some(offset) = text[pos..].find(&self.prefix) {
            let start = pos + offset;
            let name_start = start + self.prefix.len();
            let first = text[name_start..].chars().next();
            let name_end = match first {
                Some(c) if c != '\n' => {
                    let from = name_start + c.len_utf8();
                    text[from..]
                        .find(&self.suffix)
                        .map(|i| from + i)
                        .filter(|&end| !text[name_start..end].contains('\n'))
                }
                _ => None,
            };
            match name_end {
                Some(end) => {
                    let whole_end = end + self.suffix.len();
                    found.push(Reference {
                        whole: start..whole_end,
                        name: name_start..end,
                    });
                    pos = whole_end;
                }
                None => {
                    // retry from the next character
                    let step = text[start..].chars().next().map_or(1, char::len_utf8);
                    pos = start + step;
                }
            }
        }
        found
    }

    /// Names referenced in `text`, in order of appearance (repeats included).
    pub fn references(&self, text: &str) -> Vec<String> {
        self.scan(text)
            .into_iter()
            .map(|r| text[r.name].to_string())
            .collect()
    }

    /// Whether `text` contains at least one reference.
    pub fn has_references(&self, text: &str) -> bool {
        !self.scan(text).is_empty()
    }

    /// Replace every reference in `text` with the result of `resolve(name)`.
    pub fn substitute<E>(
        &self,
        text: &str,
        mut resolve: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<String, E> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for reference in self.scan(text) {
            out.push_str(&text[last..reference.whole.start]);
            out.push_str(&resolve(&text[reference.name])?);
            last = reference.whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Rewrite every reference to `old` into a reference to `new`.
    ///
    /// Returns None when `text` does not reference `old`; other characters
    /// are preserved.
    pub fn rename_reference(&self, text: &str, old: &str, new: &str) -> Option<String> {
        let marker = Regex::new(&escape_regexp(&self.construct_variable(old))).ok()?;
        if !marker.is_match(text) {
            return None;
        }
        let replacement = self.construct_variable(new);
        Some(
            marker
                .replace_all(text, NoExpand(replacement.as_str()))
                .into_owned(),
        )
    }
}
