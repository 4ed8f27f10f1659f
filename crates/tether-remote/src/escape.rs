//! Quoting of paths for device shell commands and transfer specifications
//!
//! Two disciplines exist because the text passes through different
//! parsers. A command-line word is read once by a POSIX shell, so it is
//! single-quoted. The path half of `user@host:path` is re-read by the
//! remote shell that `scp` starts, so it is backslash-escaped.
//!
//! Both functions return their input unchanged when it is already in the
//! form they would produce. A raw name that happens to look like an
//! escaped token (for example the literal text `'a'`) is therefore taken
//! as already escaped.

use std::fmt;

/// Characters that need no quoting in either discipline
fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '+' | ',' | ':' | '=' | '@' | '%' | '^' | '-')
}

fn is_safe(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_safe_char)
}

/// True when `token` parses as one word that `render` maps back to `token`
fn is_rendering_of(token: &str, render: fn(&str) -> String) -> bool {
    match shell_words::split(token) {
        Ok(words) if words.len() == 1 => render(&words[0]) == token,
        _ => false,
    }
}

fn single_quote(s: &str) -> String {
    if is_safe(s) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn backslash_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if is_safe_char(c) {
            out.push(c);
        } else if c == '\n' {
            // backslash-newline is a line continuation
            out.push_str("'\n'");
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Render `path` as a single shell word for a device command line
#[must_use]
pub fn escape(path: &str) -> String {
    if is_safe(path) || is_rendering_of(path, single_quote) {
        return path.to_string();
    }
    single_quote(path)
}

/// Render `path` as a command operand
///
/// A leading `-` gets a `./` prefix so the command does not read the path
/// as an option.
#[must_use]
pub fn escape_operand(path: &str) -> String {
    if path.starts_with('-') {
        escape(&format!("./{path}"))
    } else {
        escape(path)
    }
}

/// Render `path` for the path half of a `user@host:path` specification
#[must_use]
pub fn escape_for_transfer(path: &str) -> String {
    if is_safe(path) || is_rendering_of(path, backslash_escape) {
        return path.to_string();
    }
    backslash_escape(path)
}

/// Escape text for use between double quotes, as in `echo "<text>"`
#[must_use]
pub fn escape_double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Where an escaped path is going to be embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeContext {
    /// A word on a shell command line
    Shell,
    /// The path half of a transfer specification
    Transfer,
}

/// A raw path alongside its escaped rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathToken {
    raw: String,
    escaped: String,
    context: EscapeContext,
}

impl PathToken {
    /// Token for a shell command line
    pub fn shell(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let escaped = escape(&raw);
        Self {
            raw,
            escaped,
            context: EscapeContext::Shell,
        }
    }

    /// Token for a transfer specification
    pub fn transfer(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let escaped = escape_for_transfer(&raw);
        Self {
            raw,
            escaped,
            context: EscapeContext::Transfer,
        }
    }

    /// The path as given
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The escaped rendering
    #[must_use]
    pub fn escaped(&self) -> &str {
        &self.escaped
    }

    /// Context the rendering is meant for
    #[must_use]
    pub fn context(&self) -> EscapeContext {
        self.context
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.escaped)
    }
}
