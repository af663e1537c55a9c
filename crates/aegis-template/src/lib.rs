//! Template resolution for agent instruction strings
//!
//! Expands `{name}` placeholders and `{name, select, case:text|case:text}`
//! conditional blocks from a caller-supplied context before the text reaches
//! the validation pipeline.
//!
//! Resolution is deliberately fail-open: unknown placeholders and malformed
//! brace syntax pass through verbatim so the pipeline re-scans them as
//! literal text. Expansion is bounded — resolved text may introduce new
//! placeholders, so passes repeat until a fixed point or the iteration
//! limit, whichever comes first. The limit is a security control against
//! adversarial self-expanding input, not just a performance guard.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default cap on resolution passes
pub const DEFAULT_MAX_PASSES: usize = 8;

/// A value bound to a placeholder name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TemplateValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl TemplateValue {
    /// String form used for substitution and select-case matching
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for TemplateValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Per-call mapping from placeholder name to value. Never persisted.
pub type TemplateContext = HashMap<String, TemplateValue>;

/// Resolve a template against a context using the default pass limit.
///
/// Pure function of its inputs. Idempotent once a fixed point is reached.
pub fn resolve(template: &str, context: &TemplateContext) -> String {
    resolve_bounded(template, context, DEFAULT_MAX_PASSES)
}

/// Resolve with an explicit pass limit.
///
/// Each pass performs one full left-to-right substitution sweep. Passes stop
/// early when a sweep changes nothing; when the limit trips, the partially
/// resolved string is returned as-is.
pub fn resolve_bounded(template: &str, context: &TemplateContext, max_passes: usize) -> String {
    let mut current = template.to_string();

    for pass in 0..max_passes.max(1) {
        let next = resolve_once(&current, context);
        if next == current {
            return next;
        }
        current = next;
        if pass + 1 == max_passes.max(1) {
            debug!(
                passes = max_passes,
                "template resolution hit pass limit before fixed point"
            );
        }
    }

    current
}

/// One substitution sweep over the input
fn resolve_once(input: &str, context: &TemplateContext) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            // Copy a literal run up to the next brace
            let start = i;
            while i < bytes.len() && bytes[i] != b'{' {
                i += 1;
            }
            out.push_str(&input[start..i]);
            continue;
        }

        match find_matching_brace(bytes, i) {
            Some(close) => {
                let inner = &input[i + 1..close];
                match resolve_block(inner, context) {
                    Some(replacement) => out.push_str(&replacement),
                    // Not placeholder syntax we recognize: keep verbatim,
                    // braces included, so the pipeline sees the raw text.
                    None => out.push_str(&input[i..=close]),
                }
                i = close + 1;
            }
            None => {
                // Unbalanced open brace: pass the rest through verbatim
                out.push_str(&input[i..]);
                break;
            }
        }
    }

    out
}

/// Find the index of the `}` matching the `{` at `open`, honoring nesting
fn find_matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Resolve the content of one `{...}` block.
///
/// Returns None when the content is not valid placeholder or select syntax,
/// in which case the caller emits the block verbatim.
fn resolve_block(inner: &str, context: &TemplateContext) -> Option<String> {
    // Plain placeholder: {identifier}
    if is_identifier(inner.trim()) {
        let name = inner.trim();
        return match context.get(name) {
            Some(value) => Some(value.render()),
            // Unknown identifier stays verbatim (fail-open); signalled by
            // None so the caller re-emits the braces.
            None => None,
        };
    }

    // Select block: {identifier, select, case1:text1|case2:text2}
    let mut parts = split_top_level(inner, ',');
    if parts.len() < 3 {
        return None;
    }

    let name = parts.remove(0);
    let name = name.trim();
    let keyword = parts.remove(0);
    if !is_identifier(name) || keyword.trim() != "select" {
        return None;
    }

    // Everything after the second comma is the case list; commas inside case
    // text are legal, so rejoin.
    let cases_raw = parts.join(",");
    let selector = context.get(name).map(|v| v.render());

    for case in split_top_level(&cases_raw, '|') {
        let Some((label, text)) = case.split_once(':') else {
            continue;
        };
        if let Some(ref sel) = selector {
            if label.trim() == sel {
                return Some(text.to_string());
            }
        }
    }

    // No case matched (or the identifier is absent): the block resolves to
    // nothing rather than leaking case syntax into the instruction.
    Some(String::new())
}

/// Split on `sep` at brace depth zero
fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in input.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
