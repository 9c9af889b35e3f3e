//! Placeholder grammar
//!
//! One regular grammar for template content, scanned left to right in a
//! single pass; placeholders do not nest:
//!
//! ```text
//! placeholder := "{{" ws? expr ws? "}}"
//! expr        := segment ("." segment)*
//! segment     := ident | integer        # integer indexes into a list
//! ident       := [A-Za-z_][A-Za-z0-9_-]*
//! ```
//!
//! The only two productions are a dotted path rooted at a parameter or
//! context variable, and a bare dependency-id reference. Single-brace
//! `{var}` spans are a legacy format from older template corpora: they are
//! detected for migration warnings, never resolved.

use std::sync::LazyLock;

use regex::Regex;

/// One step of a dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Mapping key or attribute name
    Key(String),
    /// Zero-based index into a list
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", key),
            Self::Index(idx) => write!(f, "{}", idx),
        }
    }
}

/// A parsed placeholder expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    /// The expression text as written, without braces or padding
    pub raw: String,

    /// First segment: parameter name, context variable, or dependency id
    pub root: String,

    /// Remaining segments of a dotted path; empty for flat references
    pub path: Vec<PathSegment>,
}

impl Expr {
    /// Check if this is a flat (undotted) reference
    pub fn is_flat(&self) -> bool {
        self.path.is_empty()
    }
}

/// A span of template content
#[derive(Debug, Clone, PartialEq)]
pub enum Span {
    /// Verbatim text
    Literal(String),
    /// A `{{expr}}` placeholder
    Placeholder(Expr),
}

/// Scan content into literal and placeholder spans
///
/// The scan is total: a `{{` that is not followed by a well-formed
/// expression and `}}` stays in the literal stream, where the validator
/// flags it as malformed rather than guessing at intent.
pub fn scan(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut literal = String::new();
    let mut rest = content;

    while let Some(open) = rest.find("{{") {
        let (before, after_open) = rest.split_at(open);
        literal.push_str(before);
        let body = &after_open[2..];

        match body.find("}}") {
            Some(close) => {
                let inner = &body[..close];
                match parse_expr(inner.trim()) {
                    Some(expr) => {
                        if !literal.is_empty() {
                            spans.push(Span::Literal(std::mem::take(&mut literal)));
                        }
                        spans.push(Span::Placeholder(expr));
                    }
                    None => {
                        // Malformed expression: keep the braces as literal text
                        literal.push_str("{{");
                        literal.push_str(inner);
                        literal.push_str("}}");
                    }
                }
                rest = &body[close + 2..];
            }
            None => {
                // Unclosed placeholder: everything remaining is literal
                literal.push_str(after_open);
                rest = "";
            }
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        spans.push(Span::Literal(literal));
    }
    spans
}

/// Extract every placeholder expression from content, in order
pub fn extract(content: &str) -> Vec<Expr> {
    scan(content)
        .into_iter()
        .filter_map(|span| match span {
            Span::Placeholder(expr) => Some(expr),
            Span::Literal(_) => None,
        })
        .collect()
}

/// Parse a trimmed expression body, or `None` if it is not in the grammar
fn parse_expr(inner: &str) -> Option<Expr> {
    if inner.is_empty() {
        return None;
    }

    let mut segments = inner.split('.');
    let root = segments.next()?;
    if !is_ident(root) {
        return None;
    }

    let mut path = Vec::new();
    for segment in segments {
        if let Ok(index) = segment.parse::<usize>() {
            path.push(PathSegment::Index(index));
        } else if is_ident(segment) {
            path.push(PathSegment::Key(segment.to_string()));
        } else {
            return None;
        }
    }

    Some(Expr {
        raw: inner.to_string(),
        root: root.to_string(),
        path,
    })
}

/// Check an identifier segment: `[A-Za-z_][A-Za-z0-9_-]*`
fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

static LEGACY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("legacy placeholder regex"));

/// Find legacy single-brace `{var}` spans in content
///
/// Reported as migration warnings by the validator; the resolver never
/// substitutes them.
pub fn legacy_spans(content: &str) -> Vec<String> {
    // Strip canonical placeholders and stray double braces first so
    // `{{var}}` is never counted as legacy `{var}`
    let without_canonical: String = scan(content)
        .into_iter()
        .filter_map(|span| match span {
            Span::Literal(text) => Some(text),
            Span::Placeholder(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\u{0}")
        .replace("{{", "\u{0}")
        .replace("}}", "\u{0}");

    LEGACY_RE
        .captures_iter(&without_canonical)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Brace spans that open like a placeholder but do not parse as one
///
/// Returns the inner text of every `{{` span whose body fails the grammar,
/// including an unclosed trailing `{{`. A bare `}}` with no opening is
/// ordinary text; nested JSON ends with one.
pub fn malformed_spans(content: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut rest = content;

    while let Some(open) = rest.find("{{") {
        let body = &rest[open + 2..];
        match body.find("}}") {
            Some(close) => {
                let inner = &body[..close];
                if parse_expr(inner.trim()).is_none() {
                    spans.push(inner.to_string());
                }
                rest = &body[close + 2..];
            }
            None => {
                spans.push(body.to_string());
                rest = "";
            }
        }
    }

    spans
}

/// Check whether text still contains a placeholder-like span
///
/// Any `{{` counts, parsable or not; a bare `}}` does not, since valid
/// nested JSON output ends with one.
pub fn contains_placeholder_syntax(text: &str) -> bool {
    text.contains("{{")
}
