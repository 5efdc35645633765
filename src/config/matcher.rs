//! Span acquisition for replacement rules.
//!
//! Literal matchers use plain substring search. Regex matchers are compiled
//! once (see [`crate::cache`]) after expanding the `\i` identifier shorthand
//! used throughout patch definitions for minified bundles.

use crate::cache::get_or_compile_regex;
use crate::config::schema::Matcher;
use regex::Regex;
use std::ops::Range;

/// What `\i` expands to: one JavaScript identifier.
pub const IDENTIFIER_PATTERN: &str = r"(?:[A-Za-z_$][\w$]*)";

/// One located match and its capture spans, all byte ranges into the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub range: Range<usize>,
    /// Numbered groups, `groups[0]` is group 1
    pub groups: Vec<Option<Range<usize>>>,
    pub named: Vec<(String, Option<Range<usize>>)>,
}

/// Replace every unescaped `\i` in `pattern` with [`IDENTIFIER_PATTERN`].
pub fn canonicalize(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('i') => out.push_str(IDENTIFIER_PATTERN),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// The lookaround construct `pattern` uses, if any.
///
/// The regex engine has no lookaround. Host definitions written with a
/// lookbehind prefix are expressed as a captured prefix instead:
/// `(?<=a.+?)b` → `(a.+?)b` replaced with `$1...`.
pub fn lookaround(pattern: &str) -> Option<&'static str> {
    const CONSTRUCTS: [(&str, &str); 4] = [
        ("(?<=", "lookbehind"),
        ("(?<!", "negative lookbehind"),
        ("(?=", "lookahead"),
        ("(?!", "negative lookahead"),
    ];

    let bytes = pattern.as_bytes();
    let mut in_class = false;
    let mut idx = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => {
                idx += 2;
                continue;
            }
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => {
                let rest = &pattern[idx..];
                if let Some((_, name)) = CONSTRUCTS.iter().find(|(open, _)| rest.starts_with(*open)) {
                    return Some(*name);
                }
            }
            _ => {}
        }
        idx += 1;
    }

    None
}

/// Compile a regex matcher pattern (canonicalized, cached).
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    get_or_compile_regex(&canonicalize(pattern))
}

/// Find the first match of `matcher` in `source`, or every non-overlapping
/// match when `global` is set.
pub fn find_matches(
    matcher: &Matcher,
    source: &str,
    global: bool,
) -> Result<Vec<MatchSpan>, regex::Error> {
    match matcher {
        Matcher::Literal(text) => {
            let spans = source.match_indices(text.as_str()).map(|(start, m)| MatchSpan {
                range: start..start + m.len(),
                groups: Vec::new(),
                named: Vec::new(),
            });
            Ok(if global {
                spans.collect()
            } else {
                spans.take(1).collect()
            })
        }
        Matcher::Regex(pattern) => {
            let re = compile(pattern)?;
            let names: Vec<(usize, String)> = re
                .capture_names()
                .enumerate()
                .filter_map(|(idx, name)| name.map(|n| (idx, n.to_string())))
                .collect();

            let spans = re.captures_iter(source).filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(MatchSpan {
                    range: whole.range(),
                    groups: (1..caps.len())
                        .map(|idx| caps.get(idx).map(|m| m.range()))
                        .collect(),
                    named: names
                        .iter()
                        .map(|(idx, name)| (name.clone(), caps.get(*idx).map(|m| m.range())))
                        .collect(),
                })
            });
            Ok(if global {
                spans.collect()
            } else {
                spans.take(1).collect()
            })
        }
    }
}
