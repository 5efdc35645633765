//! Replacement template expansion.
//!
//! Templates follow the host's string-replace syntax. Match patterns do not
//! carry over verbatim: lookaround has to be rewritten as a captured prefix
//! (see [`crate::config::matcher::lookaround`]).
//!
//! | token        | expands to                                  |
//! |--------------|---------------------------------------------|
//! | `$$`         | `$`                                         |
//! | `$&`         | the whole match                             |
//! | `` $` ``     | text before the match                       |
//! | `$'`         | text after the match                        |
//! | `$1`..`$99`  | numbered group (literal if no such group)   |
//! | `$<name>`    | named group (literal if the regex has none) |
//! | `$self`      | expression referencing the owning plugin    |

use crate::config::matcher::MatchSpan;

/// Everything a template can refer to for one match.
pub struct ExpandContext<'a> {
    pub source: &'a str,
    pub span: &'a MatchSpan,
    pub plugin_ref: &'a str,
}

impl ExpandContext<'_> {
    fn group(&self, index: usize) -> Option<&str> {
        self.span
            .groups
            .get(index.checked_sub(1)?)?
            .as_ref()
            .map(|r| &self.source[r.clone()])
    }
}

pub fn expand(template: &str, ctx: &ExpandContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let group_count = ctx.span.groups.len();

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix("self") {
            out.push_str(ctx.plugin_ref);
            rest = tail;
            continue;
        }

        let mut chars = after.chars();
        let consumed = match chars.next() {
            Some('$') => {
                out.push('$');
                1
            }
            Some('&') => {
                out.push_str(&ctx.source[ctx.span.range.clone()]);
                1
            }
            Some('`') => {
                out.push_str(&ctx.source[..ctx.span.range.start]);
                1
            }
            Some('\'') => {
                out.push_str(&ctx.source[ctx.span.range.end..]);
                1
            }
            Some(d) if d.is_ascii_digit() => {
                let first = d.to_digit(10).unwrap_or(0) as usize;
                let two = chars
                    .next()
                    .and_then(|d2| d2.to_digit(10))
                    .map(|d2| first * 10 + d2 as usize);

                match two {
                    Some(n) if (1..=group_count).contains(&n) => {
                        out.push_str(ctx.group(n).unwrap_or(""));
                        2
                    }
                    _ if (1..=group_count).contains(&first) => {
                        out.push_str(ctx.group(first).unwrap_or(""));
                        1
                    }
                    _ => {
                        out.push('$');
                        0
                    }
                }
            }
            Some('<') if !ctx.span.named.is_empty() => match after.find('>') {
                Some(close) => {
                    let name = &after[1..close];
                    let value = ctx
                        .span
                        .named
                        .iter()
                        .find(|(n, _)| n == name)
                        .and_then(|(_, r)| r.clone())
                        .map(|r| &ctx.source[r]);
                    out.push_str(value.unwrap_or(""));
                    close + 1
                }
                None => {
                    out.push('$');
                    0
                }
            },
            _ => {
                out.push('$');
                0
            }
        };

        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}
