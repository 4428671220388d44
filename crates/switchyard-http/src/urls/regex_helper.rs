//! Reverse-engineering URL regexes into fill-in templates.
//!
//! [`normalize`] turns a pattern such as `^articles/(?P<year>\d{4})/$` into
//! the list of templates that regex can produce, each a sequence of literal
//! text and named placeholders. Optional groups fan out into one template
//! with the group and one without. Only the subset of regex syntax that makes
//! sense in URL patterns is understood:
//!
//! - `.` and character classes are replaced by one representative character.
//! - `*`, `?` and `{0,n}` drop the preceding element (or make a group
//!   optional); `+` and `{n,m}` repeat it `n` times.
//! - Anchors `^`, `$`, `\A`, `\b`, `\B`, `\Z` are dropped; `$` ends the scan.
//! - Alternation `|` is not reversible and yields a single empty template.
//! - Flag groups such as `(?i)` are ignored; lookarounds are rejected.

use std::collections::HashMap;
use std::str::Chars;

use switchyard_core::{SwitchyardError, SwitchyardResult};

/// One piece of a [`UrlTemplate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Text copied verbatim.
    Literal(String),
    /// A value substituted from the parameter with this name.
    Param(String),
}

/// A path template with named placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlTemplate {
    /// Literal and placeholder pieces, in order.
    pub pieces: Vec<Piece>,
    /// Names of the parameters a caller must supply, in capture order.
    pub params: Vec<String>,
}

impl UrlTemplate {
    /// A template that renders `text` and takes no parameters.
    pub fn literal(text: &str) -> Self {
        let mut template = Self::default();
        template.push_str(text);
        template
    }

    fn push_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Piece::Literal(last)) = self.pieces.last_mut() {
            last.push_str(text);
        } else {
            self.pieces.push(Piece::Literal(text.to_string()));
        }
    }

    fn push_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.push_str(c.encode_utf8(&mut buf));
    }

    /// Returns `self` followed by `other`.
    ///
    /// `other`'s positional parameters are renumbered to follow `self`'s, so
    /// `_0` on both sides becomes `_0` and `_1`.
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let offset = self.params.iter().filter(|p| positional_index(p).is_some()).count();
        let shift = |name: &String| match positional_index(name) {
            Some(index) => format!("_{}", index + offset),
            None => name.clone(),
        };
        let mut joined = self.clone();
        for piece in &other.pieces {
            match piece {
                Piece::Literal(text) => joined.push_str(text),
                Piece::Param(name) => joined.pieces.push(Piece::Param(shift(name))),
            }
        }
        joined.params.extend(other.params.iter().map(shift));
        joined
    }

    /// Substitutes `values` into the placeholders.
    ///
    /// Returns `None` if a placeholder has no value.
    pub fn render(&self, values: &HashMap<String, String>) -> Option<String> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Param(name) => out.push_str(values.get(name)?),
            }
        }
        Some(out)
    }
}

/// The index of an unnamed group's placeholder (`_3` is 3).
fn positional_index(name: &str) -> Option<usize> {
    name.strip_prefix('_')?.parse().ok()
}

// ── Parsing ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Elem {
    Char(char),
    Group(String),
    NonCapture(Vec<Elem>),
    Choice(Vec<Option<Elem>>),
}

impl Elem {
    fn contains_group(&self) -> bool {
        match self {
            Self::Group(_) => true,
            Self::NonCapture(inner) => inner.iter().any(Self::contains_group),
            _ => false,
        }
    }
}

/// Why the scan stopped early.
enum Stop {
    /// Input exhausted; whatever was collected stands.
    End,
    /// `|` was found.
    Alternation,
    /// The pattern can't be reversed.
    Invalid(String),
}

/// Iterates pattern characters, resolving escapes to a representative.
struct PatternChars<'a> {
    inner: Chars<'a>,
}

impl PatternChars<'_> {
    fn next_char(&mut self) -> Result<(char, bool), Stop> {
        loop {
            let ch = self.inner.next().ok_or(Stop::End)?;
            if ch != '\\' {
                return Ok((ch, false));
            }
            let escaped = self.inner.next().ok_or(Stop::End)?;
            let representative = match escaped {
                'A' | 'b' | 'B' | 'Z' | 'z' => continue,
                'd' => '0',
                'D' | 'S' | 'w' => 'x',
                's' => ' ',
                'W' => '!',
                other => other,
            };
            return Ok((representative, true));
        }
    }

    /// Consumes input up to and including the `)` closing the current group.
    fn walk_to_end(&mut self, ch: char) -> Result<(), Stop> {
        let mut nesting = usize::from(ch == '(');
        loop {
            let (ch, escaped) = self.next_char()?;
            if escaped {
                continue;
            }
            match ch {
                '(' => nesting += 1,
                ')' if nesting == 0 => return Ok(()),
                ')' => nesting -= 1,
                _ => {}
            }
        }
    }

    /// Reads a quantifier starting at `ch`.
    ///
    /// Returns the minimum repeat count and the character following the
    /// quantifier, if one was read and must be processed next.
    fn quantifier(&mut self, ch: char) -> Result<(usize, Option<(char, bool)>), Stop> {
        if ch != '{' {
            let following = self.next_or_none()?;
            let count = usize::from(ch == '+');
            return Ok((count, following));
        }
        let mut body = String::new();
        loop {
            let (c, _) = self.next_char()?;
            if c == '}' {
                break;
            }
            body.push(c);
        }
        let min = body.split(',').next().unwrap_or("").trim();
        let count = if min.is_empty() {
            0
        } else {
            min.parse()
                .map_err(|_| Stop::Invalid(format!("Invalid quantifier '{{{body}}}'")))?
        };
        Ok((count, self.next_or_none()?))
    }

    /// The next character, or `None` when the input is exhausted or the next
    /// character is a lazy-quantifier `?`.
    fn next_or_none(&mut self) -> Result<Option<(char, bool)>, Stop> {
        match self.next_char() {
            Ok(('?', false)) | Err(Stop::End) => Ok(None),
            Ok(next) => Ok(Some(next)),
            Err(other) => Err(other),
        }
    }
}

fn scan(pattern: &str, result: &mut Vec<Elem>) -> Result<(), Stop> {
    let mut chars = PatternChars {
        inner: pattern.chars(),
    };
    let mut open_non_capturing: Vec<usize> = Vec::new();
    let mut num_args = 0usize;
    let mut pending: Option<(char, bool)> = None;

    loop {
        let (ch, escaped) = match pending.take() {
            Some(next) => next,
            None => chars.next_char()?,
        };

        if escaped {
            result.push(Elem::Char(ch));
            continue;
        }
        match ch {
            '|' => return Err(Stop::Alternation),
            '^' => {}
            '$' => return Ok(()),
            ')' => {
                let start = open_non_capturing
                    .pop()
                    .ok_or_else(|| Stop::Invalid("Unbalanced parenthesis".to_string()))?;
                let inner = result.split_off(start);
                result.push(Elem::NonCapture(inner));
            }
            '[' => {
                let (first, _) = chars.next_char()?;
                result.push(Elem::Char(first));
                loop {
                    let (c, esc) = chars.next_char()?;
                    if !esc && c == ']' {
                        break;
                    }
                }
            }
            '(' => {
                let (c, esc) = chars.next_char()?;
                if c != '?' || esc {
                    let name = format!("_{num_args}");
                    num_args += 1;
                    result.push(Elem::Group(name));
                    chars.walk_to_end(c)?;
                    continue;
                }
                let (c, _) = chars.next_char()?;
                match c {
                    'i' | 'm' | 's' | 'u' | 'x' | 'U' | 'R' | '-' | '#' => chars.walk_to_end(c)?,
                    ':' => open_non_capturing.push(result.len()),
                    'P' | '<' => {
                        let c = if c == 'P' { chars.next_char()?.0 } else { '<' };
                        if c != '<' {
                            return Err(Stop::Invalid(format!(
                                "Non-reversible reg-exp portion: '(?P{c}'"
                            )));
                        }
                        let mut name = String::new();
                        loop {
                            let (c, _) = chars.next_char()?;
                            if c == '>' {
                                break;
                            }
                            if name.is_empty() && matches!(c, '=' | '!') {
                                return Err(Stop::Invalid(format!(
                                    "Non-reversible reg-exp portion: '(?<{c}'"
                                )));
                            }
                            name.push(c);
                        }
                        result.push(Elem::Group(name));
                        chars.walk_to_end('>')?;
                    }
                    other => {
                        return Err(Stop::Invalid(format!(
                            "Non-reversible reg-exp portion: '(?{other}'"
                        )))
                    }
                }
            }
            '*' | '?' | '+' | '{' => {
                let (count, following) = chars.quantifier(ch)?;
                pending = following;
                let last = result
                    .pop()
                    .ok_or_else(|| Stop::Invalid(format!("Nothing to repeat before '{ch}'")))?;
                if count == 0 {
                    if last.contains_group() {
                        result.push(Elem::Choice(vec![None, Some(last)]));
                    }
                } else {
                    for _ in 0..count {
                        result.push(last.clone());
                    }
                }
            }
            other => result.push(Elem::Char(other)),
        }
    }
}

fn product(left: &[UrlTemplate], right: &[UrlTemplate]) -> Vec<UrlTemplate> {
    left.iter()
        .flat_map(|l| right.iter().map(move |r| l.concat(r)))
        .collect()
}

fn flatten(source: &[Elem]) -> Vec<UrlTemplate> {
    let mut results = vec![UrlTemplate::default()];
    for elem in source {
        match elem {
            Elem::Char(c) => {
                for template in &mut results {
                    template.push_char(*c);
                }
            }
            Elem::Group(name) => {
                for template in &mut results {
                    template.pieces.push(Piece::Param(name.clone()));
                    template.params.push(name.clone());
                }
            }
            Elem::NonCapture(inner) => results = product(&results, &flatten(inner)),
            Elem::Choice(options) => {
                let alternatives: Vec<UrlTemplate> = options
                    .iter()
                    .flat_map(|option| match option {
                        None => vec![UrlTemplate::default()],
                        Some(elem) => flatten(std::slice::from_ref(elem)),
                    })
                    .collect();
                results = product(&results, &alternatives);
            }
        }
    }
    results
}

/// Expands `pattern` into every path template it can match.
///
/// Positional groups are named `_0`, `_1`, ... in order of appearance.
///
/// ```
/// use switchyard_http::urls::regex_helper::normalize;
///
/// let templates = normalize(r"^articles/(?P<year>\d{4})/(?:page-(?P<page>\d+)/)?$").unwrap();
/// assert_eq!(templates.len(), 2);
/// assert_eq!(templates[0].params, vec!["year"]);
/// assert_eq!(templates[1].params, vec!["year", "page"]);
/// ```
pub fn normalize(pattern: &str) -> SwitchyardResult<Vec<UrlTemplate>> {
    let mut result = Vec::new();
    match scan(pattern, &mut result) {
        Ok(()) | Err(Stop::End) => Ok(flatten(&result)),
        Err(Stop::Alternation) => Ok(vec![UrlTemplate::default()]),
        Err(Stop::Invalid(reason)) => Err(SwitchyardError::ImproperlyConfigured(format!(
            "Can't reverse the pattern '{pattern}': {reason}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes(pattern: &str) -> Vec<(String, Vec<String>)> {
        normalize(pattern)
            .unwrap()
            .into_iter()
            .map(|t| {
                let text = t
                    .pieces
                    .iter()
                    .map(|p| match p {
                        Piece::Literal(s) => s.clone(),
                        Piece::Param(n) => format!("<{n}>"),
                    })
                    .collect::<String>();
                (text, t.params)
            })
            .collect()
    }

    fn one(text: &str, params: &[&str]) -> (String, Vec<String>) {
        (text.to_string(), params.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_literal_pattern() {
        assert_eq!(shapes("^about/contact/$"), vec![one("about/contact/", &[])]);
        assert_eq!(shapes(""), vec![one("", &[])]);
    }

    #[test]
    fn test_named_and_positional_groups() {
        assert_eq!(
            shapes(r"^(?P<year>\d{4})/(\d+)/$"),
            vec![one("<year>/<_0>/", &["year", "_0"])]
        );
        assert_eq!(shapes(r"^(?<slug>[-\w]+)/$"), vec![one("<slug>/", &["slug"])]);
    }

    #[test]
    fn test_escapes_and_classes() {
        assert_eq!(shapes(r"^a\.b/\d\w[abc]\b$"), vec![one("a.b/0xa", &[])]);
        assert_eq!(shapes(r"^x[\]y]z$"), vec![one("x]z", &[])]);
    }

    #[test]
    fn test_quantifiers() {
        assert_eq!(shapes("^ab?c$"), vec![one("ac", &[])]);
        assert_eq!(shapes("^ab+c$"), vec![one("abc", &[])]);
        assert_eq!(shapes("^ab{3}c$"), vec![one("abbbc", &[])]);
        assert_eq!(shapes("^ab{2,5}c$"), vec![one("abbc", &[])]);
        assert_eq!(shapes("^ab*?c$"), vec![one("ac", &[])]);
    }

    #[test]
    fn test_optional_group_fans_out() {
        assert_eq!(
            shapes(r"^list/(?:(?P<page>\d+)/)?$"),
            vec![one("list/", &[]), one("list/<page>/", &["page"])]
        );
    }

    #[test]
    fn test_optional_non_capturing_without_group_is_dropped() {
        assert_eq!(shapes("^a(?:bc)?d$"), vec![one("ad", &[])]);
        assert_eq!(shapes("^a(?:bc)d$"), vec![one("abcd", &[])]);
    }

    #[test]
    fn test_flags_are_ignored() {
        assert_eq!(shapes("(?i)^abc/$"), vec![one("abc/", &[])]);
    }

    #[test]
    fn test_alternation_is_not_reversible() {
        assert_eq!(shapes("^(a|b)/$"), vec![one("<_0>/", &["_0"])]);
        assert_eq!(shapes("^a|b$"), vec![one("", &[])]);
    }

    #[test]
    fn test_non_reversible_constructs() {
        assert!(matches!(
            normalize("^(?=abc)"),
            Err(SwitchyardError::ImproperlyConfigured(_))
        ));
        assert!(normalize("^(?<=a)b").is_err());
        assert!(normalize("^*a").is_err());
    }

    #[test]
    fn test_render_and_concat() {
        let prefix = normalize("^(?P<lang>[a-z]+)/").unwrap().remove(0);
        let child = normalize(r"^posts/(?P<id>\d+)/$").unwrap().remove(0);
        let joined = prefix.concat(&child);
        assert_eq!(joined.params, vec!["lang", "id"]);

        let mut values = HashMap::new();
        values.insert("lang".to_string(), "en".to_string());
        assert_eq!(joined.render(&values), None);
        values.insert("id".to_string(), "7".to_string());
        assert_eq!(joined.render(&values).as_deref(), Some("en/posts/7/"));
        assert_eq!(UrlTemplate::literal("/").render(&HashMap::new()).as_deref(), Some("/"));
    }

    #[test]
    fn test_concat_renumbers_positional_params() {
        let prefix = normalize(r"^(\d+)/(?P<lang>[a-z]+)/").unwrap().remove(0);
        let child = normalize(r"^(\d+)/(\w+)/$").unwrap().remove(0);
        let joined = prefix.concat(&child);
        assert_eq!(joined.params, vec!["_0", "lang", "_1", "_2"]);

        let values: HashMap<String, String> = [("_0", "1"), ("lang", "en"), ("_1", "2"), ("_2", "x")]
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        assert_eq!(joined.render(&values).as_deref(), Some("1/en/2/x/"));
    }
}
