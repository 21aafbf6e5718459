//! URI path templates and their per-invocation resolution.
//!
//! Templates look like `/users/{id}/posts/{slug:[a-z0-9-]+}`. A placeholder without a
//! pattern matches `[^/]+`. Patterns may themselves contain braces (`{id:\d{3,5}}`), so
//! tokenizing tracks brace depth rather than splitting on the first `}`.

use regex::Regex;
use smol_str::SmolStr;

use crate::charset::Charset;
use crate::encode::percent_encode;
use crate::error::{ArgumentError, ClientError, ConfigError};

/// Pattern used by placeholders that do not declare one.
pub const DEFAULT_PATTERN: &str = "[^/]+";

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(usize),
}

/// One named placeholder of a template.
#[derive(Debug, Clone)]
pub struct Placeholder {
    name: SmolStr,
    pattern: SmolStr,
    regex: Regex,
}

impl Placeholder {
    /// Placeholder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pattern values must match in full.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// A parsed, validated path template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: SmolStr,
    segments: Vec<Segment>,
    placeholders: Vec<Placeholder>,
}

impl UriTemplate {
    /// Tokenize `template` and compile its placeholder patterns.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTemplate {
            template: template.into(),
            reason: reason.into(),
        };

        let mut segments = Vec::new();
        let mut placeholders: Vec<Placeholder> = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut depth = 1usize;
                    let mut body = String::new();
                    for c in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        if depth == 0 {
                            break;
                        }
                        body.push(c);
                    }
                    if depth != 0 {
                        return Err(invalid("unclosed `{`"));
                    }

                    let (name, pattern) = match body.split_once(':') {
                        Some((name, pattern)) => (name.trim(), pattern.trim()),
                        None => (body.trim(), DEFAULT_PATTERN),
                    };
                    if name.is_empty() {
                        return Err(invalid("empty placeholder name"));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let index = match placeholders.iter().position(|p| p.name == name) {
                        Some(index) => index,
                        None => {
                            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(
                                |source| ConfigError::InvalidPattern {
                                    name: name.into(),
                                    source,
                                },
                            )?;
                            placeholders.push(Placeholder {
                                name: name.into(),
                                pattern: pattern.into(),
                                regex,
                            });
                            placeholders.len() - 1
                        }
                    };
                    segments.push(Segment::Placeholder(index));
                }
                '}' => return Err(invalid("unmatched `}`")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.into(),
            segments,
            placeholders,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Distinct placeholders, in order of first appearance.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Start resolving this template for one invocation.
    pub fn resolver(&self, charset: Charset) -> PathResolver<'_> {
        PathResolver {
            template: self,
            values: vec![None; self.placeholders.len()],
            charset,
        }
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Accumulates placeholder values for one invocation.
///
/// Every placeholder must be merged exactly once before [`build`](Self::build).
#[derive(Debug)]
pub struct PathResolver<'t> {
    template: &'t UriTemplate,
    values: Vec<Option<String>>,
    charset: Charset,
}

impl PathResolver<'_> {
    /// Supply the value of placeholder `name`.
    ///
    /// The raw value must match the placeholder pattern. It is percent-encoded unless
    /// `encoded` is set.
    pub fn merge(&mut self, name: &str, value: &str, encoded: bool) -> Result<(), ClientError> {
        let index = self
            .template
            .placeholders
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownPlaceholder {
                name: name.into(),
                template: self.template.source.clone(),
            })?;
        if self.values[index].is_some() {
            return Err(ConfigError::PlaceholderAlreadyMerged { name: name.into() }.into());
        }

        let placeholder = &self.template.placeholders[index];
        if !placeholder.regex.is_match(value) {
            return Err(ArgumentError::InvalidPathValue {
                name: name.into(),
                value: value.to_string(),
                pattern: placeholder.pattern.clone(),
            }
            .into());
        }

        let value = if encoded {
            value.to_string()
        } else {
            percent_encode(value, self.charset)?
        };
        self.values[index] = Some(value);
        Ok(())
    }

    /// Substitute all merged values into the template.
    pub fn build(self) -> Result<String, ConfigError> {
        let missing: Vec<SmolStr> = self
            .template
            .placeholders
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| v.is_none())
            .map(|(p, _)| p.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::UnresolvedPlaceholders {
                names: missing,
                template: self.template.source.clone(),
            });
        }

        let mut out = String::with_capacity(self.template.source.len());
        for segment in &self.template.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(i) => {
                    if let Some(value) = &self.values[*i] {
                        out.push_str(value);
                    }
                }
            }
        }
        Ok(out)
    }
}
