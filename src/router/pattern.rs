//! Route pattern compilation and matching.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::server::Error;

/// The source form of a route pattern.
#[derive(Debug, Clone)]
pub enum PathSpec {
    /// Matches every path and extracts nothing.
    Any,
    /// A path template such as `/foo/:id`.
    Template(String),
    /// A caller-built regular expression, used as-is.
    Pattern(Regex),
}

impl From<&str> for PathSpec {
    fn from(template: &str) -> Self {
        PathSpec::Template(template.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(template: String) -> Self {
        PathSpec::Template(template)
    }
}

impl From<Regex> for PathSpec {
    fn from(pattern: Regex) -> Self {
        PathSpec::Pattern(pattern)
    }
}

impl<T: Into<PathSpec>> From<Option<T>> for PathSpec {
    fn from(spec: Option<T>) -> Self {
        spec.map_or(PathSpec::Any, Into::into)
    }
}

/// A compiled route pattern.
///
/// Matching never mutates the pattern, so one pattern can be shared by any
/// number of concurrent exchanges.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// The match-all sentinel.
    Any,
    /// A compiled path template. Parameters are positional capture groups;
    /// `params[i]` names group `i + 1`.
    Template {
        source: String,
        regex: Regex,
        params: Vec<String>,
    },
    /// A caller-supplied expression. Only its named groups are extracted.
    Custom(Regex),
}

impl RoutePattern {
    /// Compile a path spec.
    ///
    /// Template segments starting with `:` capture one or more non-`/`
    /// characters under the name that follows the colon; every other
    /// segment is matched literally. A single trailing `/` is optional.
    ///
    /// ```
    /// use chainhttp_rs::RoutePattern;
    ///
    /// let pattern = RoutePattern::compile("/foo/:id/patch/:patch").unwrap();
    /// assert!(pattern.is_match("/foo/1/patch/alpha/"));
    ///
    /// let params = pattern.extract_params("/foo/1/patch/alpha");
    /// assert_eq!(params["id"], "1");
    /// assert_eq!(params["patch"], "alpha");
    /// ```
    pub fn compile(spec: impl Into<PathSpec>) -> Result<Self, Error> {
        match spec.into() {
            PathSpec::Any => Ok(RoutePattern::Any),
            PathSpec::Pattern(regex) => Ok(RoutePattern::Custom(regex)),
            PathSpec::Template(source) => Self::compile_template(source),
        }
    }

    fn compile_template(source: String) -> Result<Self, Error> {
        let mut params = Vec::new();
        let mut body = source
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => {
                    params.push(name.to_string());
                    "([^/]+)".to_string()
                }
                None => regex::escape(segment),
            })
            .collect::<Vec<_>>()
            .join("/");

        if !body.ends_with('/') {
            body.push_str("/?");
        } else if body != "/" {
            body.push('?');
        }

        let regex = Regex::new(&format!("^{body}$"))?;
        Ok(RoutePattern::Template {
            source,
            regex,
            params,
        })
    }

    /// Whether this is the match-all sentinel.
    pub fn is_match_all(&self) -> bool {
        matches!(self, RoutePattern::Any)
    }

    /// Whether the pattern accepts `path`.
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            RoutePattern::Any => true,
            RoutePattern::Template { regex, .. } | RoutePattern::Custom(regex) => regex.is_match(path),
        }
    }

    /// The parameters captured by the first match of `path`.
    ///
    /// Returns an empty map when nothing matches or the pattern has no
    /// parameters. When a template repeats a parameter name, the last
    /// capture wins.
    pub fn extract_params(&self, path: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        match self {
            RoutePattern::Any => {}
            RoutePattern::Template {
                regex,
                params: names,
                ..
            } => {
                if let Some(captures) = regex.captures(path) {
                    for (index, name) in names.iter().enumerate() {
                        if let Some(value) = captures.get(index + 1) {
                            params.insert(name.clone(), value.as_str().to_string());
                        }
                    }
                }
            }
            RoutePattern::Custom(regex) => {
                if let Some(captures) = regex.captures(path) {
                    for name in regex.capture_names().flatten() {
                        if let Some(value) = captures.name(name) {
                            params.insert(name.to_string(), value.as_str().to_string());
                        }
                    }
                }
            }
        }
        params
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePattern::Any => f.write_str("*"),
            RoutePattern::Template { source, .. } => f.write_str(source),
            RoutePattern::Custom(regex) => write!(f, "{}", regex.as_str()),
        }
    }
}
