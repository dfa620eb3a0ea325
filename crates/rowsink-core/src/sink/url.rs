//! Parsing of sink URLs.
//!
//! The accepted grammar is `scheme:path?key=value,key=value`:
//! - `scheme` is an identifier (`[A-Za-z_][A-Za-z0-9_]*`);
//! - `path` is one or more `/`-separated segments over the filesystem-style
//!   character set `[A-Za-z0-9_.:\-$' ]`, with an optional leading slash;
//! - the query part is optional; keys are identifiers and values follow the
//!   path grammar.
//!
//! Option *values* are validated by the sink factory; unknown option *keys*
//! are carried through untouched so future sinks can pick them up.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use snafu::prelude::*;

/// Errors raised while parsing a sink URL.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum UrlError {
    /// The URL does not match the `scheme:path?opts` grammar.
    #[snafu(display("malformed sink url {url:?}"))]
    Malformed {
        /// The URL that failed to parse.
        url: String,
    },

    /// The scheme is not one the sink factory understands.
    #[snafu(display("unknown sink scheme {scheme:?} in {url:?}"))]
    UnknownScheme {
        /// The unrecognized scheme.
        scheme: String,
        /// The URL it came from.
        url: String,
    },

    /// A recognized option carries a value outside its legal set.
    #[snafu(display("illegal value {value:?} for option {option:?}"))]
    BadOptionValue {
        /// The option name.
        option: String,
        /// The rejected value.
        value: String,
    },
}

/// The decomposed parts of a sink URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// The scheme in front of the first colon.
    pub scheme: String,
    /// The filesystem-style path.
    pub path: String,
    /// The query options, in key order.
    pub options: BTreeMap<String, String>,
}

const SEGMENT: &str = r"[A-Za-z0-9_.:\-$' ]+";

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let path = format!(r"/?(?:{SEGMENT}/)*{SEGMENT}");
        let expr = format!(r"^([A-Za-z_][A-Za-z0-9_]*):({path})(?:\?(.*))?$");
        Regex::new(&expr).expect("hard-coded sink url pattern compiles")
    })
}

fn option_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let expr = format!(r"^([A-Za-z_][A-Za-z0-9_]*)=(/?(?:{SEGMENT}/)*{SEGMENT})$");
        Regex::new(&expr).expect("hard-coded sink option pattern compiles")
    })
}

/// Split a sink URL into scheme, path, and options.
pub fn parse_url(url: &str) -> Result<ParsedUrl, UrlError> {
    let captures = url_pattern()
        .captures(url)
        .context(MalformedSnafu { url })?;

    let scheme = captures
        .get(1)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let path = captures
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut options = BTreeMap::new();
    if let Some(query) = captures.get(3) {
        for pair in query.as_str().split(',') {
            let caps = option_pattern()
                .captures(pair)
                .context(MalformedSnafu { url })?;
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            options.insert(key.to_string(), value.to_string());
        }
    }

    Ok(ParsedUrl {
        scheme,
        path,
        options,
    })
}
