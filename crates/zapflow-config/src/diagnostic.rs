// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration error reporting.
//!
//! A rejected value is traced back to where it was read from: a TOML file,
//! an inline document or a `ZAPFLOW_*` variable. File and inline errors point
//! at the offending line; variable errors name the variable to fix.

#![allow(unused_assignments)] // miette's Diagnostic derive trips this lint on span fields

use std::fmt::{self, Write as _};
use std::path::PathBuf;

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader;

/// Jaro-Winkler score a candidate needs before it is offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Where a rejected value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// A TOML file, from the search path or `--config`.
    File(PathBuf),
    /// A TOML document passed as a string.
    Inline,
    /// A `ZAPFLOW_*` environment variable, by its full name.
    Env(String),
    Unknown,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::File(path) => write!(f, "{}", path.display()),
            ConfigOrigin::Inline => f.write_str("inline configuration"),
            ConfigOrigin::Env(var) => write!(f, "environment variable `{var}`"),
            ConfigOrigin::Unknown => f.write_str("configuration"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("{origin}: unknown key `{key}`")]
    #[diagnostic(code(zapflow::config::unknown_key))]
    UnknownKey {
        /// Dotted path of the key, e.g. `evolution.api_kye`.
        key: String,
        origin: ConfigOrigin,
        /// Closest valid spelling, written the way `origin` expects it: a
        /// key name for TOML, a full variable name for the environment.
        suggestion: Option<String>,
        #[help]
        advice: String,
        #[label("not a zapflow setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("{origin}: `{key}` {problem}")]
    #[diagnostic(code(zapflow::config::invalid_value))]
    InvalidValue {
        key: String,
        origin: ConfigOrigin,
        problem: String,
        #[label("set here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// The file named with `--config` is not there.
    #[error("config file `{}` does not exist", .path.display())]
    #[diagnostic(
        code(zapflow::config::missing_file),
        help("pass an existing file to --config, or drop the flag to use the search path")
    )]
    MissingFile { path: PathBuf },

    /// Unparseable TOML and anything else figment reports.
    #[error("{origin}: {message}")]
    #[diagnostic(code(zapflow::config::malformed))]
    Malformed { origin: ConfigOrigin, message: String },

    #[error("{message}")]
    #[diagnostic(code(zapflow::config::validation))]
    Validation { message: String },
}

/// Converts a figment extraction failure into reportable errors.
///
/// `inline` is the TOML text when the configuration was loaded from a string.
pub fn from_figment(err: figment::Error, inline: Option<&str>) -> Vec<ConfigError> {
    err.into_iter().map(|error| convert(&error, inline)).collect()
}

fn convert(error: &figment::Error, inline: Option<&str>) -> ConfigError {
    let origin = origin_of(error, inline.is_some());
    let key = error.path.join(".");

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let parents = &error.path[..error.path.len().saturating_sub(1)];
            let (suggestion, advice) = match &origin {
                ConfigOrigin::Env(_) => {
                    let suggestion = suggest_env_var(parents, field, expected);
                    let advice = env_advice(suggestion.as_deref());
                    (suggestion, advice)
                }
                _ => {
                    let suggestion = closest(field, expected).map(str::to_string);
                    let advice = file_advice(parents, suggestion.as_deref(), expected);
                    (suggestion, advice)
                }
            };
            let (span, src) = locate(&origin, inline, &error.path).unzip();
            ConfigError::UnknownKey {
                key,
                origin,
                suggestion,
                advice,
                span,
                src,
            }
        }
        Kind::InvalidType(actual, expected) | Kind::InvalidValue(actual, expected) => {
            let (span, src) = locate(&origin, inline, &error.path).unzip();
            ConfigError::InvalidValue {
                key,
                problem: format!("is {actual}, expected {expected}"),
                origin,
                span,
                src,
            }
        }
        Kind::UnknownVariant(actual, allowed) => {
            let (span, src) = locate(&origin, inline, &error.path).unzip();
            ConfigError::InvalidValue {
                key,
                problem: format!("is `{actual}`, expected one of: {}", allowed.join(", ")),
                origin,
                span,
                src,
            }
        }
        other => ConfigError::Malformed {
            origin,
            message: other.to_string(),
        },
    }
}

fn origin_of(error: &figment::Error, has_inline: bool) -> ConfigOrigin {
    let Some(metadata) = &error.metadata else {
        return ConfigOrigin::Unknown;
    };
    match &metadata.source {
        Some(figment::Source::File(path)) => ConfigOrigin::File(path.clone()),
        _ if loader::is_env_metadata(metadata) => ConfigOrigin::Env(env_var_name(&error.path)),
        _ if has_inline => ConfigOrigin::Inline,
        _ => ConfigOrigin::Unknown,
    }
}

/// The variable that sets `path`, e.g. `ZAPFLOW_POLLER_QR_INTERVAL_SECS`.
pub fn env_var_name<S: AsRef<str>>(path: &[S]) -> String {
    let joined = path
        .iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<&str>>()
        .join("_");
    format!("{}{}", loader::ENV_PREFIX, joined.to_ascii_uppercase())
}

/// Closest candidate to `unknown`, if any is close enough.
pub fn closest<'a>(unknown: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (*candidate, strsim::jaro_winkler(unknown, candidate)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

/// At the top level only sections are valid, so an unknown variable there
/// is a misspelled section followed by its key (`poler_qr_interval_secs`).
fn suggest_env_var(parents: &[String], field: &str, expected: &[&str]) -> Option<String> {
    if parents.is_empty() {
        let (head, rest) = field.split_once('_')?;
        let section = closest(head, expected)?;
        return Some(env_var_name(&[section, rest]));
    }
    let key = closest(field, expected)?;
    let mut path: Vec<&str> = parents.iter().map(String::as_str).collect();
    path.push(key);
    Some(env_var_name(&path))
}

fn env_advice(suggestion: Option<&str>) -> String {
    let reserved = loader::CLI_ONLY_ENV
        .iter()
        .map(|name| env_var_name(&[name]))
        .collect::<Vec<_>>()
        .join(", ");
    let mut advice = String::new();
    if let Some(suggestion) = suggestion {
        let _ = write!(advice, "did you mean `{suggestion}`? ");
    }
    let _ = write!(
        advice,
        "{}<SECTION>_<KEY> variables override config keys; rename or unset this one \
         ({reserved} is read by the CLI only)",
        loader::ENV_PREFIX
    );
    advice
}

fn file_advice(parents: &[String], suggestion: Option<&str>, expected: &[&str]) -> String {
    let scope = if parents.is_empty() {
        "sections".to_string()
    } else {
        format!("keys in [{}]", parents.join("."))
    };
    let valid = format!("valid {scope}: {}", expected.join(", "));
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {valid}"),
        None => valid,
    }
}

/// Source snippet and span for errors read from TOML text.
fn locate(
    origin: &ConfigOrigin,
    inline: Option<&str>,
    path: &[String],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let (name, text) = match origin {
        ConfigOrigin::File(file) => (
            file.display().to_string(),
            std::fs::read_to_string(file).ok()?,
        ),
        ConfigOrigin::Inline => ("<inline>".to_string(), inline?.to_string()),
        ConfigOrigin::Env(_) | ConfigOrigin::Unknown => return None,
    };
    let offset = key_offset(&text, path)?;
    let len = path.last().map_or(0, String::len);
    Some((SourceSpan::from((offset, len)), NamedSource::new(name, text)))
}

/// Byte offset of the last segment of `path` in `content`.
///
/// Keys are matched under their `[section]` header. A top-level name also
/// matches a table header, which is how an unknown section is written.
pub fn key_offset(content: &str, path: &[String]) -> Option<usize> {
    let (key, parents) = path.split_last()?;
    let section = parents.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let start = offset + (line.len() - trimmed.len());
        offset += line.len();

        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header.split(']').next().unwrap_or_default();
            let padding = name.len() - name.trim_start().len();
            if parents.is_empty() && name.trim() == key {
                return Some(start + 1 + padding);
            }
            current = name.trim().to_string();
        } else if current == section
            && trimmed
                .split_once('=')
                .is_some_and(|(lhs, _)| lhs.trim_end() == key)
        {
            return Some(start);
        }
    }
    None
}

/// All errors as one report, in miette's graphical format.
pub fn render_report(errors: &[ConfigError]) -> String {
    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        if handler.render_report(&mut out, error).is_err() {
            let _ = writeln!(out, "Error: {error}");
        }
    }
    out
}

/// Writes [`render_report`] to stderr.
pub fn render_errors(errors: &[ConfigError]) {
    eprint!("{}", render_report(errors));
}
