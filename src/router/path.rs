//! Path template compiler.
//!
//! Turns a template such as `/user/{id:int}/posts/{page?:int:1}` into an
//! anchored regular expression plus an ordered list of [`ParamDescriptor`]s,
//! one per capturing group.
//!
//! Token grammar (`{...}`):
//!
//! | Form                  | Meaning                                          |
//! |-----------------------|--------------------------------------------------|
//! | `{name}`              | `str` parameter                                  |
//! | `{name:type}`         | typed parameter (`str`, `int`, `float`, `bool`, `date`) |
//! | `{name:default}`      | `str` parameter with a default (when not a type) |
//! | `{name:type:default}` | typed parameter with a validated default         |
//!
//! A trailing `?` on the name marks the parameter optional. An optional
//! parameter directly after a `/` absorbs that slash, so `/user/{id?}` matches
//! both `/user` and `/user/42`.

use super::param::{ParamDescriptor, ParamType};
use crate::errors::RouteConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

#[allow(clippy::expect_used)]
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([^:{}]+)(?::([^:{}]+))?(?::([^:{}]+))?\}").expect("token grammar is valid")
});

/// Result of compiling a path template
#[derive(Debug, Clone)]
pub struct CompiledPath {
    /// The normalized template this was compiled from
    pub template: String,
    /// Anchored regex source (`^...$`)
    pub pattern: String,
    /// Route table key: the literal path for exact routes, otherwise the pattern
    pub key: String,
    /// One descriptor per capturing group, in order of appearance
    pub params: Vec<ParamDescriptor>,
    /// True when the template has no parameters and no wildcard
    pub is_exact: bool,
    /// True when a trailing file-path wildcard was appended
    pub has_wildcard: bool,
}

impl CompiledPath {
    /// Compile the pattern into a [`Regex`]
    pub fn regex(&self) -> Result<Regex, RouteConfigError> {
        Regex::new(&self.pattern).map_err(|e| RouteConfigError::InvalidPattern {
            pattern: self.pattern.clone(),
            message: e.to_string(),
        })
    }

    /// Append the trailing file-path wildcard used by static and webapp routes
    ///
    /// The template's trailing `/` is dropped and one extra capture group is
    /// added. With `permissive` the remainder is `(/.*)?`, otherwise it must
    /// name at least one segment: `(/[^/]+.*)?`.
    #[must_use]
    pub fn with_wildcard(mut self, permissive: bool) -> Self {
        let mut body = self
            .pattern
            .trim_start_matches('^')
            .trim_end_matches('$')
            .to_string();
        while body.ends_with('/') {
            body.pop();
        }
        let tail = if permissive { "(/.*)?" } else { "(/[^/]+.*)?" };
        self.pattern = format!("^{body}{tail}$");
        self.key = self.pattern.clone();
        self.is_exact = false;
        self.has_wildcard = true;
        self
    }
}

/// Join a parent path and a child path segment
///
/// Both sides are normalized to a leading `/` without a trailing one, so
/// `join_paths("/api/", "v1")` yields `/api/v1` and a root parent adds nothing.
#[must_use]
pub fn join_paths(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_matches('/');
    match (parent.is_empty(), child.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{child}"),
        (false, true) => normalize_parent(parent),
        (false, false) => format!("{}/{child}", normalize_parent(parent)),
    }
}

fn normalize_parent(parent: &str) -> String {
    if parent.starts_with('/') {
        parent.to_string()
    } else {
        format!("/{parent}")
    }
}

/// Compile a full path template
///
/// # Errors
///
/// - [`RouteConfigError::MalformedTemplate`] for stray braces or empty names
/// - [`RouteConfigError::UnknownParamType`] when `{name:type:default}` names an unknown type
/// - [`RouteConfigError::InvalidDefault`] when a default does not fully match
///   its type's sub-pattern, or matches but fails conversion
pub fn compile_path(template: &str) -> Result<CompiledPath, RouteConfigError> {
    let mut pattern = String::with_capacity(template.len() + 16);
    let mut params = Vec::new();
    let mut cursor = 0;

    pattern.push('^');
    for caps in TOKEN_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = &template[cursor..whole.start()];
        check_literal(template, literal)?;

        let descriptor = parse_token(
            template,
            caps.get(1).map_or("", |m| m.as_str()),
            caps.get(2).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()),
        )?;
        let sub = descriptor.kind.pattern();

        if descriptor.optional && literal.ends_with('/') {
            pattern.push_str(&regex::escape(&literal[..literal.len() - 1]));
            pattern.push_str("(?:/(");
            pattern.push_str(sub);
            pattern.push_str("))?");
        } else {
            pattern.push_str(&regex::escape(literal));
            pattern.push('(');
            pattern.push_str(sub);
            pattern.push(')');
            if descriptor.optional {
                pattern.push('?');
            }
        }

        params.push(descriptor);
        cursor = whole.end();
    }

    let rest = &template[cursor..];
    check_literal(template, rest)?;
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    let is_exact = params.is_empty();
    let key = if is_exact {
        template.to_string()
    } else {
        pattern.clone()
    };

    Ok(CompiledPath {
        template: template.to_string(),
        pattern,
        key,
        params,
        is_exact,
        has_wildcard: false,
    })
}

fn check_literal(template: &str, literal: &str) -> Result<(), RouteConfigError> {
    if literal.contains(['{', '}']) {
        return Err(RouteConfigError::MalformedTemplate {
            template: template.to_string(),
            reason: format!("unmatched brace or empty token near '{literal}'"),
        });
    }
    Ok(())
}

fn parse_token(
    template: &str,
    raw_name: &str,
    second: Option<&str>,
    third: Option<&str>,
) -> Result<ParamDescriptor, RouteConfigError> {
    let trimmed = raw_name.trim();
    let (name, optional) = match trimmed.strip_suffix('?') {
        Some(stripped) => (stripped.trim(), true),
        None => (trimmed, false),
    };
    if name.is_empty() || name.contains('/') {
        return Err(RouteConfigError::MalformedTemplate {
            template: template.to_string(),
            reason: format!("invalid parameter name '{raw_name}'"),
        });
    }

    let (kind, default) = match (second, third) {
        (None, _) => (ParamType::Str, None),
        (Some(second), None) => match ParamType::from_name(second) {
            Some(kind) => (kind, None),
            None => (ParamType::Str, Some(second)),
        },
        (Some(type_name), Some(default)) => {
            let kind = ParamType::from_name(type_name).ok_or_else(|| {
                RouteConfigError::UnknownParamType {
                    template: template.to_string(),
                    param: name.to_string(),
                    kind: type_name.to_string(),
                }
            })?;
            (kind, Some(default))
        }
    };

    let default = default
        .map(|raw| validate_default(template, name, kind, raw))
        .transpose()?;

    Ok(ParamDescriptor {
        key: Arc::from(name),
        kind,
        default,
        optional,
    })
}

fn validate_default(
    template: &str,
    name: &str,
    kind: ParamType,
    raw: &str,
) -> Result<super::ParamValue, RouteConfigError> {
    let invalid = || RouteConfigError::InvalidDefault {
        template: template.to_string(),
        param: name.to_string(),
        kind,
        value: raw.to_string(),
    };
    let full = Regex::new(&format!("^(?:{})$", kind.pattern())).map_err(|_| invalid())?;
    if !full.is_match(raw) {
        return Err(invalid());
    }
    kind.convert(raw).map_err(|_| invalid())
}
