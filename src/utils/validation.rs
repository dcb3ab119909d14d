use crate::utils::error::{ConstructorError, Result};
use regex::Regex;
use std::path::{Component, Path};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

const VERSION_PATTERN: &str = r"^\d+(\.\d+)*$";
const PINNED_REQUIREMENT_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*==\d+(\.\d+)*$";
const PATH_SEGMENT_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";
const SCP_LIKE_PATTERN: &str = r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[^\s]+$";

fn matches(pattern: &str, value: &str) -> Result<bool> {
    let re = Regex::new(pattern).map_err(|e| ConstructorError::validation(pattern, e.to_string()))?;
    Ok(re.is_match(value))
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConstructorError::validation(
            field_name,
            "value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    validate_non_empty_string(field_name, path)?;

    if path.contains('\0') {
        return Err(ConstructorError::validation(field_name, "path contains null bytes"));
    }

    Ok(())
}

/// A path that must stay below the directory it is joined onto.
pub fn validate_relative_path(field_name: &str, path: &str) -> Result<()> {
    validate_path(field_name, path)?;

    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(ConstructorError::validation(
            field_name,
            format!("'{}' must be a relative path", path),
        ));
    }
    if candidate.components().any(|c| c == Component::ParentDir) {
        return Err(ConstructorError::validation(
            field_name,
            format!("'{}' must not contain '..'", path),
        ));
    }

    Ok(())
}

/// A single directory name: no separators, no leading dot.
pub fn validate_path_segment(field_name: &str, value: &str) -> Result<()> {
    if !matches(PATH_SEGMENT_PATTERN, value)? {
        return Err(ConstructorError::validation(
            field_name,
            format!(
                "'{}' must start with a letter or digit and contain only letters, digits, '.', '_' or '-'",
                value
            ),
        ));
    }
    Ok(())
}

/// `major(.minor)*`, as used for python versions.
pub fn validate_version(field_name: &str, value: &str) -> Result<()> {
    if !matches(VERSION_PATTERN, value)? {
        return Err(ConstructorError::validation(
            field_name,
            format!("'{}' is not a version like 3 or 3.11", value),
        ));
    }
    Ok(())
}

/// `name==major(.minor)*`.
pub fn validate_pinned_requirement(field_name: &str, value: &str) -> Result<()> {
    if !matches(PINNED_REQUIREMENT_PATTERN, value)? {
        return Err(ConstructorError::validation(
            field_name,
            format!("'{}' must have the form name==1.2.3", value),
        ));
    }
    Ok(())
}

/// Git remote: http(s), ssh or git URL, or scp-style `user@host:path`.
pub fn validate_git_url(field_name: &str, url_str: &str) -> Result<()> {
    validate_non_empty_string(field_name, url_str)?;

    if matches(SCP_LIKE_PATTERN, url_str)? {
        return Ok(());
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" | "ssh" | "git" if url.has_host() => Ok(()),
            "http" | "https" | "ssh" | "git" => Err(ConstructorError::validation(
                field_name,
                format!("'{}' has no host", url_str),
            )),
            scheme => Err(ConstructorError::validation(
                field_name,
                format!("unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(ConstructorError::validation(
            field_name,
            format!("invalid URL format: {}", e),
        )),
    }
}
