//! Rewrites Containerfiles so package traffic goes through the proxies.
//!
//! A build file carries two sentinel lines. Everything after
//! `#<cachito-disable>` runs with public DNS only, and everything after
//! `#<cachito-proxy>` runs with resolution removed and the proxy
//! environment exported.

use crate::core::locator::PIP_REPO_PLACEHOLDER;
use crate::domain::model::{InterceptedFile, ServiceSet};
use crate::utils::error::{ConstructorError, Result};
use crate::utils::logger::LogContext;
use std::fs;
use std::path::{Path, PathBuf};

pub const DISABLE_MARKER: &str = "#<cachito-disable>";
pub const PROXY_MARKER: &str = "#<cachito-proxy>";
pub const INTERCEPTED_FILE_NAME: &str = "Containerfile.intercepted";

const DISABLE_BLOCK: &str = "RUN set -x \\\n    \
    && echo \"nameserver 1.1.1.1\" > /etc/resolv.conf \\\n    \
    && echo \"nameserver 8.8.8.8\" >> /etc/resolv.conf\n";

const PROXY_PREAMBLE: &str = "RUN set -x \\\n    \
    && rm -f /etc/resolv.conf \\\n    \
    && pip config --global set global.no-binary :all:\n";

/// Characters a Containerfile expands inside a double-quoted `ENV` value.
const ENV_SPECIALS: &[char] = &['\\', '"', '$'];

/// Fills in the pip repository name left open by service discovery.
pub fn resolve_repo_name(value: &str, repo_name: &str) -> String {
    value.replace(PIP_REPO_PLACEHOLDER, repo_name)
}

/// Backslash-escapes every character of `specials` found in `value`.
pub(crate) fn escape(value: &str, specials: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if specials.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub struct Interceptor {
    repo_name: String,
    log: LogContext,
}

impl Interceptor {
    pub fn new(repo_name: impl Into<String>, log: LogContext) -> Self {
        Self {
            repo_name: repo_name.into(),
            log: log.component("interceptor"),
        }
    }

    /// Splits `path` around its markers and renders both blocks. Touches nothing on disk.
    pub fn prepare(&self, path: &Path, services: &ServiceSet) -> Result<InterceptedFile> {
        let content = fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();

        let disable = find_marker(path, &lines, DISABLE_MARKER)?;
        let proxy = find_marker(path, &lines, PROXY_MARKER)?;
        if disable >= proxy {
            return Err(ConstructorError::interception(
                path,
                format!(
                    "'{}' (line {}) must come before '{}' (line {})",
                    DISABLE_MARKER,
                    disable + 1,
                    PROXY_MARKER,
                    proxy + 1
                ),
            ));
        }

        let source_path = absolute(path)?;
        let generated_path = source_path
            .parent()
            .map(|dir| dir.join(INTERCEPTED_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(INTERCEPTED_FILE_NAME));

        Ok(InterceptedFile {
            source_path,
            generated_path,
            before_disable: region(&lines[..disable]),
            disable_block: DISABLE_BLOCK.to_string(),
            between: region(&lines[disable + 1..proxy]),
            proxy_block: self.proxy_block(services),
            after_proxy: region(&lines[proxy + 1..]),
        })
    }

    /// Writes the intercepted file next to `path` and returns its absolute path.
    pub fn intercept(&self, path: &Path, services: &ServiceSet) -> Result<PathBuf> {
        let file = self.prepare(path, services)?;
        fs::write(&file.generated_path, file.render())?;
        tracing::info!(
            parent: self.log.span(),
            "Intercepted {} -> {}",
            file.source_path.display(),
            file.generated_path.display()
        );
        Ok(file.generated_path)
    }

    fn proxy_block(&self, services: &ServiceSet) -> String {
        let mut block = String::from(PROXY_PREAMBLE);
        for (key, value) in services.merged_env() {
            let value = resolve_repo_name(&value, &self.repo_name);
            block.push_str(&format!(
                "ENV {}=\"{}\"\n",
                key,
                escape(&value, ENV_SPECIALS)
            ));
        }
        block
    }
}

fn find_marker(path: &Path, lines: &[&str], marker: &str) -> Result<usize> {
    let mut found = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == marker)
        .map(|(index, _)| index);

    let Some(index) = found.next() else {
        return Err(ConstructorError::interception(
            path,
            format!("add a '{}' line to the file", marker),
        ));
    };
    if let Some(duplicate) = found.next() {
        return Err(ConstructorError::interception(
            path,
            format!(
                "'{}' appears more than once (lines {} and {})",
                marker,
                index + 1,
                duplicate + 1
            ),
        ));
    }
    Ok(index)
}

fn region(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{}\n", line)).collect()
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
