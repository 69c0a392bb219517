use std::sync::atomic::{AtomicUsize, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use import_logging::{human_size, import_info};
use serde_json::json;
use thiserror::Error;

use crate::fetch::USER_AGENT;

const SUPPORTED_TYPES: &[&str] = &["github"];

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Missing GITHUB_TOKEN environment variable.")]
    MissingToken,
    #[error("invalid persist target (expected type:username/repository): {0:?}")]
    InvalidTarget(String),
    #[error("invalid persist type: {0}")]
    UnsupportedType(String),
    #[error("missing persist target, call set_target() first")]
    MissingTarget,
    #[error("upload failed for {path}: {message}")]
    Upload { path: String, message: String },
    #[error("upload rejected for {path}: http status {status}")]
    Status { path: String, status: u16 },
}

/// A parsed `type:username/repository#branch` target spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistTarget {
    pub kind: String,
    pub username: String,
    pub repository: String,
    pub branch: Option<String>,
}

impl PersistTarget {
    pub fn parse(target: &str) -> Result<Self, PersistError> {
        let invalid = || PersistError::InvalidTarget(target.to_string());

        let (kind, remainder) = target.split_once(':').ok_or_else(invalid)?;
        let (username, repository) = remainder.split_once('/').ok_or_else(invalid)?;
        let (repository, branch) = match repository.split_once('#') {
            Some((name, branch)) => (name, Some(branch.to_string())),
            None => (repository, None),
        };

        if kind.is_empty() || username.is_empty() || repository.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            kind: kind.to_string(),
            username: username.to_string(),
            repository: repository.to_string(),
            branch,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PersistMetadata {
    /// Remote URL the content came from, recorded in the commit message.
    pub url: Option<String>,
    /// What is being persisted ("asset", "file"), for the log line.
    pub kind: Option<String>,
}

/// Optional remote publication of written files to a version-controlled
/// host. Currently GitHub via the contents API.
pub struct Persist {
    target: Option<PersistTarget>,
    token: Option<String>,
    verbose: bool,
    dry_run: bool,
    persist_count: AtomicUsize,
    client: reqwest::Client,
}

impl Default for Persist {
    fn default() -> Self {
        Self::new()
    }
}

impl Persist {
    pub fn new() -> Self {
        Self {
            target: None,
            token: None,
            verbose: true,
            dry_run: false,
            persist_count: AtomicUsize::new(0),
            client: reqwest::Client::new(),
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Configures the upload target. Fails fast on a malformed spec, an
    /// unsupported host type, or a missing `GITHUB_TOKEN`.
    pub fn set_target(&mut self, target: &str) -> Result<(), PersistError> {
        // Must have a token to use this feature.
        let token = std::env::var("GITHUB_TOKEN").map_err(|_| PersistError::MissingToken)?;

        let parsed = PersistTarget::parse(target)?;
        if !SUPPORTED_TYPES.contains(&parsed.kind.as_str()) {
            return Err(PersistError::UnsupportedType(parsed.kind));
        }

        self.token = Some(token);
        self.target = Some(parsed);
        Ok(())
    }

    /// Has `set_target` been successful?
    pub fn can_persist(&self) -> bool {
        self.target.is_some() && self.token.is_some()
    }

    pub fn counts(&self) -> usize {
        self.persist_count.load(Ordering::Relaxed)
    }

    /// Uploads one file, overwriting unconditionally. Local safe mode
    /// already decided whether the file was written at all, so remote
    /// persistence does not re-check existence.
    pub async fn persist_file(
        &self,
        file_path: &str,
        content: &[u8],
        metadata: PersistMetadata,
    ) -> Result<(), PersistError> {
        if self.dry_run {
            // Skipping; not worth a log line.
            return Ok(());
        }

        let target = self.target.as_ref().ok_or(PersistError::MissingTarget)?;
        let token = self.token.as_ref().ok_or(PersistError::MissingToken)?;

        self.persist_count.fetch_add(1, Ordering::Relaxed);

        if self.verbose {
            let kind = metadata.kind.as_deref().unwrap_or("file");
            let from = metadata
                .url
                .as_deref()
                .map(|url| format!(" from {url}"))
                .unwrap_or_default();
            import_info!(
                "Persisting {kind} to GitHub {file_path} ({}){from}",
                human_size(content.len())
            );
        }

        let contents_url = format!(
            "https://api.github.com/repos/{}/{}/contents/{file_path}",
            target.username, target.repository
        );

        // Overwrites require the current blob sha.
        let existing_sha = self.existing_sha(&contents_url, target, token).await;

        let message = match &metadata.url {
            Some(url) => format!("eleventy-import via {url}"),
            None => "eleventy-import".to_string(),
        };

        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content),
        });
        if let Some(branch) = &target.branch {
            body["branch"] = json!(branch);
        }
        if let Some(sha) = existing_sha {
            body["sha"] = json!(sha);
        }

        let response = self
            .client
            .put(&contents_url)
            .bearer_auth(token)
            .header("user-agent", USER_AGENT)
            .header("accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|err| PersistError::Upload {
                path: file_path.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::Status {
                path: file_path.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    async fn existing_sha(
        &self,
        contents_url: &str,
        target: &PersistTarget,
        token: &str,
    ) -> Option<String> {
        let mut request = self
            .client
            .get(contents_url)
            .bearer_auth(token)
            .header("user-agent", USER_AGENT)
            .header("accept", "application/vnd.github+json");
        if let Some(branch) = &target.branch {
            request = request.query(&[("ref", branch)]);
        }

        let response = request.send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let value: serde_json::Value = response.json().await.ok()?;
        value.get("sha")?.as_str().map(|sha| sha.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_spec() {
        let target = PersistTarget::parse("github:user/repo").unwrap();
        assert_eq!(target.kind, "github");
        assert_eq!(target.username, "user");
        assert_eq!(target.repository, "repo");
        assert_eq!(target.branch, None);

        let with_branch = PersistTarget::parse("github:user/repo#main").unwrap();
        assert_eq!(with_branch.branch.as_deref(), Some("main"));
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!(PersistTarget::parse("github").is_err());
        assert!(PersistTarget::parse("github:user").is_err());
        assert!(PersistTarget::parse(":user/repo").is_err());
        assert!(PersistTarget::parse("").is_err());
    }

    #[test]
    fn cannot_persist_without_target() {
        let persist = Persist::new();
        assert!(!persist.can_persist());
    }
}
