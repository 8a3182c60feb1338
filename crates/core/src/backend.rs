//! Local implementation of the snippet backend tables declared in
//! [`crate::schema`], persisted as a single JSON document.

use crate::schema::{
    CodeExecution, CommentId, ExecutionId, NewExecution, Snippet, SnippetComment, SnippetId, Star,
    User,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend data invalid: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Per-user execution and star statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_executions: usize,
    pub languages_count: usize,
    pub languages: Vec<String>,
    pub favorite_language: Option<String>,
    pub last_24_hours: usize,
    pub starred_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalBackend {
    #[serde(default)]
    users: BTreeMap<String, User>,
    #[serde(default)]
    code_executions: BTreeMap<ExecutionId, CodeExecution>,
    #[serde(default)]
    snippets: BTreeMap<SnippetId, Snippet>,
    #[serde(default)]
    snippet_comments: BTreeMap<CommentId, SnippetComment>,
    /// userId -> snippetId -> star
    #[serde(default)]
    stars: BTreeMap<String, BTreeMap<SnippetId, Star>>,
    #[serde(default)]
    next_id: u64,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a backend file, starting empty when it does not exist.
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), BackendError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Inserts the user or refreshes their email and name.
    pub fn sync_user(&mut self, user_id: &str, email: &str, name: &str) -> &User {
        self.users
            .entry(user_id.to_string())
            .and_modify(|u| {
                u.email = email.to_string();
                u.name = name.to_string();
            })
            .or_insert_with(|| User {
                user_id: user_id.to_string(),
                email: email.to_string(),
                name: name.to_string(),
                creation_time: now_millis(),
            })
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.get(user_id)
    }

    fn require_user(&self, user_id: &str) -> Result<&User, BackendError> {
        self.user(user_id)
            .ok_or_else(|| BackendError::NotFound(format!("user {user_id}")))
    }

    fn require_snippet(&self, id: SnippetId) -> Result<&Snippet, BackendError> {
        self.snippets
            .get(&id)
            .ok_or_else(|| BackendError::NotFound(format!("snippet {id}")))
    }

    pub fn save_execution(
        &mut self,
        user_id: &str,
        execution: NewExecution,
    ) -> Result<ExecutionId, BackendError> {
        self.require_user(user_id)?;
        let id = ExecutionId(self.allocate_id());
        self.code_executions.insert(
            id,
            CodeExecution {
                id,
                user_id: user_id.to_string(),
                language: execution.language,
                code: execution.code,
                output: execution.output,
                error: execution.error,
                creation_time: now_millis(),
            },
        );
        Ok(id)
    }

    /// Executions of one user, newest first.
    pub fn executions_for_user(&self, user_id: &str) -> Vec<&CodeExecution> {
        let mut rows: Vec<_> = self
            .code_executions
            .values()
            .filter(|e| e.user_id == user_id)
            .collect();
        rows.sort_by(|a, b| b.creation_time.cmp(&a.creation_time).then(b.id.cmp(&a.id)));
        rows
    }

    pub fn user_stats(&self, user_id: &str) -> UserStats {
        self.user_stats_at(user_id, now_millis())
    }

    fn user_stats_at(&self, user_id: &str, now: u64) -> UserStats {
        let executions = self.executions_for_user(user_id);
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for e in &executions {
            *counts.entry(e.language.as_str()).or_default() += 1;
        }
        // ties go to the alphabetically first language
        let favorite_language = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(lang, _)| lang.to_string());

        UserStats {
            total_executions: executions.len(),
            languages_count: counts.len(),
            languages: counts.keys().map(|l| l.to_string()).collect(),
            favorite_language,
            last_24_hours: executions
                .iter()
                .filter(|e| now.saturating_sub(e.creation_time) <= DAY_MS)
                .count(),
            starred_count: self.starred_snippets(user_id).len(),
        }
    }

    /// Shares a snippet under the user's display name.
    pub fn create_snippet(
        &mut self,
        user_id: &str,
        title: &str,
        language: &str,
        code: &str,
    ) -> Result<SnippetId, BackendError> {
        let user_name = self.require_user(user_id)?.name.clone();
        let id = SnippetId(self.allocate_id());
        self.snippets.insert(
            id,
            Snippet {
                id,
                user_id: user_id.to_string(),
                title: title.to_string(),
                language: language.to_string(),
                code: code.to_string(),
                user_name,
                creation_time: now_millis(),
            },
        );
        Ok(id)
    }

    pub fn snippet(&self, id: SnippetId) -> Option<&Snippet> {
        self.snippets.get(&id)
    }

    /// All snippets, newest first.
    pub fn snippets(&self) -> Vec<&Snippet> {
        let mut rows: Vec<_> = self.snippets.values().collect();
        rows.sort_by(|a, b| b.creation_time.cmp(&a.creation_time).then(b.id.cmp(&a.id)));
        rows
    }

    pub fn snippets_for_user(&self, user_id: &str) -> Vec<&Snippet> {
        self.snippets()
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .collect()
    }

    /// Deletes a snippet along with its comments and stars. Only the owner
    /// may delete.
    pub fn delete_snippet(&mut self, user_id: &str, id: SnippetId) -> Result<(), BackendError> {
        if self.require_snippet(id)?.user_id != user_id {
            return Err(BackendError::Unauthorized(format!(
                "snippet {id} belongs to another user"
            )));
        }
        self.snippet_comments.retain(|_, c| c.snippet_id != id);
        for starred in self.stars.values_mut() {
            starred.remove(&id);
        }
        self.stars.retain(|_, starred| !starred.is_empty());
        self.snippets.remove(&id);
        Ok(())
    }

    pub fn add_comment(
        &mut self,
        user_id: &str,
        snippet_id: SnippetId,
        content: &str,
    ) -> Result<CommentId, BackendError> {
        let username = self.require_user(user_id)?.name.clone();
        self.require_snippet(snippet_id)?;
        let id = CommentId(self.allocate_id());
        self.snippet_comments.insert(
            id,
            SnippetComment {
                id,
                snippet_id,
                user_id: user_id.to_string(),
                username,
                content: content.to_string(),
                creation_time: now_millis(),
            },
        );
        Ok(id)
    }

    /// Comments on a snippet, newest first.
    pub fn comments(&self, snippet_id: SnippetId) -> Vec<&SnippetComment> {
        let mut rows: Vec<_> = self
            .snippet_comments
            .values()
            .filter(|c| c.snippet_id == snippet_id)
            .collect();
        rows.sort_by(|a, b| b.creation_time.cmp(&a.creation_time).then(b.id.cmp(&a.id)));
        rows
    }

    pub fn delete_comment(&mut self, user_id: &str, id: CommentId) -> Result<(), BackendError> {
        let comment = self
            .snippet_comments
            .get(&id)
            .ok_or_else(|| BackendError::NotFound(format!("comment {id}")))?;
        if comment.user_id != user_id {
            return Err(BackendError::Unauthorized(format!(
                "comment {id} belongs to another user"
            )));
        }
        self.snippet_comments.remove(&id);
        Ok(())
    }

    /// Stars the snippet for `user_id`, or removes the star when present.
    /// Returns whether the snippet is starred afterwards.
    pub fn toggle_star(
        &mut self,
        user_id: &str,
        snippet_id: SnippetId,
    ) -> Result<bool, BackendError> {
        self.require_user(user_id)?;
        self.require_snippet(snippet_id)?;
        let starred = self.stars.entry(user_id.to_string()).or_default();
        if starred.remove(&snippet_id).is_some() {
            if starred.is_empty() {
                self.stars.remove(user_id);
            }
            return Ok(false);
        }
        starred.insert(
            snippet_id,
            Star {
                snippet_id,
                user_id: user_id.to_string(),
                creation_time: now_millis(),
            },
        );
        Ok(true)
    }

    pub fn is_starred(&self, user_id: &str, snippet_id: SnippetId) -> bool {
        self.stars
            .get(user_id)
            .is_some_and(|starred| starred.contains_key(&snippet_id))
    }

    pub fn star_count(&self, snippet_id: SnippetId) -> usize {
        self.stars
            .values()
            .filter(|starred| starred.contains_key(&snippet_id))
            .count()
    }

    pub fn starred_snippets(&self, user_id: &str) -> Vec<&Snippet> {
        let ids: BTreeSet<SnippetId> = self
            .stars
            .get(user_id)
            .map(|starred| starred.keys().copied().collect())
            .unwrap_or_default();
        self.snippets()
            .into_iter()
            .filter(|s| ids.contains(&s.id))
            .collect()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
