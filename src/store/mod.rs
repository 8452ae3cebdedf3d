//! Row store seams.
//!
//! Handlers and the memo engine only see these traits; [`pg::PgStore`] is the
//! production implementation and tests substitute an in-memory one.

pub mod pg;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::attachments::StoredAttachment;
use crate::memos::{Memo, MemoChanges, MemoFilter, NewMemo};
use crate::models::{NewProject, NewRefreshToken, NewUser, Project, User};

pub use pg::PgStore;

#[async_trait]
pub trait MemoStore: Send + Sync + 'static {
    async fn insert_memo(&self, memo: NewMemo) -> Result<Memo>;

    async fn find_memo(&self, owner_id: Uuid, memo_id: Uuid) -> Result<Option<Memo>>;

    /// Newest first.
    async fn list_memos(&self, owner_id: Uuid, filter: &MemoFilter) -> Result<Vec<Memo>>;

    /// Stores a transcript and moves the memo to `review_needed`, but only if
    /// it is still `pending`. Returns `None` when nothing was updated.
    async fn record_transcript(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        content: &str,
    ) -> Result<Option<Memo>>;

    async fn update_memo(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        changes: &MemoChanges,
    ) -> Result<Option<Memo>>;

    /// Overwrites the whole attachment list.
    async fn replace_attachments(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        attachments: &[StoredAttachment],
    ) -> Result<Option<Memo>>;

    async fn delete_memo(&self, owner_id: Uuid, memo_id: Uuid) -> Result<bool>;

    async fn create_project(&self, project: NewProject) -> Result<Project>;

    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> Result<Option<Project>>;

    /// Oldest match when several projects share a name.
    async fn find_project_by_name(&self, owner_id: Uuid, name: &str) -> Result<Option<Project>>;

    async fn list_projects(&self, owner_id: Uuid) -> Result<Vec<Project>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<()>;

    /// Revokes a live refresh token and returns its owner. Each token can be
    /// consumed once; expired, revoked and unknown tokens yield `None`.
    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>>;

    /// Revokes one token (when `token_hash` is given) or every live token of
    /// the user. Returns how many were revoked.
    async fn revoke_refresh_tokens(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize>;
}
