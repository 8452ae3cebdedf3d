use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::{AccountStore, MemoStore};
use crate::attachments::StoredAttachment;
use crate::db::PgPool;
use crate::memos::{Memo, MemoChanges, MemoFilter, MemoStatus, NewMemo, ProjectFilter};
use crate::models::{MemoRow, NewMemoRow, NewProject, NewRefreshToken, NewUser, Project, User};
use crate::schema::{memos, projects, refresh_tokens, users};

/// Diesel-backed store. Blocking queries run on tokio's blocking pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(AsChangeset)]
#[diesel(table_name = memos)]
struct MemoChangeset<'a> {
    content: Option<Option<&'a str>>,
    project_id: Option<Option<Uuid>>,
    status: Option<&'a str>,
    updated_at: NaiveDateTime,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            op(&mut *conn)
        })
        .await
        .context("database task panicked")?
    }
}

fn into_memo(row: MemoRow) -> Result<Memo> {
    let status = row
        .status
        .parse::<MemoStatus>()
        .map_err(|err| anyhow!("memo {} has corrupt status: {err}", row.id))?;
    let attachments: Vec<StoredAttachment> = serde_json::from_value(row.attachments)
        .with_context(|| format!("memo {} has corrupt attachments", row.id))?;

    Ok(Memo {
        id: row.id,
        owner_id: row.owner_id,
        content: row.content,
        audio_path: row.audio_path,
        project_id: row.project_id,
        status,
        attachments,
        created_at: row.created_at.and_utc(),
        updated_at: row.updated_at.and_utc(),
    })
}

fn attachments_json(attachments: &[StoredAttachment]) -> Result<Value> {
    serde_json::to_value(attachments).context("failed to encode attachments")
}

#[async_trait]
impl MemoStore for PgStore {
    async fn insert_memo(&self, memo: NewMemo) -> Result<Memo> {
        let row = NewMemoRow {
            id: memo.id,
            owner_id: memo.owner_id,
            content: None,
            audio_path: memo.audio_path,
            project_id: None,
            status: MemoStatus::Pending.as_str().to_string(),
            attachments: attachments_json(&memo.attachments)?,
        };

        let inserted = self
            .with_conn(move |conn| {
                diesel::insert_into(memos::table)
                    .values(&row)
                    .get_result::<MemoRow>(conn)
                    .context("failed to insert memo")
            })
            .await?;
        into_memo(inserted)
    }

    async fn find_memo(&self, owner_id: Uuid, memo_id: Uuid) -> Result<Option<Memo>> {
        let row = self
            .with_conn(move |conn| {
                memos::table
                    .find(memo_id)
                    .filter(memos::owner_id.eq(owner_id))
                    .first::<MemoRow>(conn)
                    .optional()
                    .context("failed to load memo")
            })
            .await?;
        row.map(into_memo).transpose()
    }

    async fn list_memos(&self, owner_id: Uuid, filter: &MemoFilter) -> Result<Vec<Memo>> {
        let filter = filter.clone();
        let rows = self
            .with_conn(move |conn| {
                let mut query = memos::table
                    .filter(memos::owner_id.eq(owner_id))
                    .into_boxed();

                if let Some(status) = filter.status {
                    query = query.filter(memos::status.eq(status.as_str()));
                }
                match filter.project {
                    Some(ProjectFilter::Inbox) => {
                        query = query.filter(memos::project_id.is_null());
                    }
                    Some(ProjectFilter::Project(project_id)) => {
                        query = query.filter(memos::project_id.eq(project_id));
                    }
                    None => {}
                }

                query
                    .order((memos::created_at.desc(), memos::id.desc()))
                    .load::<MemoRow>(conn)
                    .context("failed to list memos")
            })
            .await?;
        rows.into_iter().map(into_memo).collect()
    }

    async fn record_transcript(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        content: &str,
    ) -> Result<Option<Memo>> {
        let content = content.to_string();
        let row = self
            .with_conn(move |conn| {
                diesel::update(
                    memos::table
                        .find(memo_id)
                        .filter(memos::owner_id.eq(owner_id))
                        .filter(memos::status.eq(MemoStatus::Pending.as_str())),
                )
                .set((
                    memos::content.eq(Some(content)),
                    memos::status.eq(MemoStatus::ReviewNeeded.as_str()),
                    memos::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result::<MemoRow>(conn)
                .optional()
                .context("failed to record transcript")
            })
            .await?;
        row.map(into_memo).transpose()
    }

    async fn update_memo(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        changes: &MemoChanges,
    ) -> Result<Option<Memo>> {
        let changes = changes.clone();
        let row = self
            .with_conn(move |conn| {
                let changeset = MemoChangeset {
                    content: changes.content.as_ref().map(|value| value.as_deref()),
                    project_id: changes.project_id,
                    status: changes.status.map(MemoStatus::as_str),
                    updated_at: Utc::now().naive_utc(),
                };
                diesel::update(
                    memos::table
                        .find(memo_id)
                        .filter(memos::owner_id.eq(owner_id)),
                )
                .set(&changeset)
                .get_result::<MemoRow>(conn)
                .optional()
                .context("failed to update memo")
            })
            .await?;
        row.map(into_memo).transpose()
    }

    async fn replace_attachments(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        attachments: &[StoredAttachment],
    ) -> Result<Option<Memo>> {
        let encoded = attachments_json(attachments)?;
        let row = self
            .with_conn(move |conn| {
                diesel::update(
                    memos::table
                        .find(memo_id)
                        .filter(memos::owner_id.eq(owner_id)),
                )
                .set((
                    memos::attachments.eq(encoded),
                    memos::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result::<MemoRow>(conn)
                .optional()
                .context("failed to store attachments")
            })
            .await?;
        row.map(into_memo).transpose()
    }

    async fn delete_memo(&self, owner_id: Uuid, memo_id: Uuid) -> Result<bool> {
        let removed = self
            .with_conn(move |conn| {
                diesel::delete(
                    memos::table
                        .find(memo_id)
                        .filter(memos::owner_id.eq(owner_id)),
                )
                .execute(conn)
                .context("failed to delete memo")
            })
            .await?;
        Ok(removed > 0)
    }

    async fn create_project(&self, project: NewProject) -> Result<Project> {
        self.with_conn(move |conn| {
            diesel::insert_into(projects::table)
                .values(&project)
                .get_result::<Project>(conn)
                .context("failed to create project")
        })
        .await
    }

    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> Result<Option<Project>> {
        self.with_conn(move |conn| {
            projects::table
                .find(project_id)
                .filter(projects::owner_id.eq(owner_id))
                .first::<Project>(conn)
                .optional()
                .context("failed to load project")
        })
        .await
    }

    async fn find_project_by_name(&self, owner_id: Uuid, name: &str) -> Result<Option<Project>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            projects::table
                .filter(projects::owner_id.eq(owner_id))
                .filter(projects::name.eq(name))
                .order(projects::created_at.asc())
                .first::<Project>(conn)
                .optional()
                .context("failed to look up project by name")
        })
        .await
    }

    async fn list_projects(&self, owner_id: Uuid) -> Result<Vec<Project>> {
        self.with_conn(move |conn| {
            projects::table
                .filter(projects::owner_id.eq(owner_id))
                .order((projects::name.asc(), projects::created_at.asc()))
                .load::<Project>(conn)
                .context("failed to list projects")
        })
        .await
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        self.with_conn(move |conn| {
            diesel::insert_into(users::table)
                .values(&user)
                .get_result::<User>(conn)
                .context("failed to insert user")
        })
        .await
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            users::table
                .find(user_id)
                .first::<User>(conn)
                .optional()
                .context("failed to load user")
        })
        .await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            users::table
                .filter(users::username.eq(username))
                .first::<User>(conn)
                .optional()
                .context("failed to look up user")
        })
        .await
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(refresh_tokens::table)
                .values(&token)
                .execute(conn)
                .context("failed to store refresh token")?;
            Ok(())
        })
        .await
    }

    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let token_hash = token_hash.to_string();
        let now = now.naive_utc();
        // Single UPDATE so two concurrent refreshes cannot both win.
        self.with_conn(move |conn| {
            diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::token_hash.eq(token_hash))
                    .filter(refresh_tokens::revoked_at.is_null())
                    .filter(refresh_tokens::expires_at.gt(now)),
            )
            .set((
                refresh_tokens::revoked_at.eq(now),
                refresh_tokens::updated_at.eq(now),
            ))
            .returning(refresh_tokens::user_id)
            .get_result::<Uuid>(conn)
            .optional()
            .context("failed to consume refresh token")
        })
        .await
    }

    async fn revoke_refresh_tokens(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let token_hash = token_hash.map(str::to_string);
        let now = now.naive_utc();
        self.with_conn(move |conn| {
            let mut target = refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user_id))
                .filter(refresh_tokens::revoked_at.is_null())
                .into_boxed();
            if let Some(hash) = token_hash {
                target = target.filter(refresh_tokens::token_hash.eq(hash));
            }
            let ids: Vec<Uuid> = target
                .select(refresh_tokens::id)
                .load(conn)
                .context("failed to find refresh tokens")?;

            diesel::update(refresh_tokens::table.filter(refresh_tokens::id.eq_any(ids)))
                .set((
                    refresh_tokens::revoked_at.eq(now),
                    refresh_tokens::updated_at.eq(now),
                ))
                .execute(conn)
                .context("failed to revoke refresh tokens")
        })
        .await
    }
}
