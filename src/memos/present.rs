//! Client-facing memo representation.
//!
//! This is the only place stored attachments become served attachments, so
//! every read path (capture, fetch, list, edit, add-media) signs URLs the
//! same way and no response ever leaks an object path.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Memo, MemoStatus};
use crate::attachments::{ServedAttachment, ServedMedia, StoredAttachment, StoredMedia};
use crate::storage::ObjectStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoView {
    pub id: Uuid,
    pub content: Option<String>,
    pub audio_url: String,
    pub project_id: Option<Uuid>,
    pub status: MemoStatus,
    pub attachments: Vec<ServedAttachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn present_memo(
    storage: &dyn ObjectStorage,
    ttl: Duration,
    memo: Memo,
) -> Result<MemoView> {
    let audio_url = storage
        .presign_get_object(&memo.audio_path, ttl)
        .await
        .with_context(|| format!("failed to sign audio for memo {}", memo.id))?;

    let mut attachments = Vec::with_capacity(memo.attachments.len());
    for attachment in memo.attachments {
        attachments.push(serve_attachment(storage, ttl, attachment).await?);
    }

    Ok(MemoView {
        id: memo.id,
        content: memo.content,
        audio_url,
        project_id: memo.project_id,
        status: memo.status,
        attachments,
        created_at: memo.created_at,
        updated_at: memo.updated_at,
    })
}

pub async fn present_memos(
    storage: &dyn ObjectStorage,
    ttl: Duration,
    memos: Vec<Memo>,
) -> Result<Vec<MemoView>> {
    try_join_all(
        memos
            .into_iter()
            .map(|memo| present_memo(storage, ttl, memo)),
    )
    .await
}

async fn serve_attachment(
    storage: &dyn ObjectStorage,
    ttl: Duration,
    attachment: StoredAttachment,
) -> Result<ServedAttachment> {
    let served = match attachment {
        StoredAttachment::Image(media) => ServedAttachment::Image(sign(storage, ttl, media).await?),
        StoredAttachment::Video(media) => ServedAttachment::Video(sign(storage, ttl, media).await?),
        StoredAttachment::Location(point) => ServedAttachment::Location(point),
    };
    Ok(served)
}

async fn sign(
    storage: &dyn ObjectStorage,
    ttl: Duration,
    media: StoredMedia,
) -> Result<ServedMedia> {
    let url = storage
        .presign_get_object(&media.path, ttl)
        .await
        .with_context(|| format!("failed to sign attachment {}", media.path))?;
    Ok(ServedMedia {
        url,
        mime: media.mime,
        created_at: media.created_at,
    })
}
