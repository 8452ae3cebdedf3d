//! Memo lifecycle: capture, transcription, review, attachment accrual and
//! deletion.
//!
//! Every operation is owner-scoped. A memo that exists but belongs to someone
//! else is reported exactly like a memo that does not exist.

pub mod present;

use std::{str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::attachments::{
    audio_object_path, media_object_path, validate_media_batch, GeoPoint, MediaUpload,
    StoredAttachment, StoredMedia,
};
use crate::cleanup::{CleanupCoordinator, CleanupManifest};
use crate::config::{AppConfig, CaptureLimits, ProjectNamePolicy};
use crate::models::{NewProject, Project};
use crate::storage::ObjectStorage;
use crate::store::MemoStore;
use crate::transcription::{transcribe_with_timeout, AudioClip, Transcriber};
use crate::utils::json::Nullable;

pub use present::MemoView;

#[derive(Debug, Error)]
pub enum MemoError {
    #[error("memo not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("object storage failure: {0:#}")]
    Storage(anyhow::Error),
    #[error("row store failure: {0:#}")]
    Store(anyhow::Error),
}

impl MemoError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type MemoResult<T> = Result<T, MemoError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoStatus {
    Pending,
    ReviewNeeded,
    Done,
}

impl MemoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoStatus::Pending => "pending",
            MemoStatus::ReviewNeeded => "review_needed",
            MemoStatus::Done => "done",
        }
    }
}

impl FromStr for MemoStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(MemoStatus::Pending),
            "review_needed" => Ok(MemoStatus::ReviewNeeded),
            "done" => Ok(MemoStatus::Done),
            other => Err(format!(
                "invalid status '{other}' (expected pending, review_needed or done)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Memo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content: Option<String>,
    pub audio_path: String,
    pub project_id: Option<Uuid>,
    pub status: MemoStatus,
    pub attachments: Vec<StoredAttachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row inserted at capture time; status is always `pending` and content empty.
#[derive(Debug, Clone)]
pub struct NewMemo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub audio_path: String,
    pub attachments: Vec<StoredAttachment>,
}

/// Field-level changes applied by a user edit. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoChanges {
    pub content: Option<Option<String>>,
    pub project_id: Option<Option<Uuid>>,
    pub status: Option<MemoStatus>,
}

impl MemoChanges {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.project_id.is_none() && self.status.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFilter {
    Inbox,
    Project(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct MemoFilter {
    pub status: Option<MemoStatus>,
    pub project: Option<ProjectFilter>,
}

/// A partial update as received from a client.
#[derive(Debug, Clone)]
pub struct MemoPatch {
    pub content: Nullable<String>,
    pub project_id: Nullable<Uuid>,
    pub new_project_name: Option<String>,
    pub status: Option<MemoStatus>,
}

pub struct CaptureInput {
    pub audio: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub seeds: Vec<StoredAttachment>,
}

#[derive(Clone, Debug)]
pub struct MemoSettings {
    pub signed_url_ttl: Duration,
    pub transcription_timeout: Duration,
    pub limits: CaptureLimits,
    pub project_name_policy: ProjectNamePolicy,
}

impl MemoSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            signed_url_ttl: config.signed_url_ttl,
            transcription_timeout: config.transcription.timeout,
            limits: config.limits.clone(),
            project_name_policy: config.project_name_policy,
        }
    }
}

#[derive(Clone)]
pub struct MemoService {
    store: Arc<dyn MemoStore>,
    storage: Arc<dyn ObjectStorage>,
    transcriber: Option<Arc<dyn Transcriber>>,
    cleanup: CleanupCoordinator,
    settings: MemoSettings,
}

impl MemoService {
    pub fn new(
        store: Arc<dyn MemoStore>,
        storage: Arc<dyn ObjectStorage>,
        transcriber: Option<Arc<dyn Transcriber>>,
        cleanup: CleanupCoordinator,
        settings: MemoSettings,
    ) -> Self {
        Self {
            store,
            storage,
            transcriber,
            cleanup,
            settings,
        }
    }

    pub fn transcription_enabled(&self) -> bool {
        self.transcriber.is_some()
    }

    /// Stores the audio, inserts a pending memo and attempts transcription
    /// under a bounded wait. Transcription problems never fail the capture.
    pub async fn capture(&self, owner_id: Uuid, input: CaptureInput) -> MemoResult<MemoView> {
        let CaptureInput {
            audio,
            file_name,
            content_type,
            seeds,
        } = input;

        if audio.is_empty() {
            return Err(MemoError::validation("audio file must not be empty"));
        }
        if audio.len() > self.settings.limits.max_audio_bytes {
            return Err(MemoError::validation(format!(
                "audio file is {} bytes, limit is {} bytes",
                audio.len(),
                self.settings.limits.max_audio_bytes
            )));
        }

        let memo_id = Uuid::new_v4();
        let object_key = audio_object_path(owner_id, memo_id, file_name.as_deref());
        let content_type = content_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let audio_path = self
            .storage
            .put_object(&object_key, audio.clone(), Some(content_type.clone()))
            .await
            .map_err(|err| {
                error!(memo_id = %memo_id, key = %object_key, error = %err, "failed to store capture audio");
                MemoError::Storage(err)
            })?;

        let inserted = match self
            .store
            .insert_memo(NewMemo {
                id: memo_id,
                owner_id,
                audio_path: audio_path.clone(),
                attachments: seeds,
            })
            .await
        {
            Ok(memo) => memo,
            Err(err) => {
                error!(memo_id = %memo_id, error = %err, "failed to insert captured memo");
                if let Err(remove_err) = self.storage.delete_object(&audio_path).await {
                    warn!(
                        memo_id = %memo_id,
                        key = %audio_path,
                        error = %remove_err,
                        "failed to remove audio after insert failure; object orphaned"
                    );
                }
                return Err(MemoError::Store(err));
            }
        };

        let memo = self
            .transcribe_captured(inserted, &object_key, &content_type, audio)
            .await;

        info!(
            memo_id = %memo.id,
            status = memo.status.as_str(),
            attachments = memo.attachments.len(),
            "memo captured"
        );

        self.present(memo).await
    }

    async fn transcribe_captured(
        &self,
        memo: Memo,
        object_key: &str,
        content_type: &str,
        audio: Vec<u8>,
    ) -> Memo {
        let Some(transcriber) = self.transcriber.as_ref() else {
            info!(memo_id = %memo.id, "transcription not configured; memo stays pending");
            return memo;
        };

        let file_name = object_key.rsplit('/').next().unwrap_or(object_key);
        let clip = AudioClip {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes: audio,
        };

        let transcript = match transcribe_with_timeout(
            transcriber.as_ref(),
            clip,
            self.settings.transcription_timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(memo_id = %memo.id, error = %err, "transcription failed; memo stays pending");
                return memo;
            }
        };

        match self
            .store
            .record_transcript(memo.owner_id, memo.id, &transcript)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                // Edited or removed while the transcript was in flight.
                match self.store.find_memo(memo.owner_id, memo.id).await {
                    Ok(Some(current)) => current,
                    Ok(None) => memo,
                    Err(err) => {
                        warn!(memo_id = %memo.id, error = %err, "failed to re-read memo after transcript was skipped");
                        memo
                    }
                }
            }
            Err(err) => {
                warn!(memo_id = %memo.id, error = %err, "failed to record transcript; memo stays pending");
                memo
            }
        }
    }

    pub async fn get(&self, owner_id: Uuid, memo_id: Uuid) -> MemoResult<MemoView> {
        let memo = self.load_owned(owner_id, memo_id).await?;
        self.present(memo).await
    }

    pub async fn list(&self, owner_id: Uuid, filter: &MemoFilter) -> MemoResult<Vec<MemoView>> {
        let memos = self
            .store
            .list_memos(owner_id, filter)
            .await
            .map_err(MemoError::Store)?;
        present::present_memos(self.storage.as_ref(), self.settings.signed_url_ttl, memos)
            .await
            .map_err(MemoError::Storage)
    }

    pub async fn update(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        patch: MemoPatch,
    ) -> MemoResult<MemoView> {
        let existing = self.load_owned(owner_id, memo_id).await?;

        let mut changes = MemoChanges {
            content: match patch.content {
                Nullable::Omitted => None,
                Nullable::Null => Some(None),
                Nullable::Value(text) => Some(Some(text)),
            },
            project_id: None,
            status: patch.status,
        };

        let new_project_name = patch
            .new_project_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        if let Some(name) = new_project_name {
            let project = self.project_for_name(owner_id, name).await?;
            changes.project_id = Some(Some(project.id));
        } else {
            match patch.project_id {
                Nullable::Omitted => {}
                Nullable::Null => changes.project_id = Some(None),
                Nullable::Value(project_id) => {
                    self.ensure_project_owned(owner_id, project_id).await?;
                    changes.project_id = Some(Some(project_id));
                }
            }
        }

        if changes.is_empty() {
            return self.present(existing).await;
        }

        let updated = self
            .store
            .update_memo(owner_id, memo_id, &changes)
            .await
            .map_err(MemoError::Store)?
            .ok_or(MemoError::NotFound)?;

        info!(memo_id = %memo_id, status = updated.status.as_str(), "memo updated");
        self.present(updated).await
    }

    /// Removes the row, then hands the memo's objects to the cleanup
    /// coordinator. The row is gone once this returns, whatever cleanup does.
    pub async fn delete(&self, owner_id: Uuid, memo_id: Uuid) -> MemoResult<()> {
        let memo = self.load_owned(owner_id, memo_id).await?;
        let manifest = CleanupManifest::for_memo(&memo);

        let removed = self
            .store
            .delete_memo(owner_id, memo_id)
            .await
            .map_err(MemoError::Store)?;
        if !removed {
            return Err(MemoError::NotFound);
        }

        info!(memo_id = %memo_id, objects = manifest.paths().count(), "memo deleted");

        if let Err(manifest) = self.cleanup.schedule(manifest) {
            warn!(
                memo_id = %memo_id,
                objects = manifest.paths().count(),
                "cleanup queue unavailable; stored objects orphaned"
            );
        }
        Ok(())
    }

    /// Uploads a batch of media files and appends them to the memo.
    ///
    /// The append is a read-modify-write of the attachment list read before
    /// the uploads, so two concurrent batches on one memo can lose one of the
    /// appends.
    pub async fn add_media(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        files: Vec<MediaUpload>,
    ) -> MemoResult<MemoView> {
        let accepted =
            validate_media_batch(files, &self.settings.limits).map_err(MemoError::Validation)?;
        let memo = self.load_owned(owner_id, memo_id).await?;

        let mut uploaded: Vec<String> = Vec::with_capacity(accepted.len());
        let mut appended: Vec<StoredAttachment> = Vec::with_capacity(accepted.len());
        for media in accepted {
            let key = media_object_path(owner_id, memo_id, media.extension);
            match self
                .storage
                .put_object(&key, media.bytes, Some(media.mime.clone()))
                .await
            {
                Ok(path) => {
                    uploaded.push(path.clone());
                    appended.push(StoredAttachment::media(
                        media.kind,
                        StoredMedia {
                            path,
                            mime: media.mime,
                            created_at: Utc::now(),
                        },
                    ));
                }
                Err(err) => {
                    error!(memo_id = %memo_id, key = %key, error = %err, "failed to store attachment");
                    self.discard_objects(memo_id, &uploaded).await;
                    return Err(MemoError::Storage(err));
                }
            }
        }

        let mut attachments = memo.attachments;
        attachments.extend(appended);

        let updated = match self
            .store
            .replace_attachments(owner_id, memo_id, &attachments)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.discard_objects(memo_id, &uploaded).await;
                return Err(MemoError::NotFound);
            }
            Err(err) => {
                self.discard_objects(memo_id, &uploaded).await;
                return Err(MemoError::Store(err));
            }
        };

        info!(memo_id = %memo_id, added = uploaded.len(), "media attached to memo");
        self.present(updated).await
    }

    /// Appends a location with the same read-modify-write caveat as
    /// [`MemoService::add_media`].
    pub async fn add_location(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        point: GeoPoint,
    ) -> MemoResult<MemoView> {
        point.validate().map_err(MemoError::Validation)?;
        let memo = self.load_owned(owner_id, memo_id).await?;

        let mut attachments = memo.attachments;
        attachments.push(StoredAttachment::Location(point));

        let updated = self
            .store
            .replace_attachments(owner_id, memo_id, &attachments)
            .await
            .map_err(MemoError::Store)?
            .ok_or(MemoError::NotFound)?;

        self.present(updated).await
    }

    pub async fn list_projects(&self, owner_id: Uuid) -> MemoResult<Vec<Project>> {
        self.store
            .list_projects(owner_id)
            .await
            .map_err(MemoError::Store)
    }

    pub async fn create_project(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> MemoResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MemoError::validation("project name must not be empty"));
        }
        if name.chars().count() > 255 {
            return Err(MemoError::validation(
                "project name must be at most 255 characters",
            ));
        }

        let project = self
            .store
            .create_project(NewProject {
                id: Uuid::new_v4(),
                owner_id,
                name: name.to_string(),
                description: description.filter(|text| !text.trim().is_empty()),
            })
            .await
            .map_err(MemoError::Store)?;

        info!(project_id = %project.id, "project created");
        Ok(project)
    }

    async fn project_for_name(&self, owner_id: Uuid, name: &str) -> MemoResult<Project> {
        if self.settings.project_name_policy == ProjectNamePolicy::ReuseExisting {
            let existing = self
                .store
                .find_project_by_name(owner_id, name)
                .await
                .map_err(MemoError::Store)?;
            if let Some(project) = existing {
                return Ok(project);
            }
        }
        self.create_project(owner_id, name, None).await
    }

    async fn ensure_project_owned(&self, owner_id: Uuid, project_id: Uuid) -> MemoResult<()> {
        let project = self
            .store
            .find_project(owner_id, project_id)
            .await
            .map_err(MemoError::Store)?;
        match project {
            Some(_) => Ok(()),
            None => Err(MemoError::validation(
                "project_id does not reference one of your projects",
            )),
        }
    }

    async fn load_owned(&self, owner_id: Uuid, memo_id: Uuid) -> MemoResult<Memo> {
        self.store
            .find_memo(owner_id, memo_id)
            .await
            .map_err(MemoError::Store)?
            .ok_or(MemoError::NotFound)
    }

    async fn discard_objects(&self, memo_id: Uuid, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.storage.delete_object(key).await {
                warn!(memo_id = %memo_id, key = %key, error = %err, "failed to discard uploaded object");
            }
        }
    }

    async fn present(&self, memo: Memo) -> MemoResult<MemoView> {
        present::present_memo(self.storage.as_ref(), self.settings.signed_url_ttl, memo)
            .await
            .map_err(MemoError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoStatus;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            MemoStatus::Pending,
            MemoStatus::ReviewNeeded,
            MemoStatus::Done,
        ] {
            assert_eq!(status.as_str().parse::<MemoStatus>(), Ok(status));
        }
        assert!("archived".parse::<MemoStatus>().is_err());
    }
}
