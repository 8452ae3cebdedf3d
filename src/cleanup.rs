//! Best-effort removal of stored objects that belonged to deleted memos.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::memos::Memo;
use crate::storage::ObjectStorage;

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: Option<String>,
}

/// Everything a memo had in the object store, captured before its row is
/// deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupManifest {
    pub memo_id: Uuid,
    pub entries: Vec<ManifestEntry>,
}

impl CleanupManifest {
    pub fn for_memo(memo: &Memo) -> Self {
        let mut entries = Vec::with_capacity(memo.attachments.len() + 1);
        entries.push(ManifestEntry {
            path: Some(memo.audio_path.clone()),
        });
        entries.extend(memo.attachments.iter().map(|attachment| ManifestEntry {
            path: attachment.path().map(str::to_string),
        }));
        Self {
            memo_id: memo.id,
            entries,
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter_map(|entry| entry.path.as_deref())
            .filter(|path| !path.is_empty())
    }
}

/// Sending half of the cleanup queue. Scheduling never waits on the store.
#[derive(Clone)]
pub struct CleanupCoordinator {
    sender: mpsc::UnboundedSender<CleanupManifest>,
}

impl CleanupCoordinator {
    /// Starts the background task draining the queue. The task ends once every
    /// coordinator clone is dropped and the queue is empty.
    pub fn spawn(storage: Arc<dyn ObjectStorage>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(CleanupWorker { storage, receiver }.run());
        (Self { sender }, handle)
    }

    /// Hands the manifest back if the worker is gone.
    pub fn schedule(&self, manifest: CleanupManifest) -> Result<(), CleanupManifest> {
        self.sender.send(manifest).map_err(|err| err.0)
    }
}

struct CleanupWorker {
    storage: Arc<dyn ObjectStorage>,
    receiver: mpsc::UnboundedReceiver<CleanupManifest>,
}

impl CleanupWorker {
    async fn run(mut self) {
        debug!("cleanup worker started");
        while let Some(manifest) = self.receiver.recv().await {
            run_cleanup(self.storage.as_ref(), &manifest).await;
        }
        debug!("cleanup worker stopped");
    }
}

/// Removes every path in the manifest, one attempt each. Returns how many
/// removals failed; failures are only logged.
pub async fn run_cleanup(storage: &dyn ObjectStorage, manifest: &CleanupManifest) -> usize {
    let mut failed = 0;
    for path in manifest.paths() {
        if let Err(err) = storage.delete_object(path).await {
            failed += 1;
            warn!(
                memo_id = %manifest.memo_id,
                path = %path,
                error = %err,
                "failed to remove object of deleted memo"
            );
        }
    }
    info!(
        memo_id = %manifest.memo_id,
        removed = manifest.paths().count() - failed,
        failed,
        "cleanup finished"
    );
    failed
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::attachments::{GeoPoint, MediaKind, StoredAttachment, StoredMedia};
    use crate::memos::MemoStatus;

    #[test]
    fn manifest_skips_locations() {
        let now = Utc::now();
        let memo = Memo {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            content: None,
            audio_path: "owner/memo.wav".into(),
            project_id: None,
            status: MemoStatus::Pending,
            attachments: vec![
                StoredAttachment::Location(GeoPoint { lat: 1.0, lng: 2.0 }),
                StoredAttachment::media(
                    MediaKind::Image,
                    StoredMedia {
                        path: "owner/memo/a.png".into(),
                        mime: "image/png".into(),
                        created_at: now,
                    },
                ),
            ],
            created_at: now,
            updated_at: now,
        };

        let manifest = CleanupManifest::for_memo(&memo);
        assert_eq!(manifest.entries.len(), 3);
        assert_eq!(
            manifest.paths().collect::<Vec<_>>(),
            vec!["owner/memo.wav", "owner/memo/a.png"]
        );
    }
}
