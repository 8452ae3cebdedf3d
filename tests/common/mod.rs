#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use nice_catcher::attachments::StoredAttachment;
use nice_catcher::auth::jwt::JwtService;
use nice_catcher::auth::password::hash_password;
use nice_catcher::cleanup::CleanupCoordinator;
use nice_catcher::config::{AppConfig, CaptureLimits, ProjectNamePolicy, TranscriptionConfig};
use nice_catcher::memos::{
    Memo, MemoChanges, MemoFilter, MemoService, MemoSettings, MemoStatus, NewMemo, ProjectFilter,
};
use nice_catcher::models::{NewProject, NewRefreshToken, NewUser, Project, RefreshToken, User};
use nice_catcher::routes;
use nice_catcher::state::AppState;
use nice_catcher::storage::{LocalStorage, ObjectStorage};
use nice_catcher::store::{AccountStore, MemoStore};
use nice_catcher::transcription::{AudioClip, MockTranscriber, Transcriber, TranscriptionError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Barrier, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    signed: AtomicUsize,
    fail_puts_after: StdMutex<Option<usize>>,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String> {
        {
            let mut budget = self.fail_puts_after.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(anyhow!("fake storage refused {key}"));
                }
                *remaining -= 1;
            }
        }
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(key.to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        ensure!(
            !self.fail_deletes.load(Ordering::SeqCst),
            "fake storage refused to delete {key}"
        );
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        let serial = self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}&sig={serial}",
            expires_in.as_secs()
        ))
    }
}

impl FakeStorage {
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let guard = self.objects.lock().await;
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    /// Lets `successes` more uploads through, then rejects every upload.
    pub fn fail_puts_after(&self, successes: usize) {
        *self.fail_puts_after.lock().unwrap() = Some(successes);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Drops an object behind the service's back.
    pub async fn remove(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.remove(key)
    }
}

struct ReadGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

#[derive(Default)]
struct StoreData {
    memos: HashMap<Uuid, Memo>,
    projects: Vec<Project>,
    users: Vec<User>,
    refresh_tokens: Vec<RefreshToken>,
}

/// Row store kept in memory. Every lookup is owner-scoped like the Postgres
/// implementation.
#[derive(Default)]
pub struct InMemoryStore {
    data: StdMutex<StoreData>,
    read_gate: StdMutex<Option<ReadGate>>,
    fail_memo_inserts: AtomicBool,
}

impl InMemoryStore {
    /// The next `readers` memo lookups wait for each other before returning.
    pub fn hold_memo_reads(&self, readers: usize) {
        *self.read_gate.lock().unwrap() = Some(ReadGate {
            barrier: Arc::new(Barrier::new(readers)),
            remaining: readers,
        });
    }

    pub fn set_fail_memo_inserts(&self, fail: bool) {
        self.fail_memo_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn memo_count(&self) -> usize {
        self.data.lock().unwrap().memos.len()
    }

    pub fn raw_memo(&self, memo_id: Uuid) -> Option<Memo> {
        self.data.lock().unwrap().memos.get(&memo_id).cloned()
    }

    pub fn projects_named(&self, owner_id: Uuid, name: &str) -> usize {
        self.data
            .lock()
            .unwrap()
            .projects
            .iter()
            .filter(|project| project.owner_id == owner_id && project.name == name)
            .count()
    }

    /// Forces a stored memo's status, as if edited elsewhere.
    pub fn set_status(&self, memo_id: Uuid, status: MemoStatus) {
        if let Some(memo) = self.data.lock().unwrap().memos.get_mut(&memo_id) {
            memo.status = status;
        }
    }

    async fn pass_read_gate(&self) {
        let barrier = {
            let mut slot = self.read_gate.lock().unwrap();
            match slot.as_mut() {
                Some(gate) => {
                    gate.remaining -= 1;
                    let barrier = gate.barrier.clone();
                    if gate.remaining == 0 {
                        *slot = None;
                    }
                    Some(barrier)
                }
                None => None,
            }
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }

    fn with_owned_memo<T>(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        apply: impl FnOnce(&mut Memo) -> T,
    ) -> Option<T> {
        let mut data = self.data.lock().unwrap();
        data.memos
            .get_mut(&memo_id)
            .filter(|memo| memo.owner_id == owner_id)
            .map(apply)
    }
}

#[async_trait]
impl MemoStore for InMemoryStore {
    async fn insert_memo(&self, memo: NewMemo) -> Result<Memo> {
        ensure!(
            !self.fail_memo_inserts.load(Ordering::SeqCst),
            "fake row store rejected insert"
        );
        let now = Utc::now();
        let row = Memo {
            id: memo.id,
            owner_id: memo.owner_id,
            content: None,
            audio_path: memo.audio_path,
            project_id: None,
            status: MemoStatus::Pending,
            attachments: memo.attachments,
            created_at: now,
            updated_at: now,
        };
        self.data.lock().unwrap().memos.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_memo(&self, owner_id: Uuid, memo_id: Uuid) -> Result<Option<Memo>> {
        let found = {
            let data = self.data.lock().unwrap();
            data.memos
                .get(&memo_id)
                .filter(|memo| memo.owner_id == owner_id)
                .cloned()
        };
        self.pass_read_gate().await;
        Ok(found)
    }

    async fn list_memos(&self, owner_id: Uuid, filter: &MemoFilter) -> Result<Vec<Memo>> {
        let data = self.data.lock().unwrap();
        let mut memos: Vec<Memo> = data
            .memos
            .values()
            .filter(|memo| memo.owner_id == owner_id)
            .filter(|memo| filter.status.map_or(true, |status| memo.status == status))
            .filter(|memo| match filter.project {
                None => true,
                Some(ProjectFilter::Inbox) => memo.project_id.is_none(),
                Some(ProjectFilter::Project(id)) => memo.project_id == Some(id),
            })
            .cloned()
            .collect();
        memos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(memos)
    }

    async fn record_transcript(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        content: &str,
    ) -> Result<Option<Memo>> {
        Ok(self
            .with_owned_memo(owner_id, memo_id, |memo| {
                if memo.status != MemoStatus::Pending {
                    return None;
                }
                memo.content = Some(content.to_string());
                memo.status = MemoStatus::ReviewNeeded;
                memo.updated_at = Utc::now();
                Some(memo.clone())
            })
            .flatten())
    }

    async fn update_memo(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        changes: &MemoChanges,
    ) -> Result<Option<Memo>> {
        Ok(self.with_owned_memo(owner_id, memo_id, |memo| {
            if let Some(content) = &changes.content {
                memo.content = content.clone();
            }
            if let Some(project_id) = changes.project_id {
                memo.project_id = project_id;
            }
            if let Some(status) = changes.status {
                memo.status = status;
            }
            memo.updated_at = Utc::now();
            memo.clone()
        }))
    }

    async fn replace_attachments(
        &self,
        owner_id: Uuid,
        memo_id: Uuid,
        attachments: &[StoredAttachment],
    ) -> Result<Option<Memo>> {
        Ok(self.with_owned_memo(owner_id, memo_id, |memo| {
            memo.attachments = attachments.to_vec();
            memo.updated_at = Utc::now();
            memo.clone()
        }))
    }

    async fn delete_memo(&self, owner_id: Uuid, memo_id: Uuid) -> Result<bool> {
        let mut data = self.data.lock().unwrap();
        let owned = data
            .memos
            .get(&memo_id)
            .is_some_and(|memo| memo.owner_id == owner_id);
        if owned {
            data.memos.remove(&memo_id);
        }
        Ok(owned)
    }

    async fn create_project(&self, project: NewProject) -> Result<Project> {
        let row = Project {
            id: project.id,
            owner_id: project.owner_id,
            name: project.name,
            description: project.description,
            created_at: Utc::now().naive_utc(),
        };
        self.data.lock().unwrap().projects.push(row.clone());
        Ok(row)
    }

    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> Result<Option<Project>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .projects
            .iter()
            .find(|project| project.id == project_id && project.owner_id == owner_id)
            .cloned())
    }

    async fn find_project_by_name(&self, owner_id: Uuid, name: &str) -> Result<Option<Project>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .projects
            .iter()
            .find(|project| project.owner_id == owner_id && project.name == name)
            .cloned())
    }

    async fn list_projects(&self, owner_id: Uuid) -> Result<Vec<Project>> {
        let data = self.data.lock().unwrap();
        let mut projects: Vec<Project> = data
            .projects
            .iter()
            .filter(|project| project.owner_id == owner_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut data = self.data.lock().unwrap();
        ensure!(
            data.users.iter().all(|existing| existing.username != user.username),
            "username {} taken",
            user.username
        );
        let now = Utc::now().naive_utc();
        let row = User {
            id: user.id,
            username: user.username,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        data.users.push(row.clone());
        Ok(row)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let data = self.data.lock().unwrap();
        Ok(data.users.iter().find(|user| user.id == user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<()> {
        let now = Utc::now().naive_utc();
        self.data.lock().unwrap().refresh_tokens.push(RefreshToken {
            id: token.id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let now = now.naive_utc();
        let mut data = self.data.lock().unwrap();
        Ok(data
            .refresh_tokens
            .iter_mut()
            .find(|token| {
                token.token_hash == token_hash
                    && token.revoked_at.is_none()
                    && token.expires_at > now
            })
            .map(|token| {
                token.revoked_at = Some(now);
                token.user_id
            }))
    }

    async fn revoke_refresh_tokens(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let now = now.naive_utc();
        let mut data = self.data.lock().unwrap();
        let mut revoked = 0;
        for token in data.refresh_tokens.iter_mut().filter(|token| {
            token.user_id == user_id
                && token.revoked_at.is_none()
                && token_hash.map_or(true, |hash| token.token_hash == hash)
        }) {
            token.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[derive(Clone)]
pub enum Script {
    Text(String),
    Fail,
    Hang,
}

type CallHook = Box<dyn Fn(&AudioClip) + Send + Sync>;

/// Transcriber whose behaviour each test chooses up front.
pub struct ScriptedTranscriber {
    script: StdMutex<Script>,
    on_call: StdMutex<Option<CallHook>>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(script: Script) -> Self {
        Self {
            script: StdMutex::new(script),
            on_call: StdMutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Runs `hook` inside every transcription, before the script answers.
    pub fn on_call(&self, hook: impl Fn(&AudioClip) + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn set(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> Result<String, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook(&clip);
        }
        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Text(text) => Ok(text),
            Script::Fail => Err(TranscriptionError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream exploded".into(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".into())
            }
        }
    }
}

pub struct TestOptions {
    pub project_name_policy: ProjectNamePolicy,
    pub transcription_enabled: bool,
    pub script: Script,
    pub limits: CaptureLimits,
    /// Runs in mock mode with objects under this directory.
    pub mock_data_dir: Option<PathBuf>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            project_name_policy: ProjectNamePolicy::AlwaysCreate,
            transcription_enabled: true,
            script: Script::Text("buy oat milk".into()),
            limits: CaptureLimits::default(),
            mock_data_dir: None,
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    store: Arc<InMemoryStore>,
    transcriber: Arc<ScriptedTranscriber>,
}

pub fn test_config(policy: ProjectNamePolicy) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        database_max_pool_size: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        refresh_token_expiry_days: 30,
        cors_allowed_origin: None,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
        s3_bucket: "test-bucket".to_string(),
        signed_url_ttl: Duration::from_secs(3600),
        transcription: TranscriptionConfig {
            base_url: "http://transcription.invalid".to_string(),
            token: None,
            file_field: "audio_file".to_string(),
            model: "whisper-1".to_string(),
            timeout: TRANSCRIPTION_TIMEOUT,
        },
        limits: CaptureLimits::default(),
        project_name_policy: policy,
        use_mock: false,
        data_dir: PathBuf::from("./data"),
        public_base_url: "http://localhost".to_string(),
    }
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_options(TestOptions::default()).await
    }

    pub async fn with_options(options: TestOptions) -> Result<Self> {
        let mut config = test_config(options.project_name_policy);
        config.limits = options.limits;

        let storage = Arc::new(FakeStorage::default());
        let store = Arc::new(InMemoryStore::default());
        let transcriber = Arc::new(ScriptedTranscriber::new(options.script));

        let local_files = match options.mock_data_dir {
            Some(data_dir) => {
                config.use_mock = true;
                config.data_dir = data_dir;
                Some(Arc::new(LocalStorage::from_config(&config).await?))
            }
            None => None,
        };

        let storage_for_state: Arc<dyn ObjectStorage> = match &local_files {
            Some(files) => files.clone(),
            None => storage.clone(),
        };
        let transcriber_for_state: Option<Arc<dyn Transcriber>> = if local_files.is_some() {
            Some(Arc::new(MockTranscriber))
        } else {
            options
                .transcription_enabled
                .then(|| transcriber.clone() as Arc<dyn Transcriber>)
        };

        let (cleanup, _worker) = CleanupCoordinator::spawn(storage_for_state.clone());
        let memos = MemoService::new(
            store.clone(),
            storage_for_state,
            transcriber_for_state,
            cleanup,
            MemoSettings::from_config(&config),
        );
        let jwt = JwtService::from_config(&config)?;
        let mut state = AppState::new(config, memos, store.clone(), jwt);
        if let Some(files) = local_files {
            state = state.with_local_files(files);
        }
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            store,
            transcriber,
        })
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        self.store.clone()
    }

    pub fn transcriber(&self) -> Arc<ScriptedTranscriber> {
        self.transcriber.clone()
    }

    pub async fn insert_user(&self, username: &str, password: &str) -> Result<Uuid> {
        let user = AccountStore::insert_user(
            self.store.as_ref(),
            NewUser {
                id: Uuid::new_v4(),
                username: username.to_string(),
                password_hash: hash_password(password)?,
            },
        )
        .await?;
        Ok(user.id)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );
        read_json(response).await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        let body = self.login(username, password).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response had no access_token"))
    }

    /// Creates a user and returns `(user_id, access_token)`.
    pub async fn signed_in_user(&self, username: &str) -> Result<(Uuid, String)> {
        let user_id = self.insert_user(username, "pw-for-tests").await?;
        let token = self.login_token(username, "pw-for-tests").await?;
        Ok((user_id, token))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::DELETE).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        parts: &[Part],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(multipart_body(&boundary, parts)))?;
        self.send(request).await
    }

    /// Captures a small clip and returns the response body.
    pub async fn capture(&self, token: &str) -> Result<serde_json::Value> {
        let response = self
            .post_multipart(
                "/api/v1/capture",
                &[Part::file("file", "note.m4a", "audio/mp4", b"fake audio")],
                token,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "capture failed with status {}",
            response.status()
        );
        read_json(response).await
    }

    /// Polls until the fake object store holds exactly `expected` objects.
    pub async fn wait_for_object_count(&self, expected: usize) -> Result<()> {
        for _ in 0..100 {
            if self.storage.object_count().await == expected {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(anyhow!(
            "expected {expected} stored objects, found {}",
            self.storage.object_count().await
        ))
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub struct Part {
    pub name: &'static str,
    pub file_name: Option<String>,
    pub content_type: Option<&'static str>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn file(
        name: &'static str,
        file_name: &str,
        content_type: &'static str,
        data: &[u8],
    ) -> Self {
        Self {
            name,
            file_name: Some(file_name.to_string()),
            content_type: Some(content_type),
            data: data.to_vec(),
        }
    }

    pub fn text(name: &'static str, value: &str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }
}

fn multipart_body(boundary: &str, parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend(format!("--{boundary}\r\n").as_bytes());
        match &part.file_name {
            Some(file_name) => body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
            ),
        }
        if let Some(content_type) = part.content_type {
            body.extend(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend(b"\r\n");
        body.extend(&part.data);
        body.extend(b"\r\n");
    }
    body.extend(format!("--{boundary}--\r\n").as_bytes());
    body
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Asserts that no attachment object in a served payload exposes a `path`.
pub fn assert_no_paths(memo: &serde_json::Value) {
    for attachment in memo["attachments"].as_array().into_iter().flatten() {
        assert!(
            attachment.get("path").is_none(),
            "served attachment leaked a path: {attachment}"
        );
    }
    assert!(memo.get("audio_path").is_none());
}
