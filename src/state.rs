use std::sync::Arc;

use crate::{
    auth::jwt::JwtService, config::AppConfig, memos::MemoService, storage::LocalStorage,
    store::AccountStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub memos: MemoService,
    pub accounts: Arc<dyn AccountStore>,
    pub jwt: JwtService,
    /// Set in mock mode, where signed file URLs are served by this process.
    pub local_files: Option<Arc<LocalStorage>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        memos: MemoService,
        accounts: Arc<dyn AccountStore>,
        jwt: JwtService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            memos,
            accounts,
            jwt,
            local_files: None,
        }
    }

    pub fn with_local_files(mut self, files: Arc<LocalStorage>) -> Self {
        self.local_files = Some(files);
        self
    }
}
