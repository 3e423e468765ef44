/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - store: volcano ドキュメントの保存先, auth: 認可ゲート
 * - Clone 前提で持つ (内部は Arc)
 */
use std::sync::Arc;

use crate::{repos::volcano_repo::VolcanoStore, services::auth::AuthGate};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VolcanoStore>,
    pub auth: Arc<AuthGate>,
}

impl AppState {
    pub fn new(store: Arc<dyn VolcanoStore>, auth: Arc<AuthGate>) -> Self {
        Self { store, auth }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store.backend())
            .field("auth", &self.auth)
            .finish()
    }
}
