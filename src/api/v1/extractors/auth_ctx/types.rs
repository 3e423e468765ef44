/*
 * Responsibility
 * - Handler から見える「認可済みコンテキスト」の型
 * - access middleware が token 検証 + policy 評価を通した後にだけ extensions に格納する
 */
use crate::services::auth::ClaimsPrincipal;

/// 認可を通過したリクエストに付与されるコンテキスト
#[derive(Debug, Clone)]
pub struct AuthCtx {
    principal: ClaimsPrincipal,
}

impl AuthCtx {
    pub fn new(principal: ClaimsPrincipal) -> Self {
        Self { principal }
    }

    /// `sub`, or `"-"` when the token carried none.
    pub fn subject(&self) -> &str {
        self.principal.subject.as_deref().unwrap_or("-")
    }
}
