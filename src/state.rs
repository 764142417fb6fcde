use std::sync::Arc;

use crate::auth::SessionSigner;
use crate::codes::CodeStore;
use crate::config::AppConfig;
use crate::db::Db;
use crate::token::TokenCodec;
use crate::translate::Translator;

/// Shared state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    /// Codec for QR handoff tokens.
    pub handoff: TokenCodec,
    /// Signer for account session tokens.
    pub sessions: SessionSigner,
    /// TTL store for numeric fallback codes.
    pub codes: CodeStore,
    pub translator: Option<Translator>,
}
