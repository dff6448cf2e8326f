use sea_orm::DatabaseConnection;

use crate::token::TokenSigner;

/// Shared handles passed into every handler: the persistence connection and
/// the session-token signer. Both are injected here once at startup.
#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub tokens: TokenSigner,
}
