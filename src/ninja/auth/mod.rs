//! Authorization logic.

pub mod authorization_code;
pub mod clock;
pub mod grant;
pub mod listener;
pub mod token_manager;

#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    type Token: Token;
    type Error: Send + Sync;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error>;
}

pub trait Token: Send {
    fn access_token(&self) -> &str;
}

/// A token that advertises how long it stays valid once issued.
pub trait ExpiringToken: Token {
    /// Lifetime in seconds, counted from the moment the token was received.
    fn expires_in(&self) -> u64;
}
