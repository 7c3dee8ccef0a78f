//! OAuth2 support for the OAuth-SSE transport
//!
//! Tokens are kept in a [`TokenStore`] keyed by server id. The
//! [`OAuthClient`] discovers the authorization server, acquires and
//! refreshes bearer tokens and builds PKCE authorization requests.

mod client;
mod memory_store;
mod traits;

pub use client::{pkce_challenge, AuthServerMetadata, OAuthClient, OAuthParams};
pub use memory_store::MemoryTokenStore;
pub use traits::{OAuthToken, TokenStore, TokenStoreError, TokenStoreResult};
