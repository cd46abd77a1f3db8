//! Google Calendar free/busy source.
//!
//! Queries `POST /calendar/v3/freeBusy` with a bearer token read from a token
//! file. When the stored access token has expired it is refreshed with the
//! stored refresh token and written back. Obtaining the first token (the
//! consent flow) happens elsewhere.

mod client;
mod config;
mod oauth;
mod provider;
mod tokens;

pub use client::FreeBusyClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::OAuthClient;
pub use provider::GoogleFreeBusySource;
pub use tokens::{TokenInfo, TokenStorage};
