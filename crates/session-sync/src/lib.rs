//! Session reconciliation between the extension and its web application.
//!
//! This crate provides:
//! - Session validation with issuer introspection for Google tokens
//! - A reconciler that converges the local and remote session copies
//! - Token refresh with exponential backoff
//! - OAuth redirect parsing for sign-in
//! - [`AuthService`], the single entry point for all of the above
//! - A periodic driver for running passes on a timer

mod callback;
mod driver;
mod error;
mod introspection;
mod reconciler;
mod refresh;
mod service;
mod validator;

pub use callback::parse_redirect;
pub use driver::spawn_sync_loop;
pub use error::{AuthError, AuthResult};
pub use introspection::{GoogleTokenInfo, TokenIntrospector, TokenStatus};
pub use reconciler::pass_machine;
pub use reconciler::{PassInput, PassMachine, PassState, ReconcileOutcome, Reconciler};
pub use refresh::{
    refresh_with_backoff, OAuthRefresher, RefreshConfig, RefreshedTokens, TokenRefresher,
};
pub use service::AuthService;
pub use validator::SessionValidator;
