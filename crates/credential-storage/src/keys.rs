//! Storage key and cookie name constants.

/// Keys of the local backend entries that jointly encode a session.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token
    pub const ACCESS_TOKEN: &'static str = "session_access_token";

    /// Refresh token (absent when the provider issued none)
    pub const REFRESH_TOKEN: &'static str = "session_refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "session_meta";

    pub const ALL: [&'static str; 3] = [Self::ACCESS_TOKEN, Self::REFRESH_TOKEN, Self::SESSION_META];
}

/// Names of the web application's session cookies.
pub struct CookieNames;

impl CookieNames {
    /// Bearer access token
    pub const AUTH_TOKEN: &'static str = "auth_token";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// User identity: a JSON blob or a plain subject string
    pub const USER: &'static str = "user";

    /// Plain "true" flag for pages that cannot parse the user blob
    pub const IS_AUTHENTICATED: &'static str = "is_authenticated";

    pub const ALL: [&'static str; 4] = [
        Self::AUTH_TOKEN,
        Self::REFRESH_TOKEN,
        Self::USER,
        Self::IS_AUTHENTICATED,
    ];
}
