//! Remote backend encoding: the web application's session cookies.

use crate::keys::CookieNames;
use crate::session::{truncate_millis, Session};
use crate::Provider;
use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use sync_config_and_utils::{Config, CoreResult, DEFAULT_COOKIE_MAX_AGE_SECS};

/// Attributes applied to every session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub domain: Option<String>,
    pub secure: bool,
    /// Lifetime for sessions without an expiry.
    pub default_max_age: chrono::Duration,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            domain: None,
            secure: true,
            default_max_age: chrono::Duration::seconds(DEFAULT_COOKIE_MAX_AGE_SECS),
        }
    }
}

impl CookiePolicy {
    pub fn from_config(config: &Config) -> CoreResult<Self> {
        Ok(Self {
            domain: Some(config.cookie_domain()?),
            secure: config.cookie_secure,
            default_max_age: chrono::Duration::seconds(config.cookie_max_age_secs),
        })
    }

    fn build(&self, name: &str, value: String, max_age: time::Duration) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value))
            .path("/")
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if max_age > time::Duration::ZERO {
            if let Some(expires) = time::OffsetDateTime::now_utc().checked_add(max_age) {
                builder = builder.expires(expires);
            }
        }
        builder.build()
    }

    /// Cookies that jointly encode `session`.
    pub(crate) fn session_cookies(&self, session: &Session, now: DateTime<Utc>) -> Vec<Cookie<'static>> {
        let lifetime = match session.expires_at {
            Some(expires_at) => (expires_at - now).max(chrono::Duration::seconds(1)),
            None => self.default_max_age,
        };
        let max_age = time::Duration::seconds(lifetime.num_seconds().max(1));

        let user = serde_json::to_string(&UserBlob::from_session(session))
            .unwrap_or_else(|_| session.subject.clone());

        let mut cookies = vec![
            self.build(CookieNames::AUTH_TOKEN, session.access_token.clone(), max_age),
            self.build(CookieNames::USER, user, max_age),
            self.build(CookieNames::IS_AUTHENTICATED, "true".to_string(), max_age),
        ];
        match &session.refresh_token {
            Some(refresh_token) => cookies.push(self.build(
                CookieNames::REFRESH_TOKEN,
                refresh_token.clone(),
                max_age,
            )),
            None => cookies.push(self.removal(CookieNames::REFRESH_TOKEN)),
        }
        cookies
    }

    /// Removal cookies for every session cookie name.
    pub(crate) fn removal_cookies(&self) -> Vec<Cookie<'static>> {
        CookieNames::ALL.iter().map(|name| self.removal(name)).collect()
    }

    fn removal(&self, name: &str) -> Cookie<'static> {
        self.build(name, String::new(), time::Duration::ZERO)
    }
}

/// User identity blob as written by the web application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserBlob {
    #[serde(alias = "sub", alias = "subject", alias = "uid")]
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<Provider>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    issued_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl UserBlob {
    fn from_session(session: &Session) -> Self {
        Self {
            id: session.subject.clone(),
            email: session.email.clone(),
            provider: Some(session.provider.clone()),
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            updated_at: Some(session.updated_at),
        }
    }
}

/// Raw values of the session cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCookies {
    pub auth_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<String>,
    pub is_authenticated: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A plain subject: no whitespace, quotes, or JSON delimiters.
fn is_plain_subject(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '"'))
}

/// Parse the cookie set into a session.
///
/// Returns `None` for anything incomplete or malformed: no token, no user,
/// a flag other than `"true"`, an unparseable JSON blob, or an empty subject.
pub fn decode_session(cookies: &RemoteCookies) -> Option<Session> {
    if let Some(flag) = non_empty(&cookies.is_authenticated) {
        if flag != "true" {
            return None;
        }
    }

    let access_token = non_empty(&cookies.auth_token)?;
    let user = non_empty(&cookies.user)?;

    let blob = if user.starts_with('{') {
        serde_json::from_str::<UserBlob>(&user).ok()?
    } else if is_plain_subject(&user) {
        UserBlob {
            id: user,
            email: None,
            provider: None,
            issued_at: None,
            expires_at: None,
            updated_at: None,
        }
    } else {
        return None;
    };

    if blob.id.trim().is_empty() {
        return None;
    }

    Some(Session {
        subject: blob.id,
        access_token,
        refresh_token: non_empty(&cookies.refresh_token),
        provider: blob.provider.unwrap_or(Provider::Password),
        email: blob.email,
        issued_at: blob.issued_at.map(truncate_millis),
        expires_at: blob.expires_at.map(truncate_millis),
        updated_at: blob.updated_at.map(truncate_millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn cookies(token: Option<&str>, user: Option<&str>, flag: Option<&str>) -> RemoteCookies {
        RemoteCookies {
            auth_token: token.map(str::to_string),
            refresh_token: None,
            user: user.map(str::to_string),
            is_authenticated: flag.map(str::to_string),
        }
    }

    #[test]
    fn test_decode_json_blob() {
        let session = decode_session(&RemoteCookies {
            auth_token: Some("B".to_string()),
            refresh_token: Some("R".to_string()),
            user: Some(
                r#"{"id":"u1","email":"u1@example.com","provider":"google","expiresAt":5000,"updatedAt":200}"#
                    .to_string(),
            ),
            is_authenticated: Some("true".to_string()),
        })
        .unwrap();

        assert_eq!(session.subject, "u1");
        assert_eq!(session.access_token, "B");
        assert_eq!(session.refresh_token.as_deref(), Some("R"));
        assert_eq!(session.provider, Provider::Google);
        assert_eq!(session.email.as_deref(), Some("u1@example.com"));
        assert_eq!(session.expires_at, Some(at(5000)));
        assert_eq!(session.updated_at, at(200));
    }

    #[test]
    fn test_decode_plain_subject() {
        let session = decode_session(&cookies(Some("B"), Some("u1"), None)).unwrap();
        assert_eq!(session.subject, "u1");
        assert_eq!(session.provider, Provider::Password);
        assert_eq!(session.expires_at, None);
        assert_eq!(session.updated_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_decode_accepts_sub_alias() {
        let session =
            decode_session(&cookies(Some("B"), Some(r#"{"sub":"u9"}"#), Some("true"))).unwrap();
        assert_eq!(session.subject, "u9");
    }

    #[test]
    fn test_decode_malformed_payloads_are_absent() {
        let malformed = [
            cookies(None, Some("u1"), Some("true")),
            cookies(Some(""), Some("u1"), Some("true")),
            cookies(Some("B"), None, Some("true")),
            cookies(Some("B"), Some("   "), Some("true")),
            cookies(Some("B"), Some("u1"), Some("false")),
            cookies(Some("B"), Some(r#"{"id":"u1""#), Some("true")),
            cookies(Some("B"), Some(r#"{"email":"x@example.com"}"#), Some("true")),
            cookies(Some("B"), Some(r#"{"id":""}"#), Some("true")),
            cookies(Some("B"), Some(r#"{"id":"u1","updatedAt":"yesterday"}"#), Some("true")),
            cookies(Some("B"), Some("not a subject"), Some("true")),
            cookies(Some("B"), Some(r#"["u1"]"#), Some("true")),
        ];

        for case in &malformed {
            assert_eq!(decode_session(case), None, "expected absent for {:?}", case);
        }
    }

    #[test]
    fn test_session_cookies_carry_attributes() {
        let policy = CookiePolicy {
            domain: Some("gallery.test".to_string()),
            secure: true,
            default_max_age: chrono::Duration::hours(1),
        };
        let now = at(1_000_000);
        let session = Session::new("u1", "A", Provider::Google, now)
            .with_expires_at(now + chrono::Duration::minutes(10));

        let cookies = policy.session_cookies(&session, now);
        assert_eq!(cookies.len(), 4);

        let token = cookies.iter().find(|c| c.name() == CookieNames::AUTH_TOKEN).unwrap();
        assert_eq!(token.value(), "A");
        assert_eq!(token.domain(), Some("gallery.test"));
        assert_eq!(token.path(), Some("/"));
        assert_eq!(token.secure(), Some(true));
        assert_eq!(token.max_age(), Some(time::Duration::minutes(10)));

        // No refresh token: the stale cookie is removed.
        let refresh = cookies.iter().find(|c| c.name() == CookieNames::REFRESH_TOKEN).unwrap();
        assert_eq!(refresh.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn test_removal_cookies_cover_all_names() {
        let removals = CookiePolicy::default().removal_cookies();
        assert_eq!(removals.len(), CookieNames::ALL.len());
        assert!(removals
            .iter()
            .all(|c| c.max_age() == Some(time::Duration::ZERO) && c.value().is_empty()));
    }

    #[test]
    fn test_encoded_session_decodes_back() {
        let now = at(1_000_000);
        let session = Session::new("u1", "A", Provider::Google, now)
            .with_refresh_token("R")
            .with_email("u1@example.com")
            .with_expires_at(now + chrono::Duration::hours(1));

        let mut remote = RemoteCookies::default();
        for cookie in CookiePolicy::default().session_cookies(&session, now) {
            let value = Some(cookie.value().to_string());
            match cookie.name() {
                CookieNames::AUTH_TOKEN => remote.auth_token = value,
                CookieNames::REFRESH_TOKEN => remote.refresh_token = value,
                CookieNames::USER => remote.user = value,
                CookieNames::IS_AUTHENTICATED => remote.is_authenticated = value,
                _ => {}
            }
        }

        assert_eq!(decode_session(&remote), Some(session));
    }
}
