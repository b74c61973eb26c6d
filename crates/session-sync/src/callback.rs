//! Parsing of the identity provider's redirect after sign-in.

use crate::{AuthError, AuthResult};
use chrono::{DateTime, Duration, Utc};
use credential_storage::{Provider, Session};
use std::collections::HashMap;
use url::Url;

fn non_empty<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// `now + secs`, or `None` when the offset or the sum is out of range.
pub(crate) fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|delta| now.checked_add_signed(delta))
}

/// Build a session from a provider redirect URL.
///
/// Parameters are read from the query string and the fragment (implicit
/// grants put them after `#`); fragment values win. `expires_at` is epoch
/// milliseconds, `expires_in` seconds from `now`.
pub fn parse_redirect(redirect: &str, now: DateTime<Utc>) -> AuthResult<Session> {
    let url = Url::parse(redirect)?;

    let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }

    if let Some(error) = non_empty(&params, "error") {
        return Err(AuthError::OAuth(match non_empty(&params, "error_description") {
            Some(description) => format!("{}: {}", error, description),
            None => error.to_string(),
        }));
    }

    let access_token = non_empty(&params, "access_token")
        .ok_or_else(|| AuthError::OAuth("Missing access_token".to_string()))?;
    let subject = non_empty(&params, "user_id")
        .or_else(|| non_empty(&params, "sub"))
        .ok_or_else(|| AuthError::OAuth("Missing user_id".to_string()))?;
    let provider = non_empty(&params, "provider").map(Provider::from).unwrap_or(Provider::Google);

    let mut session = Session::new(subject, access_token, provider, now);
    if let Some(refresh_token) = non_empty(&params, "refresh_token") {
        session = session.with_refresh_token(refresh_token);
    }
    if let Some(email) = non_empty(&params, "email") {
        session = session.with_email(email);
    }

    let expires_at = match (non_empty(&params, "expires_at"), non_empty(&params, "expires_in")) {
        (Some(at), _) => at
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        (None, Some(secs)) => match secs.parse::<i64>() {
            Ok(secs) => Some(
                expiry_after(now, secs)
                    .ok_or_else(|| AuthError::OAuth("invalid expires_in".to_string()))?,
            ),
            Err(_) => None,
        },
        (None, None) => None,
    };
    if let Some(expires_at) = expires_at {
        session = session.with_expires_at(expires_at);
    }

    Ok(session)
}
