//! Launch-token validation
//!
//! Validates the embedded-app launch data passed on the WebSocket
//! handshake: the `hash` field must match an HMAC-SHA-256 over all other
//! fields, keyed by a digest of the bot token, and `auth_date` must be
//! recent. Anything else is a 401 before the connection is registered.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ring::hmac;

/// Tokens older than this are rejected.
pub const INIT_DATA_MAX_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("missing hash")]
    MissingHash,
    #[error("missing auth_date")]
    MissingAuthDate,
    #[error("invalid auth_date")]
    InvalidAuthDate,
    #[error("init data expired")]
    Expired,
    #[error("hash mismatch")]
    HashMismatch,
    #[error("missing user")]
    MissingUser,
    #[error("invalid user id")]
    InvalidUserId,
}

fn parse_pairs(init_data: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(init_data.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Validates launch data against the bot token.
pub fn validate_init_data(init_data: &str, bot_token: &str) -> Result<(), AuthError> {
    let pairs = parse_pairs(init_data);

    let received_hash = get(&pairs, "hash").ok_or(AuthError::MissingHash)?;
    let auth_date = get(&pairs, "auth_date").ok_or(AuthError::MissingAuthDate)?;

    let ts: u64 = auth_date.parse().map_err(|_| AuthError::InvalidAuthDate)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    if now.saturating_sub(ts) > INIT_DATA_MAX_AGE.as_secs() {
        return Err(AuthError::Expired);
    }

    let data_check = build_data_check_string(&pairs);
    if compute_hash(&data_check, bot_token) != received_hash {
        return Err(AuthError::HashMismatch);
    }
    Ok(())
}

/// Pulls the numeric user id out of the `user` JSON field.
pub fn extract_user_id(init_data: &str) -> Result<i64, AuthError> {
    let pairs = parse_pairs(init_data);
    let user_json = get(&pairs, "user").ok_or(AuthError::MissingUser)?;

    #[derive(serde::Deserialize)]
    struct User {
        id: i64,
    }
    let user: User =
        serde_json::from_str(user_json).map_err(|_| AuthError::InvalidUserId)?;
    if user.id == 0 {
        return Err(AuthError::InvalidUserId);
    }
    Ok(user.id)
}

/// All keys except `hash`, sorted, joined as `k=v\n...`.
fn build_data_check_string(pairs: &[(String, String)]) -> String {
    let mut keys: Vec<&str> = pairs
        .iter()
        .map(|(k, _)| k.as_str())
        .filter(|k| *k != "hash")
        .collect();
    keys.sort_unstable();
    keys.dedup();

    keys.into_iter()
        .map(|k| format!("{}={}", k, get(pairs, k).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn compute_hash(data_check: &str, bot_token: &str) -> String {
    let secret = hmac::sign(
        &hmac::Key::new(hmac::HMAC_SHA256, b"WebAppData"),
        bot_token.as_bytes(),
    );
    let digest = hmac::sign(
        &hmac::Key::new(hmac::HMAC_SHA256, secret.as_ref()),
        data_check.as_bytes(),
    );
    hex::encode(digest.as_ref())
}
