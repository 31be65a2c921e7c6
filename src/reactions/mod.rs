//! Emoji reactions on blog posts.
//!
//! Each visitor is identified by a salted SHA-256 of their address and holds at most one
//! emoji per post. Reacting with the same emoji again removes it; reacting with another
//! emoji switches, unless the previous change was less than three seconds ago.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use sha2::{Digest, Sha256};

use crate::errors::AppError;
use crate::models::{ActorReaction, ReactionState, ReactionView};

/// Minimum time between two switches by the same actor.
pub const SWITCH_COOLDOWN_MS: i64 = 3_000;
pub const MAX_EMOJI_CHARS: usize = 8;

/// Result of applying one reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Added,
    Removed,
    Switched,
    /// Switch rejected by the cooldown; state unchanged
    Limited,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self != Outcome::Limited
    }
}

/// Apply `emoji` from `actor` at `now_ms`.
pub fn apply(state: &mut ReactionState, actor: &str, emoji: &str, now_ms: i64) -> Outcome {
    let previous = state.actors.get(actor).cloned();

    match previous {
        None => {
            increment(state, emoji);
            record(state, actor, emoji, now_ms);
            Outcome::Added
        }
        Some(prev) if prev.emoji == emoji => {
            decrement(state, emoji);
            state.actors.remove(actor);
            Outcome::Removed
        }
        Some(prev) if now_ms.saturating_sub(prev.at) < SWITCH_COOLDOWN_MS => Outcome::Limited,
        Some(prev) => {
            decrement(state, &prev.emoji);
            increment(state, emoji);
            record(state, actor, emoji, now_ms);
            Outcome::Switched
        }
    }
}

/// Public view of a post's reactions for one actor.
pub fn view(state: &ReactionState, actor: Option<&str>, limited: bool) -> ReactionView {
    ReactionView {
        counts: state.counts.clone(),
        user_reaction: actor
            .and_then(|a| state.actors.get(a))
            .map(|r| r.emoji.clone()),
        limited,
    }
}

/// Trimmed emoji, rejecting empty or overlong input.
pub fn validate_emoji(raw: Option<&str>) -> Result<String, AppError> {
    let emoji = raw.map(str::trim).unwrap_or_default();
    if emoji.is_empty() {
        return Err(AppError::Validation("emoji is required".to_string()));
    }
    if emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(AppError::Validation(format!(
            "emoji must be at most {} characters",
            MAX_EMOJI_CHARS
        )));
    }
    Ok(emoji.to_string())
}

/// `hex(sha256(salt ":" ip))`. The raw address is never stored.
pub fn actor_key(salt: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

fn increment(state: &mut ReactionState, emoji: &str) {
    *state.counts.entry(emoji.to_string()).or_insert(0) += 1;
}

fn decrement(state: &mut ReactionState, emoji: &str) {
    if let Some(count) = state.counts.get_mut(emoji) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            state.counts.remove(emoji);
        }
    }
}

fn record(state: &mut ReactionState, actor: &str, emoji: &str, now_ms: i64) {
    state.actors.insert(
        actor.to_string(),
        ActorReaction {
            emoji: emoji.to_string(),
            at: now_ms,
        },
    );
}

/// Address of the caller, preferring proxy headers over the socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = forwarded_ip(&parts.headers) {
            return Ok(ClientIp(ip));
        }

        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| ClientIp(addr.ip().to_string()))
            .ok_or_else(|| AppError::BadRequest("Unable to determine client address".to_string()))
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("x-real-ip").map(str::trim).filter(|ip| !ip.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const ALICE: &str = "alice";
    const BOB: &str = "bob";

    fn total_actors(state: &ReactionState) -> u64 {
        state.counts.values().sum()
    }

    #[test]
    fn test_add_then_toggle_off() {
        let mut state = ReactionState::default();

        assert_eq!(apply(&mut state, ALICE, "🎉", 0), Outcome::Added);
        assert_eq!(state.counts.get("🎉"), Some(&1));

        assert_eq!(apply(&mut state, ALICE, "🎉", 10), Outcome::Removed);
        assert!(state.counts.is_empty());
        assert!(state.actors.is_empty());

        // Reacting again right away adds exactly one count back
        assert_eq!(apply(&mut state, ALICE, "🎉", 20), Outcome::Added);
        assert_eq!(state.counts.get("🎉"), Some(&1));
        assert_eq!(state.actors[ALICE].emoji, "🎉");
        assert_eq!(view(&state, Some(ALICE), false).user_reaction.as_deref(), Some("🎉"));
    }

    #[test]
    fn test_switch_respects_cooldown() {
        let mut state = ReactionState::default();
        apply(&mut state, ALICE, "🎉", 0);

        let before = state.clone();
        assert_eq!(apply(&mut state, ALICE, "❤️", 1_000), Outcome::Limited);
        assert_eq!(state, before);

        assert_eq!(
            apply(&mut state, ALICE, "❤️", SWITCH_COOLDOWN_MS),
            Outcome::Switched
        );
        assert_eq!(state.counts.get("🎉"), None);
        assert_eq!(state.counts.get("❤️"), Some(&1));
        assert_eq!(state.actors[ALICE].at, SWITCH_COOLDOWN_MS);
    }

    #[test]
    fn test_counts_match_actors() {
        let mut state = ReactionState::default();
        apply(&mut state, ALICE, "🎉", 0);
        apply(&mut state, BOB, "🎉", 0);
        apply(&mut state, BOB, "🚀", 10_000);
        apply(&mut state, ALICE, "🎉", 20_000);

        assert_eq!(total_actors(&state), state.actors.len() as u64);
        assert_eq!(state.counts.get("🚀"), Some(&1));
        assert_eq!(state.counts.get("🎉"), None);
    }

    #[test]
    fn test_decrement_saturates() {
        let mut state = ReactionState::default();
        // Actor recorded without a matching count, as in a hand-edited row
        record(&mut state, ALICE, "🎉", 0);
        assert_eq!(apply(&mut state, ALICE, "🎉", 10), Outcome::Removed);
        assert!(state.counts.is_empty());
    }

    #[test]
    fn test_view_hides_other_actors() {
        let mut state = ReactionState::default();
        apply(&mut state, ALICE, "🎉", 0);

        let mine = view(&state, Some(ALICE), false);
        assert_eq!(mine.user_reaction.as_deref(), Some("🎉"));
        let theirs = view(&state, Some(BOB), false);
        assert_eq!(theirs.user_reaction, None);
        assert_eq!(theirs.counts.get("🎉"), Some(&1));

        let json = serde_json::to_value(&theirs).unwrap();
        assert!(json.get("limited").is_none());
        assert!(json.get("actors").is_none());
    }

    #[test]
    fn test_validate_emoji() {
        assert_eq!(validate_emoji(Some(" 👍 ")).unwrap(), "👍");
        assert!(validate_emoji(None).is_err());
        assert!(validate_emoji(Some("   ")).is_err());
        assert!(validate_emoji(Some("123456789")).is_err());
        assert!(validate_emoji(Some("12345678")).is_ok());
    }

    #[test]
    fn test_actor_key() {
        let key = actor_key("salt", "203.0.113.9");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, actor_key("salt", "203.0.113.9"));
        assert_ne!(key, actor_key("pepper", "203.0.113.9"));
    }

    #[test]
    fn test_forwarded_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("198.51.100.1"));
    }
}
