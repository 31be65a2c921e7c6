//! Blog post and reaction models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A blog post served alongside the GitHub payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogEntry {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    /// RFC 3339 timestamp
    pub created_at: String,
    /// RFC 3339 timestamp
    pub modified_at: String,
    /// Emoji counts; who reacted is never exposed
    #[serde(default)]
    pub reactions: BTreeMap<String, u64>,
}

/// The emoji an actor currently has on a post and when they last changed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorReaction {
    pub emoji: String,
    /// Unix milliseconds
    pub at: i64,
}

/// Persisted reaction state for a single post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionState {
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    /// Keyed by hashed actor identifier
    #[serde(default)]
    pub actors: BTreeMap<String, ActorReaction>,
}

/// Request body for `POST /api/blog/{slug}/reactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactRequest {
    #[serde(default)]
    pub emoji: Option<String>,
}

/// Response body for the reaction endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub counts: BTreeMap<String, u64>,
    pub user_reaction: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub limited: bool,
}
