//! Per-request metadata and identity context.
//!
//! The demux parses the bearer credential from the `authorization` metadata
//! field, then carries the authenticated identity in the separate `user_id`
//! field as a canonical lowercase UUID. Handlers read identity only from
//! here, never from request parameters.

use std::collections::HashMap;

use uuid::Uuid;

const AUTHORIZATION_KEY: &str = "authorization";
const USER_ID_KEY: &str = "user_id";
const BEARER_PREFIX: &str = "Bearer ";

/// Request metadata as a string map, mirroring transport header semantics.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    fields: HashMap<String, String>,
}

impl RequestMeta {
    /// Build from the request's `meta` object; non-string values are ignored.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let mut fields = HashMap::new();
        if let Some(object) = value.as_object() {
            for (key, value) in object {
                if let Some(s) = value.as_str() {
                    fields.insert(key.clone(), s.to_string());
                }
            }
        }
        Self { fields }
    }

    /// The bearer token from the `authorization` field, if present.
    pub fn bearer_token(&self) -> Option<&str> {
        self.fields
            .get(AUTHORIZATION_KEY)
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .filter(|token| !token.is_empty())
    }

    /// Record the authenticated identity.
    pub fn set_user_id(&mut self, user_id: Uuid) {
        self.fields
            .insert(USER_ID_KEY.to_string(), user_id.to_string());
    }

    /// The authenticated identity, if the demux set one.
    pub fn user_id(&self) -> Option<Uuid> {
        self.fields
            .get(USER_ID_KEY)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}
