use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ============ Auth Models ============

/// A user as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// Opaque user identifier.
    pub id: Uuid,
    /// Email address, absent for phone-only users.
    #[serde(default)]
    pub email: Option<String>,
    /// Set once the email is confirmed.
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    pub fn email_or_id(&self) -> String {
        self.email.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// An authenticated session returned by sign-in, sign-up or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Result of a sign-up. `session` is absent when email confirmation is required.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<Session>,
}

/// Page of users from the admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<AuthUser>,
}

// ============ Table Models ============

/// A row of the `founders` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FounderProfile {
    /// Primary key.
    pub id: Uuid,
    /// Owning auth user (unique).
    pub user_id: Uuid,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub company: Option<String>,
    /// Whether other authenticated users may read this row.
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Profile completion, 0-100.
    #[serde(default)]
    pub profile_progress: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for `founders`. The backend fills id and timestamps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewFounderProfile {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub is_visible: bool,
    pub onboarding_completed: bool,
    pub profile_progress: i32,
}

impl NewFounderProfile {
    pub fn probe(user_id: Uuid, name: impl Into<String>, is_visible: bool) -> Self {
        Self {
            user_id,
            name: Some(name.into()),
            bio: Some("Created by a policy probe".to_string()),
            company: Some("Probe Labs".to_string()),
            is_visible,
            onboarding_completed: false,
            profile_progress: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Pending => write!(f, "pending"),
            ConnectionStatus::Accepted => write!(f, "accepted"),
        }
    }
}

/// A row of the `connections` table: a directed introduction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    /// Founder who sent the request.
    pub initiator_id: Uuid,
    /// Founder the request is addressed to.
    pub receiver_id: Uuid,
    pub status: ConnectionStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewConnection {
    pub initiator_id: Uuid,
    pub receiver_id: Uuid,
    pub status: ConnectionStatus,
}

// ============ Storage Models ============

/// Entry returned by the storage list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl StorageObject {
    /// Object size from metadata, if the backend reported it.
    pub fn size(&self) -> Option<u64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("size"))
            .and_then(|s| s.as_u64())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "Key")]
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_founder_fields_match_pinned_schema() {
        let row = FounderProfile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: None,
            bio: None,
            company: None,
            is_visible: true,
            onboarding_completed: false,
            profile_progress: 0,
            created_at: None,
            updated_at: None,
        };
        let value = serde_json::to_value(&row).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for column in schema::founders::ALL {
            assert!(keys.contains(column), "missing column {}", column);
        }
        assert_eq!(keys.len(), schema::founders::ALL.len());
    }

    #[test]
    fn test_connection_status_wire_format() {
        assert_eq!(
            serde_json::to_value(ConnectionStatus::Accepted).unwrap(),
            serde_json::json!("accepted")
        );
        let parsed: ConnectionStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, ConnectionStatus::Pending);
    }

    #[test]
    fn test_new_founder_omits_unset_optionals() {
        let payload = NewFounderProfile {
            user_id: Uuid::nil(),
            ..Default::default()
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("name").is_none());
        assert_eq!(value["is_visible"], serde_json::json!(false));
    }

    #[test]
    fn test_session_defaults_token_type() {
        let session: Session = serde_json::from_value(serde_json::json!({
            "access_token": "jwt",
            "refresh_token": "r",
            "expires_in": 3600,
            "user": {"id": "00000000-0000-0000-0000-000000000001", "email": "a@b.co"}
        }))
        .unwrap();
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.user.email_or_id(), "a@b.co");
    }

    #[test]
    fn test_storage_object_size_from_metadata() {
        let obj: StorageObject = serde_json::from_value(serde_json::json!({
            "name": "avatar.png",
            "metadata": {"size": 68, "mimetype": "image/png"}
        }))
        .unwrap();
        assert_eq!(obj.size(), Some(68));
    }
}
