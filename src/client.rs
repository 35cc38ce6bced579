use crate::auth_client::AuthClient;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::Session;
use crate::rest_client::{QueryBuilder, RestClient};
use crate::storage_client::StorageClient;
use reqwest;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing;

/// Handle on the hosted backend, acting as one identity.
///
/// An identity is the anonymous role, the service role, or a signed-in user. Cloning is
/// cheap; the underlying HTTP connection pool is shared.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    project_url: String,
    api_key: String,
    service_role_key: Option<String>,
    service_role: bool,
    session: Option<Session>,
}

impl BackendClient {
    /// Anonymous client. Admin auth calls still work when a service-role key is configured.
    pub fn anon(config: &Config) -> Result<Self, AppError> {
        Self::with_keys(
            &config.supabase_url,
            &config.anon_key,
            config.service_role_key.as_deref(),
        )
    }

    /// Client acting with the service-role key, which bypasses row-level security.
    pub fn service(config: &Config) -> Result<Self, AppError> {
        let key = config.require_service_role_key()?;
        let mut client = Self::with_keys(&config.supabase_url, key, Some(key))?;
        client.service_role = true;
        Ok(client)
    }

    /// Builds a client from explicit credentials.
    pub fn with_keys(
        project_url: &str,
        api_key: &str,
        service_role_key: Option<&str>,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create backend client: {}", e))
            })?;

        Ok(Self {
            http,
            project_url: project_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            service_role_key: service_role_key.map(str::to_string),
            service_role: false,
            session: None,
        })
    }

    pub fn project_url(&self) -> &str {
        &self.project_url
    }

    pub fn is_service_role(&self) -> bool {
        self.service_role
    }

    /// Who this client acts as, for log lines.
    pub fn identity(&self) -> String {
        match (&self.session, self.service_role) {
            (Some(session), _) => format!("user {}", session.user.email_or_id()),
            (None, true) => "service role".to_string(),
            (None, false) => "anonymous".to_string(),
        }
    }

    fn bearer(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.api_key.clone())
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient::new(
            self.http.clone(),
            &self.project_url,
            self.api_key.clone(),
            self.service_role_key.clone(),
        )
    }

    pub fn rest(&self) -> RestClient {
        RestClient::new(
            self.http.clone(),
            &self.project_url,
            self.api_key.clone(),
            self.bearer(),
        )
    }

    pub fn storage(&self) -> StorageClient {
        StorageClient::new(
            self.http.clone(),
            &self.project_url,
            self.api_key.clone(),
            self.bearer(),
        )
    }

    /// Starts a query against `table` as this client's identity.
    pub fn from(&self, table: &str) -> QueryBuilder {
        self.rest().from(table)
    }

    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, args: &Value) -> Result<T, AppError> {
        self.rest().rpc(function, args).await
    }

    /// Signs in with a password and keeps the session on this client.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, AppError> {
        let session = self.auth().sign_in_with_password(email, password).await?;
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Signs out the current session, if any. The local session is dropped even if the
    /// backend call fails.
    pub async fn sign_out(&mut self) -> Result<(), AppError> {
        match self.session.take() {
            Some(session) => self.auth().sign_out(&session.access_token).await,
            None => Ok(()),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Session) {
        tracing::debug!("Session set for {}", session.user.email_or_id());
        self.session = Some(session);
    }

    /// Restores a session from a refresh token and keeps it on this client.
    pub async fn set_session_from_refresh_token(
        &mut self,
        refresh_token: &str,
    ) -> Result<Session, AppError> {
        let session = self.auth().refresh_session(refresh_token).await?;
        self.session = Some(session.clone());
        Ok(session)
    }

    /// A copy of this client acting as the session's user.
    pub fn as_user(&self, session: &Session) -> Self {
        let mut client = self.clone();
        client.service_role = false;
        client.session = Some(session.clone());
        client
    }

    /// A copy of this client with no session (anonymous role).
    pub fn without_session(&self) -> Self {
        let mut client = self.clone();
        client.session = None;
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthUser;
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            access_token: "user-jwt".into(),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: None,
            refresh_token: "r".into(),
            user: AuthUser {
                id: Uuid::nil(),
                email: Some("probe@example.com".into()),
                email_confirmed_at: None,
                created_at: None,
                user_metadata: Value::Null,
            },
        }
    }

    #[test]
    fn test_bearer_follows_session() {
        let anon = BackendClient::with_keys("https://abc.supabase.co/", "anon-key", None).unwrap();
        assert_eq!(anon.bearer(), "anon-key");
        assert_eq!(anon.identity(), "anonymous");
        assert_eq!(anon.project_url(), "https://abc.supabase.co");

        let user = anon.as_user(&session());
        assert_eq!(user.bearer(), "user-jwt");
        assert_eq!(user.identity(), "user probe@example.com");
        assert_eq!(user.without_session().bearer(), "anon-key");
    }

    #[test]
    fn test_set_session_switches_identity() {
        let mut client =
            BackendClient::with_keys("https://abc.supabase.co", "anon-key", None).unwrap();
        assert!(client.session().is_none());

        client.set_session(session());
        assert_eq!(client.bearer(), "user-jwt");
        assert_eq!(client.identity(), "user probe@example.com");
        assert_eq!(client.session().map(|s| s.access_token.as_str()), Some("user-jwt"));
    }

    #[test]
    fn test_service_requires_key() {
        let config = Config::from_lookup(|key| match key {
            "SUPABASE_URL" => Some("https://abc.supabase.co".into()),
            "SUPABASE_ANON_KEY" => Some("anon".into()),
            _ => None,
        })
        .unwrap();
        assert!(BackendClient::service(&config).is_err());
        assert!(!BackendClient::anon(&config).unwrap().is_service_role());
    }
}
