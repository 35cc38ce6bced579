use crate::errors::{classify_auth_error, AppError};
use crate::models::{AuthUser, Session, SignUpOutcome, UserList};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing;
use uuid::Uuid;

/// Client for the auth service (`/auth/v1`).
///
/// Admin operations need the service-role key; without one they fail with a
/// configuration error before any request is sent.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    api_key: String,
    admin_key: Option<String>,
}

impl AuthClient {
    pub fn new(
        client: Client,
        project_url: &str,
        api_key: String,
        admin_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: format!("{}/auth/v1", project_url.trim_end_matches('/')),
            api_key,
            admin_key,
        }
    }

    /// Liveness of the auth service.
    pub async fn health(&self) -> Result<Value, AppError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .request(Method::GET, &url, None)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Auth health check failed: {}", e)))?;
        parse_json(response, "health").await
    }

    /// Registers a user. When email confirmation is enabled the backend returns only the
    /// user, and `session` is `None`.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AppError> {
        let url = format!("{}/signup", self.base_url);
        tracing::info!("Signing up {}", email);

        let response = self
            .request(Method::POST, &url, None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Sign-up request failed: {}", e)))?;

        let body: Value = parse_json(response, "sign-up").await?;
        parse_sign_up(body)
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let url = format!("{}/token?grant_type=password", self.base_url);
        tracing::info!("Signing in {}", email);

        let response = self
            .request(Method::POST, &url, None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Sign-in request failed: {}", e)))?;

        let session: Session = parse_json(response, "sign-in").await?;
        tracing::info!("✓ Signed in as {}", session.user.id);
        Ok(session)
    }

    /// Exchanges a refresh token for a fresh session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AppError> {
        let url = format!("{}/token?grant_type=refresh_token", self.base_url);

        let response = self
            .request(Method::POST, &url, None)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Refresh request failed: {}", e)))?;

        parse_json(response, "refresh").await
    }

    /// The user behind an access token.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, AppError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .request(Method::GET, &url, Some(access_token))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Get user failed: {}", e)))?;
        parse_json(response, "get user").await
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let url = format!("{}/logout", self.base_url);
        let response = self
            .request(Method::POST, &url, Some(access_token))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Sign-out failed: {}", e)))?;
        check_response(response).await?;
        tracing::debug!("Signed out");
        Ok(())
    }

    /// Creates a user through the admin API, optionally pre-confirmed.
    pub async fn admin_create_user(
        &self,
        email: &str,
        password: &str,
        email_confirm: bool,
    ) -> Result<AuthUser, AppError> {
        let admin_key = self.admin_key()?;
        let url = format!("{}/admin/users", self.base_url);
        tracing::info!("Admin: creating user {}", email);

        let response = self
            .admin_request(Method::POST, &url, admin_key)
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": email_confirm,
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Admin create user failed: {}", e)))?;

        parse_json(response, "admin create user").await
    }

    pub async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let admin_key = self.admin_key()?;
        let url = format!("{}/admin/users/{}", self.base_url, user_id);
        tracing::info!("Admin: deleting user {}", user_id);

        let response = self
            .admin_request(Method::DELETE, &url, admin_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Admin delete user failed: {}", e)))?;

        check_response(response).await?;
        Ok(())
    }

    /// One page of users, 1-based.
    pub async fn admin_list_users(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<AuthUser>, AppError> {
        let admin_key = self.admin_key()?;
        let url = reqwest::Url::parse_with_params(
            &format!("{}/admin/users", self.base_url),
            &[("page", page.to_string()), ("per_page", per_page.to_string())],
        )
        .map_err(|e| AppError::InternalError(format!("Failed to build URL: {}", e)))?;

        let response = self
            .admin_request(Method::GET, url.as_str(), admin_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Admin list users failed: {}", e)))?;

        let list: UserList = parse_json(response, "admin list users").await?;
        Ok(list.users)
    }

    fn admin_key(&self) -> Result<&str, AppError> {
        self.admin_key.as_deref().ok_or_else(|| {
            AppError::Config("admin auth calls need SUPABASE_SERVICE_ROLE_KEY".to_string())
        })
    }

    fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(
                "Authorization",
                format!("Bearer {}", bearer.unwrap_or(&self.api_key)),
            )
    }

    fn admin_request(&self, method: Method, url: &str, admin_key: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", admin_key)
            .header("Authorization", format!("Bearer {}", admin_key))
    }
}

/// Sign-up answers with a session object when auto-confirm is on, otherwise with the bare
/// user (or a `{ "user": ... }` wrapper on some versions).
fn parse_sign_up(body: Value) -> Result<SignUpOutcome, AppError> {
    let parse_err =
        |e: serde_json::Error| AppError::ExternalApiError(format!("Failed to parse sign-up response: {}", e));

    if body.get("access_token").is_some() {
        let session: Session = serde_json::from_value(body).map_err(parse_err)?;
        return Ok(SignUpOutcome {
            user: session.user.clone(),
            session: Some(session),
        });
    }

    let user_value = match body.get("user") {
        Some(user) if user.is_object() => user.clone(),
        _ => body,
    };
    let user: AuthUser = serde_json::from_value(user_value).map_err(parse_err)?;
    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

async fn check_response(response: Response) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::debug!("Auth API returned {}: {}", status, error_text);
    Err(classify_auth_error(status, &error_text))
}

async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, AppError> {
    let response = check_response(response).await?;
    response.json().await.map_err(|e| {
        AppError::ExternalApiError(format!("Failed to parse {} response: {}", what, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_with_session() {
        let outcome = parse_sign_up(json!({
            "access_token": "jwt",
            "refresh_token": "r",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {"id": "00000000-0000-0000-0000-0000000000aa", "email": "a@b.co"}
        }))
        .unwrap();
        assert!(outcome.session.is_some());
        assert_eq!(outcome.user.email.as_deref(), Some("a@b.co"));
    }

    #[test]
    fn test_sign_up_pending_confirmation() {
        let outcome = parse_sign_up(json!({
            "id": "00000000-0000-0000-0000-0000000000bb",
            "email": "b@b.co",
            "confirmation_sent_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(outcome.session.is_none());
        assert_eq!(outcome.user.email.as_deref(), Some("b@b.co"));
    }

    #[test]
    fn test_sign_up_user_wrapper() {
        let outcome = parse_sign_up(json!({
            "user": {"id": "00000000-0000-0000-0000-0000000000cc", "email": "c@b.co"},
            "session": null
        }))
        .unwrap();
        assert!(outcome.session.is_none());
        assert_eq!(outcome.user.email.as_deref(), Some("c@b.co"));
    }

    #[tokio::test]
    async fn test_admin_calls_need_service_key() {
        let auth = AuthClient::new(Client::new(), "http://localhost:1", "anon".into(), None);
        let result = auth.admin_delete_user(Uuid::nil()).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
