use crate::errors::{classify_rest_error, AppError};
use reqwest::{header::HeaderMap, Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing;

const SINGLE_OBJECT_ACCEPT: &str = "application/vnd.pgrst.object+json";

/// Client for the tables API (`/rest/v1`).
///
/// Requests carry the project API key in `apikey` and the caller's identity in
/// `Authorization`: a user's access token, or the key itself for anonymous and
/// service-role callers.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

impl RestClient {
    pub fn new(client: Client, project_url: &str, api_key: String, bearer: String) -> Self {
        Self {
            client,
            base_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            api_key,
            bearer,
        }
    }

    /// Starts a query against `table`.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder {
            client: self.clone(),
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Calls a backend-defined function via `POST /rest/v1/rpc/<function>`.
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: &Value,
    ) -> Result<T, AppError> {
        let url = format!("{}/rpc/{}", self.base_url, function);
        tracing::info!("Calling RPC {}", function);

        let response = self
            .request(Method::POST, &url)
            .json(args)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("RPC {} failed: {}", function, e)))?;

        let response = check_response(response).await?;

        // Void functions answer 204 with no body
        let bytes = response.bytes().await?;
        let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(body).map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse RPC {} response: {}", function, e))
        })
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer))
    }
}

/// Fluent query against one table. Filters render as `column=op.value` query pairs.
pub struct QueryBuilder {
    client: RestClient,
    table: String,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl QueryBuilder {
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "eq", value.to_string())
    }

    pub fn neq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "neq", value.to_string())
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "gte", value.to_string())
    }

    /// `IS` comparison; `value` is one of `null`, `true`, `false`.
    pub fn is(self, column: &str, value: &str) -> Self {
        self.filter(column, "is", value.to_string())
    }

    pub fn in_list<V: ToString>(self, column: &str, values: &[V]) -> Self {
        let joined = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({})", joined))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order = Some(format!("{}.{}", column, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn filter(mut self, column: &str, op: &str, value: String) -> Self {
        self.filters.push((column.to_string(), format!("{}.{}", op, value)));
        self
    }

    fn url(&self, include_select: bool) -> Result<reqwest::Url, AppError> {
        let mut params: Vec<(String, String)> = Vec::new();
        if include_select {
            params.push((
                "select".to_string(),
                self.select.clone().unwrap_or_else(|| "*".to_string()),
            ));
        }
        params.extend(self.filters.iter().cloned());
        if let Some(ref order) = self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        reqwest::Url::parse_with_params(
            &format!("{}/{}", self.client.base_url, self.table),
            &params,
        )
        .map_err(|e| AppError::InternalError(format!("Failed to build URL: {}", e)))
    }

    /// `SELECT` returning all matching rows.
    pub async fn execute<T: DeserializeOwned>(self) -> Result<Vec<T>, AppError> {
        let url = self.url(true)?;
        tracing::debug!("SELECT {} ({} filters)", self.table, self.filters.len());

        let response = self
            .client
            .request(Method::GET, url.as_str())
            .send()
            .await
            .map_err(|e| self.transport_error("select", e))?;

        parse_rows(check_response(response).await?, &self.table).await
    }

    /// `SELECT` that must match exactly one row.
    pub async fn single<T: DeserializeOwned>(self) -> Result<T, AppError> {
        let url = self.url(true)?;

        let response = self
            .client
            .request(Method::GET, url.as_str())
            .header("Accept", SINGLE_OBJECT_ACCEPT)
            .send()
            .await
            .map_err(|e| self.transport_error("select", e))?;

        let response = check_response(response).await?;
        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse {} row: {}", self.table, e))
        })
    }

    /// `SELECT` matching zero or one row. More than one is a cardinality error.
    pub async fn maybe_single<T: DeserializeOwned>(self) -> Result<Option<T>, AppError> {
        let table = self.table.clone();
        let mut rows: Vec<T> = self.limit(2).execute().await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(AppError::Cardinality(format!(
                "expected at most one {} row, got {}",
                table, n
            ))),
        }
    }

    /// Exact count of matching rows, read from `Content-Range` on a `HEAD` request.
    pub async fn count(self) -> Result<u64, AppError> {
        let url = self.url(true)?;

        let response = self
            .client
            .request(Method::HEAD, url.as_str())
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| self.transport_error("count", e))?;

        // HEAD responses have no body to classify
        if !response.status().is_success() {
            return Err(classify_rest_error(response.status(), ""));
        }

        content_range_total(response.headers()).ok_or_else(|| {
            AppError::ExternalApiError(format!(
                "count on {} returned no Content-Range total",
                self.table
            ))
        })
    }

    pub async fn insert<T, B>(self, body: &B) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(false)?;
        tracing::debug!("INSERT into {}", self.table);

        let response = self
            .client
            .request(Method::POST, url.as_str())
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error("insert", e))?;

        parse_rows(check_response(response).await?, &self.table).await
    }

    /// Insert-or-merge. `on_conflict` names the unique column(s) to merge on.
    pub async fn upsert<T, B>(self, body: &B, on_conflict: Option<&str>) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut url = self.url(false)?;
        if let Some(columns) = on_conflict {
            url.query_pairs_mut().append_pair("on_conflict", columns);
        }
        tracing::debug!("UPSERT into {}", self.table);

        let response = self
            .client
            .request(Method::POST, url.as_str())
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error("upsert", e))?;

        parse_rows(check_response(response).await?, &self.table).await
    }

    /// `UPDATE` of the filtered rows. Rows hidden by RLS are silently skipped by the
    /// backend, so an empty result means nothing was changed.
    pub async fn update<T, B>(self, patch: &B) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.require_filters("update")?;
        let url = self.url(false)?;
        tracing::debug!("UPDATE {} ({} filters)", self.table, self.filters.len());

        let response = self
            .client
            .request(Method::PATCH, url.as_str())
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(|e| self.transport_error("update", e))?;

        parse_rows(check_response(response).await?, &self.table).await
    }

    /// `DELETE` of the filtered rows, returning the rows actually removed.
    pub async fn delete<T: DeserializeOwned>(self) -> Result<Vec<T>, AppError> {
        self.require_filters("delete")?;
        let url = self.url(false)?;
        tracing::debug!("DELETE from {} ({} filters)", self.table, self.filters.len());

        let response = self
            .client
            .request(Method::DELETE, url.as_str())
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| self.transport_error("delete", e))?;

        parse_rows(check_response(response).await?, &self.table).await
    }

    fn require_filters(&self, verb: &str) -> Result<(), AppError> {
        if self.filters.is_empty() {
            return Err(AppError::InternalError(format!(
                "refusing to {} every row of {}",
                verb, self.table
            )));
        }
        Ok(())
    }

    fn transport_error(&self, verb: &str, e: reqwest::Error) -> AppError {
        AppError::ExternalApiError(format!("{} on {} failed: {}", verb, self.table, e))
    }
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
    tracing::debug!("Tables API returned {}: {}", status, error_text);
    Err(classify_rest_error(status, &error_text))
}

async fn parse_rows<T: DeserializeOwned>(response: Response, table: &str) -> Result<Vec<T>, AppError> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::ExternalApiError(format!("Failed to parse {} rows: {}", table, e))
    })
}

/// Builds a JSON patch body from column/value pairs.
pub fn patch(pairs: &[(&str, Value)]) -> Value {
    let map: serde_json::Map<String, Value> = pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect();
    Value::Object(map)
}

/// Extracts the total from a `Content-Range` header such as `0-9/42` or `*/0`.
pub fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
}

pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::new(
            Client::new(),
            "https://abc.supabase.co/",
            "anon".to_string(),
            "anon".to_string(),
        )
    }

    #[test]
    fn test_filters_render_as_query_pairs() {
        let url = client()
            .from("founders")
            .select("id,name")
            .eq("user_id", "u1")
            .is("is_visible", "true")
            .order("created_at", false)
            .limit(5)
            .url(true)
            .unwrap();

        assert_eq!(url.path(), "/rest/v1/founders");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "id,name".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("is_visible".to_string(), "is.true".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_in_list_joins_values() {
        let url = client()
            .from("connections")
            .in_list("status", &["pending", "accepted"])
            .url(false)
            .unwrap();
        let (_, value) = url.query_pairs().next().unwrap();
        assert_eq!(value, "in.(pending,accepted)");
    }

    #[test]
    fn test_filter_values_are_encoded() {
        let url = client()
            .from("founders")
            .eq("name", "Ada & Co")
            .url(false)
            .unwrap();
        assert!(url.as_str().contains("eq.Ada+%26+Co"));
    }

    #[test]
    fn test_content_range_parsing() {
        assert_eq!(parse_content_range_total("0-9/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_patch_builds_object() {
        let body = patch(&[("is_visible", Value::Bool(false)), ("bio", Value::from("hi"))]);
        assert_eq!(body, serde_json::json!({"is_visible": false, "bio": "hi"}));
    }

    #[tokio::test]
    async fn test_unfiltered_update_refused() {
        let result: Result<Vec<Value>, AppError> = client()
            .from("founders")
            .update(&serde_json::json!({"bio": "x"}))
            .await;
        assert!(matches!(result, Err(AppError::InternalError(_))));
    }
}
