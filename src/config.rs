use serde::Deserialize;

use crate::errors::AppError;

pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";
pub const DEFAULT_PROBE_EMAIL_DOMAIN: &str = "example.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub supabase_url: String,
    pub anon_key: String,
    pub service_role_key: Option<String>, // Only needed for admin setup/cleanup
    pub database_url: Option<String>,     // Only needed by inspect_schema
    pub avatar_bucket: String,
    pub probe_email_domain: String,
}

impl Config {
    /// Loads configuration from the process environment, after merging a local `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Backend URL: {}", config.supabase_url);
        tracing::debug!("Anon key: {}", redact(&config.anon_key));
        if let Some(ref key) = config.service_role_key {
            tracing::debug!("Service role key: {}", redact(key));
        }
        tracing::debug!("Avatar bucket: {}", config.avatar_bucket);

        Ok(config)
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            supabase_url: non_empty("SUPABASE_URL")
                .or_else(|| non_empty("NEXT_PUBLIC_SUPABASE_URL"))
                .ok_or_else(|| {
                    anyhow::anyhow!("SUPABASE_URL or NEXT_PUBLIC_SUPABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("SUPABASE_URL must start with http:// or https://");
                    }
                    url::Url::parse(&url)
                        .map_err(|e| anyhow::anyhow!("SUPABASE_URL is not a valid URL: {}", e))?;
                    Ok(url.trim_end_matches('/').to_string())
                })?,
            anon_key: non_empty("SUPABASE_ANON_KEY")
                .or_else(|| non_empty("NEXT_PUBLIC_SUPABASE_ANON_KEY"))
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "SUPABASE_ANON_KEY or NEXT_PUBLIC_SUPABASE_ANON_KEY environment variable required"
                    )
                })?,
            service_role_key: non_empty("SUPABASE_SERVICE_ROLE_KEY"),
            database_url: non_empty("DATABASE_URL")
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            avatar_bucket: non_empty("AVATAR_BUCKET")
                .unwrap_or_else(|| DEFAULT_AVATAR_BUCKET.to_string()),
            probe_email_domain: non_empty("PROBE_EMAIL_DOMAIN")
                .unwrap_or_else(|| DEFAULT_PROBE_EMAIL_DOMAIN.to_string()),
        };

        Ok(config)
    }

    /// Returns the service-role key or a configuration error naming the script's need for it.
    pub fn require_service_role_key(&self) -> Result<&str, AppError> {
        self.service_role_key.as_deref().ok_or_else(|| {
            AppError::Config("SUPABASE_SERVICE_ROLE_KEY is required for this script".to_string())
        })
    }

    pub fn require_database_url(&self) -> Result<&str, AppError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AppError::Config("DATABASE_URL is required for this script".to_string()))
    }
}

/// Shortens a credential to a loggable prefix.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{}... ({} chars)", prefix, secret.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon-key"),
        ]))
        .unwrap();

        assert_eq!(config.supabase_url, "https://abc.supabase.co");
        assert_eq!(config.avatar_bucket, DEFAULT_AVATAR_BUCKET);
        assert_eq!(config.probe_email_domain, DEFAULT_PROBE_EMAIL_DOMAIN);
        assert!(config.service_role_key.is_none());
        assert!(config.require_service_role_key().is_err());
    }

    #[test]
    fn test_legacy_public_names_accepted() {
        let config = Config::from_lookup(lookup(&[
            ("NEXT_PUBLIC_SUPABASE_URL", "http://localhost:54321"),
            ("NEXT_PUBLIC_SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.supabase_url, "http://localhost:54321");
        assert_eq!(config.anon_key, "anon");
    }

    #[test]
    fn test_missing_url_rejected() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn test_blank_anon_key_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "   "),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_scheme_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_database_url_scheme_checked() {
        let result = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("DATABASE_URL", "mysql://nope"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_redact_keeps_prefix_only() {
        let redacted = redact("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9");
        assert!(redacted.starts_with("eyJhbGci..."));
        assert!(!redacted.contains("IkpXVCJ9"));
    }
}
