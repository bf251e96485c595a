//! Credential bundle: remote endpoint plus normalized session cookies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Settings;
use crate::error::{ExtractError, Result};

/// Same-site policy attached to an injected cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Parse a browser-export value; unknown strings fall back to `Lax`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" | "no_restriction" => SameSite::None,
            _ => SameSite::Lax,
        }
    }
}

/// A cookie ready to be installed into a browsing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    /// Expiry as seconds since the epoch; `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// Everything needed to open an authenticated session.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub endpoint: String,
    pub cookies: Vec<SessionCookie>,
}

impl CredentialBundle {
    /// Read and validate the bundle from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = settings
            .browser_ws
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ExtractError::Configuration(format!(
                    "{} is missing",
                    crate::config::ENV_BROWSER_WS
                ))
            })?
            .to_string();

        let raw = settings
            .cookies_json
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ExtractError::Configuration(format!(
                    "{} is missing",
                    crate::config::ENV_COOKIES_JSON
                ))
            })?;

        let entries = parse_cookie_array(raw)?;
        let cookies = normalize_cookies(&entries, &settings.target_host());
        if cookies.is_empty() {
            return Err(ExtractError::Configuration(
                "no cookie with both a name and a value".to_string(),
            ));
        }

        Ok(Self { endpoint, cookies })
    }
}

/// Parse the serialized cookie array. Surrounding double quotes are
/// stripped first, since hosting dashboards often wrap the whole value.
pub fn parse_cookie_array(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim().trim_matches('"');
    let value: Value = serde_json::from_str(trimmed).map_err(|e| {
        ExtractError::Configuration(format!(
            "{} is not valid JSON: {}",
            crate::config::ENV_COOKIES_JSON,
            e
        ))
    })?;
    match value {
        Value::Array(entries) => Ok(entries),
        _ => Err(ExtractError::Configuration(format!(
            "{} must be a JSON array",
            crate::config::ENV_COOKIES_JSON
        ))),
    }
}

/// Fill in defaults and drop entries without a name or a value.
pub fn normalize_cookies(entries: &[Value], default_domain: &str) -> Vec<SessionCookie> {
    entries
        .iter()
        .filter_map(|entry| {
            let name = non_empty_str(entry.get("name"))?;
            let value = non_empty_str(entry.get("value"))?;

            Some(SessionCookie {
                name,
                value,
                domain: non_empty_str(entry.get("domain"))
                    .unwrap_or_else(|| default_domain.to_string()),
                path: non_empty_str(entry.get("path")).unwrap_or_else(|| "/".to_string()),
                http_only: entry
                    .get("httpOnly")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                // Only an explicit `false` turns secure off.
                secure: entry.get("secure").and_then(Value::as_bool) != Some(false),
                same_site: entry
                    .get("sameSite")
                    .and_then(Value::as_str)
                    .map(SameSite::parse)
                    .unwrap_or(SameSite::Lax),
                expires: entry
                    .get("expires")
                    .or_else(|| entry.get("expirationDate"))
                    .and_then(Value::as_f64)
                    .filter(|e| *e > 0.0),
            })
        })
        .collect()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
