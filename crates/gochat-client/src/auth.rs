//! HTTP client for the account endpoints.
//!
//! Every endpoint takes a JSON body and answers with a JSON object holding a
//! business `code`. A call only counts as successful when the HTTP status is
//! 200 *and* `code` equals the configured success code.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use gochat_core::config::ClientConfig;
use gochat_core::error::{Error, Result};

/// Default endpoint paths.
pub mod routes {
    pub const REGISTER: &str = "/user/register";
    pub const LOGIN: &str = "/user/login";
    pub const CHECK_AUTH: &str = "/user/checkAuth";
    pub const LOGOUT: &str = "/user/logout";
}

/// Business code the server uses for success.
pub const DEFAULT_SUCCESS_CODE: i64 = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRoutes {
    pub register: String,
    pub login: String,
    pub check_auth: String,
    pub logout: String,
}

impl Default for AuthRoutes {
    fn default() -> Self {
        Self {
            register: routes::REGISTER.to_string(),
            login: routes::LOGIN.to_string(),
            check_auth: routes::CHECK_AUTH.to_string(),
            logout: routes::LOGOUT.to_string(),
        }
    }
}

/// Body returned by every account endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    pub code: i64,
    pub token: Option<String>,
    #[serde(alias = "userid")]
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub error: Option<String>,
}

/// Identity obtained from a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub user_id: Option<i64>,
    pub username: String,
}

#[derive(Serialize)]
struct PasswordRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    token: &'a str,
}

/// Client for register / login / checkAuth / logout.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    routes: AuthRoutes,
    success_code: i64,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes: AuthRoutes::default(),
            success_code: DEFAULT_SUCCESS_CODE,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    pub fn with_routes(mut self, routes: AuthRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_success_code(mut self, code: i64) -> Self {
        self.success_code = code;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an account. Some servers log the new user in directly; the
    /// returned session is present when a token came back.
    pub async fn register(&self, username: &str, password: &str) -> Result<Option<AuthSession>> {
        let body = self
            .post(&self.routes.register, &PasswordRequest { username, password })
            .await?;
        info!(username = %username, "registered");
        Ok(body.token.map(|token| AuthSession {
            token,
            user_id: body.user_id,
            username: username.to_string(),
        }))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession> {
        let body = self
            .post(&self.routes.login, &PasswordRequest { username, password })
            .await?;
        let token = body
            .token
            .ok_or_else(|| Error::Http("login response carried no token".to_string()))?;
        info!(username = %username, user_id = ?body.user_id, "logged in");
        Ok(AuthSession {
            token,
            user_id: body.user_id,
            username: body.username.unwrap_or_else(|| username.to_string()),
        })
    }

    /// Validate a token; the response names the user it belongs to.
    pub async fn check_auth(&self, token: &str) -> Result<AuthResponse> {
        self.post(&self.routes.check_auth, &TokenRequest { token }).await
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.post(&self.routes.logout, &TokenRequest { token }).await?;
        info!("logged out");
        Ok(())
    }

    async fn post<B: Serialize>(&self, route: &str, body: &B) -> Result<AuthResponse> {
        let url = format!("{}{}", self.base_url, route);
        debug!(url = %url, "POST");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("invalid response body (status {}): {}", status, e)))?;

        if status == StatusCode::OK && body.code == self.success_code {
            return Ok(body);
        }
        let message = body.error.unwrap_or_else(|| "unknown error".to_string());
        warn!(
            url = %url,
            status = status.as_u16(),
            code = body.code,
            error = %message,
            "request rejected"
        );
        Err(Error::Rejected {
            status: status.as_u16(),
            code: body.code,
            message,
        })
    }
}
