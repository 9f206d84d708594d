//! Exchange an OAuth2 grant for an access token.

use std::{fmt, time::Duration};

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    authorization_code::{
        authorization_url, generate_state, AuthorizationPresenter, BrowserPresenter,
    },
    listener::{self, AuthorizationResult, RedirectListener},
};
use crate::ninja::{
    config::{self, ClientConfig, GrantType},
    utils::{ensure_success, ServerError},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error retrieving access token: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("error retrieving access token: {0}")]
    Server(#[from] ServerError),
    #[error("unable to encode token request: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("no access_token returned from token endpoint")]
    MissingAccessToken,
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("invalid authorization url: {0}")]
    AuthorizationUrl(#[from] url::ParseError),
    #[error("unable to present authorization url: {0}")]
    Present(#[source] std::io::Error),
    #[error(transparent)]
    Listener(#[from] listener::Error),
    #[error("no authorization redirect received within {0:?}")]
    CallbackTimeout(Duration),
    #[error("authorization denied: {error}{}", describe(.description))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },
    #[error("authorization redirect carried no code")]
    MissingCode,
    #[error("authorization redirect state does not match the request")]
    StateMismatch,
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|description| format!(" ({description})"))
        .unwrap_or_default()
}

/// What gets traded at the token endpoint, along with the client credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    ClientCredentials { scope: String },
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
}

impl Grant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Grant::ClientCredentials { .. } => GrantType::ClientCredentials,
            Grant::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Grant::RefreshToken { .. } => GrantType::RefreshToken,
        }
    }

    /// Form fields specific to this grant.
    fn form_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Grant::ClientCredentials { scope } => vec![("scope", scope.as_str())],
            Grant::AuthorizationCode { code, redirect_uri } => vec![
                ("redirect_uri", redirect_uri.as_str()),
                ("code", code.as_str()),
            ],
            Grant::RefreshToken { refresh_token } => {
                vec![("refresh_token", refresh_token.as_str())]
            }
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Grant").field(&self.grant_type()).finish()
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
}

/// A successful token exchange.
#[derive(Clone)]
pub struct TokenResponse {
    /// The bearer token for API calls.
    pub access_token: String,
    /// The amount of time that the access token is valid (in seconds).
    pub expires_in: u64,
    /// Returned by the authorization code and refresh grants, not stored by this crate.
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TryFrom<AuthResponse> for TokenResponse {
    type Error = Error;

    fn try_from(auth: AuthResponse) -> Result<Self, Self::Error> {
        let access_token = auth
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingAccessToken)?;
        Ok(Self {
            access_token,
            expires_in: auth.expires_in,
            refresh_token: auth.refresh_token,
            token_type: auth.token_type,
            scope: auth.scope,
        })
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Obtains access tokens with whichever grant the config names.
pub struct TokenAcquirer<Presenter = BrowserPresenter> {
    pub client: reqwest::Client,
    pub config: ClientConfig,
    pub presenter: Presenter,
}

impl TokenAcquirer {
    pub fn new(client: reqwest::Client, config: ClientConfig) -> Self {
        Self::with_presenter(client, config, BrowserPresenter)
    }
}

impl<Presenter> TokenAcquirer<Presenter>
where
    Presenter: AuthorizationPresenter,
{
    pub fn with_presenter(client: reqwest::Client, config: ClientConfig, presenter: Presenter) -> Self {
        Self {
            client,
            config,
            presenter,
        }
    }

    /// Run the configured grant and exchange it for a token. Never retries.
    pub async fn perform(&self) -> Result<TokenResponse, Error> {
        let grant = self.prepare_grant().await?;
        info!(message = "Requesting access token", grant_type = %grant.grant_type());
        self.exchange(&grant).await
    }

    async fn prepare_grant(&self) -> Result<Grant, Error> {
        match self.config.grant_type() {
            GrantType::ClientCredentials => Ok(Grant::ClientCredentials {
                scope: self.config.scope().to_owned(),
            }),
            GrantType::RefreshToken => {
                let refresh_token = self
                    .config
                    .refresh_token()
                    .ok_or(config::Error::MissingRefreshToken)?;
                Ok(Grant::RefreshToken {
                    refresh_token: refresh_token.to_owned(),
                })
            }
            GrantType::AuthorizationCode => self.obtain_authorization_code().await,
        }
    }

    /// Bind the redirect listener, send the user to the consent page and wait for the code.
    async fn obtain_authorization_code(&self) -> Result<Grant, Error> {
        let listener =
            RedirectListener::bind(self.config.listener_host(), self.config.listener_port())
                .await?;
        let redirect_uri = listener.redirect_uri();
        let state = generate_state();
        let url = authorization_url(&self.config, &redirect_uri, &state)?;

        info!(
            message = "Presenting authorization url",
            authorize = %self.config.endpoints().authorize,
            redirect_uri = %redirect_uri,
        );
        self.presenter.present(&url).map_err(Error::Present)?;

        let callback = listener.wait_for_callback();
        let result = match self.config.callback_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, callback)
                .await
                .map_err(|_| Error::CallbackTimeout(timeout))??,
            None => callback.await?,
        };

        let code = check_callback(result, &state)?;
        Ok(Grant::AuthorizationCode { code, redirect_uri })
    }

    async fn exchange(&self, grant: &Grant) -> Result<TokenResponse, Error> {
        let mut params = vec![
            ("grant_type", grant.grant_type().as_str()),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret()),
        ];
        params.extend(grant.form_fields());
        let params = serde_urlencoded::to_string(&params)?;

        let req = self
            .client
            .post(&self.config.endpoints().token)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(params)
            .build()?;

        let res = self.client.execute(req).await?;
        let res = ensure_success(res).await?;
        let auth_response: AuthResponse = res.json().await?;
        let token = TokenResponse::try_from(auth_response)?;

        debug!(message = "Token endpoint answered", expires_in = token.expires_in);

        Ok(token)
    }
}

fn check_callback(result: AuthorizationResult, expected_state: &str) -> Result<String, Error> {
    if let Some(error) = result.error {
        return Err(Error::AuthorizationDenied {
            error,
            description: result.error_description,
        });
    }
    if result.state.as_deref() != Some(expected_state) {
        return Err(Error::StateMismatch);
    }
    result
        .code
        .filter(|code| !code.is_empty())
        .ok_or(Error::MissingCode)
}

#[async_trait::async_trait]
impl<Presenter> super::TokenProvider for TokenAcquirer<Presenter>
where
    Presenter: AuthorizationPresenter,
{
    type Token = TokenResponse;
    type Error = Error;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        self.perform().await
    }
}

impl super::Token for TokenResponse {
    fn access_token(&self) -> &str {
        self.access_token.as_str()
    }
}

impl super::ExpiringToken for TokenResponse {
    fn expires_in(&self) -> u64 {
        self.expires_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(code: Option<&str>, state: Option<&str>) -> AuthorizationResult {
        AuthorizationResult {
            code: code.map(Into::into),
            state: state.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn form_fields_per_grant() {
        let grant = Grant::ClientCredentials {
            scope: "monitoring".into(),
        };
        assert_eq!(grant.form_fields(), vec![("scope", "monitoring")]);

        let grant = Grant::AuthorizationCode {
            code: "XYZ".into(),
            redirect_uri: "http://localhost:4099/oauth".into(),
        };
        assert_eq!(grant.grant_type().as_str(), "authorization_code");
        assert_eq!(
            grant.form_fields(),
            vec![
                ("redirect_uri", "http://localhost:4099/oauth"),
                ("code", "XYZ")
            ]
        );

        let grant = Grant::RefreshToken {
            refresh_token: "rt".into(),
        };
        assert_eq!(grant.grant_type().as_str(), "refresh_token");
        assert_eq!(grant.form_fields(), vec![("refresh_token", "rt")]);
    }

    #[test]
    fn grant_debug_hides_secrets() {
        let grant = Grant::RefreshToken {
            refresh_token: "very-secret".into(),
        };
        assert!(!format!("{grant:?}").contains("very-secret"));
    }

    #[test]
    fn missing_or_empty_access_token_is_rejected() {
        let missing: AuthResponse = serde_json::from_str(r#"{"expires_in": 3600}"#).unwrap();
        assert!(matches!(
            TokenResponse::try_from(missing),
            Err(Error::MissingAccessToken)
        ));

        let empty: AuthResponse =
            serde_json::from_str(r#"{"access_token": "", "expires_in": 3600}"#).unwrap();
        assert!(matches!(
            TokenResponse::try_from(empty),
            Err(Error::MissingAccessToken)
        ));
    }

    #[test]
    fn token_response_keeps_optional_fields() {
        let auth: AuthResponse = serde_json::from_str(
            r#"{"access_token": "abc", "expires_in": 3600, "refresh_token": "rt", "token_type": "Bearer"}"#,
        )
        .unwrap();
        let token = TokenResponse::try_from(auth).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.scope, None);
    }

    #[test]
    fn missing_expires_in_means_immediately_stale() {
        let auth: AuthResponse = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(TokenResponse::try_from(auth).unwrap().expires_in, 0);
    }

    #[test]
    fn callback_checks() {
        assert_eq!(
            check_callback(callback(Some("XYZ"), Some("S1")), "S1").unwrap(),
            "XYZ"
        );
        assert!(matches!(
            check_callback(callback(Some("XYZ"), Some("S2")), "S1"),
            Err(Error::StateMismatch)
        ));
        assert!(matches!(
            check_callback(callback(Some("XYZ"), None), "S1"),
            Err(Error::StateMismatch)
        ));
        assert!(matches!(
            check_callback(callback(None, Some("S1")), "S1"),
            Err(Error::MissingCode)
        ));

        let denied = AuthorizationResult {
            error: Some("access_denied".into()),
            error_description: Some("user said no".into()),
            state: Some("S1".into()),
            ..Default::default()
        };
        let err = check_callback(denied, "S1").unwrap_err();
        assert_eq!(err.to_string(), "authorization denied: access_denied (user said no)");
    }
}
