//! NinjaOne API client.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};

use self::{
    auth::{
        authorization_code::{AuthorizationPresenter, BrowserPresenter},
        clock::{Clock, SystemClock},
        grant::TokenAcquirer,
        token_manager::TokenManager,
        Token,
    },
    config::ClientConfig,
    utils::ensure_success,
};

pub mod auth;
pub mod config;
pub mod region;
mod utils;

pub use self::utils::ServerError;

/// Client whose tokens come from the configured grant, cached until they expire.
pub type ManagedClient<Presenter = BrowserPresenter> =
    Client<TokenManager<TokenAcquirer<Presenter>>>;

/// Issues bearer-authenticated calls against one API host.
pub struct Client<AuthTokenProvider> {
    pub client: reqwest::Client,
    pub base_url: String,
    pub auth_token_provider: AuthTokenProvider,
}

#[derive(Debug, thiserror::Error)]
pub enum Error<AuthError> {
    #[error("api request failed: {0}")]
    Auth(#[source] AuthError),
    #[error("api request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("api request failed: {0}")]
    Server(#[from] ServerError),
    #[error("api request failed: invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One call against the API: method, path relative to the region host, optional
/// query string and JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

impl ManagedClient {
    /// Build a client from a validated config, opening the system browser when the
    /// authorization code grant needs consent.
    pub fn from_config(config: ClientConfig) -> Result<Self, reqwest::Error> {
        Self::with_presenter(config, BrowserPresenter)
    }
}

impl<Presenter> ManagedClient<Presenter>
where
    Presenter: AuthorizationPresenter,
{
    pub fn with_presenter(config: ClientConfig, presenter: Presenter) -> Result<Self, reqwest::Error> {
        Self::with_clock(config, presenter, Arc::new(SystemClock))
    }

    /// Same as [`ManagedClient::with_presenter`], with expiry measured by `clock`.
    pub fn with_clock(
        config: ClientConfig,
        presenter: Presenter,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        let base_url = config.endpoints().api_base.clone();
        let acquirer = TokenAcquirer::with_presenter(client.clone(), config, presenter);
        Ok(Self {
            client,
            base_url,
            auth_token_provider: TokenManager::with_clock(acquirer, clock),
        })
    }
}

impl<AuthTokenProvider> Client<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
{
    fn build_url(&self, path: &str) -> String {
        format!(
            "{base}/{path}",
            base = self.base_url.trim_end_matches('/'),
            path = path.trim_start_matches('/'),
        )
    }

    fn build_request(
        &self,
        auth_token: &str,
        request: &ApiRequest,
    ) -> Result<reqwest::Request, Error<AuthTokenProvider::Error>> {
        let builder = self
            .client
            .request(request.method.clone(), self.build_url(&request.path))
            .bearer_auth(auth_token);

        let builder = if request.query.is_empty() {
            builder
        } else {
            builder.query(&request.query)
        };

        let builder = match &request.body {
            Some(body) => builder.json(body),
            None if request.method == Method::POST => {
                builder.header(reqwest::header::CONTENT_LENGTH, 0)
            }
            None => builder,
        };

        builder.build().map_err(Error::Reqwest)
    }

    async fn get_auth_token(&self) -> Result<String, Error<AuthTokenProvider::Error>> {
        let token = self
            .auth_token_provider
            .get_auth_token()
            .await
            .map_err(Error::Auth)?;
        Ok(token.access_token().to_owned())
    }

    /// Make sure a fresh token is cached, then perform `request` with it.
    ///
    /// An empty response body decodes as JSON `null`.
    pub async fn request<T>(&self, request: ApiRequest) -> Result<T, Error<AuthTokenProvider::Error>>
    where
        T: DeserializeOwned,
    {
        let auth_token = self.get_auth_token().await?;
        let res = self
            .exec(self.build_request(&auth_token, &request)?)
            .await?;
        Self::parse_json(res).await
    }

    pub async fn get<T>(&self, path: &str) -> Result<T, Error<AuthTokenProvider::Error>>
    where
        T: DeserializeOwned,
    {
        self.request(ApiRequest::get(path)).await
    }

    async fn exec(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, Error<AuthTokenProvider::Error>> {
        let res = self.client.execute(request).await.map_err(Error::Reqwest)?;
        let res = ensure_success(res).await?;
        Ok(res)
    }

    async fn parse_json<T>(res: reqwest::Response) -> Result<T, Error<AuthTokenProvider::Error>>
    where
        T: DeserializeOwned,
    {
        let bytes = res.bytes().await.map_err(Error::Reqwest)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
