//! Client configuration.

use std::{fmt, str::FromStr, time::Duration};

use super::region::{Endpoints, Region};

pub const DEFAULT_SCOPE: &str = "monitoring management control";
pub const DEFAULT_LISTENER_HOST: &str = "localhost";
pub const DEFAULT_LISTENER_PORT: u16 = 4099;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client id and client secret must be defined")]
    MissingClientCredentials,
    #[error("refresh token must be defined for the refresh_token grant")]
    MissingRefreshToken,
    #[error("invalid region {given:?}, must be one of: {valid}")]
    InvalidRegion { given: String, valid: String },
    #[error("unknown grant type {0:?}, must be one of: client_credentials, authorization_code, refresh_token")]
    UnknownGrant(String),
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

/// OAuth2 grant used to obtain access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrantType {
    #[default]
    ClientCredentials,
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    /// Value of the `grant_type` form field.
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl FromStr for GrantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            _ => Err(Error::UnknownGrant(s.to_owned())),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, immutable client configuration. Build one with [`ClientConfig::builder`].
#[derive(Clone)]
pub struct ClientConfig {
    grant_type: GrantType,
    region: Region,
    endpoints: Endpoints,
    client_id: String,
    client_secret: String,
    scope: String,
    refresh_token: Option<String>,
    listener_host: String,
    listener_port: u16,
    callback_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read the configuration from `NINJA_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`], but reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(grant) = get("NINJA_GRANT_TYPE") {
            builder = builder.grant_type(grant.parse()?);
        }
        if let Some(region) = get("NINJA_REGION") {
            builder = builder.region(region.parse()?);
        }
        if let Some(client_id) = get("NINJA_CLIENT_ID") {
            builder = builder.client_id(client_id);
        }
        if let Some(client_secret) = get("NINJA_CLIENT_SECRET") {
            builder = builder.client_secret(client_secret);
        }
        if let Some(scope) = get("NINJA_SCOPE") {
            builder = builder.scope(scope);
        }
        if let Some(refresh_token) = get("NINJA_REFRESH_TOKEN") {
            builder = builder.refresh_token(refresh_token);
        }
        if let Some(host) = get("NINJA_OAUTH_HOST") {
            builder = builder.listener_host(host);
        }
        if let Some(port) = get("NINJA_OAUTH_PORT") {
            let port = port.trim().parse().map_err(|_| Error::InvalidNumber {
                key: "NINJA_OAUTH_PORT",
                value: port.clone(),
            })?;
            builder = builder.listener_port(port);
        }
        if let Some(secs) = get("NINJA_OAUTH_TIMEOUT_SECS") {
            let secs = secs.trim().parse().map_err(|_| Error::InvalidNumber {
                key: "NINJA_OAUTH_TIMEOUT_SECS",
                value: secs.clone(),
            })?;
            builder = builder.callback_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    pub fn grant_type(&self) -> GrantType {
        self.grant_type
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Always `Some` for [`GrantType::RefreshToken`].
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn listener_host(&self) -> &str {
        &self.listener_host
    }

    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    /// Upper bound on waiting for the browser redirect. `None` waits forever.
    pub fn callback_timeout(&self) -> Option<Duration> {
        self.callback_timeout
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("grant_type", &self.grant_type)
            .field("region", &self.region)
            .field("endpoints", &self.endpoints)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("listener_host", &self.listener_host)
            .field("listener_port", &self.listener_port)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    grant_type: GrantType,
    region: Region,
    endpoints: Option<Endpoints>,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: Option<String>,
    refresh_token: Option<String>,
    listener_host: Option<String>,
    listener_port: Option<u16>,
    callback_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    pub fn grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_type = grant_type;
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Talk to these endpoints instead of the region's public hosts.
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn listener_host(mut self, host: impl Into<String>) -> Self {
        self.listener_host = Some(host.into());
        self
    }

    pub fn listener_port(mut self, port: u16) -> Self {
        self.listener_port = Some(port);
        self
    }

    pub fn callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ClientConfig, Error> {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

        let (client_id, client_secret) =
            match (non_empty(self.client_id), non_empty(self.client_secret)) {
                (Some(client_id), Some(client_secret)) => (client_id, client_secret),
                _ => return Err(Error::MissingClientCredentials),
            };

        let refresh_token = non_empty(self.refresh_token);
        let refresh_token = match self.grant_type {
            GrantType::RefreshToken if refresh_token.is_none() => {
                return Err(Error::MissingRefreshToken)
            }
            GrantType::RefreshToken => refresh_token,
            _ => None,
        };

        Ok(ClientConfig {
            grant_type: self.grant_type,
            region: self.region,
            endpoints: self.endpoints.unwrap_or_else(|| self.region.endpoints()),
            client_id,
            client_secret,
            scope: self.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_owned()),
            refresh_token,
            listener_host: self
                .listener_host
                .unwrap_or_else(|| DEFAULT_LISTENER_HOST.to_owned()),
            listener_port: self.listener_port.unwrap_or(DEFAULT_LISTENER_PORT),
            callback_timeout: self.callback_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn credentials() -> ClientConfigBuilder {
        ClientConfig::builder().client_id("id").client_secret("secret")
    }

    #[test]
    fn defaults_are_applied() {
        let config = credentials().build().unwrap();
        assert_eq!(config.grant_type(), GrantType::ClientCredentials);
        assert_eq!(config.region(), Region::Na);
        assert_eq!(config.scope(), "monitoring management control");
        assert_eq!(config.listener_host(), "localhost");
        assert_eq!(config.listener_port(), 4099);
        assert_eq!(config.callback_timeout(), None);
        assert_eq!(config.endpoints().api_base, "https://app.ninjarmm.com");
    }

    #[test]
    fn missing_credentials_fail_for_every_grant() {
        for grant in [
            GrantType::ClientCredentials,
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
        ] {
            let no_secret = ClientConfig::builder()
                .grant_type(grant)
                .client_id("id")
                .refresh_token("rt")
                .build();
            assert!(matches!(no_secret, Err(Error::MissingClientCredentials)));

            let no_id = ClientConfig::builder()
                .grant_type(grant)
                .client_secret("secret")
                .refresh_token("rt")
                .build();
            assert!(matches!(no_id, Err(Error::MissingClientCredentials)));
        }
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let result = ClientConfig::builder()
            .client_id("  ")
            .client_secret("secret")
            .build();
        assert!(matches!(result, Err(Error::MissingClientCredentials)));
    }

    #[test]
    fn refresh_grant_requires_refresh_token() {
        let result = credentials().grant_type(GrantType::RefreshToken).build();
        assert!(matches!(result, Err(Error::MissingRefreshToken)));

        let config = credentials()
            .grant_type(GrantType::RefreshToken)
            .refresh_token("rt")
            .build()
            .unwrap();
        assert_eq!(config.refresh_token(), Some("rt"));
    }

    #[test]
    fn refresh_token_is_dropped_for_other_grants() {
        let config = credentials().refresh_token("rt").build().unwrap();
        assert_eq!(config.refresh_token(), None);
    }

    #[test]
    fn grant_type_parsing() {
        assert_eq!(
            "authorization-code".parse::<GrantType>().unwrap(),
            GrantType::AuthorizationCode
        );
        assert_eq!(
            "REFRESH_TOKEN".parse::<GrantType>().unwrap(),
            GrantType::RefreshToken
        );
        assert!(matches!(
            "password".parse::<GrantType>(),
            Err(Error::UnknownGrant(_))
        ));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = credentials()
            .client_secret("super-secret")
            .grant_type(GrantType::RefreshToken)
            .refresh_token("refresh-me")
            .build()
            .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("refresh-me"));
    }

    #[test]
    fn from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = [
            ("NINJA_GRANT_TYPE", "authorization_code"),
            ("NINJA_REGION", "eu"),
            ("NINJA_CLIENT_ID", "id"),
            ("NINJA_CLIENT_SECRET", "secret"),
            ("NINJA_OAUTH_PORT", "5000"),
            ("NINJA_OAUTH_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let config =
            ClientConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string())).unwrap();
        assert_eq!(config.grant_type(), GrantType::AuthorizationCode);
        assert_eq!(config.region(), Region::Eu);
        assert_eq!(config.listener_port(), 5000);
        assert_eq!(config.callback_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn from_lookup_rejects_bad_values() {
        let bad_region = ClientConfig::from_lookup(|key| match key {
            "NINJA_REGION" => Some("mars".into()),
            "NINJA_CLIENT_ID" | "NINJA_CLIENT_SECRET" => Some("x".into()),
            _ => None,
        });
        assert!(matches!(bad_region, Err(Error::InvalidRegion { .. })));

        let bad_port = ClientConfig::from_lookup(|key| match key {
            "NINJA_OAUTH_PORT" => Some("http".into()),
            "NINJA_CLIENT_ID" | "NINJA_CLIENT_SECRET" => Some("x".into()),
            _ => None,
        });
        assert!(matches!(bad_port, Err(Error::InvalidNumber { .. })));
    }
}
