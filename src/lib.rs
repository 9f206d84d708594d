//! Client for the NinjaOne (NinjaRMM) public API.
//!
//! Tokens are obtained with one of three OAuth2 grants (client credentials,
//! authorization code through a local redirect listener, refresh token), cached
//! until they expire and attached as bearer tokens to every call.

pub mod ninja;

pub use ninja::{
    auth::{
        authorization_code::{AuthorizationPresenter, BrowserPresenter, NoopPresenter},
        grant::TokenResponse,
        listener::{AuthorizationResult, RedirectListener},
    },
    config::{ClientConfig, GrantType},
    region::{Endpoints, Region},
    ApiRequest, Client, Error, ManagedClient,
};
