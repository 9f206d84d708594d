//! Region to host mapping.

use std::{fmt, str::FromStr};

use super::config::Error;

/// Data-center region of a NinjaOne tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    /// North America.
    #[default]
    Na,
    /// Europe.
    Eu,
    /// Oceania.
    Oc,
    /// Canada.
    Ca,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Na, Region::Eu, Region::Oc, Region::Ca];

    pub fn code(self) -> &'static str {
        match self {
            Region::Na => "na",
            Region::Eu => "eu",
            Region::Oc => "oc",
            Region::Ca => "ca",
        }
    }

    /// Base URL of the public API for this region.
    pub fn api_url(self) -> &'static str {
        match self {
            Region::Na => "https://app.ninjarmm.com",
            Region::Eu => "https://eu.ninjarmm.com",
            Region::Oc => "https://oc.ninjarmm.com",
            Region::Ca => "https://ca.ninjarmm.com",
        }
    }

    pub fn endpoints(self) -> Endpoints {
        Endpoints::for_base(self.api_url())
    }

    fn valid_codes() -> String {
        Self::ALL
            .iter()
            .map(|region| region.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|region| region.code() == code)
            .ok_or_else(|| Error::InvalidRegion {
                given: s.to_owned(),
                valid: Self::valid_codes(),
            })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The three URLs a client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Prefix for every authenticated API call.
    pub api_base: String,
    /// OAuth2 token endpoint (form-encoded POST).
    pub token: String,
    /// OAuth2 authorization endpoint, presented to the user's browser.
    pub authorize: String,
}

impl Endpoints {
    /// Derive the OAuth endpoints from an API host, the way every region lays them out.
    pub fn for_base(api_base: &str) -> Self {
        let api_base = api_base.trim_end_matches('/');
        Self {
            api_base: api_base.to_owned(),
            token: format!("{api_base}/ws/oauth/token"),
            authorize: format!("{api_base}/ws/oauth/authorize"),
        }
    }
}

/// Resolve a region code straight to its endpoints.
pub fn resolve(code: &str) -> Result<Endpoints, Error> {
    let region: Region = code.parse()?;
    Ok(region.endpoints())
}
