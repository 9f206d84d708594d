//! Pieces of the interactive authorization code flow: the consent URL and how it
//! reaches the user.

use std::process::Command;

use url::Url;

use crate::ninja::config::ClientConfig;

/// Shows the authorization URL to whoever has to consent.
pub trait AuthorizationPresenter: Send + Sync {
    fn present(&self, url: &Url) -> std::io::Result<()>;
}

/// Opens the URL in the system's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPresenter;

impl AuthorizationPresenter for BrowserPresenter {
    fn present(&self, url: &Url) -> std::io::Result<()> {
        #[cfg(target_os = "macos")]
        let command = {
            let mut command = Command::new("open");
            command.arg(url.as_str());
            command
        };

        #[cfg(target_os = "windows")]
        let command = {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", "", url.as_str()]);
            command
        };

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let command = {
            let mut command = Command::new("xdg-open");
            command.arg(url.as_str());
            command
        };

        launch(command)
    }
}

/// Start the opener and reap it in the background so no zombie is left behind.
fn launch(mut command: Command) -> std::io::Result<()> {
    let mut child = command.spawn()?;
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// Does nothing. Something else has to deliver the redirect to the listener, since the
/// flow never logs the full URL (it carries the client secret).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPresenter;

impl AuthorizationPresenter for NoopPresenter {
    fn present(&self, _url: &Url) -> std::io::Result<()> {
        Ok(())
    }
}

/// Fresh opaque value to round-trip through the authorization server.
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build the consent URL the browser is sent to.
pub fn authorization_url(
    config: &ClientConfig,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&config.endpoints().authorize)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("client_id", config.client_id())
        .append_pair("client_secret", config.client_secret())
        .append_pair("scope", config.scope())
        .append_pair("state", state);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ninja::{config::GrantType, region::Region};

    #[test]
    fn url_carries_all_parameters() {
        let config = ClientConfig::builder()
            .grant_type(GrantType::AuthorizationCode)
            .region(Region::Eu)
            .client_id("my id")
            .client_secret("s3cr3t")
            .build()
            .unwrap();

        let url = authorization_url(&config, "http://localhost:4099/oauth", "abc").unwrap();
        assert_eq!(url.host_str(), Some("eu.ninjarmm.com"));
        assert_eq!(url.path(), "/ws/oauth/authorize");

        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["redirect_uri"], "http://localhost:4099/oauth");
        assert_eq!(query["client_id"], "my id");
        assert_eq!(query["client_secret"], "s3cr3t");
        assert_eq!(query["scope"], "monitoring management control");
        assert_eq!(query["state"], "abc");
    }

    #[cfg(unix)]
    #[test]
    fn launch_reaps_the_opener() {
        let mut command = Command::new("true");
        command.arg("ignored");
        launch(command).unwrap();
    }

    #[test]
    fn launch_reports_missing_opener() {
        let command = Command::new("ninja-rmm-no-such-opener");
        assert!(launch(command).is_err());
    }

    #[test]
    fn state_is_fresh_each_time() {
        let first = generate_state();
        let second = generate_state();
        assert_ne!(first, second);
        assert_eq!(first.len(), 32);
    }
}
