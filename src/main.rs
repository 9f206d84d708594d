use anyhow::Context;
use ninja_rmm::{ApiRequest, ClientConfig, ManagedClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env().context("invalid NINJA_* configuration")?;
    info!(
        message = "Configured client",
        grant_type = %config.grant_type(),
        region = %config.region(),
    );

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/v2/organizations".to_owned());

    let client = ManagedClient::from_config(config).context("unable to build http client")?;
    let body: serde_json::Value = client.request(ApiRequest::get(path)).await?;

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
