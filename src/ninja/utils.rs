/// A non-2xx answer from the NinjaOne servers.
#[derive(Debug, thiserror::Error)]
#[error("{status_code} status code{}", describe_body(.body))]
pub struct ServerError {
    pub status_code: u16,
    /// Response body as sent by the server, truncated.
    pub body: String,
}

const MAX_BODY_CHARS: usize = 512;

fn describe_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

/// Pass successful responses through, turn anything else into a [`ServerError`].
///
/// The body of a failed response is consumed so it can be reported.
pub async fn ensure_success(res: reqwest::Response) -> Result<reqwest::Response, ServerError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ServerError {
        status_code: status.as_u16(),
        body: body.trim().chars().take(MAX_BODY_CHARS).collect(),
    })
}
