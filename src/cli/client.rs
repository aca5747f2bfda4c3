use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Thin HTTP client over the results API envelope
pub struct ApiClient {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(server: &str, token: Option<String>) -> anyhow::Result<Self> {
        let base = Url::parse(server).map_err(|e| anyhow::anyhow!("Invalid server URL '{}': {}", server, e))?;
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { base, token, http })
    }

    /// Build an endpoint URL, skipping empty query values
    pub fn endpoint(&self, path: &str, query: &[(&str, Option<String>)]) -> anyhow::Result<Url> {
        let mut url = self.base.join(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    pub async fn health(&self) -> anyhow::Result<Value> {
        let url = self.endpoint("/health", &[])?;
        self.send(self.http.get(url)).await
    }

    /// GET a protected endpoint and return the `data` member of the envelope
    pub async fn get(&self, path: &str, query: &[(&str, Option<String>)]) -> anyhow::Result<Value> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No token provided (use --token or RESULTS_TOKEN)"))?;
        let url = self.endpoint(path, query)?;
        self.send(self.http.get(url).bearer_auth(token)).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> anyhow::Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            anyhow::bail!("{} ({})", message, status);
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}
