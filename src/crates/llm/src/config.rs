use std::time::Duration;

/// Connection settings for one OpenAI-protocol endpoint.
#[derive(Debug, Clone)]
pub struct RemoteLlmConfig {
    pub base_url: String,

    pub api_key: String,

    pub model: String,

    pub connect_timeout: Duration,

    /// Generous to tolerate long streamed completions.
    pub request_timeout: Duration,
}

impl RemoteLlmConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = RemoteLlmConfig::new("https://api.example.com/v1/", "key", "model-a");
        assert_eq!(config.base_url, "https://api.example.com/v1");
    }
}
