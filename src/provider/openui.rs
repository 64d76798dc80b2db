use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::Client;
use std::io::Write;
use tracing::{debug, warn};

use super::Provider;
use crate::config::Config;
use crate::errors::TransportError;
use crate::stream;
use crate::wire::{ChatRequest, Completion, Conversation};

const USER_AGENT: &str = concat!("openui-codegen/", env!("CARGO_PKG_VERSION"));

/// Streaming client for an OpenUI (or any OpenAI-compatible) chat endpoint.
pub struct OpenUiProvider {
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: Option<String>,
    cookie_header: Option<String>,
    echo: bool,
    client: Client,
}

impl OpenUiProvider {
    pub fn from_config(cfg: &Config, echo: bool) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            endpoint: endpoint_for(&cfg.base_url),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            api_key: cfg.api_key.clone(),
            cookie_header: cfg.cookie_header(),
            echo,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint_for(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

#[async_trait]
impl Provider for OpenUiProvider {
    async fn stream_completion(&self, conversation: &Conversation) -> Result<Completion, TransportError> {
        let body = ChatRequest::streaming(&self.model, conversation, self.max_tokens, self.temperature);
        debug!(url = %self.endpoint, model = %self.model, messages = body.messages.len(), "sending streaming request");

        let mut req = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(cookies) = &self.cookie_header {
            req = req.header(COOKIE, cookies);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "endpoint rejected request");
            return Err(TransportError::Status { code: status.as_u16(), body });
        }

        let echo = self.echo;
        let completion = stream::collect(stream::chunks(resp.bytes_stream()), |token| {
            if echo {
                print!("{token}");
                std::io::stdout().flush().ok();
            }
        })
        .await?;

        if echo {
            println!();
        }
        debug!(
            chars = completion.content.len(),
            finish_reason = completion.finish_reason.as_str(),
            "stream finished"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        assert_eq!(endpoint_for("http://localhost:7878/"), "http://localhost:7878/v1/chat/completions");
        assert_eq!(endpoint_for("http://h"), "http://h/v1/chat/completions");
    }

    #[test]
    fn builds_from_config_with_cookies() {
        let mut cfg = Config::default();
        cfg.cookies.insert("session".into(), "abc".into());
        let p = OpenUiProvider::from_config(&cfg, false).unwrap();
        assert_eq!(p.endpoint(), "http://localhost:7878/v1/chat/completions");
        assert_eq!(p.cookie_header.as_deref(), Some("session=abc"));
        assert!(p.api_key.is_none());
    }
}
