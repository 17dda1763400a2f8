use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Delivers rendered messages to the single configured destination.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unknown placeholder '{{{0}}}' in notification template")]
    UnknownPlaceholder(String),
    #[error("unbalanced '{0}' in notification template")]
    UnbalancedBrace(char),
}

/// Fill `{name}` and `{url}` in `template`. `{{` and `}}` produce literal braces.
pub fn render(template: &str, name: &str, url: &str) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len() + name.len() + url.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(RenderError::UnbalancedBrace('{')),
                        Some(k) => key.push(k),
                    }
                }
                match key.as_str() {
                    "name" => out.push_str(name),
                    "url" => out.push_str(url),
                    _ => return Err(RenderError::UnknownPlaceholder(key)),
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(RenderError::UnbalancedBrace('}')),
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Telegram Bot API client bound to one chat.
pub struct TelegramNotifier {
    api_url: String,
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        // the endpoint embeds the token, keep it out of error messages
        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram request failed: {}", e.without_url()))?;

        let status = response.status();
        let api: Option<ApiResponse> = response.json().await.ok();

        match api {
            Some(api) if status.is_success() && api.ok => Ok(()),
            Some(api) => anyhow::bail!(
                "Telegram API error {}: {}",
                status,
                api.description.unwrap_or_default()
            ),
            None => anyhow::bail!("Telegram API error {}: unreadable response", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_placeholders() {
        let text = render("New post on {name}: {url}", "Blog", "http://a.test/p2").unwrap();
        assert_eq!(text, "New post on Blog: http://a.test/p2");
    }

    #[test]
    fn placeholders_may_repeat_or_be_absent() {
        assert_eq!(render("{url} {url}", "n", "u").unwrap(), "u u");
        assert_eq!(render("static text", "n", "u").unwrap(), "static text");
    }

    #[test]
    fn doubled_braces_are_literal() {
        assert_eq!(render("{{{name}}}", "x", "u").unwrap(), "{x}");
    }

    #[test]
    fn substituted_values_are_not_reinterpreted() {
        assert_eq!(render("{name}", "{url}", "u").unwrap(), "{url}");
    }

    #[test]
    fn rejects_bad_templates() {
        assert_eq!(
            render("{title}", "n", "u"),
            Err(RenderError::UnknownPlaceholder("title".into()))
        );
        assert_eq!(render("oops {name", "n", "u"), Err(RenderError::UnbalancedBrace('{')));
        assert_eq!(render("oops }", "n", "u"), Err(RenderError::UnbalancedBrace('}')));
    }
}
