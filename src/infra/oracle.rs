//! 生成模型客户端。流水线只依赖 [`GenerativeOracle`]，具体服务商可替换。

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::infra::config::OracleSettings;

#[async_trait]
pub trait GenerativeOracle: Send + Sync {
    /// 一次请求/响应：系统指令 + 用户载荷 -> 文本
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

/// OpenAI 兼容的 chat-completions 客户端（含 Azure 部署布局）
pub struct ChatCompletionsOracle {
    client: reqwest::Client,
    url: String,
    settings: OracleSettings,
}

impl ChatCompletionsOracle {
    pub fn new(settings: OracleSettings) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;
        Ok(Self {
            client,
            url: completions_url(&settings),
            settings,
        })
    }
}

fn completions_url(s: &OracleSettings) -> String {
    let base = s.endpoint.trim_end_matches('/');
    match &s.api_version {
        Some(version) => format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            base, s.model, version
        ),
        None if base.ends_with("/v1") => format!("{}/chat/completions", base),
        None => format!("{}/v1/chat/completions", base),
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerativeOracle for ChatCompletionsOracle {
    #[instrument(skip_all, fields(system_len = system.len(), user_len = user.len()))]
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let mut req = self.client.post(&self.url);
        if self.settings.api_version.is_some() {
            req = req.header("api-key", &self.settings.api_key);
        } else {
            body["model"] = json!(self.settings.model);
            req = req.bearer_auth(&self.settings.api_key);
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("failed to reach generative oracle at {} ({e})", self.url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("oracle http error {status}: {text}"));
        }

        let out: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("oracle returned invalid JSON: {e}"))?;
        let content = out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("oracle returned no choices"))?;
        debug!("模型返回 {} 字符", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: &str, api_version: Option<&str>) -> OracleSettings {
        OracleSettings {
            endpoint: endpoint.into(),
            api_key: "k".into(),
            model: "o3-mini".into(),
            api_version: api_version.map(str::to_string),
            timeout: None,
        }
    }

    #[test]
    fn azure_layout_uses_deployment_path() {
        let url = completions_url(&settings("https://res.openai.azure.com/", Some("2024-12-01-preview")));
        assert_eq!(
            url,
            "https://res.openai.azure.com/openai/deployments/o3-mini/chat/completions?api-version=2024-12-01-preview"
        );
    }

    #[test]
    fn openai_layout_appends_v1_once() {
        assert_eq!(
            completions_url(&settings("http://localhost:11434", None)),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            completions_url(&settings("http://localhost:11434/v1/", None)),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
