//! Solution providers: an OpenRouter chat-completion client and an offline demo provider.

use askama::Template;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::judge::Language;
use crate::model::Task;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "kwaipilot/kat-coder-pro:free";
const SYSTEM_PROMPT: &str = "You are an expert competitive programmer. Write clean, efficient \
     programs that read from standard input and write to standard output.";

/// Program submitted when the provider fails.
pub const FALLBACK_SOLUTION: &str = "print(input())";

const DEMO_DEFAULT: &str =
    "import sys\ndata = sys.stdin.read().strip()\nprint(data if data else '0')";

#[async_trait]
pub trait SolutionProvider: Send + Sync {
    /// Answer a prompt with free text that should contain a fenced program.
    async fn propose(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Template)]
#[template(path = "prompt.txt.j2", escape = "none")]
pub struct SolutionPrompt<'a> {
    pub task: &'a Task,
    pub language: Language,
    /// Retry context from the history store; may be empty.
    pub context: &'a str,
}

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    referer: Option<String>,
    site_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Result<String, ProviderError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::Empty)
    }
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENROUTER_API_URL.to_string(),
            referer: None,
            site_name: None,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attribution headers sent with every request.
    pub fn with_attribution(mut self, referer: impl Into<String>, site_name: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self.site_name = Some(site_name.into());
        self
    }
}

#[async_trait]
impl SolutionProvider for OpenRouterClient {
    async fn propose(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(site_name) = &self.site_name {
            builder = builder.header("X-Title", site_name);
        }

        debug!(model = %self.model, "requesting solution");
        let res = builder.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }
        res.json::<ChatResponse>().await?.into_content()
    }
}

/// Offline provider with canned answers for a few well-known tasks.
#[derive(Debug, Default)]
pub struct DemoProvider;

impl DemoProvider {
    fn canned(id: &str) -> Option<&'static str> {
        let code = match id {
            "1" => "a, b = map(int, input().split())\nprint(a + b)",
            "2" => "n = int(input())\nprint(n)",
            "3" => "n = int(input())\nprint(n + 1)",
            "100" => "print(sum(map(int, input().split())))",
            "200" => "n = int(input())\nprint(n * n)",
            "500" => "print(input().upper())",
            "1000" => "print('Hello, World!')",
            _ => return None,
        };
        Some(code)
    }
}

#[async_trait]
impl SolutionProvider for DemoProvider {
    async fn propose(&self, prompt: &str) -> Result<String, ProviderError> {
        let code = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Task "))
            .and_then(|rest| rest.split(':').next())
            .and_then(Self::canned)
            .unwrap_or(DEMO_DEFAULT);
        Ok(format!("```python\n{code}\n```"))
    }
}
