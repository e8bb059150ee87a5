//! Utterance translation through a chat-completions API.
//!
//! Translation is best-effort: with no API key configured the agent still
//! produces a marked placeholder so the meeting UI renders something, and an
//! API failure falls back to an error-marked echo of the original text.

use crate::messages::TranslationData;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

fn system_prompt(source_lang: &str, target_lang: &str) -> String {
    format!(
        "You are a fast translator. Translate from {source_lang} to {target_lang} \
(or back to {source_lang} if the input is already {target_lang}). \
Output ONLY the translated text."
    )
}

pub struct Translator {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    source_lang: String,
    target_lang: String,
    system_prompt: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn placeholder_translation(text: &str) -> String {
    format!("Translated: {text}")
}

fn error_translation(text: &str) -> String {
    format!("[Error] {text}")
}

impl Translator {
    pub fn new(api_key: Option<String>, source_lang: &str, target_lang: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            system_prompt: system_prompt(source_lang, target_lang),
        }
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    /// Translate one finalized utterance. Never fails: API problems degrade
    /// to a marked placeholder so the surrounding pipeline keeps going.
    pub async fn translate(&self, text: &str) -> TranslationData {
        let translated_text = match self.api_key.as_deref() {
            None => placeholder_translation(text),
            Some(key) => match self.request_translation(key, text).await {
                Ok(translated) => translated,
                Err(e) => {
                    warn!("translation request failed: {e:#}");
                    error_translation(text)
                }
            },
        };

        TranslationData {
            original_text: text.to_string(),
            translated_text,
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            explanation: String::new(),
        }
    }

    async fn request_translation(&self, api_key: &str, text: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .context("failed to send request")?;

        if !res.status().is_success() {
            let status = res.status();
            let error_text = res.text().await.unwrap_or_default();
            anyhow::bail!("API error ({status}): {error_text}");
        }

        let parsed: ChatResponse = res.json().await.context("undecodable response")?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .context("response carried no translation")?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_api_key_yields_placeholder() {
        let translator = Translator::new(None, "ja", "en");

        let data = translator.translate("こんにちは").await;

        assert_eq!(data.original_text, "こんにちは");
        assert_eq!(data.translated_text, "Translated: こんにちは");
        assert_eq!(data.source_lang, "ja");
        assert_eq!(data.target_lang, "en");
        assert_eq!(data.explanation, "");
    }

    #[test]
    fn fallback_markers() {
        assert_eq!(placeholder_translation("hi"), "Translated: hi");
        assert_eq!(error_translation("hi"), "[Error] hi");
    }

    #[test]
    fn prompt_names_the_configured_pair() {
        let prompt = system_prompt("ko", "fr");

        assert!(prompt.contains("from ko to fr"));
        assert!(!prompt.contains("English"));
        assert!(!prompt.contains("Japanese"));
    }

    #[test]
    fn translator_prompt_follows_constructor_langs() {
        let translator = Translator::new(None, "en", "ja");

        assert!(translator.system_prompt.contains("from en to ja"));
    }

    #[tokio::test]
    async fn lang_pair_is_carried_through() {
        let translator = Translator::new(None, "en", "ja");

        let data = translator.translate("hello").await;

        assert_eq!(data.source_lang, "en");
        assert_eq!(data.target_lang, "ja");
    }
}
