use serde::{Deserialize, Serialize};

/// Frames the backend understands on the meeting socket. Everything is JSON
/// with a `type` tag; the browser clients decode the same shapes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Chat { text: String, lang: String },

    Translation { data: TranslationData },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranslationData {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub explanation: String,
}

pub const CONNECT_NOTICE_TEXT: &str = "--- Transcriber Bot Connected (Authenticated) ---";

impl OutboundMessage {
    /// System notice sent once right after the backend socket opens.
    pub fn connect_notice() -> Self {
        OutboundMessage::Chat {
            text: CONNECT_NOTICE_TEXT.to_string(),
            lang: "en".to_string(),
        }
    }

    /// A finalized transcript, rendered the way the meeting UI expects it.
    pub fn transcript_chat(text: &str, lang: &str) -> Self {
        OutboundMessage::Chat {
            text: format!("🎤 {text}"),
            lang: lang.to_string(),
        }
    }

    pub fn translation(data: TranslationData) -> Self {
        OutboundMessage::Translation { data }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_frame_shape() {
        let msg = OutboundMessage::Chat {
            text: "🎤 こんにちは".to_string(),
            lang: "ja".to_string(),
        };

        let json = msg.to_json().expect("serialize should succeed");
        assert_eq!(json, r#"{"type":"chat","text":"🎤 こんにちは","lang":"ja"}"#);
    }

    #[test]
    fn translation_frame_shape() {
        let msg = OutboundMessage::translation(TranslationData {
            original_text: "こんにちは".to_string(),
            translated_text: "Hello".to_string(),
            source_lang: "ja".to_string(),
            target_lang: "en".to_string(),
            explanation: String::new(),
        });

        let json = msg.to_json().expect("serialize should succeed");
        assert_eq!(
            json,
            r#"{"type":"translation","data":{"original_text":"こんにちは","translated_text":"Hello","source_lang":"ja","target_lang":"en","explanation":""}}"#
        );
    }

    #[test]
    fn connect_notice_is_a_chat_frame() {
        let json = OutboundMessage::connect_notice()
            .to_json()
            .expect("serialize should succeed");

        assert!(json.starts_with(r#"{"type":"chat""#));
        assert!(json.contains("Transcriber Bot Connected"));
    }

    #[test]
    fn transcript_chat_prefixes_mic_marker() {
        let OutboundMessage::Chat { text, lang } =
            OutboundMessage::transcript_chat("hello", "ja")
        else {
            panic!("expected chat variant");
        };

        assert_eq!(text, "🎤 hello");
        assert_eq!(lang, "ja");
    }
}
