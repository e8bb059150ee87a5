//! Streaming speech recognizer client.
//!
//! Speaks the realtime transcription protocol: one websocket per audio
//! track, PCM16 chunks in, transcription events out. The session owns a
//! single send/receive loop; callers talk to it through channels.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, SttError>;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("{0}")]
    Message(String),
}

/// Sample rate the provider expects for `pcm16` input (mono).
pub const RECOGNIZER_SAMPLE_RATE: u32 = 24_000;

const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";
const DEFAULT_MODEL: &str = "gpt-4o-transcribe";

/// How long to wait for in-flight transcripts after end of input before the
/// socket is closed anyway.
const END_OF_INPUT_DRAIN: Duration = Duration::from_secs(5);

/// One ranked transcript hypothesis.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptAlternative {
    pub text: String,
    pub lang: String,
}

/// Interim or final recognizer output for one utterance.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechEvent {
    pub is_final: bool,
    pub alternatives: Vec<TranscriptAlternative>,
}

impl SpeechEvent {
    pub fn top_text(&self) -> Option<&str> {
        self.alternatives.first().map(|alt| alt.text.as_str())
    }
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ClientEvent {
    #[serde(rename = "transcription_session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    AudioAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    AudioCommit,
}

#[derive(Serialize)]
struct SessionConfig {
    input_audio_format: String,
    input_audio_transcription: TranscriptionConfig,
    turn_detection: TurnDetection,
}

#[derive(Serialize)]
struct TranscriptionConfig {
    model: String,
    language: String,
}

#[derive(Serialize)]
struct TurnDetection {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ServerEvent {
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta { delta: String },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(rename = "error")]
    Error { error: ServerErrorDetail },

    #[serde(other)]
    Ignored,
}

#[derive(Deserialize, Debug)]
struct ServerErrorDetail {
    message: String,
}

#[derive(Debug)]
pub(crate) enum SendCmd {
    Frame(Vec<i16>),
    EndOfInput,
}

fn pcm16_to_base64(pcm: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(&bytes)
}

fn encode_client_event(event: &ClientEvent) -> Result<String> {
    serde_json::to_string(event).map_err(|e| SttError::Message(e.to_string()))
}

fn decode_server_event(text: &str) -> Result<ServerEvent> {
    serde_json::from_str(text).map_err(|e| SttError::Message(e.to_string()))
}

fn speech_event_for(server: &ServerEvent, lang: &str) -> Option<SpeechEvent> {
    match server {
        ServerEvent::TranscriptionDelta { delta } => Some(SpeechEvent {
            is_final: false,
            alternatives: vec![TranscriptAlternative {
                text: delta.clone(),
                lang: lang.to_string(),
            }],
        }),
        ServerEvent::TranscriptionCompleted { transcript } => Some(SpeechEvent {
            is_final: true,
            alternatives: vec![TranscriptAlternative {
                text: transcript.clone(),
                lang: lang.to_string(),
            }],
        }),
        ServerEvent::Error { .. } | ServerEvent::Ignored => None,
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecognizerBuilder {
    url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    language: Option<String>,
}

impl RecognizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    pub async fn connect(self) -> Result<RecognizerSession> {
        let url = self
            .url
            .unwrap_or_else(|| DEFAULT_REALTIME_URL.to_string());
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let language = self.language.unwrap_or_else(|| "ja".to_string());

        let mut req = url
            .into_client_request()
            .map_err(|e| SttError::Message(e.to_string()))?;

        if let Some(key) = self.api_key.as_deref() {
            let header_value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| SttError::Message(e.to_string()))?;
            req.headers_mut().insert(AUTHORIZATION, header_value);
        }
        req.headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _resp) = connect_async(req)
            .await
            .map_err(|e| SttError::Message(e.to_string()))?;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let session_update = encode_client_event(&ClientEvent::SessionUpdate {
            session: SessionConfig {
                input_audio_format: "pcm16".to_string(),
                input_audio_transcription: TranscriptionConfig {
                    model,
                    language: language.clone(),
                },
                turn_detection: TurnDetection {
                    kind: "server_vad".to_string(),
                },
            },
        })?;
        ws_write
            .send(Message::Text(session_update.into()))
            .await
            .map_err(|e| SttError::Message(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel::<SendCmd>(128);
        let (event_tx, event_rx) = mpsc::channel::<SpeechEvent>(128);

        let session_loop: JoinHandle<Result<()>> = tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = rx.recv() => {
                        let Some(cmd) = cmd else {
                            let _ = ws_write.send(Message::Close(None)).await;
                            break;
                        };

                        match cmd {
                            SendCmd::Frame(pcm) => {
                                let append = encode_client_event(&ClientEvent::AudioAppend {
                                    audio: pcm16_to_base64(&pcm),
                                })?;
                                ws_write
                                    .send(Message::Text(append.into()))
                                    .await
                                    .map_err(|e| SttError::Message(e.to_string()))?;
                            }
                            SendCmd::EndOfInput => {
                                let commit = encode_client_event(&ClientEvent::AudioCommit)?;
                                let _ = ws_write.send(Message::Text(commit.into())).await;

                                // Drain whatever the recognizer still has in
                                // flight, then close, so the event channel
                                // drops and consumers see end of stream.
                                let _ = timeout(END_OF_INPUT_DRAIN, async {
                                    while let Some(Ok(msg)) = ws_read.next().await {
                                        match msg {
                                            Message::Text(text) => {
                                                let Ok(server) =
                                                    decode_server_event(text.as_str())
                                                else {
                                                    continue;
                                                };

                                                if let Some(event) =
                                                    speech_event_for(&server, &language)
                                                {
                                                    let is_final = event.is_final;
                                                    if event_tx.send(event).await.is_err()
                                                        || is_final
                                                    {
                                                        break;
                                                    }
                                                }
                                            }
                                            Message::Close(_) => break,
                                            _ => {}
                                        }
                                    }
                                })
                                .await;

                                let _ = ws_write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    item = ws_read.next() => {
                        let Some(item) = item else {
                            break;
                        };

                        let msg = match item {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!("recognizer transport error: {e}");
                                break;
                            }
                        };

                        match msg {
                            Message::Text(text) => {
                                let server = match decode_server_event(text.as_str()) {
                                    Ok(server) => server,
                                    Err(e) => {
                                        debug!("undecodable recognizer event: {e}");
                                        continue;
                                    }
                                };

                                if let ServerEvent::Error { error } = &server {
                                    warn!("recognizer error event: {}", error.message);
                                }

                                if let Some(event) = speech_event_for(&server, &language) {
                                    if event_tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                }
            }

            Ok(())
        });

        Ok(RecognizerSession {
            sender: FrameSender { tx },
            session_loop: Some(session_loop),
            event_rx,
        })
    }
}

/// A live recognizer stream for one audio track.
pub struct RecognizerSession {
    sender: FrameSender,
    session_loop: Option<JoinHandle<Result<()>>>,
    event_rx: mpsc::Receiver<SpeechEvent>,
}

impl RecognizerSession {
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Next recognizer event; `None` once the session loop has ended.
    pub async fn recv(&mut self) -> Option<SpeechEvent> {
        self.event_rx.recv().await
    }

    /// Session backed by bare channels, for driving the pipeline in tests.
    #[cfg(test)]
    pub(crate) fn from_parts(
        tx: mpsc::Sender<SendCmd>,
        event_rx: mpsc::Receiver<SpeechEvent>,
    ) -> Self {
        Self {
            sender: FrameSender { tx },
            session_loop: None,
            event_rx,
        }
    }
}

impl Drop for RecognizerSession {
    fn drop(&mut self) {
        if let Some(handle) = self.session_loop.take() {
            handle.abort();
        }
    }
}

#[derive(Clone, Debug)]
pub struct FrameSender {
    tx: mpsc::Sender<SendCmd>,
}

impl FrameSender {
    pub async fn push_frame(&self, pcm: Vec<i16>) -> Result<()> {
        self.tx
            .send(SendCmd::Frame(pcm))
            .await
            .map_err(|_| SttError::Message("recognizer session ended".to_string()))
    }

    /// Signal that no further audio will arrive for this track.
    pub async fn end_input(&self) -> Result<()> {
        self.tx
            .send(SendCmd::EndOfInput)
            .await
            .map_err(|_| SttError::Message("recognizer session ended".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_event_carries_base64_pcm16() {
        let json = encode_client_event(&ClientEvent::AudioAppend {
            audio: pcm16_to_base64(&[0, 1, -1]),
        })
        .expect("encode should succeed");

        // 0x0000, 0x0001, 0xffff little-endian
        assert_eq!(
            json,
            r#"{"type":"input_audio_buffer.append","audio":"AAABAP//"}"#
        );
    }

    #[test]
    fn session_update_configures_pcm16_and_vad() {
        let json = encode_client_event(&ClientEvent::SessionUpdate {
            session: SessionConfig {
                input_audio_format: "pcm16".to_string(),
                input_audio_transcription: TranscriptionConfig {
                    model: DEFAULT_MODEL.to_string(),
                    language: "ja".to_string(),
                },
                turn_detection: TurnDetection {
                    kind: "server_vad".to_string(),
                },
            },
        })
        .expect("encode should succeed");

        assert!(json.starts_with(r#"{"type":"transcription_session.update""#));
        assert!(json.contains(r#""input_audio_format":"pcm16""#));
        assert!(json.contains(r#""turn_detection":{"type":"server_vad"}"#));
    }

    #[test]
    fn delta_decodes_to_interim_event() {
        let server = decode_server_event(
            r#"{"type":"conversation.item.input_audio_transcription.delta","item_id":"it_1","delta":"こん"}"#,
        )
        .expect("decode should succeed");

        let event = speech_event_for(&server, "ja").expect("delta should map to an event");
        assert!(!event.is_final);
        assert_eq!(event.top_text(), Some("こん"));
        assert_eq!(event.alternatives[0].lang, "ja");
    }

    #[test]
    fn completed_decodes_to_final_event() {
        let server = decode_server_event(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"it_1","transcript":"こんにちは"}"#,
        )
        .expect("decode should succeed");

        let event = speech_event_for(&server, "ja").expect("completed should map to an event");
        assert!(event.is_final);
        assert_eq!(event.top_text(), Some("こんにちは"));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let server = decode_server_event(
            r#"{"type":"input_audio_buffer.committed","item_id":"it_1"}"#,
        )
        .expect("unknown types should still decode");

        assert!(speech_event_for(&server, "ja").is_none());
    }

    #[test]
    fn error_event_maps_to_no_speech_event() {
        let server = decode_server_event(
            r#"{"type":"error","error":{"message":"bad frame"}}"#,
        )
        .expect("decode should succeed");

        assert!(speech_event_for(&server, "ja").is_none());
    }

    #[tokio::test]
    async fn end_input_flushes_final_transcript_and_ends_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");

        // Minimal recognizer stand-in: answer the commit with one final
        // transcript, then report whether a close frame followed.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");
            let (mut write, mut read) = ws.split();

            let first = read.next().await.expect("session update").expect("ok");
            assert!(first
                .to_text()
                .expect("text frame")
                .contains("transcription_session.update"));

            let mut saw_commit = false;
            while let Some(Ok(msg)) = read.next().await {
                match msg {
                    Message::Text(text) => {
                        if text.as_str().contains("input_audio_buffer.commit") {
                            saw_commit = true;
                            let completed = r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"it_1","transcript":"おわり"}"#;
                            write
                                .send(Message::Text(completed.into()))
                                .await
                                .expect("send completed");
                        }
                    }
                    Message::Close(_) => return saw_commit,
                    _ => {}
                }
            }
            saw_commit
        });

        let mut session = RecognizerBuilder::new()
            .url(format!("ws://{addr}"))
            .connect()
            .await
            .expect("connect should succeed");
        let sender = session.sender();

        sender.push_frame(vec![0; 4]).await.expect("push frame");
        sender.end_input().await.expect("end input");

        let event = timeout(Duration::from_secs(2), session.recv())
            .await
            .expect("final transcript should arrive after commit")
            .expect("event stream should still be open");
        assert!(event.is_final);
        assert_eq!(event.top_text(), Some("おわり"));

        // The event stream must end once the input is committed, so that
        // per-track consumers can finish instead of waiting forever.
        let end = timeout(Duration::from_secs(2), session.recv())
            .await
            .expect("session should end after end_input");
        assert!(end.is_none());

        let saw_commit = timeout(Duration::from_secs(2), server)
            .await
            .expect("server should see the close frame")
            .expect("server task");
        assert!(saw_commit);
    }
}
