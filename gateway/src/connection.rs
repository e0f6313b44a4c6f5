//! Binds one WebSocket connection to one transcription `Session`: decodes
//! control frames, classifies binary frames by byte-length alignment, and
//! emits response frames.

use crate::config::SessionParams;
use crate::engine::WhisperEngine;
use crate::session::Session;
use anyhow::Result;
use futures_util::{Sink, SinkExt, StreamExt};
use shared_audio::{decode_pcm, FrameError};
use shared_protocol::{ClientMessage, ServerMessage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use whisper_rs::WhisperContext;

const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// The engine's native sample rate. PCM input is assumed to already match
/// this rate; the gateway does not resample.
pub const SAMPLE_RATE: u32 = 16000;

pub async fn handle_connection(
    stream: TcpStream,
    user_id: u64,
    ctx: Arc<WhisperContext>,
    params: SessionParams,
) -> Result<()> {
    let config = WebSocketConfig {
        max_message_size: Some(MAX_FRAME_BYTES),
        max_frame_size: Some(MAX_FRAME_BYTES),
        ..Default::default()
    };
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(config)).await?;
    let (mut sender, mut receiver) = ws_stream.split();

    let engine = WhisperEngine::new(ctx)?;
    let mut session = Session::new(Box::new(engine), params, SAMPLE_RATE, user_id);

    send_json(
        &mut sender,
        &ServerMessage::Connected {
            user_id,
            message: "connected".to_string(),
            format: "pcm_f32le_or_s16le".to_string(),
            sample_rate: SAMPLE_RATE,
        },
    )
    .await?;

    loop {
        let next = match timeout(IDLE_TIMEOUT, receiver.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                warn!(user_id, error = %e, "websocket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!(user_id, "idle timeout, closing connection");
                break;
            }
        };

        match next {
            Message::Text(text) => {
                dispatch_control(&text, &mut session, &mut sender, user_id).await?;
            }
            Message::Binary(data) => {
                dispatch_audio(&data, &mut session, &mut sender, user_id).await?;
            }
            Message::Ping(data) => {
                sender.send(Message::Pong(data)).await?;
            }
            Message::Pong(_) | Message::Frame(_) => {}
            Message::Close(_) => break,
        }
    }

    info!(user_id, "session ended");
    Ok(())
}

async fn dispatch_control<S>(
    text: &str,
    session: &mut Session,
    sender: &mut S,
    user_id: u64,
) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Config { .. }) => {
            // Accepted and acknowledged; not yet applied to the running session.
            send_json(sender, &ServerMessage::ok_config_updated()).await
        }
        Ok(ClientMessage::Flush) => {
            let text = session.flush(Instant::now());
            send_json(sender, &ServerMessage::FlushComplete { text, user_id }).await
        }
        Ok(ClientMessage::Reset) => {
            session.reset(Instant::now());
            send_json(sender, &ServerMessage::ok_reset()).await
        }
        Err(e) => send_json(sender, &ServerMessage::error(format!("malformed control message: {e}"))).await,
    }
}

async fn dispatch_audio<S>(
    data: &[u8],
    session: &mut Session,
    sender: &mut S,
    user_id: u64,
) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match decode_pcm(data) {
        Ok(samples) => {
            session.push_audio(&samples);
            let text = session.drain_if_ready(Instant::now());
            if !text.is_empty() {
                send_json(sender, &ServerMessage::Transcription { text, user_id }).await?;
            }
            Ok(())
        }
        Err(FrameError::UnalignedLength(len)) => {
            send_json(
                sender,
                &ServerMessage::error(format!("unsupported binary frame length: {len} bytes")),
            )
            .await
        }
    }
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineError, EngineOptions, EngineOutput};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Collects every frame sent through it; never backs up, never errors.
    #[derive(Default)]
    struct VecSink(Vec<Message>);

    impl Sink<Message> for VecSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.get_mut().0.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    impl VecSink {
        fn texts(&self) -> Vec<&str> {
            self.0
                .iter()
                .filter_map(|m| match m {
                    Message::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    /// Always returns the same canned segments, one canned response per call.
    struct FakeEngine {
        responses: std::collections::VecDeque<Vec<crate::engine::EngineSegment>>,
    }

    impl FakeEngine {
        fn always(segments: Vec<crate::engine::EngineSegment>) -> Self {
            Self {
                responses: std::iter::repeat(segments).take(100).collect(),
            }
        }
    }

    impl Engine for FakeEngine {
        fn transcribe(
            &mut self,
            _samples: &[f32],
            _prompt_tokens: &[i32],
            _options: &EngineOptions,
        ) -> Result<EngineOutput, EngineError> {
            let segments = self.responses.pop_front().unwrap_or_default();
            Ok(EngineOutput { segments })
        }
    }

    fn seg(text: &str) -> crate::engine::EngineSegment {
        crate::engine::EngineSegment {
            text: text.to_string(),
            start_ms: 0,
            end_ms: 100,
            speaker_turn: false,
            token_ids: vec![],
        }
    }

    fn test_params() -> SessionParams {
        SessionParams {
            step_ms: 50,
            length_ms: 200,
            keep_ms: 20,
            no_timestamps: true,
            ..SessionParams::default()
        }
    }

    fn test_session(engine: Box<dyn Engine>, user_id: u64) -> Session {
        Session::new(engine, test_params(), SAMPLE_RATE, user_id)
    }

    #[tokio::test]
    async fn welcome_message_has_expected_shape_and_increments_user_id() {
        let mut sink = VecSink::default();
        send_json(
            &mut sink,
            &ServerMessage::Connected {
                user_id: 1,
                message: "connected".to_string(),
                format: "pcm_f32le_or_s16le".to_string(),
                sample_rate: SAMPLE_RATE,
            },
        )
        .await
        .unwrap();

        let mut second = VecSink::default();
        send_json(
            &mut second,
            &ServerMessage::Connected {
                user_id: 2,
                message: "connected".to_string(),
                format: "pcm_f32le_or_s16le".to_string(),
                sample_rate: SAMPLE_RATE,
            },
        )
        .await
        .unwrap();

        let first: serde_json::Value = serde_json::from_str(sink.texts()[0]).unwrap();
        assert_eq!(first["type"], "connected");
        assert_eq!(first["user_id"], 1);
        assert_eq!(first["sample_rate"], SAMPLE_RATE);

        let second: serde_json::Value = serde_json::from_str(second.texts()[0]).unwrap();
        assert_eq!(second["user_id"], 2);
    }

    #[tokio::test]
    async fn single_window_feed_emits_exactly_one_transcription_frame() {
        let engine = Box::new(FakeEngine::always(vec![seg("hello there")]));
        let mut session = test_session(engine, 7);
        let user_id = session.user_id();
        let mut sink = VecSink::default();

        let samples = vec![0.0f32; 2400]; // 50ms at 16kHz, f32le
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        dispatch_audio(&bytes, &mut session, &mut sink, user_id)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        dispatch_audio(&bytes, &mut session, &mut sink, user_id)
            .await
            .unwrap();

        let transcriptions: Vec<&str> = sink
            .texts()
            .into_iter()
            .filter(|t| t.contains("\"transcription\""))
            .collect();
        assert_eq!(transcriptions.len(), 1);
        let msg: serde_json::Value = serde_json::from_str(transcriptions[0]).unwrap();
        assert_eq!(msg["user_id"], 7);
        assert_eq!(msg["text"], "hello there");
    }

    #[tokio::test]
    async fn flush_of_empty_buffer_returns_empty_text() {
        let engine = Box::new(FakeEngine::always(vec![]));
        let mut session = test_session(engine, 3);
        let mut sink = VecSink::default();

        dispatch_control("{\"type\":\"flush\"}", &mut session, &mut sink, 3)
            .await
            .unwrap();

        let msg: serde_json::Value = serde_json::from_str(sink.texts()[0]).unwrap();
        assert_eq!(msg["type"], "flush_complete");
        assert_eq!(msg["text"], "");
        assert_eq!(msg["user_id"], 3);
    }

    #[tokio::test]
    async fn int16_frame_is_auto_detected_and_produces_no_error() {
        let engine = Box::new(FakeEngine::always(vec![]));
        let mut session = test_session(engine, 9);
        let mut sink = VecSink::default();

        // 6002 bytes is 2-aligned but not 4-aligned, forcing the int16 path
        // (a 4-aligned length would be decoded as float32 instead).
        let bytes = vec![0u8; 6002];
        dispatch_audio(&bytes, &mut session, &mut sink, 9).await.unwrap();

        assert_eq!(session.buffer_len(), 3001);
        assert!(sink.texts().iter().all(|t| !t.contains("\"error\"")));
    }
}
