//! Voice session: microphone in, speaker out, typed lines as extra input.

use crate::bootstrap::AppContext;
use anyhow::{Context, Result};
use deskpilot_core::StreamState;
use deskpilot_runtime::audio::{AudioSink, AudioSource};
use deskpilot_runtime::{StreamController, StreamNotice, WebSocketConnector};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

#[cfg(feature = "audio-device")]
fn audio_devices() -> Result<(Box<dyn AudioSource>, Box<dyn AudioSink>)> {
    use deskpilot_runtime::audio::device::{CpalSink, CpalSource};
    Ok((Box::new(CpalSource::new()), Box::new(CpalSink::new())))
}

#[cfg(not(feature = "audio-device"))]
fn audio_devices() -> Result<(Box<dyn AudioSource>, Box<dyn AudioSink>)> {
    anyhow::bail!("Audio devices are unavailable: rebuild with --features audio-device")
}

pub async fn run(context: &mut AppContext) -> Result<()> {
    let api_key = context
        .settings
        .api_key
        .clone()
        .context("An OpenAI API key is required for realtime sessions")?;
    let (source, sink) = audio_devices()?;

    let connector = Arc::new(WebSocketConnector::openai(
        &context.settings.realtime_model,
        api_key,
    ));
    let controller = StreamController::new(
        connector,
        context.dispatcher.clone(),
        context.session.clone(),
        source,
        sink,
    );
    let mut notices = controller.subscribe();

    println!("🎙️  Connecting to {} ...", context.settings.realtime_model);
    controller
        .start()
        .await
        .context("Failed to start realtime session")?;
    println!("Streaming. Speak, or type a message. 'stop' ends the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => continue,
                    "stop" | "exit" | "quit" => break,
                    text => {
                        if let Err(e) = controller.send_text(text).await {
                            eprintln!("❌ {}", e);
                        }
                    }
                }
            }
            notice = notices.recv() => match notice {
                Ok(StreamNotice::AssistantText(text)) => println!("\n🤖 {}\n", text),
                Ok(StreamNotice::ToolResult { operation, ok, message }) => {
                    let mark = if ok { "✅" } else { "❌" };
                    println!("{} {}: {}", mark, operation, message);
                }
                Ok(StreamNotice::ServerError(message)) => eprintln!("⚠️  Server error: {}", message),
                Ok(StreamNotice::State(StreamState::Failed(reason))) => {
                    eprintln!("❌ Stream failed: {}", reason);
                    break;
                }
                Ok(StreamNotice::State(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} stream notices", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    controller.stop().await?;
    context.persist()?;

    let stats = controller.stats();
    println!(
        "Session ended: {} frames sent, {} dropped, {} muted, {} played",
        stats.frames_sent, stats.frames_dropped, stats.frames_muted, stats.frames_played
    );
    Ok(())
}
