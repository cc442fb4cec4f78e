//! `threadline chat` — one streamed turn against a thread, from the
//! terminal.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use threadline_agent::{AgentLoop, RenderOp, RunOptions, ToolDispatcher, ViewState};
use threadline_config::AppConfig;
use threadline_core::event::EventBus;
use threadline_core::message::{Message, ThreadId};
use threadline_providers::{OpenAiCompatProvider, RetryProvider};

pub async fn run(thread: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = super::open_store(&config).await?;

    let upstream = OpenAiCompatProvider::new(
        &config.provider,
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    )?;
    let provider = Arc::new(
        RetryProvider::new(Arc::new(upstream)).with_max_attempts(config.relay.retry_attempts),
    );
    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(threadline_tools::default_registry()),
        Duration::from_secs(config.relay.tool_timeout_secs),
    ));

    let agent = Arc::new(
        AgentLoop::new(
            provider,
            store,
            dispatcher,
            &config.default_model,
            Arc::new(EventBus::default()),
        )
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_max_iterations(config.relay.max_iterations)
        .with_provider_timeout(Duration::from_secs(config.relay.provider_timeout_secs)),
    );

    let mut rx = agent.run(
        ThreadId::from(thread),
        vec![Message::user(message)],
        RunOptions::default(),
    );

    // Fold the event stream through the same pure view logic a UI would use.
    let mut view = ViewState::default();
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        let (next, ops) = view.apply(&event);
        view = next;
        for op in ops {
            match op {
                RenderOp::AppendText { text } => {
                    print!("{text}");
                    stdout.flush().ok();
                }
                RenderOp::AppendToolOutput {
                    tool_name, text, ..
                } => {
                    print!("[{tool_name}] {text}");
                    stdout.flush().ok();
                }
                RenderOp::SpliceMessages { count } => {
                    tracing::debug!(count, "Tool messages appended");
                }
                RenderOp::Finish { truncated } => {
                    println!();
                    if truncated {
                        eprintln!("(turn truncated: iteration budget reached)");
                    }
                }
                RenderOp::ShowError { message } => {
                    eprintln!("\nError: {message}");
                }
            }
        }
    }

    Ok(())
}
