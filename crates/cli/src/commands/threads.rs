//! `threadline threads` — inspect and clear stored threads.

use clap::Subcommand;
use threadline_config::AppConfig;
use threadline_core::message::{Role, ThreadId};
use threadline_core::store::TranscriptStore;

#[derive(Subcommand)]
pub enum ThreadsAction {
    /// Print a thread's transcript
    Show { thread: String },

    /// Delete all messages in a thread, keeping the thread itself
    Clear { thread: String },
}

pub async fn run(action: ThreadsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = super::open_store(&config).await?;

    match action {
        ThreadsAction::Show { thread } => {
            let id = ThreadId::from(&thread);
            let messages = store.list_messages(&id).await?;
            if messages.is_empty() {
                println!("(thread '{thread}' is empty)");
                return Ok(());
            }
            for message in messages {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let content = message.content.as_deref().unwrap_or("");
                if message.tool_calls.is_empty() {
                    println!("{role}: {content}");
                } else {
                    let calls: Vec<String> = message
                        .tool_calls
                        .iter()
                        .map(|tc| format!("{}({})", tc.name, tc.arguments))
                        .collect();
                    println!("{role}: {content} [calls: {}]", calls.join(", "));
                }
            }
        }
        ThreadsAction::Clear { thread } => {
            let id = ThreadId::from(&thread);
            let deleted = store.clear_messages(&id).await?;
            println!("Deleted {deleted} messages from thread '{thread}'");
        }
    }

    Ok(())
}
