//! Counting tool with incremental output.
//!
//! Counts from 1 to a requested number with a delay between each, pushing a
//! chunk per number. Exists to demonstrate and test the streamed
//! tool-result path end to end.

use async_trait::async_trait;
use std::time::Duration;
use threadline_core::error::ToolError;
use threadline_core::tool::{Tool, ToolResult};
use tokio::sync::mpsc;

const MAX_COUNT: u64 = 100;

pub struct CountSlowlyTool {
    /// Upper bound applied to the caller-requested delay.
    max_delay: Duration,
}

impl CountSlowlyTool {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }
}

impl Default for CountSlowlyTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Tool for CountSlowlyTool {
    fn name(&self) -> &str {
        "count_slowly"
    }

    fn description(&self) -> &str {
        "Count from 1 to a number slowly, with a delay between each number. Useful for demonstrating streaming tool results."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "count": {
                    "type": "integer",
                    "description": "The number to count to. Defaults to 10.",
                    "default": 10
                },
                "delay_ms": {
                    "type": "integer",
                    "description": "Milliseconds between each number. Defaults to 1000.",
                    "default": 1000
                }
            },
            "required": []
        })
    }

    fn is_streaming(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        // Buffered variant: no receiver, chunks are simply discarded while
        // the full output accumulates.
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        self.execute_streaming(arguments, tx).await
    }

    async fn execute_streaming(
        &self,
        arguments: serde_json::Value,
        chunks: mpsc::Sender<String>,
    ) -> Result<ToolResult, ToolError> {
        let count = arguments["count"].as_u64().unwrap_or(10).min(MAX_COUNT);
        let delay = Duration::from_millis(arguments["delay_ms"].as_u64().unwrap_or(1000))
            .min(self.max_delay);

        let mut output = String::new();
        for i in 1..=count {
            tokio::time::sleep(delay).await;
            let chunk = format!("{i}... ");
            output.push_str(&chunk);
            let _ = chunks.send(chunk).await;
        }
        let done = "Done!".to_string();
        output.push_str(&done);
        let _ = chunks.send(done).await;

        Ok(ToolResult {
            success: true,
            output,
            data: Some(serde_json::json!({ "counted_to": count })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_tool() -> CountSlowlyTool {
        CountSlowlyTool::new(Duration::from_millis(0))
    }

    #[tokio::test]
    async fn streams_one_chunk_per_number() {
        let tool = fast_tool();
        let (tx, mut rx) = mpsc::channel(16);

        let result = tool
            .execute_streaming(serde_json::json!({"count": 3, "delay_ms": 0}), tx)
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(c) = rx.recv().await {
            chunks.push(c);
        }
        assert_eq!(chunks, vec!["1... ", "2... ", "3... ", "Done!"]);
        assert_eq!(result.output, chunks.concat());
    }

    #[tokio::test]
    async fn buffered_execute_matches_stream() {
        let tool = fast_tool();
        let result = tool
            .execute(serde_json::json!({"count": 2, "delay_ms": 0}))
            .await
            .unwrap();
        assert_eq!(result.output, "1... 2... Done!");
    }

    #[tokio::test]
    async fn count_is_capped() {
        let tool = fast_tool();
        let result = tool
            .execute(serde_json::json!({"count": 100000, "delay_ms": 0}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["counted_to"], MAX_COUNT);
    }

    #[test]
    fn reports_streaming() {
        assert!(fast_tool().is_streaming());
    }
}
