use crate::notification::{format_message, NotificationContext, Notifier};
use async_trait::async_trait;
use common::{NotificationError, Signal};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Prints escalating signals and appends them to a text file
pub struct ConsoleNotifier {
    output_file: PathBuf,
}

impl ConsoleNotifier {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
        }
    }

    pub fn output_file(&self) -> &PathBuf {
        &self.output_file
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    async fn notify(&self, signal: &Signal, ctx: &NotificationContext) -> Result<(), NotificationError> {
        let Some(message) = format_message(signal, ctx) else {
            return Ok(());
        };

        info!("{}", message);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_file)
            .await?;
        file.write_all(format!("{}\n", message).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
