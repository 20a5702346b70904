//! Sink that writes each result to a byte stream (stdout by default).

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::core::{Context, EventSink};
use crate::domain::{InvocationResult, SinkError};

pub const MODULE_PATH: &str = "builtin/stdout";
pub const SYMBOL: &str = "StdoutSink";

/// Writes result data followed by a newline; concurrent results never interleave
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

pub type StdoutSink = WriterSink<Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> EventSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn consume(&self, _ctx: &Context, result: &InvocationResult) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&result.data).await?;
        if !result.data.ends_with(b"\n") {
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_writes_one_line_per_result() {
        let sink = WriterSink::new(Vec::<u8>::new());
        let ctx = Context::background();

        sink.consume(&ctx, &InvocationResult::new(Uuid::new_v4(), "ok", Duration::ZERO))
            .await
            .unwrap();
        sink.consume(&ctx, &InvocationResult::new(Uuid::new_v4(), "done\n", Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(sink.into_inner(), b"ok\ndone\n");
    }
}
