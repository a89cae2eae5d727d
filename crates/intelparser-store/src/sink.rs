//! The single operation every sink implements (§4.8): `write` one
//! document record. The fan-out calls sinks in registration order;
//! a sink's own error never aborts the others.

use async_trait::async_trait;
use intelparser_core::model::Document;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Human-readable name used in `SinkWriteFailed` log lines.
    fn name(&self) -> &str;

    async fn write(&self, document: &Document) -> anyhow::Result<()>;

    /// Flushes buffered records. Most sinks are unbuffered and no-op;
    /// the search-index sink overrides this to drain its bulk queue.
    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
