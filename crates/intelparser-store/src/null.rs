//! Null sink (§4.8): discards every record. Grounded on the source's
//! `writers.NoneWriter`.

use async_trait::async_trait;
use intelparser_core::model::Document;

use crate::sink::Sink;

#[derive(Default)]
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn write(&self, _document: &Document) -> anyhow::Result<()> {
        Ok(())
    }
}
