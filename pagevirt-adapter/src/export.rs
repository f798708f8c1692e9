use core::future::Future;

use pagevirt::Role;

/// One block as read by bulk extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractedBlock {
    pub role: Role,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("clipboard write failed: {0}")]
    Clipboard(String),

    #[error("download failed: {0}")]
    Download(String),
}

/// A clipboard or file-download target for extracted blocks.
///
/// Delivery is best-effort: [`deliver`] swallows every failure.
pub trait ExportSink {
    fn write(&mut self, blocks: &[ExtractedBlock]) -> impl Future<Output = Result<(), SinkError>>;
}

/// Hands `blocks` to `sink`, logging and discarding any failure. Returns whether it succeeded.
pub async fn deliver<K: ExportSink>(sink: &mut K, blocks: &[ExtractedBlock]) -> bool {
    match sink.write(blocks).await {
        Ok(()) => {
            adebug!(blocks = blocks.len(), "deliver: sink accepted export");
            true
        }
        Err(_err) => {
            awarn!(error = %_err, "deliver: export dropped");
            false
        }
    }
}

/// Collects every delivery in memory, or rejects them all.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    deliveries: Vec<Vec<ExtractedBlock>>,
    reject: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> &[Vec<ExtractedBlock>] {
        &self.deliveries
    }
}

impl ExportSink for MemorySink {
    async fn write(&mut self, blocks: &[ExtractedBlock]) -> Result<(), SinkError> {
        if self.reject {
            return Err(SinkError::Clipboard("permission denied".into()));
        }
        self.deliveries.push(blocks.to_vec());
        Ok(())
    }
}
