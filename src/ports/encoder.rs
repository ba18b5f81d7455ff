use crate::domain::dpg::settings::EncodeConfig;
use crate::error::EncodeError;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Converts `source` into a container at `config.output()`.
    async fn encode(&self, source: &Path, config: &EncodeConfig) -> Result<(), EncodeError>;
}
