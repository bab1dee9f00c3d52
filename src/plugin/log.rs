use crate::plugin::Plugin;
use crate::config::PluginConfig;
use crate::debuginfo::render;
use crate::types::DnsMessage;
use anyhow::Result;

/// Writes every query's debug line to the log.
pub struct LogPlugin;

impl LogPlugin {
    fn line(msg: &DnsMessage) -> String {
        msg.info_src
            .as_ref()
            .map(|src| render(&src.get_info(msg)))
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Plugin for LogPlugin {
    fn name(&self) -> &str { "log" }
    fn from_config(config: &PluginConfig) -> Result<Self> {
        tracing::info!("[log] Initialized for zones: {:?}", config.args);
        Ok(Self)
    }
    async fn process(&self, msg: &mut DnsMessage) -> Result<()> {
        tracing::info!("=> [Incoming Query] TxID: {:#06x} {}", msg.id, Self::line(msg));
        Ok(())
    }
    fn priority(&self) -> u8 { 255 }
}
