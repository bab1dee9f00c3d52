pub mod debuginfo;
pub mod log;
pub mod prometheus;

use anyhow::Result;
use crate::config::PluginConfig;
use crate::types::DnsMessage;

#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn from_config(config: &PluginConfig) -> Result<Self> where Self: Sized;
    async fn process(&self, msg: &mut DnsMessage) -> Result<()>;
    async fn post_process(&self, _msg: &mut DnsMessage) -> Result<()> {
        Ok(())
    }
    fn priority(&self) -> u8;
}

pub fn create_plugin(config: &PluginConfig) -> Result<Box<dyn Plugin>> {
    match config.name.as_str() {
        "debuginfo" => Ok(Box::new(debuginfo::DebugInfoPlugin::from_config(config)?)),
        "log" => Ok(Box::new(log::LogPlugin::from_config(config)?)),
        "prometheus" => Ok(Box::new(prometheus::PrometheusPlugin::from_config(config)?)),
        _ => anyhow::bail!("Unknown plugin: {}", config.name),
    }
}

/// Runs `process` in chain order until a plugin halts it, then `post_process`
/// in reverse. Plugin errors are logged and do not stop the chain.
pub async fn run_chain(plugins: &[Box<dyn Plugin>], msg: &mut DnsMessage) {
    for plugin in plugins {
        if msg.halt_chain { break; }
        if let Err(e) = plugin.process(msg).await {
            tracing::warn!("[{}] process failed for TxID {:#06x}: {:#}", plugin.name(), msg.id, e);
        }
    }
    for plugin in plugins.iter().rev() {
        if let Err(e) = plugin.post_process(msg).await {
            tracing::warn!("[{}] post_process failed for TxID {:#06x}: {:#}", plugin.name(), msg.id, e);
        }
    }
}
