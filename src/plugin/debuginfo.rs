use crate::plugin::Plugin;
use crate::plugin::prometheus::{server_label, DEBUGINFO_ANSWERS_TOTAL};
use crate::config::PluginConfig;
use crate::debuginfo::render;
use crate::types::DnsMessage;
use crate::wire::{self, CLASS_IN, TYPE_ANY, TYPE_TXT};
use anyhow::Result;

const DEFAULT_NAME: &str = "debuginfo.";

/// Answers TXT queries for the configured names with the listener's debug line.
pub struct DebugInfoPlugin {
    names: Vec<String>,
}

fn normalize(name: &str) -> String {
    let mut name = name.to_ascii_lowercase();
    if !name.ends_with('.') { name.push('.'); }
    name
}

#[async_trait::async_trait]
impl Plugin for DebugInfoPlugin {
    fn name(&self) -> &str { "debuginfo" }

    fn from_config(config: &PluginConfig) -> Result<Self> {
        let mut names: Vec<String> = config.args.iter().map(|n| normalize(n)).collect();
        if names.is_empty() {
            names.push(DEFAULT_NAME.to_string());
        }
        tracing::info!("[debuginfo] Plugin initialized for {:?}", names);
        Ok(Self { names })
    }

    async fn process(&self, msg: &mut DnsMessage) -> Result<()> {
        if msg.halt_chain { return Ok(()); }

        let Some(question) = wire::parse_question(&msg.raw_query) else { return Ok(()) };
        // only standard queries; responses, NOTIFY and UPDATE pass through
        if msg.raw_query[2] & 0x80 != 0 || (msg.raw_query[2] >> 3) & 0x0F != 0 { return Ok(()); }
        if question.qclass != CLASS_IN || !matches!(question.qtype, TYPE_TXT | TYPE_ANY) { return Ok(()); }
        if !self.names.contains(&question.name) { return Ok(()); }

        let Some(info_src) = msg.info_src.clone() else {
            tracing::debug!("[debuginfo] No listener info for TxID {:#06x}, skipping", msg.id);
            return Ok(());
        };

        let line = render(&info_src.get_info(msg));
        msg.raw_response = Some(wire::build_txt_response(&msg.raw_query, &question, &line));
        msg.halt_chain = true;
        msg.answered_by = "debuginfo".to_string();

        DEBUGINFO_ANSWERS_TOTAL.with_label_values(&[&server_label(msg)]).inc();
        tracing::info!("    |-- [debuginfo] Answered {} for {}: {}", question.name, msg.remote_addr(), line);
        Ok(())
    }

    fn priority(&self) -> u8 { 200 }
}
