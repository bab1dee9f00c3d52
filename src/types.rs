//! Request context shared by the listeners and the plugin chain

use crate::debuginfo::InfoSrc;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Default)]
pub struct DnsMessage {
    pub id: u16,
    pub raw_query: Vec<u8>,
    pub raw_response: Option<Vec<u8>>,
    pub halt_chain: bool,

    pub client_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub transport: Transport,
    pub server_port: Option<u16>,

    /// Debug info collector of the listener that received this query.
    pub info_src: Option<Arc<dyn InfoSrc>>,
    /// Name of the plugin that wrote `raw_response`.
    pub answered_by: String,
}

impl DnsMessage {
    pub fn new(raw_query: Vec<u8>, transport: Transport) -> Self {
        let id = match raw_query.get(0..2) {
            Some(b) => u16::from_be_bytes([b[0], b[1]]),
            None => 0,
        };
        Self { id, raw_query, transport, ..Default::default() }
    }

    /// Client endpoint as `ip:port`, empty when unknown.
    pub fn remote_addr(&self) -> String {
        self.client_addr.map(|a| a.to_string()).unwrap_or_default()
    }

    /// Listener endpoint as `ip:port`, empty when unknown.
    pub fn local_addr(&self) -> String {
        self.local_addr.map(|a| a.to_string()).unwrap_or_default()
    }

    pub fn local_ip(&self) -> String {
        self.local_addr.map(|a| a.ip().to_string()).unwrap_or_default()
    }
}

/// Short transport label used in debug info and metrics.
pub fn request_protocol(msg: &DnsMessage) -> &'static str {
    match msg.transport {
        Transport::Udp => "udp",
        Transport::Tcp => "tcp",
    }
}
