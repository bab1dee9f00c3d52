use crate::plugin::Plugin;
use crate::config::PluginConfig;
use crate::types::{request_protocol, DnsMessage};
use crate::wire;
use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use prometheus::{
    IntCounterVec, GaugeVec,
    register_int_counter_vec, register_gauge_vec,
};
use lazy_static::lazy_static;

lazy_static! {
    pub static ref DNS_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coredns_dns_requests_total",
        "Counter of DNS requests made per protocol and type.",
        &["proto", "server", "type"]
    ).unwrap();

    pub static ref DNS_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coredns_dns_responses_total",
        "Counter of response status codes.",
        &["plugin", "rcode", "server"]
    ).unwrap();

    pub static ref DEBUGINFO_ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coredns_debuginfo_answers_total",
        "Counter of queries answered with debug info.",
        &["server"]
    ).unwrap();

    pub static ref BUILD_INFO: GaugeVec = register_gauge_vec!(
        "coredns_build_info",
        "A metric with a constant '1' value labeled by version.",
        &["version"]
    ).unwrap();
}

pub struct PrometheusPlugin {
    _handle: tokio::task::JoinHandle<()>,
}

#[async_trait::async_trait]
impl Plugin for PrometheusPlugin {
    fn name(&self) -> &str { "prometheus" }

    fn from_config(config: &PluginConfig) -> Result<Self> {
        let addr = listen_addr(config.args.first().map(String::as_str));
        BUILD_INFO.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1.0);

        let handle = tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    tracing::info!("[prometheus] Successfully bound metrics listener on {}", addr);
                    while let Ok((mut stream, _)) = listener.accept().await {
                        tokio::spawn(async move {
                            let mut buf = [0u8; 8192];
                            let read = tokio::time::timeout(std::time::Duration::from_secs(2), stream.read(&mut buf)).await;
                            if !matches!(read, Ok(Ok(n)) if n > 0 && buf.starts_with(b"GET ")) { return; }

                            let body = match gather_text() {
                                Ok(body) => body,
                                Err(e) => {
                                    tracing::error!("[prometheus] Failed to encode metrics: {}", e);
                                    return;
                                }
                            };
                            let header = format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                body.len()
                            );
                            let mut response = header.into_bytes();
                            response.extend_from_slice(&body);

                            let _ = tokio::time::timeout(std::time::Duration::from_secs(2), stream.write_all(&response)).await;
                            let _ = stream.flush().await;
                            let _ = stream.shutdown().await;
                        });
                    }
                }
                Err(_) => {
                    tracing::info!("[prometheus] Port {} is already active (shared with another zone).", addr);
                }
            }
        });

        Ok(Self { _handle: handle })
    }

    async fn process(&self, msg: &mut DnsMessage) -> Result<()> {
        let qtype = wire::parse_question(&msg.raw_query).map(|q| qtype_str(q.qtype)).unwrap_or("UNKNOWN");
        DNS_REQUESTS_TOTAL.with_label_values(&[request_protocol(msg), &server_label(msg), qtype]).inc();
        Ok(())
    }

    async fn post_process(&self, msg: &mut DnsMessage) -> Result<()> {
        if let Some(resp) = &msg.raw_response {
            let rcode = resp.get(3).map(|b| b & 0x0F).unwrap_or(0);
            let plugin_name = if msg.answered_by.is_empty() { "unknown" } else { &msg.answered_by };
            DNS_RESPONSES_TOTAL.with_label_values(&[plugin_name, rcode_to_str(rcode), &server_label(msg)]).inc();
        }
        Ok(())
    }

    fn priority(&self) -> u8 { 150 }
}

impl Drop for PrometheusPlugin {
    fn drop(&mut self) { self._handle.abort(); }
}

fn listen_addr(arg: Option<&str>) -> String {
    let port = arg.unwrap_or(":9153");
    if port.contains(':') {
        if port.starts_with(':') { format!("0.0.0.0{}", port) } else { port.to_string() }
    } else {
        format!("0.0.0.0:{}", port)
    }
}

fn gather_text() -> Result<Vec<u8>> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

pub fn server_label(msg: &DnsMessage) -> String {
    format!("dns://:{}", msg.server_port.unwrap_or(53))
}

pub fn rcode_to_str(rcode: u8) -> &'static str {
    match rcode { 0 => "NOERROR", 1 => "FORMERR", 2 => "SERVFAIL", 3 => "NXDOMAIN", 4 => "NOTIMP", 5 => "REFUSED", _ => "UNKNOWN" }
}

fn qtype_str(qtype: u16) -> &'static str {
    match qtype {
        1 => "A", 28 => "AAAA", 33 => "SRV", 5 => "CNAME", 15 => "MX", 16 => "TXT", 2 => "NS", 6 => "SOA", 12 => "PTR", 255 => "ANY", _ => "OTHER"
    }
}
