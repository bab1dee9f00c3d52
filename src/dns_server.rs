use crate::config::Config;
use crate::debuginfo::{InfoSource, InfoSrc};
use crate::plugin::run_chain;
use crate::types::{DnsMessage, Transport};
use crate::wire;
use anyhow::Result;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{UdpSocket, TcpListener};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const MAX_UDP_RESPONSE: usize = 1232;

pub struct DnsServer {
    config: Arc<Config>,
}

/// What a listener task needs to serve one bind address.
#[derive(Clone)]
struct Listener {
    config: Arc<Config>,
    zone_idx: usize,
    port: u16,
    info_src: Arc<dyn InfoSrc>,
}

impl Listener {
    fn message(&self, query: Vec<u8>, transport: Transport, client: SocketAddr, local: Option<SocketAddr>) -> DnsMessage {
        let mut msg = DnsMessage::new(query, transport);
        msg.client_addr = Some(client);
        msg.local_addr = local;
        msg.server_port = Some(self.port);
        msg.info_src = Some(self.info_src.clone());
        msg
    }

    async fn serve(&self, msg: &mut DnsMessage) {
        run_chain(&self.config.zones[self.zone_idx].plugins, msg).await;
    }
}

/// Groups zones by the address they bind to. Zones sharing a port share a listener.
fn bind_map(config: &Config, base_ip: IpAddr) -> Result<BTreeMap<SocketAddr, Vec<usize>>> {
    let mut map: BTreeMap<SocketAddr, Vec<usize>> = BTreeMap::new();
    for (i, zone) in config.zones.iter().enumerate() {
        map.entry(SocketAddr::new(base_ip, zone.port()?)).or_default().push(i);
    }
    Ok(map)
}

/// The first block on a shared port serves it; the rest are reported and skipped.
fn serving_zone(config: &Config, bind_addr: SocketAddr, zone_indices: &[usize]) -> usize {
    for &idx in &zone_indices[1..] {
        tracing::warn!(
            "Server block '{}' shares {} with '{}' and will not serve queries",
            config.zones[idx].name, bind_addr, config.zones[zone_indices[0]].name
        );
    }
    zone_indices[0]
}

impl DnsServer {
    pub fn new(config: Config) -> Self {
        Self { config: Arc::new(config) }
    }

    /// Binds every configured port and serves until Ctrl-C.
    pub async fn run(&self, base_ip: IpAddr) -> Result<()> {
        let mut tasks = Vec::new();

        for (bind_addr, zone_indices) in bind_map(&self.config, base_ip)? {
            let udp_socket = match UdpSocket::bind(bind_addr).await {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    tracing::error!("Failed to bind UDP {}: {}", bind_addr, e);
                    continue;
                }
            };
            let tcp_listener = match TcpListener::bind(bind_addr).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("Failed to bind TCP {}: {}", bind_addr, e);
                    continue;
                }
            };

            // one debug epoch per listener, shared by its UDP and TCP sides
            let source = InfoSource::new();
            tracing::info!(
                "🚀 Server bound to TCP & UDP on {} for {} zone(s), debug epoch {}",
                bind_addr, zone_indices.len(), source.created().format("%Y-%m-%dT%H:%M:%S%.3fZ")
            );
            let listener = Listener {
                config: self.config.clone(),
                zone_idx: serving_zone(&self.config, bind_addr, &zone_indices),
                port: bind_addr.port(),
                info_src: Arc::new(source),
            };

            tasks.push(tokio::spawn(serve_udp(listener.clone(), udp_socket)));
            tasks.push(tokio::spawn(serve_tcp(listener, tcp_listener)));
        }

        if tasks.is_empty() {
            anyhow::bail!("no listener could be bound");
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down {} listener task(s)", tasks.len());
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

async fn serve_udp(listener: Listener, socket: Arc<UdpSocket>) {
    let local = socket.local_addr().ok();
    let mut buf = vec![0u8; 4096];
    loop {
        let (size, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("UDP receive error: {}", e);
                continue;
            }
        };
        let query = buf[..size].to_vec();
        let listener = listener.clone();
        let socket = socket.clone();

        tokio::spawn(async move {
            let mut msg = listener.message(query, Transport::Udp, src, local);
            listener.serve(&mut msg).await;

            if let Some(mut resp) = msg.raw_response {
                if resp.len() > MAX_UDP_RESPONSE {
                    resp = wire::truncate_response(&resp);
                }
                if let Err(e) = socket.send_to(&resp, src).await {
                    tracing::debug!("UDP send to {} failed: {}", src, e);
                }
            }
        });
    }
}

async fn serve_tcp(listener: Listener, tcp: TcpListener) {
    loop {
        let (mut stream, src) = match tcp.accept().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("TCP accept error: {}", e);
                continue;
            }
        };
        let listener = listener.clone();

        tokio::spawn(async move {
            let mut len_buf = [0u8; 2];
            if stream.read_exact(&mut len_buf).await.is_err() { return; }
            let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            if stream.read_exact(&mut query).await.is_err() { return; }

            let local = stream.local_addr().ok();
            let mut msg = listener.message(query, Transport::Tcp, src, local);
            listener.serve(&mut msg).await;

            if let Some(resp) = msg.raw_response {
                let resp_len = resp.len() as u16;
                let _ = stream.write_all(&resp_len.to_be_bytes()).await;
                let _ = stream.write_all(&resp).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuginfo::render;
    use crate::wire::test_support::{build_query, txt_answer};
    use crate::wire::TYPE_TXT;
    use chrono::DateTime;

    fn listener(corefile: &str) -> Listener {
        let created = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        Listener {
            config: Arc::new(Config::parse(corefile).unwrap()),
            zone_idx: 0,
            port: 53,
            info_src: Arc::new(InfoSource::with_created(created)),
        }
    }

    #[tokio::test]
    async fn test_bind_map_groups_zones_by_port() {
        let cfg = Config::parse("a.:53 b.:53 {\n log\n}\nc.:1053 {\n log\n}\n").unwrap();
        let map = bind_map(&cfg, "::".parse().unwrap()).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map[&"[::]:53".parse::<SocketAddr>().unwrap()], vec![0, 1]);
        assert_eq!(map[&"[::]:1053".parse::<SocketAddr>().unwrap()], vec![2]);
    }

    #[tokio::test]
    async fn test_first_block_serves_shared_port() {
        let cfg = Config::parse("a.:53 {\n log\n}\nb.:53 {\n debuginfo\n}\n").unwrap();
        let addr: SocketAddr = "[::]:53".parse().unwrap();
        let map = bind_map(&cfg, addr.ip()).unwrap();

        assert_eq!(serving_zone(&cfg, addr, &map[&addr]), 0);
        assert_eq!(serving_zone(&cfg, addr, &[1]), 1);
    }

    #[tokio::test]
    async fn test_chain_answers_with_listener_info() {
        let l = listener(".:53 {\n  log\n  debuginfo\n}\n");
        let query = build_query(0x0102, "debuginfo.", TYPE_TXT, None);
        let mut msg = l.message(query, Transport::Udp, "10.0.0.5:5353".parse().unwrap(), Some("192.0.2.1:53".parse().unwrap()));
        l.serve(&mut msg).await;

        assert_eq!(msg.answered_by, "debuginfo");
        assert_eq!(
            txt_answer(&msg.raw_response.unwrap()),
            "time=1700000000.123 protocol=udp source=10.0.0.5:5353 destination=192.0.2.1:53"
        );
    }

    #[tokio::test]
    async fn test_listener_epoch_shared_across_requests() {
        let l = listener(".:53 {\n  log\n}\n");
        let first = l.message(Vec::new(), Transport::Udp, "10.0.0.5:1".parse().unwrap(), None);
        let second = l.message(Vec::new(), Transport::Tcp, "10.0.0.6:2".parse().unwrap(), None);

        let a = render(&first.info_src.as_ref().unwrap().get_info(&first));
        let b = render(&second.info_src.as_ref().unwrap().get_info(&second));
        assert_eq!(a, "time=1700000000.123 protocol=udp source=10.0.0.5:1");
        assert_eq!(b, "time=1700000000.123 protocol=tcp source=10.0.0.6:2");
    }

    #[tokio::test]
    async fn test_unmatched_query_gets_no_response() {
        let l = listener(".:53 {\n  debuginfo\n}\n");
        let query = build_query(7, "example.com.", TYPE_TXT, None);
        let mut msg = l.message(query, Transport::Udp, "10.0.0.5:5353".parse().unwrap(), None);
        l.serve(&mut msg).await;
        assert!(msg.raw_response.is_none());
    }
}
