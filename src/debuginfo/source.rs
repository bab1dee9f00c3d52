use crate::debuginfo::pair::{Pair, PairList};
use crate::ecs::find_ecs;
use crate::types::{request_protocol, DnsMessage};
use chrono::{DateTime, Utc};
use std::fmt;

/// Produces the debug info for a request. Handlers hold it as
/// `Arc<dyn InfoSrc>` so tests can swap in a fixed list.
pub trait InfoSrc: fmt::Debug + Send + Sync {
    fn get_info(&self, msg: &DnsMessage) -> PairList;
}

/// Debug info collector for one listener.
///
/// `created` is captured once and reported as `time` for every request the
/// listener serves, so all answers from one listener share an epoch.
#[derive(Debug, Clone, Copy)]
pub struct InfoSource {
    created: DateTime<Utc>,
}

impl InfoSource {
    /// Captures the current wall-clock time. Build exactly one per listener.
    pub fn new() -> Self {
        Self::with_created(Utc::now())
    }

    pub fn with_created(created: DateTime<Utc>) -> Self {
        Self { created }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Seconds since the Unix epoch with millisecond precision, e.g. `1700000000.123`.
    fn epoch_secs(&self) -> String {
        let ms = self.created.timestamp_millis();
        format!("{}.{:03}", ms.div_euclid(1000), ms.rem_euclid(1000))
    }
}

impl Default for InfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InfoSrc for InfoSource {
    fn get_info(&self, msg: &DnsMessage) -> PairList {
        let mut info = vec![
            Pair::new("time", self.epoch_secs()),
            Pair::new("protocol", request_protocol(msg)),
            Pair::new("source", msg.remote_addr()),
        ];
        // a wildcard listener reports `::`, which says nothing about the destination
        if msg.local_ip() != "::" {
            info.push(Pair::new("destination", msg.local_addr()));
        }
        if let Some(ecs) = find_ecs(&msg.raw_query) {
            info.push(Pair::new("ecs", ecs.to_string()));
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuginfo::render;
    use crate::types::Transport;
    use crate::wire::test_support::{build_query, EcsOption};
    use crate::wire::TYPE_TXT;

    fn fixed_source() -> InfoSource {
        InfoSource::with_created(DateTime::from_timestamp_millis(1_700_000_000_123).unwrap())
    }

    fn request(local: &str, ecs: Option<EcsOption>) -> DnsMessage {
        DnsMessage {
            raw_query: build_query(0x1234, "debuginfo.", TYPE_TXT, ecs),
            client_addr: Some("10.0.0.5:5353".parse().unwrap()),
            local_addr: Some(local.parse().unwrap()),
            transport: Transport::Udp,
            ..Default::default()
        }
    }

    #[test]
    fn test_info_without_ecs() {
        let info = fixed_source().get_info(&request("192.0.2.1:53", None));
        assert_eq!(
            info,
            vec![
                Pair::new("time", "1700000000.123"),
                Pair::new("protocol", "udp"),
                Pair::new("source", "10.0.0.5:5353"),
                Pair::new("destination", "192.0.2.1:53"),
            ]
        );
        assert_eq!(
            render(&info),
            "time=1700000000.123 protocol=udp source=10.0.0.5:5353 destination=192.0.2.1:53"
        );
    }

    #[test]
    fn test_info_unspecified_v6_with_ecs() {
        let ecs = EcsOption { family: 1, source: 24, scope: 24, address: vec![1, 2, 3] };
        let info = fixed_source().get_info(&request("[::]:53", Some(ecs)));

        let keys: Vec<&str> = info.iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["time", "protocol", "source", "ecs"]);
        assert_eq!(
            render(&info),
            "time=1700000000.123 protocol=udp source=10.0.0.5:5353 ecs=1.2.3.0/24/24"
        );
    }

    #[test]
    fn test_unspecified_v4_is_still_reported() {
        let info = fixed_source().get_info(&request("0.0.0.0:53", None));
        assert_eq!(info.last(), Some(&Pair::new("destination", "0.0.0.0:53")));
    }

    #[test]
    fn test_tcp_over_v6() {
        let mut msg = request("[2001:db8::53]:53", None);
        msg.transport = Transport::Tcp;
        msg.client_addr = Some("[2001:db8::1]:40000".parse().unwrap());

        let info = fixed_source().get_info(&msg);
        assert_eq!(info[1], Pair::new("protocol", "tcp"));
        assert_eq!(info[2], Pair::new("source", "[2001:db8::1]:40000"));
        assert_eq!(info[3], Pair::new("destination", "[2001:db8::53]:53"));
    }

    #[test]
    fn test_unknown_endpoints_render_nothing() {
        let msg = DnsMessage::default();
        let info = fixed_source().get_info(&msg);
        assert_eq!(render(&info), "time=1700000000.123 protocol=udp");
    }

    #[test]
    fn test_time_is_fixed_at_creation() {
        let src = InfoSource::new();
        let msg = request("192.0.2.1:53", None);

        let first = src.get_info(&msg);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = src.get_info(&msg);

        assert_eq!(first[0], second[0]);
        assert_eq!(first[0].val(), src.epoch_secs());
    }

    #[test]
    fn test_millis_are_zero_padded() {
        let src = InfoSource::with_created(DateTime::from_timestamp_millis(1_700_000_000_007).unwrap());
        assert_eq!(src.epoch_secs(), "1700000000.007");
    }
}
