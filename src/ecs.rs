//! EDNS Client Subnet (RFC 7871) lookup over a raw query.

use crate::wire::{read_u16, skip_name, skip_record, HEADER_LEN, TYPE_OPT};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const OPTION_CLIENT_SUBNET: u16 = 8;
const FAMILY_ANY: u16 = 0;
const FAMILY_IPV4: u16 = 1;
const FAMILY_IPV6: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSubnet {
    pub family: u16,
    pub source_prefix: u8,
    pub scope_prefix: u8,
    pub address: IpAddr,
}

impl fmt::Display for ClientSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => write!(f, "{}", v4)?,
                None => write!(f, "[{}]", v6)?,
            },
            IpAddr::V4(v4) => write!(f, "{}", v4)?,
        }
        write!(f, "/{}/{}", self.source_prefix, self.scope_prefix)
    }
}

/// Finds the client subnet option in the query's OPT record, if any.
///
/// Malformed messages and malformed options are treated as carrying no subnet.
pub fn find_ecs(raw: &[u8]) -> Option<ClientSubnet> {
    let qdcount = read_u16(raw, 4)? as usize;
    let ancount = read_u16(raw, 6)? as usize;
    let nscount = read_u16(raw, 8)? as usize;
    let arcount = read_u16(raw, 10)? as usize;

    let mut offset = HEADER_LEN;
    for _ in 0..qdcount {
        offset = skip_name(raw, offset)? + 4;
    }
    for _ in 0..ancount + nscount {
        offset = skip_record(raw, offset)?;
    }

    for _ in 0..arcount {
        let name_end = skip_name(raw, offset)?;
        let rtype = read_u16(raw, name_end)?;
        let rdlen = read_u16(raw, name_end + 8)? as usize;
        let rdata_start = name_end + 10;
        let rdata = raw.get(rdata_start..rdata_start + rdlen)?;
        if rtype == TYPE_OPT {
            return parse_options(rdata);
        }
        offset = rdata_start + rdlen;
    }
    None
}

fn parse_options(rdata: &[u8]) -> Option<ClientSubnet> {
    let mut i = 0;
    while i + 4 <= rdata.len() {
        let code = read_u16(rdata, i)?;
        let len = read_u16(rdata, i + 2)? as usize;
        let data = rdata.get(i + 4..i + 4 + len)?;
        if code == OPTION_CLIENT_SUBNET {
            return decode_subnet(data);
        }
        i += 4 + len;
    }
    None
}

fn decode_subnet(data: &[u8]) -> Option<ClientSubnet> {
    let family = read_u16(data, 0)?;
    let source_prefix = *data.get(2)?;
    let scope_prefix = *data.get(3)?;
    let addr = &data[4..];

    let address = match family {
        // dig sends family 0 with a zero source prefix to ask for no subnet
        FAMILY_ANY => {
            if source_prefix != 0 { return None; }
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
        FAMILY_IPV4 => {
            if source_prefix > 32 || scope_prefix > 32 || addr.len() > 4 { return None; }
            let mut octets = [0u8; 4];
            octets[..addr.len()].copy_from_slice(addr);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_IPV6 => {
            if source_prefix > 128 || scope_prefix > 128 || addr.len() > 16 { return None; }
            let mut octets = [0u8; 16];
            octets[..addr.len()].copy_from_slice(addr);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(ClientSubnet { family, source_prefix, scope_prefix, address })
}
