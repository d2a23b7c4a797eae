//! Allow-list matching for inbound connections.
//!
//! Sources are a comma-separated list of entries, each either a literal
//! `address/mask` expression (mask as a prefix length or a dotted/colon
//! literal), a literal address, or a hostname that is resolved into
//! full-length entries at refresh time. Resolution is lazy: queries made
//! while the cache is invalid trigger a refresh first.
//!
//! Multi-connection accept paths share one matcher behind a
//! `tokio::sync::RwLock`; lazy refresh mutates, so queries take the write
//! guard.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use log::warn;

use crate::address::{Address, NetLocation};
use crate::resolver::Resolver;

#[derive(Debug, Clone)]
pub struct HostRecord<A> {
    pub source: String,
    pub addr: A,
    pub mask: A,
}

pub type HostRecordV4 = HostRecord<[u8; 4]>;
pub type HostRecordV6 = HostRecord<[u8; 16]>;

#[derive(Debug, Clone)]
pub struct AllowedHosts {
    entries_v4: Vec<HostRecordV4>,
    entries_v6: Vec<HostRecordV6>,
    sources: Vec<String>,
    cached: bool,
}

impl AllowedHosts {
    pub fn new() -> Self {
        Self {
            entries_v4: vec![],
            entries_v6: vec![],
            sources: vec![],
            cached: true,
        }
    }
}

impl Default for AllowedHosts {
    fn default() -> Self {
        Self::new()
    }
}

impl AllowedHosts {
    /// Replaces the source list from a comma-separated specification and
    /// invalidates the cache.
    ///
    /// An empty specification clears the list, which allows every remote.
    pub fn set_sources(&mut self, source_list: &str) {
        self.sources = source_list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.cached = false;
    }

    /// Forces re-resolution on the next query, e.g. after a config reload.
    pub fn invalidate(&mut self) {
        self.cached = false;
    }

    pub fn is_empty(&self) -> bool {
        self.entries_v4.is_empty() && self.entries_v6.is_empty()
    }

    /// Rebuilds the entry lists from the sources. Returns the resolution
    /// failures; a failed source contributes no entries but never aborts
    /// the rest of the refresh.
    pub async fn refresh(&mut self, resolver: &Arc<dyn Resolver>) -> Vec<String> {
        if self.cached {
            return vec![];
        }

        let mut entries_v4 = vec![];
        let mut entries_v6 = vec![];
        let mut errors = vec![];

        for source in &self.sources {
            match parse_source(source) {
                Ok(ParsedSource::V4(record)) => entries_v4.push(record),
                Ok(ParsedSource::V6(record)) => entries_v6.push(record),
                Ok(ParsedSource::Hostname(hostname)) => {
                    let location = NetLocation::new(Address::Hostname(hostname.clone()), 0);
                    match resolver.resolve_location(&location).await {
                        Ok(addrs) => {
                            for addr in addrs {
                                match addr.ip() {
                                    IpAddr::V4(v4) => entries_v4.push(HostRecord {
                                        source: source.clone(),
                                        addr: v4.octets(),
                                        mask: [0xff; 4],
                                    }),
                                    IpAddr::V6(v6) => entries_v6.push(HostRecord {
                                        source: source.clone(),
                                        addr: v6.octets(),
                                        mask: [0xff; 16],
                                    }),
                                }
                            }
                        }
                        Err(e) => {
                            errors.push(format!("failed to resolve {hostname}: {e}"));
                        }
                    }
                }
                Err(e) => {
                    errors.push(format!("invalid allowed hosts entry {source}: {e}"));
                }
            }
        }

        self.entries_v4 = entries_v4;
        self.entries_v6 = entries_v6;
        self.cached = true;
        errors
    }

    /// Whether `remote` matches the allow list. An empty list allows every
    /// address: no sources configured means no restriction.
    pub async fn is_allowed(&mut self, remote: IpAddr, resolver: &Arc<dyn Resolver>) -> bool {
        if !self.cached {
            for error in self.refresh(resolver).await {
                warn!("allowed hosts refresh: {error}");
            }
        }

        if self.is_empty() {
            return true;
        }

        match remote {
            IpAddr::V4(v4) => self.is_allowed_v4(&v4.octets()),
            IpAddr::V6(v6) => {
                if self.is_allowed_v6(&v6.octets()) {
                    return true;
                }
                // A v4 allow rule also covers the v4-in-v6 representations
                // of the same host.
                match embedded_v4(&v6) {
                    Some(v4) => self.is_allowed_v4(&v4.octets()),
                    None => false,
                }
            }
        }
    }

    fn is_allowed_v4(&self, remote: &[u8; 4]) -> bool {
        self.entries_v4
            .iter()
            .any(|r| match_host(&r.addr, &r.mask, remote))
    }

    fn is_allowed_v6(&self, remote: &[u8; 16]) -> bool {
        self.entries_v6
            .iter()
            .any(|r| match_host(&r.addr, &r.mask, remote))
    }
}

fn match_host<const N: usize>(allowed: &[u8; N], mask: &[u8; N], remote: &[u8; N]) -> bool {
    for i in 0..N {
        if allowed[i] & mask[i] != remote[i] & mask[i] {
            return false;
        }
    }
    true
}

enum ParsedSource {
    V4(HostRecordV4),
    V6(HostRecordV6),
    Hostname(String),
}

fn parse_source(source: &str) -> std::io::Result<ParsedSource> {
    if let Some((addr_str, mask_str)) = source.split_once('/') {
        if let Ok(v4) = addr_str.parse::<Ipv4Addr>() {
            return Ok(ParsedSource::V4(HostRecord {
                source: source.to_string(),
                addr: v4.octets(),
                mask: parse_mask_v4(mask_str)?,
            }));
        }
        if let Ok(v6) = addr_str.parse::<Ipv6Addr>() {
            return Ok(ParsedSource::V6(HostRecord {
                source: source.to_string(),
                addr: v6.octets(),
                mask: parse_mask_v6(mask_str)?,
            }));
        }
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("masked entry is not an address literal: {addr_str}"),
        ));
    }

    if let Ok(v4) = source.parse::<Ipv4Addr>() {
        return Ok(ParsedSource::V4(HostRecord {
            source: source.to_string(),
            addr: v4.octets(),
            mask: [0xff; 4],
        }));
    }
    if let Ok(v6) = source.parse::<Ipv6Addr>() {
        return Ok(ParsedSource::V6(HostRecord {
            source: source.to_string(),
            addr: v6.octets(),
            mask: [0xff; 16],
        }));
    }

    match Address::from(source)? {
        Address::Hostname(hostname) => Ok(ParsedSource::Hostname(hostname)),
        // Unreachable given the literal parses above, but keeps Address::from
        // as the single syntax gate.
        Address::Ipv4(v4) => Ok(ParsedSource::V4(HostRecord {
            source: source.to_string(),
            addr: v4.octets(),
            mask: [0xff; 4],
        })),
        Address::Ipv6(v6) => Ok(ParsedSource::V6(HostRecord {
            source: source.to_string(),
            addr: v6.octets(),
            mask: [0xff; 16],
        })),
    }
}

fn parse_mask_v4(mask: &str) -> std::io::Result<[u8; 4]> {
    if mask.contains('.') {
        let parsed = mask.parse::<Ipv4Addr>().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid dotted mask {mask}: {e}"),
            )
        })?;
        return Ok(parsed.octets());
    }
    prefix_mask::<4>(mask)
}

fn parse_mask_v6(mask: &str) -> std::io::Result<[u8; 16]> {
    if mask.contains(':') {
        let parsed = mask.parse::<Ipv6Addr>().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid literal mask {mask}: {e}"),
            )
        })?;
        return Ok(parsed.octets());
    }
    prefix_mask::<16>(mask)
}

fn prefix_mask<const N: usize>(bits_str: &str) -> std::io::Result<[u8; N]> {
    let bits = bits_str.parse::<u32>().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid prefix length {bits_str}: {e}"),
        )
    })?;
    if bits as usize > N * 8 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("prefix length {bits} too large for address family"),
        ));
    }
    let mut mask = [0u8; N];
    for (i, byte) in mask.iter_mut().enumerate() {
        let remaining = bits.saturating_sub(i as u32 * 8);
        *byte = match remaining {
            0 => 0,
            1..=7 => !(0xffu8 >> remaining),
            _ => 0xff,
        };
    }
    Ok(mask)
}

/// Extracts the IPv4 address embedded in a v4-mapped (`::ffff:a.b.c.d`) or
/// v4-compatible (`::a.b.c.d`, excluding `::` and `::1`) IPv6 address.
fn embedded_v4(v6: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = v6.to_ipv4_mapped() {
        return Some(v4);
    }
    let segments = v6.segments();
    if segments[..6] == [0; 6] && !(segments[6] == 0 && segments[7] <= 1) {
        let octets = v6.octets();
        return Some(Ipv4Addr::new(
            octets[12], octets[13], octets[14], octets[15],
        ));
    }
    None
}
