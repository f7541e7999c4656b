//! Network whitelist gating authentication attempts.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whitelist configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WhitelistError {
    /// Address part is not an IPv4 or IPv6 address.
    #[error("Invalid whitelist address: {0}")]
    InvalidAddress(String),

    /// Prefix length missing, not a number, or too long for the family.
    #[error("Invalid whitelist prefix length: {0}")]
    InvalidPrefix(String),
}

/// A contiguous block of addresses in CIDR notation.
///
/// Host bits beyond the prefix are cleared, so `10.1.2.3/8` and `10.0.0.0/8`
/// describe the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrRange {
    network: IpAddr,
    prefix: u8,
}

impl CidrRange {
    /// Create a range, clamping the prefix to the address family's width.
    #[must_use]
    pub fn new(addr: IpAddr, prefix: u8) -> Self {
        let prefix = prefix.min(max_prefix(addr));
        let network = match addr {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask_v4(prefix))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask_v6(prefix))),
        };
        Self { network, prefix }
    }

    /// Network address of the range.
    #[must_use]
    pub const fn network(&self) -> IpAddr {
        self.network
    }

    /// Prefix length.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Check if `addr` lies inside this range.
    ///
    /// Addresses of the other family never match.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => u32::from(a) & mask_v4(self.prefix) == u32::from(net),
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                u128::from(a) & mask_v6(self.prefix) == u128::from(net)
            }
            _ => false,
        }
    }
}

/// Width of the `::ffff:0:0/96` prefix carrying IPv4-mapped addresses.
const MAPPED_PREFIX: u8 = 96;

const fn max_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

const fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

const fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix)
    }
}

impl FromStr for CidrRange {
    type Err = WhitelistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = s.trim();
        let (addr_part, prefix_part) = match entry.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (entry, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| WhitelistError::InvalidAddress(entry.to_string()))?;

        // A bare address is a single-host range
        let prefix = match prefix_part {
            None => max_prefix(addr),
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max_prefix(addr))
                .ok_or_else(|| WhitelistError::InvalidPrefix(entry.to_string()))?,
        };

        // IPv4-mapped entries are stored as IPv4, like mapped origins
        if let (IpAddr::V6(_), IpAddr::V4(v4)) = (addr, addr.to_canonical()) {
            let prefix = prefix
                .checked_sub(MAPPED_PREFIX)
                .ok_or_else(|| WhitelistError::InvalidPrefix(entry.to_string()))?;
            return Ok(Self::new(IpAddr::V4(v4), prefix));
        }

        Ok(Self::new(addr, prefix))
    }
}

impl TryFrom<String> for CidrRange {
    type Error = WhitelistError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrRange> for String {
    fn from(range: CidrRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for CidrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Immutable set of address ranges allowed to attempt authentication.
///
/// An empty policy permits nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistPolicy {
    ranges: Vec<CidrRange>,
}

impl WhitelistPolicy {
    /// A policy that permits no address.
    #[must_use]
    pub const fn deny_all() -> Self {
        Self { ranges: Vec::new() }
    }

    /// A policy that permits every IPv6 and IPv4 address.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self {
            ranges: vec![
                CidrRange::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
                CidrRange::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            ],
        }
    }

    /// Build a policy from textual CIDR entries such as `"10.0.0.0/8"`.
    ///
    /// # Errors
    ///
    /// Returns error on the first entry that does not parse.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, WhitelistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = entries
            .into_iter()
            .map(|entry| entry.as_ref().parse())
            .collect::<Result<Vec<CidrRange>, _>>()?;

        Ok(Self { ranges })
    }

    /// Check if an origin address may attempt authentication.
    ///
    /// IPv4-mapped IPv6 addresses are matched as IPv4.
    #[must_use]
    pub fn permits(&self, addr: IpAddr) -> bool {
        let addr = addr.to_canonical();
        self.ranges.iter().any(|range| range.contains(addr))
    }

    /// Configured ranges, in order.
    #[must_use]
    pub fn ranges(&self) -> &[CidrRange] {
        &self.ranges
    }

    /// Check if this policy permits every address.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        let v4 = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let v6 = IpAddr::V6(Ipv6Addr::UNSPECIFIED);
        [v4, v6]
            .into_iter()
            .all(|family| self.ranges.contains(&CidrRange::new(family, 0)))
    }
}
