//! IPv4 地址与前缀
//!
//! 定义 32 位 IPv4 地址（点分十进制解析）与 CIDR 前缀（最长前缀匹配用）。

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIpError {
    #[error("invalid IPv4 address: {0}")]
    Address(String),
    #[error("invalid IPv4 prefix: {0}")]
    Prefix(String),
}

/// IPv4 地址（内部为 32 位整数）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpAddr(pub u32);

impl IpAddr {
    pub fn octets(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_octets(o: [u8; 4]) -> IpAddr {
        IpAddr(u32::from_be_bytes(o))
    }
}

impl FromStr for IpAddr {
    type Err = ParseIpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = 0usize;
        for part in s.trim().split('.') {
            if parts >= 4 {
                return Err(ParseIpError::Address(s.to_string()));
            }
            octets[parts] = part
                .parse::<u8>()
                .map_err(|_| ParseIpError::Address(s.to_string()))?;
            parts += 1;
        }
        if parts != 4 {
            return Err(ParseIpError::Address(s.to_string()));
        }
        Ok(IpAddr::from_octets(octets))
    }
}

impl fmt::Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets();
        write!(f, "{}.{}.{}.{}", o[0], o[1], o[2], o[3])
    }
}

/// IPv4 前缀：网络地址 + 前缀长度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    network: u32,
    len: u8,
}

impl IpPrefix {
    pub fn new(addr: IpAddr, len: u8) -> Result<IpPrefix, ParseIpError> {
        if len > 32 {
            return Err(ParseIpError::Prefix(format!("{addr}/{len}")));
        }
        let mask = Self::mask(len);
        Ok(IpPrefix {
            network: addr.0 & mask,
            len,
        })
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn network(&self) -> IpAddr {
        IpAddr(self.network)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        (ip.0 & Self::mask(self.len)) == self.network
    }

    fn mask(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - len as u32)
        }
    }
}

impl FromStr for IpPrefix {
    type Err = ParseIpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, len_part) = s
            .split_once('/')
            .ok_or_else(|| ParseIpError::Prefix(s.to_string()))?;
        let addr: IpAddr = addr_part.parse()?;
        let len: u8 = len_part
            .trim()
            .parse()
            .map_err(|_| ParseIpError::Prefix(s.to_string()))?;
        IpPrefix::new(addr, len)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.len)
    }
}
