//! IPv4 subnet pools for address assignment on switch and router links.
//!
//! Only uniqueness matters to the simulation; the pool hands out the host
//! addresses of its CIDR block in ascending order and never reuses one.

use crate::error::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A CIDR block with a cursor over its unassigned host addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubnetPool {
    network: Ipv4Addr,
    prefix: u8,
    next_offset: u32,
}

impl SubnetPool {
    /// Create a pool over `network/prefix`. The network and broadcast
    /// addresses are never assigned.
    pub fn new(network: Ipv4Addr, prefix: u8) -> NetworkResult<Self> {
        if prefix < 1 || prefix > 30 {
            return Err(NetworkError::InvalidSubnet {
                value: format!("{network}/{prefix}"),
            });
        }
        let base = u32::from(network);
        let mask = u32::MAX << (32 - prefix);
        if base & !mask != 0 {
            return Err(NetworkError::InvalidSubnet {
                value: format!("{network}/{prefix}"),
            });
        }
        Ok(SubnetPool {
            network,
            prefix,
            next_offset: 1,
        })
    }

    /// The CIDR prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The network address of the block.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Number of addresses still assignable.
    pub fn remaining(&self) -> u32 {
        let host_count = (1u32 << (32 - self.prefix)) - 2;
        host_count.saturating_sub(self.next_offset - 1)
    }

    /// Assign the next free host address.
    pub fn allocate(&mut self) -> NetworkResult<Ipv4Addr> {
        if self.remaining() == 0 {
            return Err(NetworkError::SubnetExhausted {
                subnet: self.to_string(),
            });
        }
        let address = Ipv4Addr::from(u32::from(self.network) + self.next_offset);
        self.next_offset += 1;
        Ok(address)
    }
}

impl fmt::Display for SubnetPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for SubnetPool {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetworkError::InvalidSubnet {
            value: s.to_string(),
        };
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let network: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        SubnetPool::new(network, prefix)
    }
}

impl TryFrom<String> for SubnetPool {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubnetPool> for String {
    fn from(pool: SubnetPool) -> String {
        pool.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_unique_addresses() {
        let mut pool: SubnetPool = "192.168.0.0/24".parse().unwrap();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!(a, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(b, Ipv4Addr::new(192, 168, 0, 2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_exhaustion() {
        let mut pool: SubnetPool = "10.0.0.0/30".parse().unwrap();
        assert_eq!(pool.remaining(), 2);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert!(matches!(
            pool.allocate(),
            Err(NetworkError::SubnetExhausted { .. })
        ));
    }

    #[test]
    fn test_rejects_misaligned_network() {
        assert!("192.168.0.5/24".parse::<SubnetPool>().is_err());
        assert!("192.168.0.0/0".parse::<SubnetPool>().is_err());
        assert!("not-a-subnet".parse::<SubnetPool>().is_err());
    }
}
