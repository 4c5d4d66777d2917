//! Address pool allocator
//!
//! Pure functions over an [`AddressPoolStatus`] snapshot. The caller persists
//! the mutated snapshot with a resource-version check; on conflict it re-reads
//! the pool and decides again from scratch.
//!
//! Only IPv4 pools are supported. The network and broadcast addresses (for
//! prefixes shorter than /31) and the pool gateway are never handed out.

use crds::{AddressPoolSpec, AddressPoolStatus, ObjectReferenceWithKind};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Allocation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// Every allocatable address is claimed
    #[error("no free address left in pool range")]
    PoolExhausted,

    /// Requested address is held by someone else
    #[error("address {address} is already claimed by {holder}")]
    AddressConflict { address: String, holder: String },

    /// Claimant already holds a different address in this pool
    #[error("{claimant} already holds {held}, cannot also claim {requested}")]
    ClaimantHoldsOther {
        claimant: String,
        held: String,
        requested: String,
    },

    /// Requested address is outside the allocatable range
    #[error("address {0} is outside the allocatable range")]
    OutOfRange(String),

    /// Requested address does not parse
    #[error("invalid address {0}")]
    InvalidAddress(String),

    /// Pool spec cannot be turned into a range
    #[error("invalid pool: {0}")]
    InvalidPool(String),
}

/// Allocatable range of an AddressPool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    first: u32,
    last: u32,
    gateway: Ipv4Addr,
    netmask: Ipv4Addr,
}

impl AddressRange {
    /// Resolve the range declared by a pool spec
    ///
    /// Start and end default to the first and last host address of the CIDR.
    /// Start, end and gateway must all lie inside the CIDR.
    pub fn from_spec(spec: &AddressPoolSpec) -> Result<Self, AllocationError> {
        let network: Ipv4Network = spec
            .cidr
            .parse()
            .map_err(|e| AllocationError::InvalidPool(format!("cidr {}: {}", spec.cidr, e)))?;

        let base = u32::from(network.network());
        let broadcast = u32::from(network.broadcast());
        let (host_first, host_last) = if network.prefix() >= 31 {
            (base, broadcast)
        } else {
            (base + 1, broadcast - 1)
        };

        let bound = |value: Option<&String>,
                     default: u32,
                     what: &str|
         -> Result<u32, AllocationError> {
            let Some(raw) = value else {
                return Ok(default);
            };
            let addr: Ipv4Addr = raw.parse().map_err(|_| {
                AllocationError::InvalidPool(format!("{} {} is not an IPv4 address", what, raw))
            })?;
            let addr = u32::from(addr);
            if addr < host_first || addr > host_last {
                return Err(AllocationError::InvalidPool(format!(
                    "{} {} is not a host address of {}",
                    what, raw, spec.cidr
                )));
            }
            Ok(addr)
        };
        let first = bound(spec.start_address.as_ref(), host_first, "start address")?;
        let last = bound(spec.end_address.as_ref(), host_last, "end address")?;
        if first > last {
            return Err(AllocationError::InvalidPool(format!(
                "start address {} is after end address {}",
                Ipv4Addr::from(first),
                Ipv4Addr::from(last)
            )));
        }

        let gateway: Ipv4Addr = spec.gateway.parse().map_err(|_| {
            AllocationError::InvalidPool(format!("gateway {} is not an IPv4 address", spec.gateway))
        })?;
        if !network.contains(gateway) {
            return Err(AllocationError::InvalidPool(format!(
                "gateway {} is outside {}",
                gateway, spec.cidr
            )));
        }

        let netmask = match &spec.netmask {
            Some(raw) => raw.parse().map_err(|_| {
                AllocationError::InvalidPool(format!("netmask {} is not valid", raw))
            })?,
            None => network.mask(),
        };

        Ok(Self {
            first,
            last,
            gateway,
            netmask,
        })
    }

    /// First allocatable address
    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first)
    }

    /// Last allocatable address
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.last)
    }

    /// Netmask handed to claimants
    pub fn netmask(&self) -> Ipv4Addr {
        self.netmask
    }

    /// Whether `addr` may be handed out
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let value = u32::from(addr);
        value >= self.first && value <= self.last && addr != self.gateway
    }

    /// Number of addresses that may be handed out
    pub fn size(&self) -> u32 {
        let span = self.last - self.first + 1;
        if self.contains_raw(self.gateway) {
            span - 1
        } else {
            span
        }
    }

    fn contains_raw(&self, addr: Ipv4Addr) -> bool {
        let value = u32::from(addr);
        value >= self.first && value <= self.last
    }

    fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        (self.first..=self.last)
            .map(Ipv4Addr::from)
            .filter(move |addr| *addr != self.gateway)
    }
}

/// Recompute the free-address count from the allocation map
pub fn refresh_available(status: &mut AddressPoolStatus, range: &AddressRange) {
    let claimed = status
        .address_allocation
        .keys()
        .filter_map(|a| a.parse::<Ipv4Addr>().ok())
        .filter(|a| range.contains(*a))
        .count();
    let claimed = u32::try_from(claimed).unwrap_or(u32::MAX);
    status.available_addresses = range.size().saturating_sub(claimed);
}

/// Claim an address for `claimant`
///
/// With `requested` set, that exact address is claimed. Otherwise the lowest
/// free address in the range is used. An address already held by the same
/// claimant is returned as is. The status is only modified on success.
pub fn allocate(
    status: &mut AddressPoolStatus,
    range: &AddressRange,
    claimant: &ObjectReferenceWithKind,
    requested: Option<&str>,
) -> Result<String, AllocationError> {
    let held = status.claim_of(claimant).map(str::to_owned);

    let address = match requested {
        Some(raw) => {
            let addr: Ipv4Addr = raw
                .parse()
                .map_err(|_| AllocationError::InvalidAddress(raw.to_string()))?;
            if !range.contains(addr) {
                return Err(AllocationError::OutOfRange(raw.to_string()));
            }
            let address = addr.to_string();
            if let Some(holder) = status.address_allocation.get(&address) {
                if holder == claimant {
                    return Ok(address);
                }
                return Err(AllocationError::AddressConflict {
                    address,
                    holder: holder.to_string(),
                });
            }
            if let Some(held) = held {
                return Err(AllocationError::ClaimantHoldsOther {
                    claimant: claimant.to_string(),
                    held,
                    requested: address,
                });
            }
            address
        }
        None => {
            if let Some(held) = held {
                return Ok(held);
            }
            range
                .addresses()
                .map(|a| a.to_string())
                .find(|a| !status.address_allocation.contains_key(a))
                .ok_or(AllocationError::PoolExhausted)?
        }
    };

    status
        .address_allocation
        .insert(address.clone(), claimant.clone());
    refresh_available(status, range);
    Ok(address)
}

/// Remove the claim on `address`; no-op if it is not claimed
pub fn release(status: &mut AddressPoolStatus, range: &AddressRange, address: &str) -> bool {
    let removed = status.address_allocation.remove(address).is_some();
    if removed {
        refresh_available(status, range);
    }
    removed
}

/// Remove whatever address `claimant` holds, returning it
pub fn release_claimant(
    status: &mut AddressPoolStatus,
    range: &AddressRange,
    claimant: &ObjectReferenceWithKind,
) -> Option<String> {
    let address = status.claim_of(claimant)?.to_owned();
    release(status, range, &address);
    Some(address)
}
