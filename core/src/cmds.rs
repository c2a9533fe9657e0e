//! Auxiliary commands carried by a transaction.
//!
//! The ledger core treats them as opaque except for the single asset each
//! one moves into or out of the transaction's balance.

use shroud_privacy::{Address, Asset};

use crate::error::{LedgerError, Result};

/// Lock an asset into a claimable package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCreate {
    pub id: [u8; 32],
    pub to: Address,
    pub asset: Asset,
}

/// Hand a package to a new owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTransfer {
    pub id: [u8; 32],
    pub to: Address,
}

/// Open a package; its asset flows back into the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageClose {
    pub id: [u8; 32],
    pub key: [u8; 32],
    pub asset: Asset,
}

/// Pay for staking shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyShare {
    pub vote: Address,
    pub pool: Option<[u8; 32]>,
    pub count: u32,
    pub asset: Asset,
}

/// Stake an asset to open a staking pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPool {
    pub vote: Address,
    pub fee_rate: u32,
    pub asset: Asset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePool {
    pub pool: [u8; 32],
}

/// Call into the execution engine, optionally paying an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Option<Address>,
    pub data: Vec<u8>,
    pub asset: Asset,
}

/// At most one command per transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmds {
    pub package_create: Option<PackageCreate>,
    pub package_transfer: Option<PackageTransfer>,
    pub package_close: Option<PackageClose>,
    pub buy_share: Option<BuyShare>,
    pub register_pool: Option<RegisterPool>,
    pub close_pool: Option<ClosePool>,
    pub contract: Option<ContractCall>,
}

impl Cmds {
    pub fn count(&self) -> usize {
        [
            self.package_create.is_some(),
            self.package_transfer.is_some(),
            self.package_close.is_some(),
            self.buy_share.is_some(),
            self.register_pool.is_some(),
            self.close_pool.is_some(),
            self.contract.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn validate(&self) -> Result<()> {
        match self.count() {
            0 | 1 => Ok(()),
            n => Err(LedgerError::InvalidRecord(format!(
                "{} auxiliary commands in one transaction",
                n
            ))),
        }
    }

    /// Asset the command releases into the transaction
    pub fn in_asset(&self) -> Option<&Asset> {
        self.package_close.as_ref().map(|c| &c.asset)
    }

    /// Asset the command consumes from the transaction
    pub fn out_asset(&self) -> Option<&Asset> {
        if let Some(c) = &self.package_create {
            return Some(&c.asset);
        }
        if let Some(c) = &self.buy_share {
            return Some(&c.asset);
        }
        if let Some(c) = &self.register_pool {
            return Some(&c.asset);
        }
        self.contract.as_ref().map(|c| &c.asset)
    }

    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        if let Some(c) = &self.package_create {
            hasher.update(b"package_create");
            hasher.update(&c.id);
            hasher.update(&c.to.id());
            hasher.update(&c.asset.to_bytes());
        }
        if let Some(c) = &self.package_transfer {
            hasher.update(b"package_transfer");
            hasher.update(&c.id);
            hasher.update(&c.to.id());
        }
        if let Some(c) = &self.package_close {
            hasher.update(b"package_close");
            hasher.update(&c.id);
            hasher.update(&c.key);
            hasher.update(&c.asset.to_bytes());
        }
        if let Some(c) = &self.buy_share {
            hasher.update(b"buy_share");
            hasher.update(&c.vote.id());
            hasher.update(&c.pool.unwrap_or_default());
            hasher.update(&c.count.to_be_bytes());
            hasher.update(&c.asset.to_bytes());
        }
        if let Some(c) = &self.register_pool {
            hasher.update(b"register_pool");
            hasher.update(&c.vote.id());
            hasher.update(&c.fee_rate.to_be_bytes());
            hasher.update(&c.asset.to_bytes());
        }
        if let Some(c) = &self.close_pool {
            hasher.update(b"close_pool");
            hasher.update(&c.pool);
        }
        if let Some(c) = &self.contract {
            hasher.update(b"contract");
            hasher.update(&c.to.map(|a| a.id()).unwrap_or_default());
            hasher.update(&(c.data.len() as u64).to_be_bytes());
            hasher.update(&c.data);
            hasher.update(&c.asset.to_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_privacy::{AddressKind, Keypair, currency_id};

    fn addr() -> Address {
        Keypair::from_seed(&[1u8; 64]).address(AddressKind::Native)
    }

    #[test]
    fn test_single_command_is_valid() {
        let cmds = Cmds {
            register_pool: Some(RegisterPool {
                vote: addr(),
                fee_rate: 25,
                asset: Asset::token(currency_id("SERO"), 200_000),
            }),
            ..Default::default()
        };
        cmds.validate().unwrap();
        assert_eq!(cmds.out_asset(), Some(&Asset::token(currency_id("SERO"), 200_000)));
        assert!(cmds.in_asset().is_none());
    }

    #[test]
    fn test_two_commands_rejected() {
        let cmds = Cmds {
            close_pool: Some(ClosePool { pool: [1u8; 32] }),
            package_transfer: Some(PackageTransfer {
                id: [2u8; 32],
                to: addr(),
            }),
            ..Default::default()
        };
        assert!(matches!(cmds.validate(), Err(LedgerError::InvalidRecord(_))));
    }

    #[test]
    fn test_package_close_releases_asset() {
        let asset = Asset::token(currency_id("SERO"), 9);
        let cmds = Cmds {
            package_close: Some(PackageClose {
                id: [3u8; 32],
                key: [4u8; 32],
                asset,
            }),
            ..Default::default()
        };
        assert_eq!(cmds.in_asset(), Some(&asset));
        assert!(cmds.out_asset().is_none());
    }
}
