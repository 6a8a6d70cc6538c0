//! Well-known network identifiers.
//!
//! Nodes report a `network_id` in `server_info`; this maps it to a name and
//! the network's native asset code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native asset code on XRPL networks.
pub const XRP: &str = "XRP";
/// Native asset code on Xahau networks.
pub const XAH: &str = "XAH";

/// A known ledger network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// XRPL mainnet
    #[default]
    XrplMainnet,
    /// XRPL testnet
    XrplTestnet,
    /// XRPL devnet
    XrplDevnet,
    /// XRPL AMM devnet
    XrplAmmDevnet,
    /// Xahau mainnet
    XahauMainnet,
    /// Xahau testnet
    XahauTestnet,
}

impl Network {
    /// Every known network.
    pub const ALL: [Self; 6] = [
        Self::XrplMainnet,
        Self::XrplTestnet,
        Self::XrplDevnet,
        Self::XrplAmmDevnet,
        Self::XahauMainnet,
        Self::XahauTestnet,
    ];

    /// Numeric network id.
    pub const fn id(self) -> u32 {
        match self {
            Self::XrplMainnet => 0,
            Self::XrplTestnet => 1,
            Self::XrplDevnet => 2,
            Self::XrplAmmDevnet => 25,
            Self::XahauMainnet => 21337,
            Self::XahauTestnet => 21338,
        }
    }

    /// Network for `id`, falling back to XRPL mainnet for unknown ids.
    pub fn from_id(id: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|network| network.id() == id)
            .unwrap_or_default()
    }

    /// Human readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::XrplMainnet => "XRPL Mainnet",
            Self::XrplTestnet => "XRPL Testnet",
            Self::XrplDevnet => "XRPL Devnet",
            Self::XrplAmmDevnet => "XRPL AMM Devnet",
            Self::XahauMainnet => "Xahau Mainnet",
            Self::XahauTestnet => "Xahau Testnet",
        }
    }

    /// Code of the network's native asset.
    pub const fn native_asset(self) -> &'static str {
        match self {
            Self::XahauMainnet | Self::XahauTestnet => XAH,
            _ => XRP,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
