//! Identifiers of the networks the relayer serves.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The family of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// An EVM network.
    Evm,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm => f.write_str("EVM"),
        }
    }
}

/// Networks supported by the relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkChainId {
    /// Ethereum mainnet.
    Ethereum,
    /// Ethereum Goerli testnet.
    EthereumGoerli,
    /// BNB Chain.
    BnbChain,
    /// Polygon PoS.
    PolygonPos,
    /// Local hardhat node.
    Hardhat,
    /// Polygon Mumbai testnet.
    PolygonMumbai,
    /// Arbitrum Goerli testnet.
    ArbitrumGoerli,
}

impl NetworkChainId {
    /// All supported networks.
    pub const ALL: [Self; 7] = [
        Self::Ethereum,
        Self::EthereumGoerli,
        Self::BnbChain,
        Self::PolygonPos,
        Self::Hardhat,
        Self::PolygonMumbai,
        Self::ArbitrumGoerli,
    ];

    /// Returns the numeric chain id.
    pub const fn id(self) -> u64 {
        match self {
            Self::Ethereum => 1,
            Self::EthereumGoerli => 5,
            Self::BnbChain => 56,
            Self::PolygonPos => 137,
            Self::Hardhat => 31337,
            Self::PolygonMumbai => 80001,
            Self::ArbitrumGoerli => 421613,
        }
    }

    /// Looks up a supported network by numeric chain id.
    fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|chain| chain.id() == id)
    }

    /// Whether the network is a rollup, where gas estimates drift more between client and relayer.
    pub const fn is_l2(self) -> bool {
        matches!(self, Self::ArbitrumGoerli)
    }
}

impl fmt::Display for NetworkChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Error returned when a chain id is not one of the supported networks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported network chain id: {0}")]
pub struct UnknownChainId(pub String);

impl FromStr for NetworkChainId {
    type Err = UnknownChainId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .ok()
            .and_then(Self::from_id)
            .ok_or_else(|| UnknownChainId(s.to_string()))
    }
}

impl TryFrom<u64> for NetworkChainId {
    type Error = UnknownChainId;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| UnknownChainId(id.to_string()))
    }
}

impl Serialize for NetworkChainId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.id())
    }
}

impl<'de> Deserialize<'de> for NetworkChainId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = u64::deserialize(deserializer)?;
        Self::try_from(id).map_err(serde::de::Error::custom)
    }
}

/// A `{type, id}` pair naming a network. Used as the key of every cache and config table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainIdentifier {
    /// Network family.
    pub kind: ChainType,
    /// Network id within the family.
    pub id: NetworkChainId,
}

impl ChainIdentifier {
    /// Creates an EVM chain identifier.
    pub const fn evm(id: NetworkChainId) -> Self {
        Self { kind: ChainType::Evm, id }
    }
}

impl From<NetworkChainId> for ChainIdentifier {
    fn from(id: NetworkChainId) -> Self {
        Self::evm(id)
    }
}

impl fmt::Display for ChainIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_ids() {
        assert_eq!("137".parse::<NetworkChainId>().unwrap(), NetworkChainId::PolygonPos);
        assert_eq!(NetworkChainId::try_from(421613).unwrap(), NetworkChainId::ArbitrumGoerli);
        assert!("10".parse::<NetworkChainId>().is_err());
        assert!("polygon".parse::<NetworkChainId>().is_err());
    }

    #[test]
    fn display() {
        let chain = ChainIdentifier::evm(NetworkChainId::Ethereum);
        assert_eq!(chain.to_string(), "EVM:1");
    }

    #[test]
    fn ids_are_unique() {
        for chain in NetworkChainId::ALL {
            assert_eq!(NetworkChainId::from_id(chain.id()), Some(chain));
        }
    }
}
