//! Networks, tokens and wei amounts shared by every chain client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest on-chain unit of a token. 128 bits cover every supply we touch.
pub type Wei = u128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    Ethereum,
    Arbitrum,
    Optimism,
    Polygon,
    Avalanche,
    BinanceBnb,
    ZksyncEra,
    StarkNet,
    Goerli,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ethereum => "ETHEREUM",
            Self::Arbitrum => "ARBITRUM",
            Self::Optimism => "OPTIMISM",
            Self::Polygon => "POLYGON",
            Self::Avalanche => "AVALANCHE",
            Self::BinanceBnb => "BINANCE_BNB",
            Self::ZksyncEra => "ZKSYNC_ERA",
            Self::StarkNet => "STARK_NET",
            Self::Goerli => "GOERLI",
        }
    }

    /// Token used to pay fees on this network.
    pub fn native_token(self) -> Token {
        match self {
            Self::Ethereum
            | Self::Arbitrum
            | Self::Optimism
            | Self::ZksyncEra
            | Self::StarkNet
            | Self::Goerli => Token::Eth,
            Self::Polygon => Token::Matic,
            Self::Avalanche => Token::Avax,
            Self::BinanceBnb => Token::Bnb,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Eth,
    Weth,
    Usdt,
    Usdc,
    Stg,
    Bnb,
    Matic,
    Avax,
    Mav,
    Lsd,
    Lusd,
    Mute,
    Space,
    Vc,
    Izi,
}

impl Token {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Weth => "WETH",
            Self::Usdt => "USDT",
            Self::Usdc => "USDC",
            Self::Stg => "STG",
            Self::Bnb => "BNB",
            Self::Matic => "MATIC",
            Self::Avax => "AVAX",
            Self::Mav => "MAV",
            Self::Lsd => "LSD",
            Self::Lusd => "LUSD",
            Self::Mute => "MUTE",
            Self::Space => "SPACE",
            Self::Vc => "VC",
            Self::Izi => "IZI",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serde adapter storing wei amounts as decimal strings, so JSON readers
/// without 128-bit integers see the exact value.
pub mod wei_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::Wei;

    pub fn serialize<S: Serializer>(value: &Wei, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Wei, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim()
            .parse::<Wei>()
            .map_err(|e| D::Error::custom(format!("invalid wei amount '{raw}': {e}")))
    }
}
