//! Amount, gas and slippage resolution.
//!
//! Everything here is pure: callers feed in a balance snapshot or a dry-run
//! cost and get back concrete execution parameters.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::chain::{Cost, GasPlan, Network, Wei, wei_string};
use crate::error::TaskError;
use crate::profile::{NetworkSettings, SettingsSource};
use crate::task::types::{AmountSpec, TaskKind};

/// Share of the resolved amount used for the dry run, in percent.
pub const ESTIMATE_PERCENT: u128 = 90;

/// Percent values keep at most this many fractional digits.
const MAX_PERCENT_SCALE: u32 = 16;

/// Normalized dry-run fee figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Estimate {
    pub gas_limit: u64,
    #[serde(with = "wei_string")]
    pub gas_price: Wei,
    #[serde(with = "wei_string")]
    pub total_fee: Wei,
}

/// Resolve an amount spec against a live balance.
pub fn resolve_amount(spec: &AmountSpec, balance: Wei) -> Result<Wei, TaskError> {
    let resolved = match spec {
        AmountSpec::Absolute(amount) => {
            if *amount > balance {
                return Err(TaskError::InsufficientBalance {
                    requested: *amount,
                    available: balance,
                });
            }
            *amount
        }
        AmountSpec::Percent(percent) => percent_of_balance(*percent, balance)?,
    };

    if resolved == 0 {
        return Err(TaskError::InsufficientBalance {
            requested: resolved,
            available: balance,
        });
    }
    Ok(resolved)
}

/// `floor(balance * percent / 100)` in exact integer arithmetic.
fn percent_of_balance(percent: Decimal, balance: Wei) -> Result<Wei, TaskError> {
    if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(TaskError::InvalidAmount(format!(
            "percent must be in (0, 100], got {percent}"
        )));
    }

    let percent = percent
        .round_dp_with_strategy(MAX_PERCENT_SCALE, RoundingStrategy::ToZero)
        .normalize();
    let numerator = u128::try_from(percent.mantissa())
        .map_err(|_| TaskError::InvalidAmount(format!("percent out of range: {percent}")))?;
    let denominator = 10u128
        .checked_pow(percent.scale())
        .and_then(|scale| scale.checked_mul(100))
        .ok_or_else(|| TaskError::InvalidAmount(format!("percent out of range: {percent}")))?;

    mul_div_floor(balance, numerator, denominator)
        .ok_or_else(|| TaskError::InvalidAmount(format!("{percent}% of {balance} overflows")))
}

/// `floor(value * numerator / denominator)` without overflowing on `value * numerator`.
fn mul_div_floor(value: u128, numerator: u128, denominator: u128) -> Option<u128> {
    let quotient = value / denominator;
    let remainder = value % denominator;
    quotient
        .checked_mul(numerator)?
        .checked_add(remainder.checked_mul(numerator)? / denominator)
}

/// Dry-run amount: `floor(resolved * 90 / 100)`.
pub fn estimate_amount(resolved: Wei) -> Wei {
    // numerator < denominator, so neither product can overflow
    mul_div_floor(resolved, ESTIMATE_PERCENT, 100).unwrap_or(0)
}

/// Lowest gas price a network accepts, in wei.
fn min_gas_price(network: Network) -> Wei {
    match network {
        Network::ZksyncEra => 250_000_000,
        Network::Arbitrum => 100_000_000,
        _ => 0,
    }
}

/// Normalize a dry-run cost into an [`Estimate`].
pub fn gas_station(cost: Cost, network: Network) -> Estimate {
    let gas_price = cost.gas_price.max(min_gas_price(network));
    Estimate {
        gas_limit: cost.gas_limit,
        gas_price,
        total_fee: Wei::from(cost.gas_limit).saturating_mul(gas_price),
    }
}

/// Gas limit headroom applied to estimates under service-default settings.
fn default_gas_multiplier(network: Network) -> Decimal {
    match network {
        Network::ZksyncEra | Network::StarkNet => dec!(1.5),
        Network::Arbitrum => dec!(1.3),
        _ => dec!(1.2),
    }
}

/// Translate an estimate into the gas plan for the real submission.
pub fn gas_plan(
    estimate: Estimate,
    settings: &NetworkSettings,
    destination: Network,
) -> Result<GasPlan, TaskError> {
    let source = settings.network;
    if !supported_pair(source, destination) {
        return Err(TaskError::UnsupportedNetwork {
            from_network: source,
            to_network: destination,
        });
    }

    let multiplier = match settings.source {
        SettingsSource::Default => default_gas_multiplier(source),
        SettingsSource::User => settings
            .gas_multiplier
            .unwrap_or_else(|| default_gas_multiplier(source)),
    };
    if multiplier < Decimal::ONE {
        return Err(TaskError::InvalidAmount(format!(
            "gas multiplier must be at least 1, got {multiplier}"
        )));
    }

    let gas_limit = (Decimal::from(estimate.gas_limit) * multiplier)
        .ceil()
        .to_u64()
        .ok_or_else(|| {
            TaskError::InvalidAmount(format!(
                "gas limit {} x {multiplier} overflows",
                estimate.gas_limit
            ))
        })?;

    // cross-chain messages are priced off the source chain at submit time
    let gas_price = if source == destination {
        estimate.gas_price
    } else {
        estimate.gas_price.saturating_add(estimate.gas_price / 10)
    };

    let plan = GasPlan {
        gas_limit,
        gas_price,
    };
    if let Some(limit) = settings.max_fee_wei {
        let fee = plan.max_fee();
        if fee > limit {
            return Err(TaskError::GasLimitExceeded { fee, limit });
        }
    }
    Ok(plan)
}

/// StarkNet only bridges to and from Ethereum.
fn supported_pair(source: Network, destination: Network) -> bool {
    match (source, destination) {
        (Network::StarkNet, Network::StarkNet | Network::Ethereum) => true,
        (Network::Ethereum, Network::StarkNet) => true,
        (Network::StarkNet, _) | (_, Network::StarkNet) => false,
        _ => true,
    }
}

/// Slippage tolerance in percent for a kind under the given settings source.
pub fn slippage(settings_source: SettingsSource, kind: TaskKind) -> Result<Decimal, TaskError> {
    let unsupported = || TaskError::UnsupportedSlippage {
        kind,
        settings_source,
    };
    if !kind.uses_slippage() {
        return Err(unsupported());
    }

    match (settings_source, kind.is_starknet()) {
        (SettingsSource::Default, false) => match kind {
            TaskKind::TestNetBridgeSwap => Ok(dec!(1)),
            _ => Ok(dec!(0.5)),
        },
        (SettingsSource::Default, true) => Ok(dec!(1)),
        (SettingsSource::User, false) => match kind {
            TaskKind::TestNetBridgeSwap => Err(unsupported()),
            _ => Ok(dec!(1)),
        },
        // user-tuned StarkNet settings have no tolerance table yet
        (SettingsSource::User, true) => Err(unsupported()),
    }
}
