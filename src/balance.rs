//! Concurrent per-token balance lookup for a profile.

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::chain::{ChainClient, ChainConnector, Network, Token, Wei, wei_string};
use crate::error::TaskError;
use crate::profile::ProfileProvider;

/// Tokens queried when the caller names none. The network's native token is
/// always added.
pub const DEFAULT_BALANCE_TOKENS: [Token; 12] = [
    Token::Usdt,
    Token::Usdc,
    Token::Eth,
    Token::Stg,
    Token::Weth,
    Token::Lsd,
    Token::Lusd,
    Token::Mute,
    Token::Mav,
    Token::Space,
    Token::Vc,
    Token::Izi,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub token: Token,
    #[serde(with = "wei_string")]
    pub wei: Wei,
    pub human: Decimal,
}

/// Unique tokens in first-seen order, followed by `native` if missing.
fn query_tokens(tokens: &[Token], native: Token) -> Vec<Token> {
    let mut unique = Vec::with_capacity(tokens.len() + 1);
    for token in tokens.iter().copied().chain(std::iter::once(native)) {
        if !unique.contains(&token) {
            unique.push(token);
        }
    }
    unique
}

/// Query every token concurrently and keep the non-zero successes.
///
/// A failed lookup drops that token only; the aggregate never fails.
pub async fn fetch_balances(
    client: &dyn ChainClient,
    address: &str,
    tokens: &[Token],
) -> Vec<TokenBalance> {
    let tokens = query_tokens(tokens, client.native_token());
    let lookups = tokens.iter().map(|&token| async move {
        let result = client.balance(address, token).await;
        (token, result)
    });

    join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(token, result)| match result {
            Ok(balance) if balance.wei > 0 => Some(TokenBalance {
                token,
                wei: balance.wei,
                human: balance.human,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(%token, "Balance lookup failed: {}", e);
                None
            }
        })
        .collect()
}

/// Balances of a profile's wallet on `network`.
pub async fn profile_balances(
    profiles: &dyn ProfileProvider,
    connector: &dyn ChainConnector,
    profile_id: Uuid,
    network: Network,
    tokens: Option<&[Token]>,
) -> Result<Vec<TokenBalance>, TaskError> {
    let profile = profiles.profile(profile_id).await?;
    let settings = profiles.network_settings(&profile.user_id, network).await?;
    let client = connector.connect(&profile, &settings, network).await?;
    let address = client.wallet_address().await?;

    let tokens = tokens.unwrap_or(&DEFAULT_BALANCE_TOKENS);
    Ok(fetch_balances(client.as_ref(), &address, tokens).await)
}
