//! Token Data Client
//!
//! JSON-RPC reads for candidate enrichment, executed through the [`RpcPool`]:
//! - `getAccountInfo` (jsonParsed) for decimals, supply and authorities
//! - `getTokenLargestAccounts` for holder concentration
//! - `getAsset` (DAS) for symbol and name

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{
    top10_share, AccountData, AccountInfoValue, DasAsset, LargestAccount, MintInfo, RpcEnvelope,
    WithContext,
};
use crate::adapters::rpc_pool::RpcPool;
use crate::domain::known_programs::{TOKEN_2022_PROGRAM, TOKEN_PROGRAM};
use crate::ports::{AssetMetadata, MetadataPort, OnChainSnapshot, TokenDataError, TokenDataPort};

/// Configuration for the TokenDataClient
#[derive(Debug, Clone)]
pub struct TokenDataConfig {
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Commitment used for reads
    pub commitment: String,
}

impl Default for TokenDataConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            commitment: "confirmed".to_string(),
        }
    }
}

/// Client for on-chain token reads, shared as an `Arc` handle
#[derive(Debug, Clone)]
pub struct TokenDataClient {
    pool: Arc<RpcPool>,
    http: Client,
    config: TokenDataConfig,
}

impl TokenDataClient {
    pub fn new(pool: Arc<RpcPool>) -> Result<Self, TokenDataError> {
        Self::with_config(pool, TokenDataConfig::default())
    }

    pub fn with_config(pool: Arc<RpcPool>, config: TokenDataConfig) -> Result<Self, TokenDataError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TokenDataError::Rpc(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { pool, http, config })
    }

    pub fn pool(&self) -> &Arc<RpcPool> {
        &self.pool
    }

    /// Fetch and parse the mint account
    pub async fn get_mint_info(&self, mint: &str) -> Result<MintInfo, TokenDataError> {
        let result: WithContext<Option<AccountInfoValue>> = self
            .rpc_request(
                "getAccountInfo",
                json!([mint, {"encoding": "jsonParsed", "commitment": self.config.commitment}]),
            )
            .await?;
        let value = result
            .value
            .ok_or_else(|| TokenDataError::NotFound(mint.to_string()))?;
        parse_mint_account(value)
    }

    /// Up to 20 largest token accounts for a mint
    pub async fn get_largest_accounts(&self, mint: &str) -> Result<Vec<LargestAccount>, TokenDataError> {
        let result: WithContext<Vec<LargestAccount>> = self
            .rpc_request(
                "getTokenLargestAccounts",
                json!([mint, {"commitment": self.config.commitment}]),
            )
            .await?;
        Ok(result.value)
    }

    /// DAS asset lookup
    pub async fn get_asset(&self, mint: &str) -> Result<DasAsset, TokenDataError> {
        self.rpc_request("getAsset", json!({ "id": mint })).await
    }

    /// `getHealth` through the pool; feeds endpoint health like any other read
    pub async fn health(&self) -> Result<String, TokenDataError> {
        self.rpc_request("getHealth", json!([])).await
    }

    /// Single JSON-RPC request with pool failover.
    ///
    /// Transport errors, 429 and non-2xx responses count against the endpoint.
    /// A well-formed JSON-RPC error body does not.
    async fn rpc_request<T>(&self, method: &str, params: Value) -> Result<T, TokenDataError>
    where
        T: DeserializeOwned + Send,
    {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let http = self.http.clone();

        let envelope: RpcEnvelope<T> = self
            .pool
            .call(|url| {
                let http = http.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err("rate limited (429)".to_string());
                    }
                    if !status.is_success() {
                        return Err(format!("HTTP {}", status));
                    }
                    response
                        .json::<RpcEnvelope<T>>()
                        .await
                        .map_err(|e| format!("invalid JSON-RPC body: {}", e))
                }
            })
            .await
            .map_err(|e| TokenDataError::Rpc(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(TokenDataError::Rpc(format!(
                "{} returned {}: {}",
                method, err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| TokenDataError::InvalidData(format!("{} returned no result", method)))
    }
}

fn parse_mint_account(value: AccountInfoValue) -> Result<MintInfo, TokenDataError> {
    if value.owner != TOKEN_PROGRAM && value.owner != TOKEN_2022_PROGRAM {
        return Err(TokenDataError::InvalidData(format!(
            "account owned by {}, not a token program",
            value.owner
        )));
    }
    let parsed = match value.data {
        AccountData::Parsed(parsed) => parsed,
        AccountData::Raw(_) => {
            return Err(TokenDataError::InvalidData(
                "Expected jsonParsed encoding, got raw data".into(),
            ))
        }
    };
    if parsed.parsed.account_type != "mint" {
        return Err(TokenDataError::InvalidData(format!(
            "Account type is '{}', expected 'mint'",
            parsed.parsed.account_type
        )));
    }
    Ok(parsed.parsed.info)
}

#[async_trait]
impl TokenDataPort for TokenDataClient {
    async fn fetch_snapshot(&self, mint: &str) -> Result<OnChainSnapshot, TokenDataError> {
        let (info, largest) = tokio::join!(self.get_mint_info(mint), self.get_largest_accounts(mint));
        let info = info?;

        let top10 = match largest {
            Ok(accounts) => info.supply_raw().and_then(|supply| top10_share(&accounts, supply)),
            Err(e) => {
                debug!(mint = %mint, error = %e, "Largest accounts unavailable");
                None
            }
        };

        Ok(OnChainSnapshot {
            decimals: Some(info.decimals),
            mint_authority_renounced: Some(info.mint_authority.is_none()),
            freeze_authority_renounced: Some(info.freeze_authority.is_none()),
            top10_holder_share: top10,
            ..Default::default()
        })
    }
}

#[async_trait]
impl MetadataPort for TokenDataClient {
    async fn lookup(&self, mint: &str) -> Result<AssetMetadata, TokenDataError> {
        let asset = self.get_asset(mint).await?;
        Ok(AssetMetadata {
            symbol: asset.symbol(),
            name: asset.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::{ParsedAccountData, ParsedInfo};

    fn mint_value(owner: &str, account_type: &str, authority: Option<&str>) -> AccountInfoValue {
        AccountInfoValue {
            data: AccountData::Parsed(ParsedAccountData {
                parsed: ParsedInfo {
                    info: MintInfo {
                        mint_authority: authority.map(String::from),
                        freeze_authority: None,
                        supply: "1000000000000".to_string(),
                        decimals: 9,
                        is_initialized: true,
                    },
                    account_type: account_type.to_string(),
                },
                program: "spl-token".to_string(),
            }),
            owner: owner.to_string(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = TokenDataConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.commitment, "confirmed");
    }

    #[test]
    fn test_client_creation() {
        let pool = Arc::new(RpcPool::with_defaults(vec!["https://api.mainnet-beta.solana.com".into()]).unwrap());
        let client = TokenDataClient::new(pool);
        assert!(client.is_ok());
        assert_eq!(client.unwrap().pool().len(), 1);
    }

    #[test]
    fn test_parse_mint_account_success() {
        let info = parse_mint_account(mint_value(TOKEN_PROGRAM, "mint", None)).unwrap();
        assert_eq!(info.decimals, 9);
        assert_eq!(info.supply_raw(), Some(1_000_000_000_000));
        assert!(info.mint_authority.is_none());
    }

    #[test]
    fn test_parse_mint_account_token_2022() {
        let info = parse_mint_account(mint_value(TOKEN_2022_PROGRAM, "mint", Some("Auth"))).unwrap();
        assert_eq!(info.mint_authority.as_deref(), Some("Auth"));
    }

    #[test]
    fn test_parse_rejects_non_mint() {
        let result = parse_mint_account(mint_value(TOKEN_PROGRAM, "account", None));
        assert!(matches!(result, Err(TokenDataError::InvalidData(_))));
    }

    #[test]
    fn test_parse_rejects_foreign_owner() {
        let result = parse_mint_account(mint_value("11111111111111111111111111111111", "mint", None));
        assert!(matches!(result, Err(TokenDataError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_surfaces_rpc_error() {
        // Port 9 (discard) on localhost refuses connections
        let pool = Arc::new(
            RpcPool::with_defaults(vec!["http://127.0.0.1:9".into()])
                .unwrap()
                .with_retry_delay(Duration::from_millis(1)),
        );
        let client = TokenDataClient::new(pool).unwrap();
        let result = client.fetch_snapshot("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263").await;
        assert!(matches!(result, Err(TokenDataError::Rpc(_))));
    }
}
