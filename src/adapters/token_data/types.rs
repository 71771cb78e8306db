//! Token Data Types
//!
//! JSON-RPC response shapes for `getAccountInfo` (jsonParsed),
//! `getTokenLargestAccounts` and the DAS `getAsset` method.

use serde::Deserialize;

/// Generic JSON-RPC 2.0 envelope
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

/// `{ context, value }` wrapper used by most Solana RPC methods
#[derive(Debug, Clone, Deserialize)]
pub struct WithContext<T> {
    pub value: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfoValue {
    pub data: AccountData,
    pub owner: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountData {
    Parsed(ParsedAccountData),
    Raw(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedAccountData {
    pub parsed: ParsedInfo,
    pub program: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedInfo {
    pub info: MintInfo,
    #[serde(rename = "type")]
    pub account_type: String,
}

/// Mint account information from the SPL Token program
#[derive(Debug, Clone, Deserialize)]
pub struct MintInfo {
    #[serde(rename = "mintAuthority")]
    pub mint_authority: Option<String>,
    #[serde(rename = "freezeAuthority")]
    pub freeze_authority: Option<String>,
    pub supply: String,
    pub decimals: u8,
    #[serde(rename = "isInitialized", default)]
    pub is_initialized: bool,
}

impl MintInfo {
    pub fn supply_raw(&self) -> Option<u128> {
        self.supply.parse().ok()
    }
}

/// One entry of `getTokenLargestAccounts`
#[derive(Debug, Clone, Deserialize)]
pub struct LargestAccount {
    pub address: String,
    pub amount: String,
}

impl LargestAccount {
    pub fn amount_raw(&self) -> u128 {
        self.amount.parse().unwrap_or(0)
    }
}

/// Subset of a DAS asset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasAsset {
    #[serde(default)]
    pub content: Option<DasContent>,
    #[serde(default)]
    pub token_info: Option<DasTokenInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasContent {
    #[serde(default)]
    pub metadata: Option<DasMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DasTokenInfo {
    #[serde(default)]
    pub symbol: Option<String>,
}

impl DasAsset {
    /// Symbol from metadata, falling back to token_info
    pub fn symbol(&self) -> Option<String> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.symbol.clone())
            .or_else(|| self.token_info.as_ref().and_then(|t| t.symbol.clone()))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<String> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.name.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Share of supply held by the ten largest accounts
pub fn top10_share(largest: &[LargestAccount], supply: u128) -> Option<f64> {
    if supply == 0 {
        return None;
    }
    let held: u128 = largest.iter().take(10).map(LargestAccount::amount_raw).sum();
    Some((held as f64 / supply as f64).clamp(0.0, 1.0))
}
