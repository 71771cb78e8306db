//! Known Program Addresses
//!
//! Program ids and quote mints that show up in new-token transactions but are
//! never themselves a new token. Used by the log-stream parser to reject
//! false positives.

/// SPL Token program (InitializeMint lives here)
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// SPL Token 2022
pub const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
/// Raydium AMM v4
pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
/// Pump.fun bonding curve program
pub const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Programs that appear in token launches
pub const SYSTEM_PROGRAMS: &[&str] = &[
    "11111111111111111111111111111111",
    TOKEN_PROGRAM,
    TOKEN_2022_PROGRAM,
    // Associated Token Account Program
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
    "ComputeBudget111111111111111111111111111111",
    "AddressLookupTab1e1111111111111111111111111",
    // Metaplex Token Metadata
    "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s",
    // Sysvar rent
    "SysvarRent111111111111111111111111111111111",
];

/// DEX programs that create pools
pub const DEX_PROGRAMS: &[&str] = &[
    RAYDIUM_AMM_V4,
    // Raydium CLMM
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
    // Raydium CP
    "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C",
    PUMP_FUN_PROGRAM,
    // Orca Whirlpool
    "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
    // Meteora DLMM
    "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo",
];

/// Quote mints paired against new tokens
pub const QUOTE_MINTS: &[&str] = &[
    // Wrapped SOL
    "So11111111111111111111111111111111111111112",
    // USDC
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    // USDT
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
];

/// True for program ids and quote mints that can never be a new token
pub fn is_known_non_token(address: &str) -> bool {
    SYSTEM_PROGRAMS.contains(&address)
        || DEX_PROGRAMS.contains(&address)
        || QUOTE_MINTS.contains(&address)
}

/// True if `address` decodes as a 32-byte base58 public key
pub fn is_address_shaped(address: &str) -> bool {
    if !(32..=44).contains(&address.len()) {
        return false;
    }
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Address-shaped and not a known program or quote mint
pub fn is_plausible_mint(address: &str) -> bool {
    is_address_shaped(address) && !is_known_non_token(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_constants_are_address_shaped() {
        for addr in SYSTEM_PROGRAMS.iter().chain(DEX_PROGRAMS).chain(QUOTE_MINTS) {
            assert!(is_address_shaped(addr), "{} should decode to 32 bytes", addr);
        }
    }

    #[test]
    fn test_plausible_mint() {
        // BONK mint
        assert!(is_plausible_mint("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"));
        assert!(!is_plausible_mint(TOKEN_PROGRAM));
        assert!(!is_plausible_mint("So11111111111111111111111111111111111111112"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(!is_address_shaped(""));
        assert!(!is_address_shaped("invoke"));
        // '0' and 'O' are not in the base58 alphabet
        assert!(!is_address_shaped("0OOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOO"));
        assert!(!is_address_shaped("MockMint00000001"));
    }
}
