pub const TEST_CHAIN_ID: &str = "0x1";
pub const TEST_POOL_INDEX: u64 = 420;

pub const ETH: &str = "0x0000000000000000000000000000000000000000";
pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const WBTC: &str = "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599";

pub const ETH_DECIMALS: u8 = 18;
pub const USDC_DECIMALS: u8 = 6;
pub const WBTC_DECIMALS: u8 = 8;

/// Raw ETH/USDC spot, 2000 USDC per ETH once decimal corrected and inverted
pub const ETH_USDC_SPOT: f64 = 5e8;
/// Raw WBTC/USDC spot, 50000 USDC per WBTC
pub const WBTC_USDC_SPOT: f64 = 2e-3;

pub const ETH_USD: f64 = 2000.0;
pub const USDC_USD: f64 = 1.0;
pub const WBTC_USD: f64 = 50_000.0;

pub const TEST_USER: &str = "0x00000000000000000000000000000000000000aa";
pub const OTHER_USER: &str = "0x00000000000000000000000000000000000000bb";

/// Liquidity reported for positions read straight from chain
pub const ONCHAIN_LIQUIDITY: f64 = 1_000_000.0;
