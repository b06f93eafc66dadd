//! ABI interfaces of the collaborator contracts, plus the offsets routes
//! need to patch amounts into their calldata.

use alloy_primitives::{hex, keccak256};
use alloy_sol_types::sol;

/// Size of a function selector in bytes.
pub const SELECTOR_LEN: usize = 4;

sol! {
    /// Yield vault entry points.
    #[derive(Debug, PartialEq, Eq)]
    interface IVault {
        function deposit(uint256 amount) returns (uint256 shares);
        function depositAll() returns (uint256 shares);
        function withdraw(uint256 shares) returns (uint256 amount);
        function withdrawAll() returns (uint256 amount);
        function balanceOf(address account) view returns (uint256 shares);
        function getPricePerFullShare() view returns (uint256 price);
    }

    /// Constant-product pool entry point.
    #[derive(Debug, PartialEq, Eq)]
    interface IPool {
        function swap(address tokenIn, uint256 amountIn, uint256 minAmountOut, address recipient) returns (uint256 amountOut);
    }
}

/// Byte offset of static argument `n` (zero-based) in calldata.
///
/// # Examples
///
/// ```
/// use settlement_engine::collaborators::calldata::arg_offset;
///
/// assert_eq!(arg_offset(1), 36);
/// ```
pub const fn arg_offset(n: usize) -> usize {
    SELECTOR_LEN + 32 * n
}

/// The selector of an arbitrary signature such as `"harvest()"`, for
/// functions no interface above declares.
///
/// # Examples
///
/// ```
/// use settlement_engine::collaborators::calldata::selector;
///
/// assert_eq!(selector("depositAll()"), [0xde, 0x5f, 0x62, 0x68]);
/// ```
pub fn selector(signature: &str) -> [u8; SELECTOR_LEN] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&hash[..SELECTOR_LEN]);
    out
}

/// [`selector`] as `0x`-prefixed hex.
pub fn selector_hex(signature: &str) -> String {
    hex::encode_prefixed(selector(signature))
}
