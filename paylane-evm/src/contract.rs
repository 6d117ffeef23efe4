//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface the handler needs: the EIP-2612 permit
//! entry point plus the ERC-20 subset for moving funds and reading
//! allowances and balances.

use alloy_sol_types::sol;

sol! {
    /// EIP-2612 permit + minimal ERC-20 interface.
    ///
    /// Only the functions actually used by the handler are declared.
    ///
    /// References:
    /// - EIP-2612: <https://eips.ethereum.org/EIPS/eip-2612>
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IErc20Permit {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function nonces(address owner) external view returns (uint256);
        function permit(
            address owner,
            address spender,
            uint256 value,
            uint256 deadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
        function transferFrom(address from, address to, uint256 value) external returns (bool);
    }
}
