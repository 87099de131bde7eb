//! Contract bindings for the confidential token and the ACL.
//!
//! Balances, supplies and allowances are bytes32 ciphertext handles;
//! encrypted entry points take a handle where a plain ERC20 takes an amount.

use alloy::sol;

sol! {
    #[sol(rpc)]
    contract ConfidentialErc20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (bytes32);
        function balanceOf(address account) external view returns (bytes32);
        function allowance(address owner, address spender) external view returns (bytes32);

        function mint(bytes32 amount) external;
        function burn(bytes32 amount) external;
        function transfer(address to, bytes32 amount) external returns (bool);
        function approve(address spender, bytes32 amount) external returns (bool);
        function transferFrom(address from, address to, bytes32 amount) external returns (bool);

        function transferOwnership(address newOwner) external;
        function addToWhitelist(address account) external;
        function removeFromWhitelist(address account) external;
        function isWhitelisted(address account) external view returns (bool);
        function getFullWhitelist() external view returns (address[]);
        function getTotalHandles() external view returns (bytes32[]);

        function deposit(uint256 amount) external;
        function claim(address to, uint256 amount) external;
        function addOracle(address oracle) external;
        function removeOracle(address oracle) external;
    }

    #[sol(rpc)]
    contract Acl {
        function isAllowed(bytes32 handle, address account) external view returns (bool);
        function isAllowedForDecryption(bytes32 handle, address account) external view returns (bool);
        function allowForDecryption(bytes32[] handles) external;
        function accessPolicy(bytes32 handle, address account, uint8 policy) external;
    }
}
