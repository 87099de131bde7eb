//! Command-line client for confidential ERC20 tokens.
//!
//! Wires the chain provider, the operator wallet and the FHE coprocessor
//! client together, and exposes one subcommand per token operation.

pub mod acl;
pub mod config;
pub mod contracts;
mod error;
pub mod ops;

pub use crate::config::{CliConfig, TokenCapability, TokenProfile};
pub use crate::error::{CliError, Result};

use crate::acl::AclContract;
use crate::ops::TokenSession;
use alloy::network::EthereumWallet;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};
use fhe_client::{DecryptOptions, FheClient, Handle, RequestSigner};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Debug, Args, Clone)]
pub struct AccountArg {
    /// Account address
    #[clap(long)]
    pub account: Address,
}

#[derive(Debug, Args, Clone)]
pub struct AllowanceArgs {
    /// Owner address
    #[clap(long)]
    pub owner: Address,
    /// Spender address
    #[clap(long)]
    pub spender: Address,
}

#[derive(Debug, Args, Clone)]
pub struct AmountArg {
    /// Token amount (human-readable)
    #[clap(long)]
    pub amount: String,
}

#[derive(Debug, Args, Clone)]
pub struct TransferArgs {
    /// Recipient address
    #[clap(long)]
    pub to: Address,
    /// Token amount (human-readable)
    #[clap(long)]
    pub amount: String,
}

#[derive(Debug, Args, Clone)]
pub struct ApproveArgs {
    /// Spender address
    #[clap(long)]
    pub spender: Address,
    /// Token amount (human-readable)
    #[clap(long)]
    pub amount: String,
}

#[derive(Debug, Args, Clone)]
pub struct TransferFromArgs {
    /// Sender address
    #[clap(long)]
    pub from: Address,
    /// Recipient address
    #[clap(long)]
    pub to: Address,
    /// Token amount (human-readable)
    #[clap(long)]
    pub amount: String,
}

#[derive(Debug, Args, Clone)]
pub struct NewOwnerArg {
    /// The account of the new owner
    #[clap(long)]
    pub to: Address,
}

#[derive(Debug, Args, Clone)]
pub struct OracleArg {
    /// Oracle address
    #[clap(long)]
    pub oracle: Address,
}

#[derive(Debug, Args, Clone)]
pub struct ClaimArgs {
    /// Recipient address
    #[clap(long)]
    pub to: Address,
    /// Token amount (human-readable)
    #[clap(long)]
    pub amount: String,
}

#[derive(Debug, Args, Clone)]
pub struct HandleArg {
    /// Ciphertext handle (bytes32)
    #[clap(long)]
    pub handle: Handle,
}

#[derive(Debug, Args, Clone)]
pub struct AllowForDecryptionArgs {
    /// Ciphertext handle (bytes32)
    #[clap(long)]
    pub handle: Handle,
    /// Account to grant decryption permission to; everyone when omitted
    #[clap(long)]
    pub account: Option<Address>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TokenCommand {
    /// Returns the name of the token.
    Name,
    /// Returns the symbol of the token.
    Symbol,
    /// Returns the number of decimals of the token.
    Decimals,
    /// Returns the decrypted total supply.
    TotalSupply,
    /// Returns the decrypted balance of `account`.
    BalanceOf(AccountArg),
    /// Returns the decrypted allowance of `spender` over `owner`'s tokens.
    Allowance(AllowanceArgs),
    /// Mints an encrypted `amount` of tokens to the caller.
    Mint(AmountArg),
    /// Burns an encrypted `amount` of tokens from the caller.
    Burn(AmountArg),
    /// Transfers an encrypted `amount` of tokens to `to`.
    Transfer(TransferArgs),
    /// Approves `spender` for an encrypted `amount` of the caller's tokens.
    Approve(ApproveArgs),
    /// Transfers an encrypted `amount` from `from` to `to` via allowance.
    TransferFrom(TransferFromArgs),
    /// Transfers the contract ownership to `to`.
    TransferOwnership(NewOwnerArg),
    /// Adds an `account` to the whitelist.
    AddToWhitelist(AccountArg),
    /// Removes an `account` from the whitelist.
    RemoveFromWhitelist(AccountArg),
    /// Determines whether the `account` is on the whitelist.
    IsWhitelisted(AccountArg),
    /// Retrieves the whitelist.
    GetFullWhitelist,
    /// Retrieves all handles for contract state variables.
    GetTotalHandles,
    /// Deposits a plain `amount` through the oracle-managed bridge.
    Deposit(AmountArg),
    /// Claims a plain `amount` for `to`.
    Claim(ClaimArgs),
    /// Registers an oracle.
    AddOracle(OracleArg),
    /// Removes an oracle.
    RemoveOracle(OracleArg),
    /// Grants decryption permission for the `handle`.
    AllowForDecryption(AllowForDecryptionArgs),
    /// Retrieves the plaintext behind the `handle`.
    Decrypt(HandleArg),
}

#[derive(Debug, Parser)]
#[clap(name = "token-cli", version)]
pub struct CmdConfig {
    /// Path to the configuration file
    #[clap(long, short = 'f', default_value = "config.toml")]
    pub file_conf: String,
    /// Name of the configured token to target; defaults to the first one
    #[clap(long, short = 't')]
    pub token: Option<String>,
    /// Whether to print logs or not
    #[clap(long, short = 'l')]
    pub logs: bool,
    /// Force mock mode regardless of the configuration file
    #[clap(long)]
    pub mock: bool,
    /// Decrypt polling budget in milliseconds
    #[clap(long, default_value_t = 30_000)]
    pub decrypt_timeout_ms: u64,
    /// Pause between decrypt polling attempts in milliseconds
    #[clap(long, default_value_t = 1_000)]
    pub decrypt_interval_ms: u64,
    /// The command to execute
    #[clap(subcommand)]
    pub command: TokenCommand,
}

pub fn setup_logging() {
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "token-cli.log");
    let file_and_stdout = file_appender.and(std::io::stdout);

    // RUST_LOG picks the level, INFO otherwise
    let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
    let log_level = tracing::Level::from_str(&log_level_str).unwrap_or(tracing::Level::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_and_stdout)
        .with_ansi(false)
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set logging subscriber");
}

pub async fn execute_cmd(cmd: &CmdConfig) -> Result<()> {
    let config = CliConfig::from_file(&cmd.file_conf)?;
    let profile = config.token(cmd.token.as_deref())?;
    let acl_address = config.acl()?;

    let operator_key = config.operator_key()?;
    let wallet_signer: PrivateKeySigner = operator_key
        .trim()
        .parse()
        .map_err(|e| CliError::Config(format!("invalid operator key: {e}")))?;
    let chain_url = config
        .chain_rpc_url
        .parse()
        .map_err(|e| CliError::Config(format!("invalid chain_rpc_url: {e}")))?;
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(wallet_signer))
        .on_http(chain_url);

    let chain_id = provider.get_chain_id().await?;
    let signer = RequestSigner::from_hex_key(&operator_key, Some(chain_id))?;
    tracing::info!(
        "operating as {} on chain {chain_id} against token '{}'",
        signer.address(),
        profile.name
    );

    let acl_contract = Arc::new(AclContract::new(acl_address, provider.clone()));
    let fhe = FheClient::new(config.fhe_config(cmd.mock)).with_acl_precheck(acl_contract.clone());

    let options = DecryptOptions {
        timeout: Duration::from_millis(cmd.decrypt_timeout_ms),
        interval: Duration::from_millis(cmd.decrypt_interval_ms),
    };
    let session = TokenSession::new(
        profile,
        provider.clone(),
        &fhe,
        &signer,
        acl_address,
        options.clone(),
    )?;

    match &cmd.command {
        TokenCommand::Name => {
            println!("Token name: {}", ops::token_name(&session).await?);
        }
        TokenCommand::Symbol => {
            println!("Token symbol: {}", ops::token_symbol(&session).await?);
        }
        TokenCommand::Decimals => {
            println!("Token decimals: {}", session.decimals().await?);
        }
        TokenCommand::TotalSupply => {
            let supply = ops::total_supply(&session).await?;
            println!("TotalSupply handle: {}", supply.handle);
            println!("TotalSupply: {}", supply.formatted);
        }
        TokenCommand::BalanceOf(args) => {
            let balance = ops::balance_of(&session, args.account).await?;
            println!("Balance handle: {}", balance.handle);
            println!("Balance: {}", balance.formatted);
        }
        TokenCommand::Allowance(args) => {
            let allowance = ops::allowance(&session, args.owner, args.spender).await?;
            println!("Allowance handle: {}", allowance.handle);
            println!("Allowance: {}", allowance.formatted);
        }
        TokenCommand::Mint(args) => {
            ops::mint(&session, &args.amount).await?;
        }
        TokenCommand::Burn(args) => {
            ops::burn(&session, &args.amount).await?;
        }
        TokenCommand::Transfer(args) => {
            ops::transfer(&session, args.to, &args.amount).await?;
        }
        TokenCommand::Approve(args) => {
            ops::approve(&session, args.spender, &args.amount).await?;
        }
        TokenCommand::TransferFrom(args) => {
            ops::transfer_from(&session, args.from, args.to, &args.amount).await?;
        }
        TokenCommand::TransferOwnership(args) => {
            ops::transfer_ownership(&session, args.to).await?;
        }
        TokenCommand::AddToWhitelist(args) => {
            ops::add_to_whitelist(&session, args.account).await?;
        }
        TokenCommand::RemoveFromWhitelist(args) => {
            ops::remove_from_whitelist(&session, args.account).await?;
        }
        TokenCommand::IsWhitelisted(args) => {
            println!(
                "isWhitelisted: {}",
                ops::is_whitelisted(&session, args.account).await?
            );
        }
        TokenCommand::GetFullWhitelist => {
            println!("Full whitelist: {:?}", ops::get_full_whitelist(&session).await?);
        }
        TokenCommand::GetTotalHandles => {
            for handle in ops::get_total_handles(&session).await? {
                println!("{handle}");
            }
        }
        TokenCommand::Deposit(args) => {
            ops::deposit(&session, &args.amount).await?;
        }
        TokenCommand::Claim(args) => {
            ops::claim(&session, args.to, &args.amount).await?;
        }
        TokenCommand::AddOracle(args) => {
            ops::add_oracle(&session, args.oracle).await?;
        }
        TokenCommand::RemoveOracle(args) => {
            ops::remove_oracle(&session, args.oracle).await?;
        }
        TokenCommand::AllowForDecryption(args) => {
            acl_contract
                .allow_for_decryption(args.handle, args.account)
                .await?;
        }
        TokenCommand::Decrypt(args) => {
            let value = fhe
                .request_decrypt(
                    &signer,
                    acl_address,
                    profile.fhe_type,
                    &args.handle,
                    &options,
                )
                .await?;
            println!("Decrypted: {value}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_parses() {
        let cmd = CmdConfig::try_parse_from([
            "token-cli",
            "-f",
            "custom.toml",
            "--token",
            "privy",
            "balance-of",
            "--account",
            "0x0000000000000000000000000000000000000001",
        ])
        .unwrap();
        assert_eq!(cmd.file_conf, "custom.toml");
        assert_eq!(cmd.token.as_deref(), Some("privy"));
        match cmd.command {
            TokenCommand::BalanceOf(args) => {
                assert_eq!(
                    args.account,
                    Address::from_str("0x0000000000000000000000000000000000000001").unwrap()
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn decrypt_command_accepts_a_handle() {
        let handle_hex = format!("0x{}", "11".repeat(32));
        let cmd = CmdConfig::try_parse_from([
            "token-cli",
            "decrypt",
            "--handle",
            &handle_hex,
        ])
        .unwrap();
        match cmd.command {
            TokenCommand::Decrypt(args) => assert_eq!(args.handle.to_hex(), handle_hex),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cmd.decrypt_timeout_ms, 30_000);
        assert_eq!(cmd.decrypt_interval_ms, 1_000);
    }

    #[test]
    fn rejects_malformed_handles() {
        let result = CmdConfig::try_parse_from(["token-cli", "decrypt", "--handle", "0x1234"]);
        assert!(result.is_err());
    }
}
