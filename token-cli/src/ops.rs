//! Token operations, grouped by capability.
//!
//! Handle-valued reads decrypt through the coprocessor before display;
//! encrypted writes turn a human-readable amount into a ciphertext handle
//! first. Operations outside a token's capability set fail cleanly instead
//! of reverting on-chain.

use crate::config::{TokenCapability, TokenProfile};
use crate::contracts::ConfidentialErc20;
use crate::error::{CliError, Result};
use alloy::primitives::utils::{format_units, parse_units};
use alloy::providers::Provider;
use alloy_primitives::{Address, B256, U256};
use fhe_client::{DecryptOptions, FheClient, FheType, Handle, RequestSigner};
use tokio::sync::OnceCell;

/// Everything one command execution needs to talk to a single token.
pub struct TokenSession<'a, P: Provider + Clone> {
    pub profile: &'a TokenProfile,
    pub contract: ConfidentialErc20::ConfidentialErc20Instance<P>,
    pub fhe: &'a FheClient,
    pub signer: &'a RequestSigner,
    pub acl_address: Address,
    pub decrypt_options: DecryptOptions,
    decimals: OnceCell<u8>,
}

impl<'a, P: Provider + Clone> TokenSession<'a, P> {
    pub fn new(
        profile: &'a TokenProfile,
        provider: P,
        fhe: &'a FheClient,
        signer: &'a RequestSigner,
        acl_address: Address,
        decrypt_options: DecryptOptions,
    ) -> Result<Self> {
        let contract = ConfidentialErc20::new(profile.token_address()?, provider);
        Ok(Self {
            profile,
            contract,
            fhe,
            signer,
            acl_address,
            decrypt_options,
            decimals: OnceCell::new(),
        })
    }

    pub fn fhe_type(&self) -> FheType {
        self.profile.fhe_type
    }

    pub async fn decimals(&self) -> Result<u8> {
        self.decimals
            .get_or_try_init(|| async {
                self.contract
                    .decimals()
                    .call()
                    .await
                    .map_err(CliError::from)
            })
            .await
            .copied()
    }

    async fn decrypt_handle(&self, handle: Handle) -> Result<U256> {
        Ok(self
            .fhe
            .request_decrypt(
                self.signer,
                self.acl_address,
                self.fhe_type(),
                &handle,
                &self.decrypt_options,
            )
            .await?)
    }

    /// Parse a human-readable amount and encrypt it into a handle.
    async fn encrypt_amount(&self, amount: &str) -> Result<Handle> {
        let decimals = self.decimals().await?;
        let value = parse_units(amount, decimals)?.get_absolute();
        let encrypted = self
            .fhe
            .request_encrypt(self.signer, self.acl_address, value, self.fhe_type(), None)
            .await?;
        Ok(encrypted.handle)
    }

    async fn parse_plain_amount(&self, amount: &str) -> Result<U256> {
        let decimals = self.decimals().await?;
        Ok(parse_units(amount, decimals)?.get_absolute())
    }

    async fn format_amount(&self, value: U256) -> Result<String> {
        let decimals = self.decimals().await?;
        Ok(format_units(value, decimals)?)
    }
}

fn require(profile: &TokenProfile, capability: TokenCapability, operation: &str) -> Result<()> {
    if profile.has(capability) {
        return Ok(());
    }
    Err(CliError::Unsupported {
        token: profile.name.clone(),
        operation: operation.to_string(),
        capability: capability.to_string(),
    })
}

/// Decrypted handle-valued read, formatted for display.
pub struct DecryptedAmount {
    pub handle: Handle,
    pub value: U256,
    pub formatted: String,
}

async fn resolve_amount<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    handle: B256,
) -> Result<DecryptedAmount> {
    let handle = Handle::from(handle);
    let value = session.decrypt_handle(handle).await?;
    let formatted = session.format_amount(value).await?;
    Ok(DecryptedAmount {
        handle,
        value,
        formatted,
    })
}

// ========== Query operations ==========

pub async fn token_name<P: Provider + Clone>(session: &TokenSession<'_, P>) -> Result<String> {
    Ok(session.contract.name().call().await?)
}

pub async fn token_symbol<P: Provider + Clone>(session: &TokenSession<'_, P>) -> Result<String> {
    Ok(session.contract.symbol().call().await?)
}

pub async fn total_supply<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
) -> Result<DecryptedAmount> {
    let handle = session.contract.totalSupply().call().await?;
    resolve_amount(session, handle).await
}

pub async fn balance_of<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    account: Address,
) -> Result<DecryptedAmount> {
    let handle = session.contract.balanceOf(account).call().await?;
    resolve_amount(session, handle).await
}

pub async fn allowance<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    owner: Address,
    spender: Address,
) -> Result<DecryptedAmount> {
    let handle = session.contract.allowance(owner, spender).call().await?;
    resolve_amount(session, handle).await
}

// ========== Encrypted state-changing operations ==========

/// Outcome of a state-changing call that consumed an encrypted amount.
pub struct EncryptedTx {
    pub amount_handle: Handle,
    pub tx_hash: B256,
}

pub async fn mint<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    amount: &str,
) -> Result<EncryptedTx> {
    require(session.profile, TokenCapability::Encrypted, "mint")?;
    let handle = session.encrypt_amount(amount).await?;
    println!("Mint amountHandle: {handle}");
    let pending = session.contract.mint(B256::from(handle)).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("Mint tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("Mint Confirmed");
    Ok(EncryptedTx {
        amount_handle: handle,
        tx_hash,
    })
}

pub async fn burn<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    amount: &str,
) -> Result<EncryptedTx> {
    require(session.profile, TokenCapability::Encrypted, "burn")?;
    let handle = session.encrypt_amount(amount).await?;
    println!("Burn amountHandle: {handle}");
    let pending = session.contract.burn(B256::from(handle)).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("Burn tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("Burn Confirmed");
    Ok(EncryptedTx {
        amount_handle: handle,
        tx_hash,
    })
}

pub async fn transfer<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    to: Address,
    amount: &str,
) -> Result<EncryptedTx> {
    require(session.profile, TokenCapability::Encrypted, "transfer")?;
    let handle = session.encrypt_amount(amount).await?;
    println!("Transfer amountHandle: {handle}");
    let pending = session
        .contract
        .transfer(to, B256::from(handle))
        .send()
        .await?;
    let tx_hash = *pending.tx_hash();
    println!("Transfer tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("Transfer Confirmed");
    Ok(EncryptedTx {
        amount_handle: handle,
        tx_hash,
    })
}

pub async fn approve<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    spender: Address,
    amount: &str,
) -> Result<EncryptedTx> {
    require(session.profile, TokenCapability::Encrypted, "approve")?;
    let handle = session.encrypt_amount(amount).await?;
    println!("Approve amountHandle: {handle}");
    let pending = session
        .contract
        .approve(spender, B256::from(handle))
        .send()
        .await?;
    let tx_hash = *pending.tx_hash();
    println!("Approve tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("Approve Confirmed");
    Ok(EncryptedTx {
        amount_handle: handle,
        tx_hash,
    })
}

pub async fn transfer_from<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    from: Address,
    to: Address,
    amount: &str,
) -> Result<EncryptedTx> {
    require(session.profile, TokenCapability::Encrypted, "transferFrom")?;
    let handle = session.encrypt_amount(amount).await?;
    println!("TransferFrom amountHandle: {handle}");
    let pending = session
        .contract
        .transferFrom(from, to, B256::from(handle))
        .send()
        .await?;
    let tx_hash = *pending.tx_hash();
    println!("TransferFrom tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("TransferFrom Confirmed");
    Ok(EncryptedTx {
        amount_handle: handle,
        tx_hash,
    })
}

// ========== Whitelist operations ==========

pub async fn transfer_ownership<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    to: Address,
) -> Result<B256> {
    require(session.profile, TokenCapability::Whitelist, "transferOwnership")?;
    let pending = session.contract.transferOwnership(to).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("transferOwnership tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("transferOwnership Confirmed");
    Ok(tx_hash)
}

pub async fn add_to_whitelist<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    account: Address,
) -> Result<B256> {
    require(session.profile, TokenCapability::Whitelist, "addToWhitelist")?;
    let pending = session.contract.addToWhitelist(account).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("addToWhitelist tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("addToWhitelist Confirmed");
    Ok(tx_hash)
}

pub async fn remove_from_whitelist<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    account: Address,
) -> Result<B256> {
    require(
        session.profile,
        TokenCapability::Whitelist,
        "removeFromWhitelist",
    )?;
    let pending = session.contract.removeFromWhitelist(account).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("removeFromWhitelist tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("removeFromWhitelist Confirmed");
    Ok(tx_hash)
}

pub async fn is_whitelisted<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    account: Address,
) -> Result<bool> {
    require(session.profile, TokenCapability::Whitelist, "isWhitelisted")?;
    Ok(session.contract.isWhitelisted(account).call().await?)
}

pub async fn get_full_whitelist<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
) -> Result<Vec<Address>> {
    require(session.profile, TokenCapability::Whitelist, "getFullWhitelist")?;
    Ok(session.contract.getFullWhitelist().call().await?)
}

pub async fn get_total_handles<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
) -> Result<Vec<Handle>> {
    require(session.profile, TokenCapability::Whitelist, "getTotalHandles")?;
    let handles = session.contract.getTotalHandles().call().await?;
    Ok(handles.into_iter().map(Handle::from).collect())
}

// ========== Deposit operations (plain amounts) ==========

pub async fn deposit<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    amount: &str,
) -> Result<B256> {
    require(session.profile, TokenCapability::Deposit, "deposit")?;
    let value = session.parse_plain_amount(amount).await?;
    let pending = session.contract.deposit(value).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("Deposit tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("Deposit Confirmed");
    Ok(tx_hash)
}

pub async fn claim<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    to: Address,
    amount: &str,
) -> Result<B256> {
    require(session.profile, TokenCapability::Deposit, "claim")?;
    let value = session.parse_plain_amount(amount).await?;
    let pending = session.contract.claim(to, value).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("Claim tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("Claim Confirmed");
    Ok(tx_hash)
}

pub async fn add_oracle<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    oracle: Address,
) -> Result<B256> {
    require(session.profile, TokenCapability::Deposit, "addOracle")?;
    let pending = session.contract.addOracle(oracle).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("addOracle tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("addOracle Confirmed");
    Ok(tx_hash)
}

pub async fn remove_oracle<P: Provider + Clone>(
    session: &TokenSession<'_, P>,
    oracle: Address,
) -> Result<B256> {
    require(session.profile, TokenCapability::Deposit, "removeOracle")?;
    let pending = session.contract.removeOracle(oracle).send().await?;
    let tx_hash = *pending.tx_hash();
    println!("removeOracle tx: {tx_hash}");
    pending.get_receipt().await?;
    println!("removeOracle Confirmed");
    Ok(tx_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn profile(capabilities: HashSet<TokenCapability>) -> TokenProfile {
        TokenProfile {
            name: "sample".to_string(),
            address: "0x0000000000000000000000000000000000000002".to_string(),
            fhe_type: FheType::Uint64,
            capabilities,
        }
    }

    #[test]
    fn capability_gating() {
        let encrypted_only = profile(HashSet::from([TokenCapability::Encrypted]));
        assert!(require(&encrypted_only, TokenCapability::Encrypted, "mint").is_ok());
        let err = require(&encrypted_only, TokenCapability::Deposit, "deposit")
            .err()
            .unwrap();
        match err {
            CliError::Unsupported {
                token,
                operation,
                capability,
            } => {
                assert_eq!(token, "sample");
                assert_eq!(operation, "deposit");
                assert_eq!(capability, "deposit");
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[test]
    fn bare_profile_supports_nothing_extra() {
        let plain = profile(HashSet::new());
        assert!(require(&plain, TokenCapability::Encrypted, "transfer").is_err());
        assert!(require(&plain, TokenCapability::Whitelist, "addToWhitelist").is_err());
        assert!(require(&plain, TokenCapability::Deposit, "claim").is_err());
    }
}
