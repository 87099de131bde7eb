//! On-chain ACL access: decryption grants and the advisory permission lookup.

use crate::contracts::Acl;
use crate::error::Result;
use alloy::providers::Provider;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use fhe_client::{AclPrecheck, Handle};

/// Access policy tag granting decryption to a single account.
const POLICY_DECRYPT: u8 = 2;

/// ACL contract wrapper.
pub struct AclContract<P: Provider + Clone> {
    contract: Acl::AclInstance<P>,
}

impl<P: Provider + Clone> AclContract<P> {
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            contract: Acl::new(address, provider),
        }
    }

    /// Grant decryption of `handle`: to one account through an access policy,
    /// or to everyone when no account is given.
    pub async fn allow_for_decryption(
        &self,
        handle: Handle,
        account: Option<Address>,
    ) -> Result<B256> {
        let handle = B256::from(handle);
        let pending = match account {
            Some(account) => {
                self.contract
                    .accessPolicy(handle, account, POLICY_DECRYPT)
                    .send()
                    .await?
            }
            None => {
                self.contract
                    .allowForDecryption(vec![handle])
                    .send()
                    .await?
            }
        };
        let tx_hash = *pending.tx_hash();
        println!("allowForDecryption tx: {tx_hash}");
        pending.get_receipt().await?;
        println!("Confirmed");
        Ok(tx_hash)
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> AclPrecheck for AclContract<P> {
    /// Either view counts as permission; the coprocessor remains the
    /// authority either way.
    async fn is_allowed(&self, handle: &Handle, account: Address) -> anyhow::Result<bool> {
        let handle = B256::from(*handle.as_bytes());
        let allowed = self.contract.isAllowed(handle, account).call().await?;
        if allowed {
            return Ok(true);
        }
        Ok(self
            .contract
            .isAllowedForDecryption(handle, account)
            .call()
            .await?)
    }
}
