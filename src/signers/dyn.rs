//! Type-erased transaction signer.
use alloy::{
    network::{FullSigner, TxSigner},
    primitives::{Address, Signature},
    signers::{
        k256::ecdsa::SigningKey,
        local::{
            PrivateKeySigner,
            coins_bip39::{English, Mnemonic},
        },
    },
};
use std::{fmt, ops::Deref, sync::Arc};

/// Abstraction over local signers.
#[derive(Clone)]
pub struct DynSigner(pub Arc<dyn FullSigner<Signature> + Send + Sync>);

impl fmt::Debug for DynSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RelayerSigner").field(&self.address()).finish()
    }
}

impl DynSigner {
    /// Derives the given number of signers from a mnemonic along `m/44'/60'/0'/0/{index}`.
    pub fn derive_from_mnemonic(
        mnemonic: &Mnemonic<English>,
        num: usize,
    ) -> eyre::Result<Vec<Self>> {
        (0..num)
            .map(|idx| {
                let path = format!("m/44'/60'/0'/0/{idx}");
                let key = mnemonic.derive_key(path.as_str(), None)?;
                let key: &SigningKey = key.as_ref();
                Ok(Self(Arc::new(PrivateKeySigner::from_signing_key(key.clone()))))
            })
            .collect()
    }

    /// Returns the signer's Ethereum Address.
    pub fn address(&self) -> Address {
        TxSigner::address(&self.0)
    }
}

impl Deref for DynSigner {
    type Target = dyn FullSigner<Signature> + Send + Sync;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}
