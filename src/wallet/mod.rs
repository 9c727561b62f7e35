use log::debug;
use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

use crate::error::{ValidationError, WalletError};
use crate::transaction::{InputWitness, Transaction, TransactionVerifier, TxOutput, UtxoSet};

/// Generate a new secp256k1 keypair and return (priv_hex, pub_hex_compressed, address_hex).
/// Address is simply the hex of the compressed public key (didactic).
pub fn generate_keypair_hex() -> (String, String, String) {
    let secp = Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    let sk_hex = hex::encode(sk.secret_bytes());
    let pk_hex = hex::encode(pk.serialize()); // compressed (33 bytes)
    let address = pk_hex.clone();
    (sk_hex, pk_hex, address)
}

/// Derive address (hex of compressed pubkey) from a given hex pubkey.
/// Returns normalized hex (lowercase) if valid.
pub fn pubkey_to_address_hex(pubkey_hex: &str) -> Result<String, WalletError> {
    let pk = parse_public_key(pubkey_hex)?;
    Ok(hex::encode(pk.serialize()))
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed) and message hash (32 bytes).
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> Result<bool, WalletError> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| WalletError::InvalidHex("signature"))?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| WalletError::InvalidSignature)?;
    let pk = parse_public_key(pubkey_hex)?;

    let msg = Message::from_digest(msg32);
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

/// What the owner of `source_output_id` signs to spend it in `tx`: the
/// spent output id, every output of `tx`, and its txid.
pub fn signing_digest(tx: &Transaction, source_output_id: &str) -> [u8; 32] {
    let preimage = serde_json::json!({
        "source_output_id": source_output_id,
        "outputs": &tx.outputs,
        "txid": &tx.txid,
    });
    Sha256::digest(preimage.to_string().as_bytes()).into()
}

/// Attach a witness for input `input_index`, signed with `secret_key_hex`.
/// The txid must already be set.
pub fn sign_input(
    tx: &mut Transaction,
    input_index: usize,
    secret_key_hex: &str,
) -> Result<(), WalletError> {
    if tx.txid.is_none() {
        return Err(WalletError::MissingTxid);
    }
    let source = tx
        .inputs
        .get(input_index)
        .map(|input| input.source_output_id.clone())
        .ok_or(WalletError::InputOutOfRange(input_index))?;

    let secp = Secp256k1::new();
    let sk_bytes = hex::decode(secret_key_hex).map_err(|_| WalletError::InvalidHex("secret key"))?;
    let sk = SecretKey::from_slice(&sk_bytes).map_err(|_| WalletError::InvalidSecretKey)?;
    let pk = PublicKey::from_secret_key(&secp, &sk);

    let msg = Message::from_digest(signing_digest(tx, &source));
    let sig = secp.sign_ecdsa(&msg, &sk);

    tx.inputs[input_index].witness = Some(InputWitness {
        public_key: hex::encode(pk.serialize()),
        signature: hex::encode(sig.serialize_der().to_vec()),
    });
    Ok(())
}

/// An output payable to `address`: only the holder of the matching key
/// can spend it once `SignatureVerifier` is installed.
pub fn locked_output(index: u32, owner_id: &str, value: u64, address: &str) -> TxOutput {
    TxOutput {
        lock: Some(address.to_string()),
        ..TxOutput::new(index, owner_id, value)
    }
}

fn parse_public_key(pubkey_hex: &str) -> Result<PublicKey, WalletError> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| WalletError::InvalidHex("public key"))?;
    PublicKey::from_slice(&bytes).map_err(|_| WalletError::InvalidPublicKey)
}

/// Ownership layer: every input must carry a witness whose key matches the
/// spent output's lock (when it has one) and whose signature covers
/// `signing_digest`.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    reward_sentinel: String,
}

impl SignatureVerifier {
    pub fn new(reward_sentinel: impl Into<String>) -> Self {
        Self {
            reward_sentinel: reward_sentinel.into(),
        }
    }
}

impl TransactionVerifier for SignatureVerifier {
    fn verify(&self, tx: &Transaction, utxo: &UtxoSet) -> Result<(), ValidationError> {
        for input in &tx.inputs {
            let source = input.source_output_id.as_str();
            if source == self.reward_sentinel {
                continue;
            }
            let witness = input
                .witness
                .as_ref()
                .ok_or_else(|| ValidationError::Unauthorized(format!("{source}: missing witness")))?;
            let spent = utxo
                .get(source)
                .ok_or_else(|| ValidationError::UnknownInput(source.to_string()))?;

            if let Some(lock) = &spent.lock {
                let address = pubkey_to_address_hex(&witness.public_key).map_err(|e| {
                    ValidationError::Unauthorized(format!("{source}: {e}"))
                })?;
                if !address.eq_ignore_ascii_case(lock) {
                    debug!("key {} does not match lock {}", address, lock);
                    return Err(ValidationError::Unauthorized(format!(
                        "{source}: key does not match lock"
                    )));
                }
            }

            let digest = signing_digest(tx, source);
            match verify_signature_hex(&witness.public_key, &witness.signature, digest) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ValidationError::Unauthorized(format!(
                        "{source}: bad signature"
                    )));
                }
                Err(e) => return Err(ValidationError::Unauthorized(format!("{source}: {e}"))),
            }
        }
        Ok(())
    }
}
