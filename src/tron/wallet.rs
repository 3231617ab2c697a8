use alloy::signers::local::PrivateKeySigner;
use sha2::{Digest, Sha256};

/// Tron mainnet address version byte.
const ADDRESS_PREFIX: u8 = 0x41;

/// One-time deposit credentials for a sell order. The address is the public
/// identity derived from the secret; the secret authorizes a later sweep of
/// received funds and is handed to the store as an opaque value.
#[derive(Clone)]
pub struct DepositCredentials {
    pub address: String,
    pub secret: String,
}

impl std::fmt::Debug for DepositCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepositCredentials")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh secp256k1 keypair and its Tron base58check address.
///
/// The signer draws from the OS CSPRNG; the 20-byte account id is the
/// keccak-derived public identity, identical to the EVM address body.
pub fn generate_credentials() -> DepositCredentials {
    let signer = PrivateKeySigner::random();
    let account = signer.address();

    DepositCredentials {
        address: encode_base58check(account.as_slice()),
        secret: hex::encode(signer.to_bytes()),
    }
}

fn encode_base58check(account: &[u8]) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(ADDRESS_PREFIX);
    payload.extend_from_slice(account);

    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);

    bs58::encode(payload).into_string()
}

/// Validate a user-supplied Tron address: base58check, 21-byte body,
/// mainnet prefix, checksum intact.
pub fn is_valid_address(address: &str) -> bool {
    let Ok(bytes) = bs58::decode(address).into_vec() else {
        return false;
    };
    if bytes.len() != 25 || bytes[0] != ADDRESS_PREFIX {
        return false;
    }

    let (body, checksum) = bytes.split_at(21);
    let expected = Sha256::digest(Sha256::digest(body));
    checksum == &expected[..4]
}
