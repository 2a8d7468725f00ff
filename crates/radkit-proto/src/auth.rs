//! Authenticator derivation and User-Password obfuscation (RFC 2865).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("password longer than {max} bytes: {len}", max = MAX_PASSWORD_LEN)]
    PasswordTooLong { len: usize },
    #[error("encrypted value length {0} is not a positive multiple of 16")]
    BadCipherLength(usize),
}

/// RFC 2865 §5.2 bound on the User-Password plaintext.
pub const MAX_PASSWORD_LEN: usize = 128;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 §3.
pub fn generate_request_authenticator() -> [u8; 16] {
    use rand::Rng;
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

/// Verify a reply datagram's Response Authenticator against the request it
/// answers.
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator
/// + Attributes + Secret). The comparison is over the declared packet
/// length, ignoring any trailing datagram bytes.
pub fn verify_response(reply: &[u8], request_authenticator: &[u8; 16], secret: &[u8]) -> bool {
    if reply.len() < 20 {
        return false;
    }
    let declared = u16::from_be_bytes([reply[2], reply[3]]) as usize;
    if declared < 20 || declared > reply.len() {
        return false;
    }
    let reply = &reply[..declared];

    let mut ctx = md5::Context::new();
    ctx.consume(&reply[0..4]);
    ctx.consume(request_authenticator);
    ctx.consume(&reply[20..]);
    ctx.consume(secret);
    ctx.compute().0[..] == reply[4..20]
}

/// Obfuscate a User-Password per RFC 2865 §5.2.
///
/// The plaintext is right-padded with NULs to a multiple of 16, then each
/// 16-byte chunk is XORed with an MD5 chain: the first block keyed by
/// `secret ∥ authenticator`, each later block by `secret ∥ previous
/// ciphertext block`.
pub fn encrypt_user_password(
    plain: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, CryptoError> {
    if plain.len() > MAX_PASSWORD_LEN {
        return Err(CryptoError::PasswordTooLong { len: plain.len() });
    }

    let mut padded = plain.to_vec();
    let rem = padded.len() % 16;
    if rem != 0 || padded.is_empty() {
        padded.resize(padded.len() + 16 - rem, 0);
    }

    let mut out = Vec::with_capacity(padded.len());
    let mut chain: [u8; 16] = *authenticator;

    for chunk in padded.chunks(16) {
        let mut ctx = md5::Context::new();
        ctx.consume(secret);
        ctx.consume(chain);
        let digest = ctx.compute();

        for (i, byte) in chunk.iter().enumerate() {
            chain[i] = byte ^ digest.0[i];
        }
        out.extend_from_slice(&chain);
    }

    Ok(out)
}

/// Reverse [`encrypt_user_password`], stripping the NUL padding.
pub fn decrypt_user_password(
    cipher: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, CryptoError> {
    if cipher.is_empty() || cipher.len() % 16 != 0 {
        return Err(CryptoError::BadCipherLength(cipher.len()));
    }

    let mut out = Vec::with_capacity(cipher.len());
    let mut chain: &[u8] = authenticator;

    for chunk in cipher.chunks(16) {
        let mut ctx = md5::Context::new();
        ctx.consume(secret);
        ctx.consume(chain);
        let digest = ctx.compute();

        for (i, byte) in chunk.iter().enumerate() {
            out.push(byte ^ digest.0[i]);
        }
        chain = chunk;
    }

    while out.last() == Some(&0) {
        out.pop();
    }
    Ok(out)
}
