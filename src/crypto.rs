// 🔐 Form Cryptor - hidden password field of the login form
// AES-CBC with PKCS#7 padding, base64 output, exactly as the portal's login script does it

use crate::error::{AttendanceError, Result};
use base64::engine::general_purpose;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

pub const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext` and return standard base64.
///
/// PKCS#7 always pads, so a plaintext that is already block aligned gains a
/// full block of `0x10` bytes. The AES variant follows the key length
/// (16, 24 or 32 bytes); the IV must be one block.
pub fn encrypt_password(plaintext: &str, key: &str, iv: &str) -> Result<String> {
    let (key, iv) = (key.as_bytes(), iv.as_bytes());
    let data = plaintext.as_bytes();

    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        24 => Aes192CbcEnc::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        n => {
            return Err(AttendanceError::EncryptionFailed(format!(
                "key must be 16, 24 or 32 bytes, got {}",
                n
            )))
        }
    };

    Ok(general_purpose::STANDARD.encode(ciphertext))
}

fn invalid_length(_: cbc::cipher::InvalidLength) -> AttendanceError {
    AttendanceError::EncryptionFailed(format!("IV must be {} bytes", BLOCK_SIZE))
}

// ============================================================================
// TESTS
// ============================================================================
