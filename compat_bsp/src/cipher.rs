//! Repeating-key XOR used by Tactical Intervention maps.
//!
//! The key is indexed by absolute file position, so a slice taken from the
//! middle of a file decrypts with `index` set to its offset.

pub const KEY_LENGTH: usize = 32;

/// Where the key sits in an encrypted file. The plaintext there is zero, so
/// the ciphertext is the key itself.
pub const KEY_OFFSET: usize = 384;

pub type Key = [u8; KEY_LENGTH];

pub fn xor_in_place(data: &mut [u8], key: &[u8], index: usize) {
    if key.is_empty() {
        return;
    }
    let len = key.len();
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(i + index) % len];
    }
}

pub fn xor(data: &[u8], key: &[u8], index: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    xor_in_place(&mut out, key, index);
    out
}

/// Reads the key from its fixed position, if the file is long enough.
pub fn key_from_file(data: &[u8]) -> Option<Key> {
    let bytes = data.get(KEY_OFFSET..KEY_OFFSET + KEY_LENGTH)?;
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(bytes);
    Some(key)
}
