//! S3 credential helpers
//!
//! Access key synthesis and lookup of a managed key pair in the key list
//! returned by the admin API.

use crate::domain::ports::UserKey;
use rand::Rng;

/// Alphabet of synthesized access keys
pub const ACCESS_KEY_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of synthesized access keys
pub const ACCESS_KEY_LENGTH: usize = 20;

/// Generate a random access key
pub fn generate_access_key() -> String {
    generate_access_key_with(&mut rand::thread_rng())
}

/// Generate a random access key from the given source
pub fn generate_access_key_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ACCESS_KEY_LENGTH)
        .map(|_| ACCESS_KEY_ALPHABET[rng.gen_range(0..ACCESS_KEY_ALPHABET.len())] as char)
        .collect()
}

/// Find the key pair with the given access key
pub fn find_key<'a>(keys: &'a [UserKey], access_key: &str) -> Option<&'a UserKey> {
    keys.iter().find(|k| k.access_key == access_key)
}

/// Keys other than the managed one
pub fn unmanaged_keys<'a>(
    keys: &'a [UserKey],
    managed: Option<&'a str>,
) -> impl Iterator<Item = &'a UserKey> + 'a {
    keys.iter()
        .filter(move |k| managed != Some(k.access_key.as_str()))
}
