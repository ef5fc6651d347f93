//! Local SSH keypair generation.
//!
//! Keys are RSA; the private half is written as a PKCS#1 PEM file readable by
//! OpenSSH, the public half next to it as `<path>.pub` in `authorized_keys`
//! format.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::{Error, Result};

pub const DEFAULT_KEY_BITS: usize = 2048;

const KEY_TYPE: &str = "ssh-rsa";

pub fn public_key_path(private_key_path: &Path) -> PathBuf {
    let mut path = private_key_path.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Generate a fresh keypair at `path` (and `path.pub`), replacing any existing
/// files, and return the public key line.
pub fn generate_keypair(path: &Path, bits: usize, comment: &str) -> Result<String> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| Error::SshKey(format!("generate {bits}-bit rsa key: {e}")))?;
    let pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::SshKey(format!("encode private key: {e}")))?;
    let public = authorized_key(&private.to_public_key(), comment);

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    write_private(path, pem.as_bytes())?;
    fs::write(public_key_path(path), format!("{public}\n"))?;

    tracing::debug!(path = %path.display(), bits, "generated ssh keypair");
    Ok(public)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    Ok(())
}

/// `ssh-rsa <base64 blob> <comment>` per RFC 4253 §6.6.
fn authorized_key(key: &RsaPublicKey, comment: &str) -> String {
    let mut blob = Vec::new();
    put_string(&mut blob, KEY_TYPE.as_bytes());
    put_mpint(&mut blob, key.e());
    put_mpint(&mut blob, key.n());

    let encoded = STANDARD.encode(&blob);
    if comment.is_empty() {
        format!("{KEY_TYPE} {encoded}")
    } else {
        format!("{KEY_TYPE} {encoded} {comment}")
    }
}

fn put_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

fn put_mpint(buf: &mut Vec<u8>, n: &BigUint) {
    let bytes = n.to_bytes_be();
    let trimmed: &[u8] = match bytes.iter().position(|&b| b != 0) {
        Some(i) => &bytes[i..],
        None => &[],
    };
    if trimmed.first().is_some_and(|&b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        put_string(buf, &padded);
    } else {
        put_string(buf, trimmed);
    }
}
