//! File-backed durable storage.

use super::DurableStorage;
use crate::error::{CourierError, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for entry files.
const ENTRY_MAGIC: &[u8; 4] = b"CRE\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 2;

/// Magic, version and key length.
const KEY_HEADER_LEN: u64 = 4 + 1 + 4;

/// Payload length field plus trailing CRC32.
const PAYLOAD_FRAME_LEN: u64 = 8 + 4;

/// Longest hex-encoded key used directly as a file name. Longer keys are
/// named by their SHA-256 so names stay under common filesystem limits.
const MAX_HEX_NAME: usize = 200;

/// File name prefix of digest-named entries.
const DIGEST_PREFIX: &str = "sha256-";

/// Extension of committed entry files.
const ENTRY_EXT: &str = "ent";

/// Extension of in-progress writes.
const TEMP_EXT: &str = "tmp";

/// Name of the directory lock file.
const LOCK_FILE: &str = "LOCK";

/// One file per key, named by the hex encoding of the key (or its digest
/// when that would be too long).
///
/// File layout: magic, version, key length (u32 LE), key, payload length
/// (u64 LE), payload, CRC32 of key and payload (u32 LE). Writes go to a
/// temp file that is renamed into place, so a crash leaves either the old
/// or the new value.
pub struct FileStorage {
    /// Directory holding the entry files.
    path: PathBuf,

    /// Held for the lifetime of the storage for exclusive access.
    _lock_file: File,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = File::create(path.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| CourierError::Locked)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Directory this storage lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_stem(key: &str) -> String {
        let encoded = hex::encode(key.as_bytes());
        if encoded.len() <= MAX_HEX_NAME {
            return encoded;
        }
        format!("{}{}", DIGEST_PREFIX, hex::encode(Sha256::digest(key.as_bytes())))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.path
            .join(format!("{}.{}", Self::file_stem(key), ENTRY_EXT))
    }

    /// Read the header up to and including the key. Returns the key and
    /// the number of bytes left after it.
    fn read_key(file: &mut File, size: u64) -> Result<(Vec<u8>, u64)> {
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ENTRY_MAGIC {
            return Err(CourierError::InvalidFormat("Invalid entry magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != ENTRY_VERSION {
            return Err(CourierError::InvalidFormat(format!(
                "Unsupported entry version: {}",
                version[0]
            )));
        }

        let mut key_len_bytes = [0u8; 4];
        file.read_exact(&mut key_len_bytes)?;
        let key_len = u64::from(u32::from_le_bytes(key_len_bytes));

        let remaining = size
            .checked_sub(KEY_HEADER_LEN + key_len)
            .ok_or_else(|| CourierError::InvalidFormat("Entry key exceeds file size".into()))?;

        let mut key = vec![0u8; key_len as usize];
        file.read_exact(&mut key)?;
        Ok((key, remaining))
    }

    fn decode(mut file: File) -> Result<(String, Vec<u8>)> {
        let size = file.metadata()?.len();
        let (key, remaining) = Self::read_key(&mut file, size)?;

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        // The length field is untrusted; it must match what the file holds
        if remaining.checked_sub(PAYLOAD_FRAME_LEN) != Some(len) {
            return Err(CourierError::InvalidFormat(format!(
                "Entry length {} does not match file size {}",
                len, size
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = Self::checksum(&key, &payload);

        if stored_checksum != computed_checksum {
            return Err(CourierError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let key = String::from_utf8(key)
            .map_err(|_| CourierError::InvalidFormat("Entry key is not UTF-8".into()))?;
        Ok((key, payload))
    }

    fn checksum(key: &[u8], payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(key);
        hasher.update(payload);
        hasher.finalize()
    }

    /// Key stored inside a digest-named file.
    fn stored_key(file_path: &Path) -> Result<String> {
        let mut file = File::open(file_path)?;
        let size = file.metadata()?.len();
        let (key, _) = Self::read_key(&mut file, size)?;
        String::from_utf8(key)
            .map_err(|_| CourierError::InvalidFormat("Entry key is not UTF-8".into()))
    }
}

impl DurableStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let file = match File::open(self.entry_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (stored_key, payload) = Self::decode(file)?;
        if stored_key != key {
            return Err(CourierError::InvalidFormat(format!(
                "Entry file for {} holds key {}",
                key, stored_key
            )));
        }
        Ok(Some(payload))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let key_len = u32::try_from(key.len())
            .map_err(|_| CourierError::InvalidFormat("Entry key too long".into()))?;
        let final_path = self.entry_path(key);
        let temp_path = final_path.with_extension(TEMP_EXT);

        let mut file = File::create(&temp_path)?;
        file.write_all(ENTRY_MAGIC)?;
        file.write_all(&[ENTRY_VERSION])?;
        file.write_all(&key_len.to_le_bytes())?;
        file.write_all(key.as_bytes())?;
        file.write_all(&(bytes.len() as u64).to_le_bytes())?;
        file.write_all(bytes)?;
        file.write_all(&Self::checksum(key.as_bytes(), bytes).to_le_bytes())?;
        file.sync_all()?;

        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if stem.starts_with(DIGEST_PREFIX) {
                match Self::stored_key(&file_path) {
                    Ok(key) => keys.push(key),
                    Err(e) => {
                        // No key can address it any more
                        warn!(file = %file_path.display(), error = %e, "removing unreadable entry file");
                        let _ = fs::remove_file(&file_path);
                    }
                }
                continue;
            }

            // Foreign files that are not hex-encoded keys are ignored
            if let Ok(bytes) = hex::decode(stem) {
                if let Ok(key) = String::from_utf8(bytes) {
                    keys.push(key);
                }
            }
        }

        Ok(keys)
    }
}
