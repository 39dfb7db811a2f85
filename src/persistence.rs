//! Saving and loading trained models.
//!
//! A model is written as one blob holding the factors, the global mean, the
//! hyperparameters and both id indices:
//!
//! ```text
//! "MFRC" | format version (u16 LE) | crc32 of payload (u32 LE) | bincode payload
//! ```
//!
//! Loading never returns a partially populated model: any framing, checksum,
//! decoding or shape problem is a [`RecError::ModelLoad`]. Encoding failures
//! surface as [`RecError::Encode`].

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use ahash::AHashMap;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{RecError, Result};
use crate::model::FactorModel;

const MAGIC: &[u8; 4] = b"MFRC";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4;

/// Encode a model into a self-describing blob.
pub fn to_bytes(model: &FactorModel) -> Result<Vec<u8>> {
    let payload = bincode::serialize(model).map_err(RecError::Encode)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a blob written by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<FactorModel> {
    if bytes.len() < HEADER_LEN {
        return Err(RecError::model_load(format!(
            "blob is {} bytes, shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if &header[..4] != MAGIC {
        return Err(RecError::model_load("not a model blob (bad magic)"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(RecError::model_load(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let expected = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(RecError::model_load(format!(
            "checksum mismatch: header {expected:#010x}, payload {actual:#010x}"
        )));
    }
    bincode::deserialize(payload)
        .map_err(|e| RecError::model_load(format!("decoding payload: {e}")))
}

pub fn save<W: Write>(model: &FactorModel, mut writer: W) -> Result<()> {
    writer.write_all(&to_bytes(model)?)?;
    writer.flush()?;
    Ok(())
}

pub fn load<R: Read>(mut reader: R) -> Result<FactorModel> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| RecError::model_load(format!("reading model: {e}")))?;
    from_bytes(&bytes)
}

/// Write to `path` through a temp file in the same directory, then rename,
/// so readers never see a half-written model.
pub fn save_to_path<P: AsRef<Path>>(model: &FactorModel, path: P) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, &to_bytes(model)?)?;
    info!(path = %path.display(), users = model.n_users(), items = model.n_items(), "saved model");
    Ok(())
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<FactorModel> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| RecError::model_load(format!("reading {}: {e}", path.display())))?;
    let model = from_bytes(&bytes)?;
    info!(path = %path.display(), users = model.n_users(), items = model.n_items(), "loaded model");
    Ok(model)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Opaque key → bytes storage for model blobs.
pub trait BlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// One file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl BlobStore for FileStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.key_path(key), bytes)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<AHashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(key).cloned())
    }
}

pub fn save_to_store<S: BlobStore + ?Sized>(model: &FactorModel, store: &S, key: &str) -> Result<()> {
    store.put(key, &to_bytes(model)?)?;
    info!(key, users = model.n_users(), items = model.n_items(), "stored model");
    Ok(())
}

pub fn load_from_store<S: BlobStore + ?Sized>(store: &S, key: &str) -> Result<FactorModel> {
    let bytes = store
        .get(key)?
        .ok_or_else(|| RecError::model_load(format!("no model stored under key '{key}'")))?;
    from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainConfig;
    use crate::interaction::{build, InteractionRecord};
    use crate::svd::train;
    use tempfile::TempDir;

    fn trained() -> FactorModel {
        let records = vec![
            InteractionRecord::new(1, 10, 2.0),
            InteractionRecord::new(1, 20, 1.0),
            InteractionRecord::new(2, 10, 3.0),
            InteractionRecord::new(3, 30, 5.0),
        ];
        let (m, users, items) = build(&records).expect("build");
        train(&m, users, items, &TrainConfig::default().with_rank(5).with_epochs(10)).expect("train")
    }

    #[test]
    fn test_round_trip_is_exact() {
        let model = trained();
        let mut buf = Vec::new();
        save(&model, &mut buf).expect("save");
        let loaded = load(buf.as_slice()).expect("load");

        assert_eq!(loaded, model);
        assert_eq!(loaded.known_item_ids(), model.known_item_ids());
        assert_eq!(loaded.known_user_ids(), model.known_user_ids());
        assert_eq!(loaded.config(), model.config());
        for &u in model.known_user_ids() {
            for &i in model.known_item_ids() {
                assert_eq!(
                    loaded.predict(u, i).score.to_bits(),
                    model.predict(u, i).score.to_bits()
                );
            }
        }
    }

    #[test]
    fn test_path_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("model.bin");
        let model = trained();

        save_to_path(&model, &path).expect("save");
        assert_eq!(load_from_path(&path).expect("load"), model);

        // Overwrite in place
        save_to_path(&model, &path).expect("save again");
        assert_eq!(load_from_path(&path).expect("load"), model);
    }

    #[test]
    fn test_load_missing_path() {
        let dir = TempDir::new().expect("temp dir");
        let err = load_from_path(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, RecError::ModelLoad(_)));
    }

    #[test]
    fn test_corrupt_blobs_are_rejected() {
        let bytes = to_bytes(&trained()).expect("encode");

        // Truncated at every interesting boundary
        for len in [0, 3, HEADER_LEN - 1, HEADER_LEN, bytes.len() - 1] {
            let err = from_bytes(&bytes[..len]).unwrap_err();
            assert!(matches!(err, RecError::ModelLoad(_)), "len {len}");
        }

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(from_bytes(&bad_magic), Err(RecError::ModelLoad(_))));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert!(matches!(from_bytes(&bad_version), Err(RecError::ModelLoad(_))));

        let mut flipped = bytes.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0x01;
        assert!(matches!(from_bytes(&flipped), Err(RecError::ModelLoad(_))));
    }

    #[test]
    fn test_inconsistent_payload_is_rejected() {
        let model = trained();
        let mut payload = bincode::serialize(&model).expect("encode");
        // user_factors length prefix is the first 8 bytes; shrink it by one
        let len = u64::from_le_bytes(payload[..8].try_into().expect("8 bytes"));
        payload[..8].copy_from_slice(&(len - 1).to_le_bytes());
        payload.drain(8 + (len as usize - 1) * 4..8 + len as usize * 4);

        let mut blob = Vec::new();
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        blob.extend_from_slice(&payload);

        let err = from_bytes(&blob).unwrap_err();
        match err {
            RecError::ModelLoad(msg) => assert!(msg.contains("user factors"), "{msg}"),
            other => panic!("expected ModelLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_file_store() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path().join("models")).expect("store");
        let model = trained();

        assert!(store.get("current").expect("get").is_none());
        save_to_store(&model, &store, "current").expect("save");
        assert_eq!(load_from_store(&store, "current").expect("load"), model);
    }

    #[test]
    fn test_memory_store_missing_key() {
        let store = MemoryStore::new();
        let err = load_from_store(&store, "nope").unwrap_err();
        assert!(matches!(err, RecError::ModelLoad(_)));

        save_to_store(&trained(), &store, "v1").expect("save");
        assert!(load_from_store(&store, "v1").is_ok());
    }
}
