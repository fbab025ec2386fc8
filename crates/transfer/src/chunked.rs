use std::io::Read;
use std::path::PathBuf;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::{TransferError, UploadFile};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the lowercase hex digest.
pub fn sha256_file(path: impl AsRef<std::path::Path>) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Computes SHA-1 of an entire file and returns the lowercase hex digest.
///
/// Used to verify server-reported datafiles after an import finishes.
pub fn sha1_file(path: impl AsRef<std::path::Path>) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sha1::Digest::update(&mut hasher, &buf[..n]);
    }
    Ok(hex::encode(sha1::Digest::finalize(hasher)))
}

// ---------------------------------------------------------------------------
// Chunk planning
// ---------------------------------------------------------------------------

/// Chunk layout for one upload unit.
///
/// Boundaries derive from the primary payload alone: every chunk except the
/// last holds exactly `chunk_size` primary bytes, and attachment bytes ride
/// on the final chunk. The server reassembles all chunks of a flow identifier
/// into one file, so the tail placement keeps attachments contiguous with
/// their primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Total bytes of the unit: primary plus all attachments.
    pub total_size: i64,
    /// Number of chunks; numbering starts at 1.
    pub total_chunks: usize,
    /// Nominal chunk size in bytes.
    pub chunk_size: usize,
}

impl ChunkPlan {
    /// Computes the layout for a unit.
    ///
    /// An empty primary with attachments still yields one chunk so the
    /// attachment bytes have something to ride on; a fully empty unit yields
    /// zero chunks.
    pub fn for_unit(primary_size: i64, attachment_size: i64, chunk_size: usize) -> Self {
        let mut total_chunks = (primary_size.max(0) as usize).div_ceil(chunk_size);
        if total_chunks == 0 && attachment_size > 0 {
            total_chunks = 1;
        }
        Self {
            total_size: primary_size + attachment_size,
            total_chunks,
            chunk_size,
        }
    }
}

/// One chunk of a unit, ready to be posted.
#[derive(Debug, Clone)]
pub struct UnitChunk {
    /// 1-based chunk index.
    pub number: usize,
    /// The exact bytes to send.
    pub data: Vec<u8>,
    /// Lowercase hex SHA-256 of `data`.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// UnitReader
// ---------------------------------------------------------------------------

/// Reads one upload unit as a sequence of checksummed chunks.
pub struct UnitReader {
    primary: std::fs::File,
    remaining_primary: i64,
    attachments: Vec<PathBuf>,
    plan: ChunkPlan,
    next_number: usize,
}

impl UnitReader {
    /// Opens the unit's primary file and stats all parts.
    pub fn open(file: &UploadFile, chunk_size: usize) -> Result<Self, TransferError> {
        let meta = std::fs::metadata(&file.source_path)
            .map_err(|_| TransferError::Missing(file.source_path.display().to_string()))?;
        let primary_size = meta.len() as i64;

        let mut attachment_size = 0i64;
        for attachment in &file.attachments {
            let meta = std::fs::metadata(attachment)
                .map_err(|_| TransferError::Missing(attachment.display().to_string()))?;
            attachment_size += meta.len() as i64;
        }

        let primary = std::fs::File::open(&file.source_path)?;
        Ok(Self {
            primary,
            remaining_primary: primary_size,
            attachments: file.attachments.clone(),
            plan: ChunkPlan::for_unit(primary_size, attachment_size, chunk_size),
            next_number: 1,
        })
    }

    /// The unit's chunk layout.
    pub fn plan(&self) -> ChunkPlan {
        self.plan
    }

    /// Reads the next chunk. Returns `None` once all chunks are produced.
    pub fn next_chunk(&mut self) -> Result<Option<UnitChunk>, TransferError> {
        if self.next_number > self.plan.total_chunks {
            return Ok(None);
        }
        let number = self.next_number;
        let is_last = number == self.plan.total_chunks;

        let take = (self.remaining_primary.max(0) as usize).min(self.plan.chunk_size);
        let mut data = vec![0u8; take];
        self.primary.read_exact(&mut data)?;
        self.remaining_primary -= take as i64;

        if is_last {
            for attachment in &self.attachments {
                let bytes = std::fs::read(attachment)?;
                data.extend_from_slice(&bytes);
            }
        }

        let hash = sha256_bytes(&data);
        self.next_number += 1;
        Ok(Some(UnitChunk { number, data, hash }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn unit(dir: &Path, name: &str, size: usize) -> UploadFile {
        let path = dir.join(name);
        fs::write(&path, vec![0xA5u8; size]).unwrap();
        UploadFile::new(&path, vec![]).unwrap()
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn sha256_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"checksum me").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(b"checksum me"));
    }

    #[test]
    fn sha1_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            sha1_file(&path).unwrap(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn plan_exact_multiple() {
        let plan = ChunkPlan::for_unit(100, 0, 100);
        assert_eq!(plan.total_chunks, 1);
        assert_eq!(plan.total_size, 100);
    }

    #[test]
    fn plan_one_byte_over() {
        let plan = ChunkPlan::for_unit(101, 0, 100);
        assert_eq!(plan.total_chunks, 2);
    }

    #[test]
    fn plan_attachments_do_not_add_chunks() {
        // 150 primary + 3 attachment bytes at chunk size 100: two chunks,
        // tail carries 50 primary + 3 attachment bytes.
        let plan = ChunkPlan::for_unit(150, 3, 100);
        assert_eq!(plan.total_chunks, 2);
        assert_eq!(plan.total_size, 153);
    }

    #[test]
    fn plan_empty_unit_has_no_chunks() {
        let plan = ChunkPlan::for_unit(0, 0, 100);
        assert_eq!(plan.total_chunks, 0);
    }

    #[test]
    fn plan_attachment_only_unit_has_one_chunk() {
        let plan = ChunkPlan::for_unit(0, 42, 100);
        assert_eq!(plan.total_chunks, 1);
        assert_eq!(plan.total_size, 42);
    }

    #[test]
    fn reader_splits_primary() {
        let dir = TempDir::new().unwrap();
        let file = unit(dir.path(), "big.bin", 210);

        let mut reader = UnitReader::open(&file, 100).unwrap();
        assert_eq!(reader.plan().total_chunks, 3);

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.number, 1);
        assert_eq!(c1.data.len(), 100);
        assert_eq!(c1.hash, sha256_bytes(&c1.data));

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.number, 2);
        assert_eq!(c2.data.len(), 100);

        let c3 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c3.number, 3);
        assert_eq!(c3.data.len(), 10);

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_appends_attachments_to_final_chunk() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("scan.dat");
        let att1 = dir.path().join("scan.lab");
        let att2 = dir.path().join("scan.raw");
        fs::write(&primary, vec![1u8; 150]).unwrap();
        fs::write(&att1, vec![2u8; 1]).unwrap();
        fs::write(&att2, vec![3u8; 2]).unwrap();

        let file = UploadFile::new(&primary, vec![att1, att2]).unwrap();
        let mut reader = UnitReader::open(&file, 100).unwrap();

        let plan = reader.plan();
        assert_eq!(plan.total_chunks, 2);
        assert_eq!(plan.total_size, 153);

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.data.len(), 100);
        assert!(c1.data.iter().all(|b| *b == 1));

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.data.len(), 53);
        assert!(c2.data[..50].iter().all(|b| *b == 1));
        assert_eq!(c2.data[50], 2);
        assert_eq!(&c2.data[51..], &[3, 3]);

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_empty_file_yields_no_chunks() {
        let dir = TempDir::new().unwrap();
        let file = unit(dir.path(), "empty.bin", 0);

        let mut reader = UnitReader::open(&file, 100).unwrap();
        assert_eq!(reader.plan().total_chunks, 0);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_attachment_only_chunk() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("empty.dat");
        let att = dir.path().join("tail.lab");
        fs::write(&primary, b"").unwrap();
        fs::write(&att, b"TAIL").unwrap();

        let file = UploadFile::new(&primary, vec![att]).unwrap();
        let mut reader = UnitReader::open(&file, 100).unwrap();

        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.number, 1);
        assert_eq!(chunk.data, b"TAIL");
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let file = unit(dir.path(), "gone.bin", 4);
        fs::remove_file(&file.source_path).unwrap();

        let result = UnitReader::open(&file, 100);
        assert!(matches!(result, Err(TransferError::Missing(_))));
    }
}
