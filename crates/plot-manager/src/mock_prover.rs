//! Mock prover and key derivation.
//!
//! Mock plot files start with a SCALE-encoded header (size parameter and memo) and are then
//! extended to the desired length, which creates sparse files that take no real space on disk.

use crate::keys::{
    G1_PUBLIC_KEY_SIZE, G1PublicKey, KeyDerivation, KeyDerivationError, PlotMemo, PlotPool,
    SECRET_KEY_SIZE, SecretKey,
};
use crate::prover::{PlotError, Prover, ProverOpener, expected_plot_file_size};
use crate::utils::{path_from_bytes, path_to_bytes};
use parity_scale_codec::{Decode, Encode};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Headers are never larger than this
const MAX_HEADER_SIZE: u64 = 4096;

#[derive(Debug, Encode, Decode)]
struct MockPlotHeader {
    size: u8,
    memo: Vec<u8>,
}

#[derive(Debug, Encode, Decode)]
struct MockProverBytes {
    filename: Vec<u8>,
    header: MockPlotHeader,
}

#[derive(Debug, Encode, Decode)]
struct MockMemo {
    pool: PlotPool,
    farmer_public_key: G1PublicKey,
    local_master_secret_key: [u8; SECRET_KEY_SIZE],
}

#[derive(Debug)]
pub(crate) struct MockProver {
    filename: PathBuf,
    header: MockPlotHeader,
}

impl Prover for MockProver {
    fn size(&self) -> u8 {
        self.header.size
    }

    fn memo(&self) -> &[u8] {
        &self.header.memo
    }

    fn to_bytes(&self) -> Vec<u8> {
        MockProverBytes {
            filename: path_to_bytes(&self.filename).unwrap_or_default(),
            header: MockPlotHeader {
                size: self.header.size,
                memo: self.header.memo.clone(),
            },
        }
        .encode()
    }

    fn filename(&self) -> &Path {
        &self.filename
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockProverOpener {
    opened: AtomicUsize,
}

impl ProverOpener for MockProverOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn Prover>, PlotError> {
        self.opened.fetch_add(1, Ordering::Relaxed);

        let mut bytes = Vec::new();
        File::open(path)?
            .take(MAX_HEADER_SIZE)
            .read_to_end(&mut bytes)?;
        let header = MockPlotHeader::decode(&mut bytes.as_slice())?;

        Ok(Arc::new(MockProver {
            filename: path.to_path_buf(),
            header,
        }))
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Arc<dyn Prover>, PlotError> {
        let MockProverBytes { filename, header } = MockProverBytes::decode(&mut &*bytes)?;

        let filename = path_from_bytes(filename).ok_or("Invalid plot filename")?;

        Ok(Arc::new(MockProver {
            filename,
            header,
        }))
    }
}

impl MockProverOpener {
    /// How many times `open()` was called
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

/// Memos with local master secret key filled with this seed make key derivation panic
pub(crate) const PANIC_SEED: u8 = u8::MAX;

/// Derives keys with BLAKE3 instead of BLS arithmetic
#[derive(Debug, Default)]
pub(crate) struct MockKeyDerivation {
    parsed: AtomicUsize,
}

impl KeyDerivation for MockKeyDerivation {
    fn parse_memo(&self, memo: &[u8]) -> Result<PlotMemo, KeyDerivationError> {
        self.parsed.fetch_add(1, Ordering::Relaxed);

        let MockMemo {
            pool,
            farmer_public_key,
            local_master_secret_key,
        } = MockMemo::decode(&mut &*memo)
            .map_err(|error| KeyDerivationError::InvalidMemo(error.to_string()))?;

        if local_master_secret_key == [PANIC_SEED; SECRET_KEY_SIZE] {
            panic!("Mock key derivation panicked");
        }

        Ok(PlotMemo {
            pool,
            farmer_public_key,
            local_master_secret_key: SecretKey::from(local_master_secret_key),
        })
    }

    fn master_sk_to_local_sk(
        &self,
        master_secret_key: &SecretKey,
    ) -> Result<SecretKey, KeyDerivationError> {
        Ok(SecretKey::from(*blake3::hash(master_secret_key.as_bytes()).as_bytes()))
    }

    fn generate_plot_public_key(
        &self,
        local_secret_key: &SecretKey,
        farmer_public_key: &G1PublicKey,
        include_taproot: bool,
    ) -> Result<G1PublicKey, KeyDerivationError> {
        let mut plot_public_key = [0; G1_PUBLIC_KEY_SIZE];
        blake3::Hasher::new()
            .update(local_secret_key.as_bytes())
            .update(farmer_public_key.as_ref())
            .update(&[u8::from(include_taproot)])
            .finalize_xof()
            .fill(&mut plot_public_key);

        Ok(G1PublicKey::from(plot_public_key))
    }
}

impl MockKeyDerivation {
    /// How many memos were parsed
    pub(crate) fn parsed(&self) -> usize {
        self.parsed.load(Ordering::Relaxed)
    }
}

pub(crate) fn public_key(seed: u8) -> G1PublicKey {
    G1PublicKey::from([seed; G1_PUBLIC_KEY_SIZE])
}

pub(crate) fn memo(pool: PlotPool, farmer_public_key: G1PublicKey, seed: u8) -> Vec<u8> {
    MockMemo {
        pool,
        farmer_public_key,
        local_master_secret_key: [seed; SECRET_KEY_SIZE],
    }
    .encode()
}

/// Size of completely written plot file with size parameter `k`
pub(crate) fn full_plot_file_size(k: u8) -> u64 {
    expected_plot_file_size(k).ceil() as u64
}

/// Write mock plot file of `file_size` bytes (or header size, whichever is larger)
pub(crate) fn write_plot(path: &Path, k: u8, memo: &[u8], file_size: u64) {
    let header = MockPlotHeader {
        size: k,
        memo: memo.to_vec(),
    }
    .encode();

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .unwrap();
    file.write_all(&header).unwrap();
    file.set_len(file_size.max(header.len() as u64)).unwrap();
}

/// Grow existing mock plot file to `file_size` bytes
pub(crate) fn resize_plot(path: &Path, file_size: u64) {
    OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_len(file_size)
        .unwrap();
}
