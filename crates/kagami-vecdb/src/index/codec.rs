//! On-disk index format: gzip-compressed JSON.
//!
//! Floats are stored as their IEEE-754 bit patterns so a reload yields
//! bit-identical vectors and therefore identical distances.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use kagami_core::{KagamiError, Result};
use serde::{Deserialize, Serialize};

use super::ivf::IvfIndex;
use super::{Index, VectorStore};

pub const FORMAT_TAG: &str = "kagami-index";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    format: String,
    version: u32,
    dim: usize,
    count: usize,
    kind: KindFile,
    vectors: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum KindFile {
    Flat,
    Ivf {
        nlist: usize,
        nprobe: usize,
        placeholder: bool,
        centroids: Vec<u32>,
        lists: Vec<Vec<usize>>,
    },
}

fn to_bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

fn from_bits(bits: Vec<u32>) -> Vec<f32> {
    bits.into_iter().map(f32::from_bits).collect()
}

pub fn write_store(store: &VectorStore, w: &mut dyn Write) -> Result<()> {
    let kind = match &store.index {
        Index::Flat => KindFile::Flat,
        Index::Ivf(ivf) => KindFile::Ivf {
            nlist: ivf.nlist,
            nprobe: ivf.nprobe,
            placeholder: ivf.placeholder,
            centroids: to_bits(&ivf.centroids),
            lists: ivf.lists.clone(),
        },
    };
    let doc = IndexFile {
        format: FORMAT_TAG.to_string(),
        version: FORMAT_VERSION,
        dim: store.dim,
        count: store.len(),
        kind,
        vectors: to_bits(&store.vectors),
    };

    let mut gz = GzEncoder::new(w, Compression::default());
    serde_json::to_writer(&mut gz, &doc)?;
    gz.finish()?;
    Ok(())
}

/// Read and validate an index file.
///
/// A missing file is an `Io` error; anything unreadable after opening is
/// `CorruptIndex`.
pub fn read_store(path: &Path) -> Result<VectorStore> {
    let file = File::open(path)?;
    let corrupt = |reason: String| KagamiError::CorruptIndex {
        path: path.to_path_buf(),
        reason,
    };

    let doc: IndexFile = serde_json::from_reader(GzDecoder::new(BufReader::new(file)))
        .map_err(|e| corrupt(e.to_string()))?;

    if doc.format != FORMAT_TAG {
        return Err(corrupt(format!("unexpected format tag {:?}", doc.format)));
    }
    if doc.version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported version {}", doc.version)));
    }
    if doc.dim == 0 {
        return Err(corrupt("zero dimension".into()));
    }
    if doc.count.checked_mul(doc.dim) != Some(doc.vectors.len()) {
        return Err(corrupt(format!(
            "{} values for {} vectors of dimension {}",
            doc.vectors.len(),
            doc.count,
            doc.dim
        )));
    }

    let index = match doc.kind {
        KindFile::Flat => Index::Flat,
        KindFile::Ivf {
            nlist,
            nprobe,
            placeholder,
            centroids,
            lists,
        } => {
            if nlist == 0 || nprobe == 0 {
                return Err(corrupt("zero nlist or nprobe".into()));
            }
            if nlist.checked_mul(doc.dim) != Some(centroids.len()) || lists.len() != nlist {
                return Err(corrupt("centroid table does not match nlist".into()));
            }
            let mut seen = vec![false; doc.count];
            for &id in lists.iter().flatten() {
                match seen.get_mut(id) {
                    Some(slot) if !*slot => *slot = true,
                    _ => return Err(corrupt(format!("bad or duplicate list entry {id}"))),
                }
            }
            if seen.iter().any(|s| !s) {
                return Err(corrupt("vector missing from inverted lists".into()));
            }
            Index::Ivf(IvfIndex {
                nlist,
                nprobe,
                centroids: from_bits(centroids),
                lists,
                placeholder,
            })
        }
    };

    Ok(VectorStore {
        dim: doc.dim,
        vectors: from_bits(doc.vectors),
        index,
    })
}
