//! The shell's notification-area icon cache (`IconStreams`).
//!
//! Layout: a 20-byte header holding the record count at offset 12, then
//! fixed-size records. Each record starts with the owning executable's path
//! as NUL-padded UTF-16LE with ROT13 applied to ASCII letters.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

const HEADER_LEN: usize = 20;
const COUNT_OFFSET: usize = 12;
pub(crate) const RECORD_LEN: usize = 1640;
pub(crate) const PATH_FIELD_LEN: usize = 528;

/// Executable paths of every record in `blob`, in stored order.
pub fn icon_stream_paths(blob: &[u8]) -> Result<Vec<PathBuf>> {
    let count = record_count(blob)?;
    Ok((0..count)
        .map(|index| decode_path(record(blob, index)))
        .collect())
}

/// Drops records that point inside `root` at anything but `keep`.
///
/// Returns the rewritten blob and the number of records removed, or `None`
/// when nothing needed removing.
pub fn prune_icon_streams(
    blob: &[u8],
    root: &Path,
    keep: &[PathBuf],
) -> Result<Option<(Vec<u8>, usize)>> {
    let count = record_count(blob)?;
    let root = normalized(&root.display().to_string());
    let root = root.trim_end_matches('\\');
    let keep = keep
        .iter()
        .map(|path| normalized(&path.display().to_string()))
        .collect::<Vec<_>>();

    let mut kept = Vec::new();
    for index in 0..count {
        let path = normalized(&decode_path(record(blob, index)).display().to_string());
        let inside_root = path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('\\'));
        if !inside_root || keep.contains(&path) {
            kept.push(index);
        }
    }

    let removed = count - kept.len();
    if removed == 0 {
        return Ok(None);
    }

    let records_end = HEADER_LEN + count * RECORD_LEN;
    let mut output = Vec::with_capacity(blob.len() - removed * RECORD_LEN);
    output.extend_from_slice(&blob[..HEADER_LEN]);
    let kept_count = u32::try_from(kept.len())
        .map_err(|_| anyhow!("icon stream record count overflows"))?;
    output[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&kept_count.to_le_bytes());
    for index in kept {
        output.extend_from_slice(record(blob, index));
    }
    output.extend_from_slice(&blob[records_end..]);
    Ok(Some((output, removed)))
}

fn record_count(blob: &[u8]) -> Result<usize> {
    if blob.len() < HEADER_LEN {
        return Err(anyhow!(
            "icon stream is {} bytes, shorter than its header",
            blob.len()
        ));
    }
    let mut raw = [0_u8; 4];
    raw.copy_from_slice(&blob[COUNT_OFFSET..COUNT_OFFSET + 4]);
    let count = u32::from_le_bytes(raw) as usize;
    let needed = count
        .checked_mul(RECORD_LEN)
        .and_then(|len| len.checked_add(HEADER_LEN))
        .ok_or_else(|| anyhow!("icon stream record count {count} is implausible"))?;
    if blob.len() < needed {
        return Err(anyhow!(
            "icon stream declares {count} records but holds {} bytes",
            blob.len()
        ));
    }
    Ok(count)
}

fn record(blob: &[u8], index: usize) -> &[u8] {
    let start = HEADER_LEN + index * RECORD_LEN;
    &blob[start..start + RECORD_LEN]
}

fn decode_path(record: &[u8]) -> PathBuf {
    let units = record[..PATH_FIELD_LEN]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .collect::<Vec<_>>();
    PathBuf::from(rot13(&String::from_utf16_lossy(&units)))
}

/// Encodes `path` into a record's path field.
#[cfg(test)]
pub(crate) fn encode_path_field(path: &Path) -> Vec<u8> {
    let mut field = rot13(&path.display().to_string())
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .take(PATH_FIELD_LEN - 2)
        .collect::<Vec<_>>();
    field.resize(PATH_FIELD_LEN, 0);
    field
}

fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            'a'..='z' => (((ch as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((ch as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => ch,
        })
        .collect()
}

fn normalized(path: &str) -> String {
    path.replace('/', "\\").to_ascii_lowercase()
}
