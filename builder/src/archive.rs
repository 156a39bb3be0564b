//! Writes a [LambdaBundle] as a ZIP archive.
//!
//! Regular files reuse the raw deflate stream and CRC32 computed when their
//! pseudo-file was built, so nothing is compressed twice. Symlinks and
//! generated files are stored. Entries are written in path order with a
//! fixed timestamp, so identical bundles produce identical archives.
//!
//! ```rust,ignore
//! let mut out = tokio::io::BufWriter::new(tokio::fs::File::create(path).await?);
//! lambdapack_builder::archive::write(&bundle, &mut out).await?;
//! out.flush().await?;
//! ```

use std::collections::BTreeMap;
use std::io::{self, ErrorKind::InvalidInput};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{BundleFile, LambdaBundle};

const LOCAL_HEADER: u32 = 0x0403_4b50;
const CENTRAL_HEADER: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY: u32 = 0x0605_4b50;

const VERSION_NEEDED: u16 = 20;
/// Unix host, format version 2.0. Extractors then honour the mode bits.
const VERSION_MADE_BY: u16 = (3 << 8) | 20;
const FLAG_UTF8: u16 = 0x0800;

const STORED: u16 = 0;
const DEFLATED: u16 = 8;

/// 1980-01-01 00:00:00, the DOS epoch.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = (1 << 5) | 1;

/// A file's record, with every size already checked against the zip32
/// field widths.
struct Entry<'a> {
    name: &'a str,
    name_len: u16,
    method: u16,
    crc32: u32,
    data: &'a [u8],
    compressed_size: u32,
    uncompressed_size: u32,
    mode: u32,
    offset: u32,
}

fn too_large(what: &str) -> io::Error {
    io::Error::new(InvalidInput, format!("{what} exceeds the zip32 limits"))
}

fn to_u32(n: u64, what: &str) -> io::Result<u32> {
    u32::try_from(n).map_err(|_| too_large(what))
}

fn to_u16(n: usize, what: &str) -> io::Result<u16> {
    u16::try_from(n).map_err(|_| too_large(what))
}

/// Writes `bundle` to `w`, returning the number of bytes written.
pub async fn write<W>(bundle: &LambdaBundle, w: &mut W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let count = to_u16(bundle.files.len(), "entry count")?;
    let mut offset: u64 = 0;
    let mut entries = Vec::with_capacity(bundle.files.len());
    // Entries borrow their data, symlink targets need an owner.
    let targets: BTreeMap<&str, String> = bundle
        .files
        .iter()
        .filter_map(|(name, file)| match file {
            BundleFile::Layer(pseudo) => pseudo
                .symlink_target()
                .map(|target| (name.as_str(), target.to_string_lossy().into_owned())),
            BundleFile::Generated { .. } => None,
        })
        .collect();

    for (name, file) in &bundle.files {
        let (method, data, crc32): (u16, &[u8], u32) = match (file, targets.get(name.as_str())) {
            (_, Some(target)) => (STORED, target.as_bytes(), crc32fast::hash(target.as_bytes())),
            (BundleFile::Layer(pseudo), None) => match pseudo.compressed() {
                Some(compressed) => (DEFLATED, &compressed[..], pseudo.crc32().unwrap_or_default()),
                None => return Err(io::Error::new(InvalidInput, format!("{name} has no content"))),
            },
            (BundleFile::Generated { data, .. }, None) => (STORED, &data[..], crc32fast::hash(data)),
        };
        let uncompressed_size = match method {
            DEFLATED => to_u32(file.uncompressed_size(), name)?,
            _ => to_u32(data.len() as u64, name)?,
        };

        let entry = Entry {
            name,
            name_len: to_u16(name.len(), name)?,
            method,
            crc32,
            data,
            compressed_size: to_u32(data.len() as u64, name)?,
            uncompressed_size,
            mode: file.mode(),
            offset: to_u32(offset, "archive")?,
        };
        offset += write_local(w, &entry).await?;
        entries.push(entry);
    }

    let central_directory = offset;
    for entry in &entries {
        offset += write_central(w, entry).await?;
    }

    w.write_u32_le(END_OF_CENTRAL_DIRECTORY).await?;
    w.write_u16_le(0).await?; // this disk
    w.write_u16_le(0).await?; // disk with the central directory
    w.write_u16_le(count).await?;
    w.write_u16_le(count).await?;
    w.write_u32_le(to_u32(offset - central_directory, "central directory")?)
        .await?;
    w.write_u32_le(to_u32(central_directory, "archive")?).await?;
    w.write_u16_le(0).await?; // comment length
    offset += 22;

    Ok(offset)
}

async fn write_local<W>(w: &mut W, entry: &Entry<'_>) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let name = entry.name.as_bytes();
    w.write_u32_le(LOCAL_HEADER).await?;
    w.write_u16_le(VERSION_NEEDED).await?;
    w.write_u16_le(FLAG_UTF8).await?;
    w.write_u16_le(entry.method).await?;
    w.write_u16_le(DOS_TIME).await?;
    w.write_u16_le(DOS_DATE).await?;
    w.write_u32_le(entry.crc32).await?;
    w.write_u32_le(entry.compressed_size).await?;
    w.write_u32_le(entry.uncompressed_size).await?;
    w.write_u16_le(entry.name_len).await?;
    w.write_u16_le(0).await?; // extra length
    w.write_all(name).await?;
    w.write_all(entry.data).await?;

    Ok(30 + name.len() as u64 + entry.data.len() as u64)
}

async fn write_central<W>(w: &mut W, entry: &Entry<'_>) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let name = entry.name.as_bytes();
    w.write_u32_le(CENTRAL_HEADER).await?;
    w.write_u16_le(VERSION_MADE_BY).await?;
    w.write_u16_le(VERSION_NEEDED).await?;
    w.write_u16_le(FLAG_UTF8).await?;
    w.write_u16_le(entry.method).await?;
    w.write_u16_le(DOS_TIME).await?;
    w.write_u16_le(DOS_DATE).await?;
    w.write_u32_le(entry.crc32).await?;
    w.write_u32_le(entry.compressed_size).await?;
    w.write_u32_le(entry.uncompressed_size).await?;
    w.write_u16_le(entry.name_len).await?;
    w.write_u16_le(0).await?; // extra length
    w.write_u16_le(0).await?; // comment length
    w.write_u16_le(0).await?; // disk number
    w.write_u16_le(0).await?; // internal attributes
    w.write_u32_le(entry.mode << 16).await?;
    w.write_u32_le(entry.offset).await?;
    w.write_all(name).await?;

    Ok(46 + name.len() as u64)
}
