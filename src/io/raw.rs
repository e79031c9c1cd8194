//! Read / write image volumes as a small header followed by raw little-endian `f32`s
//!
//! ```text
//! "IM3D"  nx: u32  ny: u32  nz: u32   nx*ny*nz * f32
//! ```

use std::fs::File;
use std::io::{Read, Write, Seek, SeekFrom, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use binrw::{binrw, BinReaderExt, BinWriterExt};

use crate::{BoxDim, Error, Result};
use super::{ImageSource, ImageStore, checked_read_len, volume_len};

#[binrw]
#[brw(little, magic = b"IM3D")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl Header {
    /// Bytes occupied by the header, including the magic
    pub const SIZE: u64 = 16;

    pub fn new([nx, ny, nz]: BoxDim) -> Result<Self> {
        let narrow = |n: usize| u32::try_from(n).map_err(|_| Error::illegal(
            "raw::Header", format!("extent {n} does not fit in the image header")));
        Ok(Self { nx: narrow(nx)?, ny: narrow(ny)?, nz: narrow(nz)? })
    }

    pub fn dims(&self) -> BoxDim { [self.nx as usize, self.ny as usize, self.nz as usize] }

    /// `None` if the announced size cannot be represented
    fn data_bytes(&self) -> Option<u64> {
        [self.nx, self.ny, self.nz].into_iter()
            .try_fold(4_u64, |bytes, n| bytes.checked_mul(u64::from(n)))
    }
}

/// Images stored as individual files in the local file system
#[derive(Clone, Copy, Debug, Default)]
pub struct RawStore;

pub struct RawSource {
    path: PathBuf,
    file: BufReader<File>,
    dims: BoxDim,
}

impl ImageStore for RawStore {
    type Source = RawSource;

    fn open(&self, path: &Path) -> Result<RawSource> {
        let file = File::open(path).map_err(Error::io(path))?;
        let available = file.metadata().map_err(Error::io(path))?.len();
        let mut file = BufReader::new(file);
        let header: Header = file.read_le()
            .map_err(|source| Error::Header { path: path.into(), source })?;
        let needed = header.data_bytes().and_then(|bytes| bytes.checked_add(Header::SIZE));
        if needed.map_or(true, |needed| available < needed) {
            return Err(Error::illegal("raw::open", format!(
                "`{}` is truncated: header announces {:?} but the file holds only {available} bytes",
                path.display(), header.dims())));
        }
        log::trace!("opened {} ({:?})", path.display(), header.dims());
        Ok(RawSource { path: path.into(), file, dims: header.dims() })
    }

    fn write(&self, path: &Path, dims: BoxDim, data: &[f32]) -> Result<()> {
        write(path, dims, data.iter().copied())
    }
}

impl ImageSource for RawSource {

    fn dims(&self) -> BoxDim { self.dims }

    fn read_slices(&mut self, first: usize, last: usize, out: &mut [f32]) -> Result<()> {
        let len = checked_read_len(self.dims, first, last, out.len())?;
        let offset = Header::SIZE + 4 * (first * self.slice_len()) as u64;
        let mut bytes = vec![0; 4 * len];
        self.file.seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(&mut bytes))
            .map_err(Error::io(&self.path))?;
        for (sample, le) in out.iter_mut().zip(bytes.chunks_exact(4)) {
            *sample = f32::from_le_bytes([le[0], le[1], le[2], le[3]]);
        }
        Ok(())
    }
}

pub fn write(path: &Path, dims: BoxDim, data: impl ExactSizeIterator<Item = f32>) -> Result<()> {
    if data.len() != volume_len(dims)? {
        return Err(Error::illegal("raw::write", format!(
            "{} samples do not match dimensions {dims:?}", data.len())));
    }
    let header = Header::new(dims)?;
    let file = File::create(path).map_err(Error::io(path))?;
    let mut buf = BufWriter::new(file);
    buf.write_le(&header).map_err(|source| Error::Header { path: path.into(), source })?;
    for datum in data {
        buf.write_all(&datum.to_le_bytes()).map_err(Error::io(path))?;
    }
    buf.flush().map_err(Error::io(path))?;
    Ok(())
}
