//! Images held in memory, keyed by path.
//!
//! Lets whole staging runs be exercised without touching the file system.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::{BoxDim, Error, Result};
use super::{ImageSource, ImageStore, checked_read_len, volume_len};

type Volume = (BoxDim, Rc<Vec<f32>>);

#[derive(Default)]
pub struct MemoryStore {
    images: RefCell<HashMap<PathBuf, Volume>>,
}

pub struct MemorySource {
    dims: BoxDim,
    data: Rc<Vec<f32>>,
}

impl MemoryStore {

    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, path: impl Into<PathBuf>, dims: BoxDim, data: Vec<f32>) {
        let len = volume_len(dims).ok();
        assert_eq!(Some(data.len()), len, "image data does not match dimensions {dims:?}");
        self.images.borrow_mut().insert(path.into(), (dims, Rc::new(data)));
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<(BoxDim, Vec<f32>)> {
        self.images.borrow()
            .get(path.as_ref())
            .map(|(dims, data)| (*dims, data.as_ref().clone()))
    }
}

impl ImageStore for MemoryStore {
    type Source = MemorySource;

    fn open(&self, path: &Path) -> Result<MemorySource> {
        let images = self.images.borrow();
        let (dims, data) = images.get(path).ok_or_else(|| Error::Io {
            path: path.into(),
            source: std::io::ErrorKind::NotFound.into(),
        })?;
        Ok(MemorySource { dims: *dims, data: Rc::clone(data) })
    }

    fn write(&self, path: &Path, dims: BoxDim, data: &[f32]) -> Result<()> {
        if data.len() != volume_len(dims)? {
            return Err(Error::illegal("MemoryStore::write", format!(
                "{} samples do not match dimensions {dims:?}", data.len())));
        }
        self.insert(path, dims, data.to_vec());
        Ok(())
    }
}

impl ImageSource for MemorySource {

    fn dims(&self) -> BoxDim { self.dims }

    fn read_slices(&mut self, first: usize, last: usize, out: &mut [f32]) -> Result<()> {
        let len = checked_read_len(self.dims, first, last, out.len())?;
        let start = first * self.slice_len();
        out[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(())
    }
}
