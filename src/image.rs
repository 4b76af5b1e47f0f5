//! Read-only access to raw NAND dumps.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Resource, Result};

/// A raw image file, mapped into memory read-only
#[derive(Debug)]
pub struct RawImage {
    /// None for an empty file, which can't be mapped
    map: Option<Mmap>,
}

impl RawImage {
    /// Map the image at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingResource {
                resource: Resource::Image,
                path: path.to_owned(),
            });
        }

        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { map: None });
        }

        // SAFETY: the mapping is read-only and private to this process. Modifying the dump while
        // it is being corrected is unsupported.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Some(map) })
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Deref for RawImage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

#[test]
fn test_open() -> anyhow::Result<()> {
    use std::io::Write;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dump.bin");

    match RawImage::open(&path) {
        Err(Error::MissingResource { resource, .. }) => {
            assert_eq!(resource, Resource::Image);
            assert_eq!(resource.status(), -1);
        }
        other => panic!("expected missing image, got {other:?}"),
    }

    File::create(&path)?;
    let image = RawImage::open(&path)?;
    assert!(image.is_empty());
    assert_eq!(&image[..], &[] as &[u8]);

    File::create(&path)?.write_all(&[1, 2, 3, 0xFF])?;
    let image = RawImage::open(&path)?;
    assert_eq!(image.len(), 4);
    assert_eq!(&image[..], &[1, 2, 3, 0xFF]);
    Ok(())
}
