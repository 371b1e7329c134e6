//! File-backed random-access vector
//!
//! A typed, appendable array of fixed-size records persisted through a
//! memory mapping. The first page of the backing file is a header
//! (magic, version, element size, logical length, content checksum);
//! records start at byte offset 4096. The file grows in fixed chunks of
//! elements, and the content checksum is maintained incrementally: an
//! append-only delta extends the cached CRC with the tail bytes, while an
//! interior overwrite or a truncation forces a from-scratch recompute on
//! the next `compute_checksum` call.

use std::fs::File;
use std::marker::PhantomData;
use std::mem;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use memmap2::MmapMut;

use crate::checksum::Crc32;
use crate::error::{MinnowError, Result};
use crate::fs::Filesystem;

/// Magic bytes identifying a minnow vector file
const FILE_MAGIC: u32 = u32::from_le_bytes(*b"mnvf");
/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

/// The header occupies one page; content starts right after it.
pub const HEADER_PAGE_SIZE: usize = 4096;

/// Hard cap on the number of elements a vector may hold.
pub const MAX_ELEMENTS: u32 = 1 << 20;
/// Elements allocated per growth step.
pub const GROW_ELEMENTS: u32 = 1 << 14;

// Header field offsets (all fields u32 LE).
const OFFSET_MAGIC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_ELEMENT_SIZE: usize = 8;
const OFFSET_NUM_ELEMENTS: usize = 12;
const OFFSET_CHECKSUM: usize = 16;

/// How writes reach the disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Persist on drop; flushes also happen on explicit `persist_to_disk`.
    ReadWriteAutoSync,
    /// Only explicit `persist_to_disk` calls flush.
    ReadWriteManualSync,
}

/// A mmap-backed, auto-growing array of fixed-size records.
pub struct FileBackedVector<T: Pod> {
    file: File,
    path: PathBuf,
    mmap: MmapMut,
    /// Logical element count; elements `[0, len)` are the vector's content.
    len: u32,
    /// Elements currently allocated in the file.
    capacity: u32,
    cached_crc: Crc32,
    cached_len: u32,
    /// Set when an element below `cached_len` was overwritten or the vector
    /// was truncated; the next checksum call recomputes from scratch.
    interior_dirty: bool,
    /// Set when a remap failed; every subsequent operation fails.
    poisoned: bool,
    strategy: SyncStrategy,
    _marker: PhantomData<T>,
}

impl<T: Pod> std::fmt::Debug for FileBackedVector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackedVector")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl<T: Pod> FileBackedVector<T> {
    /// Open or create the vector backing file at `path`.
    ///
    /// An existing file is validated: magic, version or element-size
    /// disagreement is an internal error (wrong file), while a content
    /// checksum mismatch is data loss.
    pub fn create(fs: &dyn Filesystem, path: &Path, strategy: SyncStrategy) -> Result<Self> {
        let element_size = mem::size_of::<T>() as u32;
        debug_assert!(element_size > 0);

        let file = fs.open_for_write(path)?;
        let file_size = file.metadata().map_err(MinnowError::from)?.len();

        if file_size == 0 {
            file.set_len(HEADER_PAGE_SIZE as u64)
                .map_err(MinnowError::from)?;
            let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(MinnowError::from)?;
            write_u32(&mut mmap, OFFSET_MAGIC, FILE_MAGIC);
            write_u32(&mut mmap, OFFSET_VERSION, FORMAT_VERSION);
            write_u32(&mut mmap, OFFSET_ELEMENT_SIZE, element_size);
            write_u32(&mut mmap, OFFSET_NUM_ELEMENTS, 0);
            write_u32(&mut mmap, OFFSET_CHECKSUM, 0);
            return Ok(Self {
                file,
                path: path.to_path_buf(),
                mmap,
                len: 0,
                capacity: 0,
                cached_crc: Crc32::new(),
                cached_len: 0,
                interior_dirty: false,
                poisoned: false,
                strategy,
                _marker: PhantomData,
            });
        }

        if file_size < HEADER_PAGE_SIZE as u64 {
            return Err(MinnowError::Internal(format!(
                "vector file {} smaller than its header ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(MinnowError::from)?;
        if read_u32(&mmap, OFFSET_MAGIC) != FILE_MAGIC {
            return Err(MinnowError::Internal(format!(
                "bad magic in vector file {}",
                path.display()
            )));
        }
        if read_u32(&mmap, OFFSET_VERSION) != FORMAT_VERSION {
            return Err(MinnowError::Internal(format!(
                "unsupported vector file version {} in {}",
                read_u32(&mmap, OFFSET_VERSION),
                path.display()
            )));
        }
        if read_u32(&mmap, OFFSET_ELEMENT_SIZE) != element_size {
            return Err(MinnowError::Internal(format!(
                "element size mismatch in {}: file has {}, expected {}",
                path.display(),
                read_u32(&mmap, OFFSET_ELEMENT_SIZE),
                element_size
            )));
        }

        let len = read_u32(&mmap, OFFSET_NUM_ELEMENTS);
        let capacity = ((file_size - HEADER_PAGE_SIZE as u64) / element_size as u64) as u32;
        if len > capacity {
            return Err(MinnowError::Internal(format!(
                "vector file {} records {} elements but only has room for {}",
                path.display(),
                len,
                capacity
            )));
        }

        let content_end = HEADER_PAGE_SIZE + len as usize * element_size as usize;
        let crc = Crc32::of(&mmap[HEADER_PAGE_SIZE..content_end]);
        let stored = read_u32(&mmap, OFFSET_CHECKSUM);
        if crc.get() != stored {
            return Err(MinnowError::DataLoss(format!(
                "checksum mismatch in {}: computed {}, header has {}",
                path.display(),
                crc.get(),
                stored
            )));
        }

        tracing::debug!(
            path = %path.display(),
            elements = len,
            "reopened file-backed vector"
        );
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mmap,
            len,
            capacity,
            cached_crc: crc,
            cached_len: len,
            interior_dirty: false,
            poisoned: false,
            strategy,
            _marker: PhantomData,
        })
    }

    /// Remove the backing file; succeeds if it does not exist.
    pub fn delete(fs: &dyn Filesystem, path: &Path) -> Result<()> {
        fs.delete_file(path)
    }

    /// Logical element count.
    pub fn num_elements(&self) -> u32 {
        self.len
    }

    /// Write `value` at `idx`, growing the file as needed.
    ///
    /// Writing past the current length extends it to `idx + 1`; skipped
    /// elements read as zero.
    pub fn set(&mut self, idx: u32, value: T) -> Result<()> {
        self.check_usable()?;
        if idx >= MAX_ELEMENTS {
            return Err(MinnowError::OutOfRange(format!(
                "index {} exceeds the {} element cap",
                idx, MAX_ELEMENTS
            )));
        }
        if idx >= self.capacity {
            self.grow_to_fit(idx)?;
        }

        let element_size = mem::size_of::<T>();
        let start = HEADER_PAGE_SIZE + idx as usize * element_size;
        self.mmap[start..start + element_size].copy_from_slice(bytemuck::bytes_of(&value));

        if idx < self.cached_len {
            self.interior_dirty = true;
        }
        if idx >= self.len {
            self.len = idx + 1;
            write_u32(&mut self.mmap, OFFSET_NUM_ELEMENTS, self.len);
        }
        Ok(())
    }

    /// Read the element at `idx`.
    pub fn get(&self, idx: u32) -> Result<&T> {
        self.check_usable()?;
        if idx >= self.len {
            return Err(MinnowError::OutOfRange(format!(
                "index {} out of bounds for length {}",
                idx, self.len
            )));
        }
        let element_size = mem::size_of::<T>();
        let start = HEADER_PAGE_SIZE + idx as usize * element_size;
        Ok(bytemuck::from_bytes(&self.mmap[start..start + element_size]))
    }

    /// View the whole logical content.
    pub fn as_slice(&self) -> &[T] {
        let end = HEADER_PAGE_SIZE + self.len as usize * mem::size_of::<T>();
        bytemuck::cast_slice(&self.mmap[HEADER_PAGE_SIZE..end])
    }

    /// Shrink the logical length to `new_len`.
    ///
    /// The cached checksum is left untouched; the next `compute_checksum`
    /// recomputes over the shortened content.
    pub fn truncate_to(&mut self, new_len: u32) -> Result<()> {
        self.check_usable()?;
        if new_len > self.len {
            return Err(MinnowError::OutOfRange(format!(
                "cannot truncate length {} up to {}",
                self.len, new_len
            )));
        }
        self.len = new_len;
        write_u32(&mut self.mmap, OFFSET_NUM_ELEMENTS, new_len);
        self.interior_dirty = true;
        Ok(())
    }

    /// The CRC-32 of the current logical content.
    ///
    /// Idempotent; successive calls without intervening writes return the
    /// same value.
    pub fn compute_checksum(&mut self) -> Crc32 {
        let element_size = mem::size_of::<T>();
        if self.interior_dirty || self.cached_len > self.len {
            let end = HEADER_PAGE_SIZE + self.len as usize * element_size;
            self.cached_crc = Crc32::of(&self.mmap[HEADER_PAGE_SIZE..end]);
        } else if self.len > self.cached_len {
            let start = HEADER_PAGE_SIZE + self.cached_len as usize * element_size;
            let end = HEADER_PAGE_SIZE + self.len as usize * element_size;
            self.cached_crc.append(&self.mmap[start..end]);
        }
        self.cached_len = self.len;
        self.interior_dirty = false;
        self.cached_crc
    }

    /// Flush mapped pages and record the current length and checksum in the
    /// header.
    pub fn persist_to_disk(&mut self) -> Result<()> {
        self.check_usable()?;
        let crc = self.compute_checksum();
        write_u32(&mut self.mmap, OFFSET_NUM_ELEMENTS, self.len);
        write_u32(&mut self.mmap, OFFSET_CHECKSUM, crc.get());
        self.mmap.flush().map_err(MinnowError::from)?;
        Ok(())
    }

    fn grow_to_fit(&mut self, idx: u32) -> Result<()> {
        let needed = idx + 1;
        let new_capacity = needed.div_ceil(GROW_ELEMENTS) * GROW_ELEMENTS;
        let new_capacity = new_capacity.min(MAX_ELEMENTS);
        let new_size =
            HEADER_PAGE_SIZE as u64 + new_capacity as u64 * mem::size_of::<T>() as u64;
        self.file.set_len(new_size).map_err(MinnowError::from)?;
        match unsafe { MmapMut::map_mut(&self.file) } {
            Ok(mmap) => {
                self.mmap = mmap;
                self.capacity = new_capacity;
                Ok(())
            }
            Err(e) => {
                // The old mapping no longer reflects the file; refuse all
                // further access rather than risk writing through it.
                self.poisoned = true;
                Err(MinnowError::Internal(format!(
                    "remap of {} failed after growth: {}",
                    self.path.display(),
                    e
                )))
            }
        }
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(MinnowError::Internal(format!(
                "vector {} is unusable after a failed remap",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl<T: Pod> Drop for FileBackedVector<T> {
    fn drop(&mut self) {
        if self.strategy == SyncStrategy::ReadWriteAutoSync && !self.poisoned {
            if let Err(e) = self.persist_to_disk() {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to persist file-backed vector on drop"
                );
            }
        }
    }
}

fn read_u32(mmap: &MmapMut, offset: usize) -> u32 {
    u32::from_le_bytes(mmap[offset..offset + 4].try_into().unwrap())
}

fn write_u32(mmap: &mut MmapMut, offset: usize, value: u32) {
    mmap[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StdFilesystem;
    use tempfile::TempDir;

    fn insert(vector: &mut FileBackedVector<u8>, idx: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            vector.set(idx + i as u32, *byte).unwrap();
        }
    }

    #[test]
    fn test_create_twice() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        {
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        }
        // We can create it again based on the same file.
        FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
    }

    #[test]
    fn test_set_get_and_checksum() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        let mut vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        assert_eq!(vector.compute_checksum(), Crc32::new());

        insert(&mut vector, 0, b"abcde");
        assert_eq!(vector.num_elements(), 5);
        assert_eq!(vector.as_slice(), b"abcde");

        // CRC-32 of "abcde" cross-checked against zlib.
        assert_eq!(vector.compute_checksum(), Crc32::from_raw(2240272485));

        assert_eq!(*vector.get(0).unwrap(), b'a');
        assert_eq!(*vector.get(4).unwrap(), b'e');
        assert!(matches!(
            vector.get(5),
            Err(MinnowError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_data_loss() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        {
            let mut vector =
                FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
                    .unwrap();
            insert(&mut vector, 0, b"abcde");
            vector.persist_to_disk().unwrap();
        }

        // Write a bad crc; reinitialization recomputes and disagrees.
        fs.pwrite(&path, OFFSET_CHECKSUM as u64, &123u32.to_le_bytes())
            .unwrap();
        let err = FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
            .unwrap_err();
        assert!(err.is_data_loss());

        // Restore the good crc and recovery succeeds with content intact.
        fs.pwrite(
            &path,
            OFFSET_CHECKSUM as u64,
            &2240272485u32.to_le_bytes(),
        )
        .unwrap();
        let vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        assert_eq!(vector.as_slice(), b"abcde");
    }

    #[test]
    fn test_bad_magic_is_internal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        {
            let mut vector =
                FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
                    .unwrap();
            insert(&mut vector, 0, b"abc");
        }
        fs.pwrite(&path, OFFSET_MAGIC as u64, b"zzzz").unwrap();
        let err = FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
            .unwrap_err();
        assert!(matches!(err, MinnowError::Internal(_)));
    }

    #[test]
    fn test_element_size_mismatch_is_internal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        {
            let mut vector =
                FileBackedVector::<u32>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
                    .unwrap();
            vector.set(0, 7).unwrap();
        }
        let err = FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
            .unwrap_err();
        assert!(matches!(err, MinnowError::Internal(_)));
    }

    #[test]
    fn test_incremental_crc_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        let mut vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();

        // Append in bursts with checksum calls in between; the incremental
        // value must always match a from-scratch computation.
        let mut next_check = 2;
        for i in 0..1000u32 {
            vector.set(i, b'a').unwrap();
            if i >= next_check {
                let incremental = vector.compute_checksum();
                let full = Crc32::of(vector.as_slice());
                assert_eq!(incremental, full);
                next_check *= 2;
            }
        }
    }

    #[test]
    fn test_incremental_crc_overlapping_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        let mut vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        insert(&mut vector, 0, &[b'a'; 1000]);
        assert_eq!(vector.compute_checksum(), Crc32::of(&[b'a'; 1000]));

        // Overwrite interior runs; every checksum call must still equal the
        // full recomputation.
        let mut next_check = 2;
        for i in 0..1000u32 {
            insert(&mut vector, i, &[b'b'; 3]);
            if i >= next_check {
                let incremental = vector.compute_checksum();
                let full = Crc32::of(vector.as_slice());
                assert_eq!(incremental, full);
                next_check *= 2;
            }
        }
        for i in 0..1000u32 {
            assert_eq!(*vector.get(i).unwrap(), b'b');
        }
    }

    #[test]
    fn test_grow_bounds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        let mut vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();

        assert!(matches!(
            vector.set(MAX_ELEMENTS + 11, b'a'),
            Err(MinnowError::OutOfRange(_))
        ));

        let start = MAX_ELEMENTS - 13;
        insert(&mut vector, start, b"abcde");
        vector.persist_to_disk().unwrap();
        drop(vector);

        let vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        assert_eq!(
            &vector.as_slice()[start as usize..start as usize + 5],
            b"abcde"
        );
    }

    #[test]
    fn test_grows_in_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        let mut vector =
            FileBackedVector::<i32>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();

        // A fresh vector's file is header-only.
        assert_eq!(fs.get_file_size(&path).unwrap(), HEADER_PAGE_SIZE as u64);

        // The first write allocates one chunk.
        let chunk_bytes = GROW_ELEMENTS as u64 * 4;
        vector.set(0, 1).unwrap();
        assert_eq!(
            fs.get_file_size(&path).unwrap(),
            HEADER_PAGE_SIZE as u64 + chunk_bytes
        );

        // Writes within the chunk do not grow the file.
        vector.set(1, 2).unwrap();
        assert_eq!(
            fs.get_file_size(&path).unwrap(),
            HEADER_PAGE_SIZE as u64 + chunk_bytes
        );

        // Crossing the chunk boundary allocates the second chunk.
        vector.set(GROW_ELEMENTS, 3).unwrap();
        assert_eq!(
            fs.get_file_size(&path).unwrap(),
            HEADER_PAGE_SIZE as u64 + 2 * chunk_bytes
        );

        drop(vector);
        let _vector =
            FileBackedVector::<i32>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        assert_eq!(
            fs.get_file_size(&path).unwrap(),
            HEADER_PAGE_SIZE as u64 + 2 * chunk_bytes
        );
    }

    #[test]
    fn test_truncate_to() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        let mut vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        insert(&mut vector, 0, b"AZ");
        assert_eq!(vector.compute_checksum(), Crc32::of(b"AZ"));

        vector.set(1, b'J').unwrap();
        vector.truncate_to(1).unwrap();
        assert_eq!(vector.num_elements(), 1);
        // CRC-32 of "A" cross-checked against zlib.
        assert_eq!(vector.compute_checksum(), Crc32::from_raw(3554254475));

        vector.truncate_to(0).unwrap();
        assert_eq!(vector.num_elements(), 0);
        assert_eq!(vector.compute_checksum(), Crc32::new());

        assert!(matches!(
            vector.truncate_to(100),
            Err(MinnowError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        // Can delete even if there's nothing there.
        FileBackedVector::<i64>::delete(&fs, &path).unwrap();

        {
            let mut vector =
                FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
                    .unwrap();
            insert(&mut vector, 0, b"abcde");
        }

        FileBackedVector::<i64>::delete(&fs, &path).unwrap();
        assert!(!fs.file_exists(&path));

        // Can successfully create again.
        FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
    }

    #[test]
    fn test_auto_sync_persists_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.array");
        let fs = StdFilesystem;

        {
            let mut vector =
                FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync)
                    .unwrap();
            insert(&mut vector, 0, b"abcde");
            // No explicit persist: the drop takes care of it.
        }

        let vector =
            FileBackedVector::<u8>::create(&fs, &path, SyncStrategy::ReadWriteAutoSync).unwrap();
        assert_eq!(vector.as_slice(), b"abcde");
    }
}
