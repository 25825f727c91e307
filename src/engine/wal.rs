//! LSMKV - Segmented Write-Ahead Log (WAL)
//! Provides durability by logging all mutations to disk
//! before they are applied to the in-memory memtable.
//!
//! The log is a chain of size-bounded segment files named after the
//! index of their first entry:
//!
//! ```text
//! <base>/log/dat-0000000001.seg   entries 1..=N
//! <base>/log/dat-00000000XX.seg   entries N+1..   (active)
//! ```
//!
//! Each segment is a plain concatenation of codec records. Every entry
//! gets the next sequence index; offsets are kept in memory per segment
//! and rebuilt by scanning the files on open. Only the last segment is
//! open for writing; once its remaining capacity drops under
//! [`SEGMENT_TRIGGER_BYTES`] it is sealed and a new one is started.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::engine::codec::{self, EntryCodec};
use crate::error::{LsmError, Result};
use crate::types::Entry;

/// A segment is sealed once fewer than this many bytes remain.
pub const SEGMENT_TRIGGER_BYTES: i64 = 64;

const SEGMENT_PREFIX: &str = "dat-";
const SEGMENT_SUFFIX: &str = ".seg";
const TMP_SUFFIX: &str = ".tmp";

/// File name of the segment whose first entry is `index`.
pub fn segment_name(index: i64) -> String {
    format!("{SEGMENT_PREFIX}{:010x}{SEGMENT_SUFFIX}", index)
}

fn parse_segment_name(name: &str) -> Option<i64> {
    let hex = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    if hex.len() != 10 {
        return None;
    }
    i64::from_str_radix(hex, 16).ok()
}

/// One segment file and the offsets of the entries it holds.
#[derive(Debug)]
struct Segment {
    path: PathBuf,
    /// Index of the first entry stored in this file.
    index: i64,
    /// `(index, offset)` pairs, ascending by index.
    entries: Vec<(i64, u64)>,
    /// `max_segment_size - bytes_written`.
    remaining: i64,
}

impl Segment {
    fn next_index(&self) -> i64 {
        self.index + self.entries.len() as i64
    }
}

/// Outcome of scanning a segment file on open.
struct SegmentScan {
    entries: Vec<(i64, u64)>,
    valid_len: u64,
    torn: bool,
}

/// Segmented write-ahead log.
pub struct Wal {
    dir: PathBuf,
    max_segment_size: i64,
    sync_writes: bool,
    segments: Vec<Segment>,
    first_index: i64,
    last_index: i64,
    writer: Option<BufWriter<File>>,
    /// Read handle on the active segment.
    reader: Option<File>,
    codec: EntryCodec,
    closed: bool,
}

impl Wal {
    /// Open or create the log in `dir`, rebuilding segment offsets from disk.
    pub fn open(dir: impl AsRef<Path>, max_segment_size: u64, sync_writes: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if (max_segment_size as i64) < SEGMENT_TRIGGER_BYTES * 2 {
            return Err(LsmError::Config(format!(
                "max_segment_size {max_segment_size} is below {}",
                SEGMENT_TRIGGER_BYTES * 2
            )));
        }
        fs::create_dir_all(&dir)?;

        let mut files = Vec::new();
        for dirent in fs::read_dir(&dir)? {
            let path = dirent?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                log::warn!("wal: removing leftover temp file {:?}", path);
                fs::remove_file(&path)?;
                continue;
            }
            if let Some(index) = parse_segment_name(name) {
                files.push((index, path));
            }
        }
        files.sort_by_key(|(index, _)| *index);

        let mut segments: Vec<Segment> = Vec::new();
        let mut next_index = 1;
        let file_count = files.len();
        for (pos, (start, path)) in files.into_iter().enumerate() {
            let is_last = pos + 1 == file_count;
            let scan = Self::scan_segment(&path, start)?;

            if scan.torn {
                if !is_last {
                    return Err(LsmError::Corruption(format!(
                        "segment {:?} has a truncated record at offset {}",
                        path, scan.valid_len
                    )));
                }
                log::warn!(
                    "wal: dropping torn tail of {:?} after {} bytes",
                    path,
                    scan.valid_len
                );
                OpenOptions::new()
                    .write(true)
                    .open(&path)?
                    .set_len(scan.valid_len)?;
            }

            if scan.entries.is_empty() {
                log::debug!("wal: dropping empty segment {:?}", path);
                fs::remove_file(&path)?;
                next_index = next_index.max(start);
                continue;
            }

            if let Some(prev) = segments.last() {
                let expected = prev.next_index();
                if start < expected && start > prev.index {
                    // Interrupted front truncation: the rewritten copy supersedes its source.
                    log::warn!("wal: removing superseded segment {:?}", prev.path);
                    fs::remove_file(&prev.path)?;
                    segments.pop();
                } else if start != expected {
                    return Err(LsmError::Corruption(format!(
                        "segment {:?} starts at {} but {} was expected",
                        path, start, expected
                    )));
                }
            }

            next_index = start + scan.entries.len() as i64;
            segments.push(Segment {
                path,
                index: start,
                entries: scan.entries,
                remaining: max_segment_size as i64 - scan.valid_len as i64,
            });
        }

        let first_index = segments.first().map_or(next_index, |s| s.index);
        let mut wal = Self {
            dir,
            max_segment_size: max_segment_size as i64,
            sync_writes,
            segments,
            first_index,
            last_index: next_index - 1,
            writer: None,
            reader: None,
            codec: EntryCodec::new(),
            closed: false,
        };

        let needs_new = wal
            .segments
            .last()
            .map_or(true, |s| s.remaining < SEGMENT_TRIGGER_BYTES);
        if needs_new {
            wal.cycle()?;
        } else {
            wal.open_active()?;
        }

        log::info!(
            "wal: opened {:?} with {} segment(s), entries [{}, {}]",
            wal.dir,
            wal.segments.len(),
            wal.first_index,
            wal.last_index
        );
        Ok(wal)
    }

    fn scan_segment(path: &Path, start: i64) -> Result<SegmentScan> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut offset = 0u64;
        let mut index = start;
        let mut torn = false;
        loop {
            match codec::try_decode(&mut reader) {
                Ok(Some(entry)) => {
                    entries.push((index, offset));
                    offset += codec::encoded_len(&entry) as u64;
                    index += 1;
                }
                Ok(None) => break,
                Err(LsmError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    torn = true;
                    break;
                }
                Err(LsmError::BadEntry(_)) => {
                    torn = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(SegmentScan {
            entries,
            valid_len: offset,
            torn,
        })
    }

    /// Open writer and reader handles on the last segment.
    fn open_active(&mut self) -> Result<()> {
        let path = match self.segments.last() {
            Some(seg) => seg.path.clone(),
            None => return Err(LsmError::Corruption("wal has no active segment".into())),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        // Append mode reports position 0 until the first write.
        file.seek(SeekFrom::End(0))?;
        self.writer = Some(BufWriter::new(file));
        self.reader = Some(File::open(&path)?);
        Ok(())
    }

    /// Seal the active segment and start a new one at `last_index + 1`.
    fn cycle(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        self.reader = None;

        let start = self.last_index + 1;
        let path = self.dir.join(segment_name(start));
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        log::debug!("wal: starting segment {:?}", path);

        self.segments.push(Segment {
            path,
            index: start,
            entries: Vec::new(),
            remaining: self.max_segment_size,
        });
        self.open_active()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(LsmError::FileClosed);
        }
        Ok(())
    }

    /// Append `entry` and return its index.
    pub fn write(&mut self, entry: &Entry) -> Result<i64> {
        self.ensure_open()?;
        let writer = self.writer.as_mut().ok_or(LsmError::FileClosed)?;
        let offset = self.codec.encode(writer, entry)?;
        let written = codec::encoded_len(entry);
        writer.flush()?;
        if self.sync_writes {
            writer.get_ref().sync_data()?;
        }

        let index = self.last_index + 1;
        let segment = self
            .segments
            .last_mut()
            .ok_or_else(|| LsmError::Corruption("wal has no active segment".into()))?;
        segment.entries.push((index, offset));
        segment.remaining -= written as i64;
        let remaining = segment.remaining;

        self.last_index = index;

        if remaining < SEGMENT_TRIGGER_BYTES {
            self.cycle()?;
        }
        Ok(index)
    }

    /// Position of the segment holding `index`; `index` must be in bounds.
    fn segment_for(&self, index: i64) -> usize {
        self.segments
            .partition_point(|s| s.index <= index)
            .saturating_sub(1)
    }

    fn check_bounds(&self, index: i64) -> Result<()> {
        if index < self.first_index || index > self.last_index {
            return Err(LsmError::OutOfBounds {
                index,
                first: self.first_index,
                last: self.last_index,
            });
        }
        Ok(())
    }

    /// Read the entry stored at `index`.
    pub fn read(&mut self, index: i64) -> Result<Entry> {
        self.ensure_open()?;
        self.check_bounds(index)?;

        let pos = self.segment_for(index);
        let segment = &self.segments[pos];
        let slot = segment
            .entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .map_err(|_| LsmError::Corruption(format!("index {index} missing from segment")))?;
        let offset = segment.entries[slot].1;

        if pos + 1 == self.segments.len() {
            let reader = self.reader.as_mut().ok_or(LsmError::FileClosed)?;
            codec::decode_at(reader, offset)
        } else {
            let mut file = File::open(&segment.path)?;
            codec::decode_at(&mut file, offset)
        }
    }

    /// Replay every entry in index order until `f` returns false.
    pub fn scan<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(i64, Entry) -> bool,
    {
        self.ensure_open()?;
        for segment in &self.segments {
            if segment.entries.is_empty() {
                continue;
            }
            let mut reader = BufReader::new(File::open(&segment.path)?);
            for &(index, _) in &segment.entries {
                let entry = codec::decode(&mut reader)?;
                if !f(index, entry) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Drop every entry before `index`.
    ///
    /// Whole segments ahead of the one holding `index` are deleted; the
    /// surviving tail of that segment is copied into a fresh file named
    /// after `index`, which replaces the old file only once fully written.
    /// `index == last_index + 1` empties the log without resetting indices.
    pub fn truncate_front(&mut self, index: i64) -> Result<()> {
        self.ensure_open()?;
        if index < self.first_index || index > self.last_index + 1 {
            return Err(LsmError::OutOfBounds {
                index,
                first: self.first_index,
                last: self.last_index,
            });
        }
        if index == self.first_index {
            return Ok(());
        }

        if index == self.last_index + 1 {
            let active_has_entries = self.segments.last().map_or(false, |s| !s.entries.is_empty());
            if active_has_entries {
                self.cycle()?;
            }
            let keep = self.segments.len() - 1;
            self.remove_segments(keep)?;
            self.first_index = index;
            log::debug!("wal: emptied, next index {}", index);
            return Ok(());
        }

        let pos = self.segment_for(index);
        self.remove_segments(pos)?;
        if self.segments[0].index != index {
            self.rewrite_head(index)?;
        }
        self.first_index = index;
        log::debug!("wal: truncated front to {}", index);
        Ok(())
    }

    /// Delete the first `count` segments.
    fn remove_segments(&mut self, count: usize) -> Result<()> {
        for segment in self.segments.drain(..count) {
            fs::remove_file(&segment.path)?;
        }
        Ok(())
    }

    /// Rewrite the first segment so it starts at `index`.
    fn rewrite_head(&mut self, index: i64) -> Result<()> {
        let is_active = self.segments.len() == 1;
        let segment = &self.segments[0];
        let slot = segment
            .entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .map_err(|_| LsmError::Corruption(format!("index {index} missing from segment")))?;
        let cut = segment.entries[slot].1;
        let old_path = segment.path.clone();
        let new_path = self.dir.join(segment_name(index));
        let tmp_path = self.dir.join(format!("{}{TMP_SUFFIX}", segment_name(index)));

        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        {
            let mut src = File::open(&old_path)?;
            src.seek(SeekFrom::Start(cut))?;
            let mut dst = BufWriter::new(File::create(&tmp_path)?);
            io::copy(&mut src, &mut dst)?;
            dst.flush()?;
            dst.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &new_path)?;

        if is_active {
            self.writer = None;
            self.reader = None;
        }
        fs::remove_file(&old_path)?;

        let segment = &mut self.segments[0];
        segment.entries = segment.entries[slot..]
            .iter()
            .map(|&(i, off)| (i, off - cut))
            .collect();
        segment.index = index;
        segment.path = new_path;
        segment.remaining += cut as i64;

        if is_active {
            self.open_active()?;
        }
        Ok(())
    }

    /// Flush buffered bytes and fsync the active segment.
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Sync and release all file handles. Later calls fail with `FileClosed`.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        log::debug!("wal: closed {:?}", self.dir);
        Ok(())
    }

    pub fn first_index(&self) -> i64 {
        self.first_index
    }

    pub fn last_index(&self) -> i64 {
        self.last_index
    }

    /// True when no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.last_index < self.first_index
    }

    pub fn len(&self) -> usize {
        (self.last_index - self.first_index + 1).max(0) as usize
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment file paths in index order.
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }
}
