//! Reading entries out of a resolved archive.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use crate::checksum::verify;
use crate::decoder::decode_folder;
use crate::error::{ArchiveError, ChecksumField, Result};
use crate::index::{ArchiveIndex, EntryRecord};

pub struct Extractor<'a, S: Read + Seek> {
    stream: &'a mut S,
    index:  &'a ArchiveIndex,
}

impl<'a, S: Read + Seek> Extractor<'a, S> {
    pub(crate) fn new(stream: &'a mut S, index: &'a ArchiveIndex) -> Self {
        Self { stream, index }
    }

    pub fn entries(&self) -> &'a [EntryRecord] {
        &self.index.entries
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.find(name)
    }

    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let idx = self.find(name).ok_or_else(|| {
            ArchiveError::Io(io::Error::new(io::ErrorKind::NotFound, format!("File not found: {name}")))
        })?;
        self.read_entry(idx)
    }

    pub fn read_entry(&mut self, idx: usize) -> Result<Vec<u8>> {
        let index = self.index;
        let entry = index.entries.get(idx).ok_or_else(|| {
            ArchiveError::Io(io::Error::new(io::ErrorKind::NotFound, format!("No entry #{idx}")))
        })?;
        let unpacked = match entry.folder {
            Some(f) => self.unpack(f)?,
            None => Vec::new(),
        };
        let data = slice_entry(entry, &unpacked)?;
        Ok(data.to_vec())
    }

    /// Decode every folder once and check every entry.  Returns the number of
    /// entries verified.
    pub fn test(&mut self) -> Result<usize> {
        let index = self.index;
        check_folder_refs(index)?;
        let mut checked = 0;
        for f in 0..index.folders.len() {
            let unpacked = self.unpack(f)?;
            for entry in index.entries.iter().filter(|e| e.folder == Some(f)) {
                slice_entry(entry, &unpacked)?;
                checked += 1;
            }
        }
        for entry in index.entries.iter().filter(|e| e.folder.is_none()) {
            slice_entry(entry, &[])?;
            checked += 1;
        }
        Ok(checked)
    }

    /// Extract all entries below `dest`, creating it if necessary.  Every
    /// name is checked before anything is written, and each folder is
    /// decoded once.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> Result<()> {
        let dest = dest.as_ref();
        let index = self.index;
        check_folder_refs(index)?;
        let targets = index
            .entries
            .iter()
            .map(|e| safe_relative_path(&e.name).map(|p| dest.join(p)))
            .collect::<Result<Vec<_>>>()?;
        fs::create_dir_all(dest)?;

        for f in 0..index.folders.len() {
            let unpacked = self.unpack(f)?;
            for (entry, target) in index.entries.iter().zip(&targets).filter(|(e, _)| e.folder == Some(f)) {
                write_file(target, slice_entry(entry, &unpacked)?)?;
            }
        }
        for (entry, target) in index.entries.iter().zip(&targets).filter(|(e, _)| e.folder.is_none()) {
            write_file(target, slice_entry(entry, &[])?)?;
        }
        Ok(())
    }

    fn unpack(&mut self, folder: usize) -> Result<Vec<u8>> {
        let index = self.index;
        let folder = index.folders.get(folder).ok_or_else(|| {
            ArchiveError::format(format!("entry refers to missing folder #{folder}"))
        })?;
        Ok(decode_folder(&mut *self.stream, folder)?)
    }
}

fn slice_entry<'d>(entry: &EntryRecord, unpacked: &'d [u8]) -> Result<&'d [u8]> {
    let range = entry
        .offset
        .checked_add(entry.size)
        .filter(|&end| end <= unpacked.len() as u64)
        .map(|end| entry.offset as usize..end as usize)
        .ok_or_else(|| {
            ArchiveError::format(format!(
                "entry {:?} range {}+{} exceeds its folder ({} bytes)",
                entry.name,
                entry.offset,
                entry.size,
                unpacked.len()
            ))
        })?;
    let data = &unpacked[range];
    if let Some(crc) = entry.crc {
        verify(ChecksumField::Entry, crc, data)?;
    }
    Ok(data)
}

/// Folder-wise passes would otherwise skip entries pointing past the folder list.
fn check_folder_refs(index: &ArchiveIndex) -> Result<()> {
    match index.entries.iter().find(|e| e.folder.is_some_and(|f| f >= index.folders.len())) {
        Some(e) => Err(ArchiveError::format(format!("entry {:?} refers to a missing folder", e.name))),
        None => Ok(()),
    }
}

fn write_file(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(target)?.write_all(data)?;
    Ok(())
}

/// Reject absolute names and `..` components.
fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::format(format!("unsafe entry name {name:?}"))),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ArchiveError::format(format!("empty entry name {name:?}")));
    }
    Ok(out)
}
