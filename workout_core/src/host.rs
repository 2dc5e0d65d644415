//! Host documents that embed workout blocks.
//!
//! A workout block is a fenced code block in a markdown document:
//!
//! ````text
//! ```workout
//! title: Leg Day
//! ---
//! - [ ] Squat | Reps: [10]
//! ```
//! ````
//!
//! Writes are validated: the fences must still be where we last saw them and
//! the block must still carry the title we expect, so a write never lands on
//! another workout after the document shifted.

use crate::parser::parse_workout;
use crate::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Where a workout block sits inside its host document
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    /// Identifies the document (a path, or any name for in-memory text)
    pub source: String,
    /// Line of the opening fence
    pub start_line: usize,
    /// Line of the closing fence
    pub end_line: usize,
}

impl BlockLocation {
    /// Stable identifier used to key the block's timer
    pub fn workout_id(&self) -> String {
        format!("{}:{}", self.source, self.start_line)
    }
}

/// The document collaborator used by a `WorkoutSession`
pub trait HostDocument {
    /// Every workout block currently in the document
    fn blocks(&self) -> Result<Vec<BlockLocation>>;

    /// Inner text of the block at `location`
    fn read_block(&self, location: &BlockLocation) -> Result<String>;

    /// Replace the block's inner text, refusing if its title is not
    /// `expected_title`. Returns the block's location after the write.
    fn replace_block(
        &mut self,
        location: &BlockLocation,
        expected_title: Option<&str>,
        content: &str,
    ) -> Result<BlockLocation>;
}

fn is_opening_fence(line: &str, fence: &str) -> bool {
    line.trim_start()
        .strip_prefix("```")
        .map(|info| info.trim().eq_ignore_ascii_case(fence))
        .unwrap_or(false)
}

fn is_closing_fence(line: &str) -> bool {
    line.trim() == "```"
}

/// Find every fenced workout block in `text`
pub fn find_workout_blocks(source: &str, text: &str, fence: &str) -> Vec<BlockLocation> {
    let mut blocks = Vec::new();
    let mut open: Option<usize> = None;

    for (i, line) in text.split('\n').enumerate() {
        match open {
            None if is_opening_fence(line, fence) => open = Some(i),
            Some(start) if is_closing_fence(line) => {
                blocks.push(BlockLocation {
                    source: source.to_string(),
                    start_line: start,
                    end_line: i,
                });
                open = None;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        tracing::debug!("Ignoring unclosed workout block at line {} of {}", start, source);
    }
    blocks
}

fn check_fences<'a>(
    lines: &[&'a str],
    location: &BlockLocation,
    fence: &str,
) -> Result<Vec<&'a str>> {
    let start_ok = lines
        .get(location.start_line)
        .map_or(false, |l| is_opening_fence(l, fence));
    let end_ok = location.end_line > location.start_line
        && lines.get(location.end_line).map_or(false, |l| is_closing_fence(l));

    if !start_ok || !end_ok {
        return Err(Error::BlockNotFound(format!(
            "{} lines {}-{}",
            location.source, location.start_line, location.end_line
        )));
    }
    Ok(lines[location.start_line + 1..location.end_line].to_vec())
}

/// Inner text of the block at `location`
pub fn read_block_in_text(text: &str, location: &BlockLocation, fence: &str) -> Result<String> {
    let lines: Vec<&str> = text.split('\n').collect();
    Ok(check_fences(&lines, location, fence)?.join("\n"))
}

/// Splice `content` into the block at `location`
///
/// Returns the new document text and the block's new location.
pub fn replace_block_in_text(
    text: &str,
    location: &BlockLocation,
    fence: &str,
    expected_title: Option<&str>,
    content: &str,
) -> Result<(String, BlockLocation)> {
    let lines: Vec<&str> = text.split('\n').collect();
    let inner = check_fences(&lines, location, fence)?.join("\n");

    let found = parse_workout(&inner).metadata.title;
    if found.as_deref() != expected_title {
        return Err(Error::TitleMismatch {
            expected: expected_title.map(str::to_string),
            found,
        });
    }

    let content_lines: Vec<&str> = content.split('\n').collect();
    let end_line = location.start_line + 1 + content_lines.len();

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + content_lines.len());
    out.extend_from_slice(&lines[..=location.start_line]);
    out.extend_from_slice(&content_lines);
    out.extend_from_slice(&lines[location.end_line..]);

    Ok((
        out.join("\n"),
        BlockLocation {
            end_line,
            ..location.clone()
        },
    ))
}

// ============================================================================
// In-memory document
// ============================================================================

/// Markdown text held in memory
#[derive(Clone, Debug)]
pub struct MemoryDocument {
    name: String,
    text: String,
    fence: String,
}

impl MemoryDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            fence: crate::config::DEFAULT_FENCE.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the whole document, as an editor would on an external edit
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

impl HostDocument for MemoryDocument {
    fn blocks(&self) -> Result<Vec<BlockLocation>> {
        Ok(find_workout_blocks(&self.name, &self.text, &self.fence))
    }

    fn read_block(&self, location: &BlockLocation) -> Result<String> {
        read_block_in_text(&self.text, location, &self.fence)
    }

    fn replace_block(
        &mut self,
        location: &BlockLocation,
        expected_title: Option<&str>,
        content: &str,
    ) -> Result<BlockLocation> {
        let (text, location) =
            replace_block_in_text(&self.text, location, &self.fence, expected_title, content)?;
        self.text = text;
        Ok(location)
    }
}

// ============================================================================
// File-backed document
// ============================================================================

/// A markdown file on disk
///
/// Writes replace the file atomically through a temp file in the same
/// directory. The rename gives the path a new inode, so locks are taken on a
/// sidecar `.<name>.lock` file next to it rather than on the file itself.
#[derive(Clone, Debug)]
pub struct MarkdownFile {
    path: PathBuf,
    fence: String,
}

impl MarkdownFile {
    pub fn new(path: impl Into<PathBuf>, fence: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fence: fence.into(),
        }
    }

    pub fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> Result<File> {
        File::open(&self.path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::BlockNotFound(self.source()),
                _ => Error::Io(e),
            })
    }

    /// Path of the lock file shared by every writer of this document
    pub fn lock_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parent_dir().join(format!(".{}.lock", name))
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?)
    }

    fn read_unlocked(&self) -> Result<String> {
        let file = self.open()?;
        let mut contents = String::new();
        std::io::BufReader::new(&file).read_to_string(&mut contents)?;
        Ok(contents)
    }

    /// Read the whole document under a shared lock
    pub fn read_text(&self) -> Result<String> {
        // surface a missing document before touching the lock file
        drop(self.open()?);
        let lock = self.lock_file()?;
        lock.lock_shared()?;
        let result = self.read_unlocked();
        lock.unlock()?;
        result
    }

    /// Replace the whole document atomically
    pub fn write_text(&self, contents: &str) -> Result<()> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let result = self.persist(contents);
        lock.unlock()?;
        result
    }

    fn replace_locked(
        &self,
        location: &BlockLocation,
        expected_title: Option<&str>,
        content: &str,
    ) -> Result<BlockLocation> {
        let text = self.read_unlocked()?;
        let (updated, location) =
            replace_block_in_text(&text, location, &self.fence, expected_title, content)?;
        self.persist(&updated)?;
        Ok(location)
    }

    fn persist(&self, contents: &str) -> Result<()> {
        let temp = NamedTempFile::new_in(self.parent_dir())?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl HostDocument for MarkdownFile {
    fn blocks(&self) -> Result<Vec<BlockLocation>> {
        Ok(find_workout_blocks(
            &self.source(),
            &self.read_text()?,
            &self.fence,
        ))
    }

    fn read_block(&self, location: &BlockLocation) -> Result<String> {
        read_block_in_text(&self.read_text()?, location, &self.fence)
    }

    fn replace_block(
        &mut self,
        location: &BlockLocation,
        expected_title: Option<&str>,
        content: &str,
    ) -> Result<BlockLocation> {
        // validate before creating the lock file
        drop(self.open()?);
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let result = self.replace_locked(location, expected_title, content);
        lock.unlock()?;
        if result.is_ok() {
            tracing::debug!("Wrote workout block to {:?}", self.path);
        }
        result
    }
}
