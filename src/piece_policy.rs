use crate::piece::{overlapping_range, FileIndex, FileMeta, PieceMeta};
use std::collections::HashSet;

/// The minimum size of a file tail region, in bytes.
const MIN_TAIL_SIZE: usize = 1024 * 1024;
/// The maximum size of a file tail region, in bytes.
const MAX_TAIL_SIZE: usize = 20 * 1024 * 1024;
/// The fraction of a file's length used to derive its tail size before clamping.
const TAIL_FRACTION: f64 = 0.02;

const VIDEO_EXTENSIONS: &[&str] = &["avi", "mp4", "mkv", "mov", "m4v", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["cue"];
const DISC_INDEX_EXTENSIONS: &[&str] = &["ifo", "bup"];
const DISC_INDEX_BASENAMES: &[&str] = &["index.bdmv", "movieobject.bdmv"];
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Pure predicates over a single piece: whether it lies in a file's tail region, and whether it
/// belongs to a "priority file" (disc navigation index or album cover) that unlocks playback
/// earlier than its raw priority would suggest.
///
/// [`PiecePolicy`] holds no per-piece state; `has_audio_and_cover` is the only thing derived once,
/// at metainfo install time, since album-cover treatment depends on the torrent as a whole.
#[derive(Debug, Clone, Copy)]
pub struct PiecePolicy {
    has_audio_and_cover: bool,
}

impl PiecePolicy {
    /// Derive the policy flags from the full set of files known to the torrent.
    pub fn new(files: &[FileMeta]) -> Self {
        let has_audio = files.iter().any(is_audio_file);
        let has_cover = files.iter().any(is_cover_candidate);

        Self {
            has_audio_and_cover: has_audio && has_cover,
        }
    }

    /// Check whether the given piece overlaps the tail region of at least one wanted video file.
    pub fn is_in_file_tail(&self, piece: &PieceMeta, files: &[FileMeta], wanted: &HashSet<FileIndex>) -> bool {
        files
            .iter()
            .filter(|file| wanted.contains(&file.index))
            .filter(|file| is_video_file(file))
            .any(|file| piece_overlaps_tail(piece, file))
    }

    /// Check whether the given piece overlaps at least one wanted priority file.
    pub fn is_in_priority_file(&self, piece: &PieceMeta, files: &[FileMeta], wanted: &HashSet<FileIndex>) -> bool {
        files
            .iter()
            .filter(|file| wanted.contains(&file.index))
            .filter(|file| overlapping_range(file.torrent_byte_range(), piece.torrent_byte_range()).is_some())
            .any(|file| self.is_priority_file(file))
    }

    fn is_priority_file(&self, file: &FileMeta) -> bool {
        if has_extension(file, DISC_INDEX_EXTENSIONS) {
            return true;
        }

        if has_basename(file, DISC_INDEX_BASENAMES) {
            return true;
        }

        if self.has_audio_and_cover && has_extension(file, COVER_EXTENSIONS) {
            return true;
        }

        false
    }
}

fn tail_size(file_length: usize) -> usize {
    let raw = (file_length as f64 * TAIL_FRACTION) as usize;
    raw.clamp(MIN_TAIL_SIZE, MAX_TAIL_SIZE)
}

fn piece_overlaps_tail(piece: &PieceMeta, file: &FileMeta) -> bool {
    let file_range = file.torrent_byte_range();
    let tail_size = tail_size(file.length).min(file.length);
    let tail_start = file_range.end - tail_size;
    let piece_range = piece.torrent_byte_range();

    piece_range.end > tail_start && piece_range.start < file_range.end
}

fn extension(file: &FileMeta) -> Option<String> {
    file.subpath.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn basename(file: &FileMeta) -> Option<String> {
    file.subpath.file_name().map(|n| n.to_string_lossy().to_lowercase())
}

fn has_extension(file: &FileMeta, candidates: &[&str]) -> bool {
    extension(file).is_some_and(|ext| candidates.contains(&ext.as_str()))
}

fn has_basename(file: &FileMeta, candidates: &[&str]) -> bool {
    basename(file).is_some_and(|name| candidates.contains(&name.as_str()))
}

fn is_video_file(file: &FileMeta) -> bool {
    if let Some(mime) = &file.mime {
        if mime.starts_with("video/") {
            return true;
        }
    }

    has_extension(file, VIDEO_EXTENSIONS)
}

fn is_audio_file(file: &FileMeta) -> bool {
    if let Some(mime) = &file.mime {
        if mime.starts_with("audio/") {
            return true;
        }
    }

    has_extension(file, AUDIO_EXTENSIONS)
}

fn is_cover_candidate(file: &FileMeta) -> bool {
    has_extension(file, COVER_EXTENSIONS)
}
