use crate::errors::WishlistError;
use crate::piece::{overlapping_range, FileIndex, FileMeta, FileRank, PieceIndex, PieceMeta, NO_FILE_RANK};
use itertools::Itertools;
use log::warn;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Derives the alphabetical ranking of the wanted files of a torrent, and the mapping from
/// each piece to the rank of the alphabetically earliest wanted file that owns it.
///
/// [`FileOrder`] is pure: it has no side effects and cannot fail. Call [`FileOrder::recalculate`]
/// whenever the wanted-file set changes or the torrent's metainfo is installed.
#[derive(Debug, Default)]
pub struct FileOrder {
    file_rank: HashMap<FileIndex, FileRank>,
    piece_file_rank: HashMap<PieceIndex, FileRank>,
}

impl FileOrder {
    /// Create an empty file order, as if no metainfo had been installed yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the alphabetical file ranking and the piece-to-file mapping from scratch.
    ///
    /// # Arguments
    ///
    /// * `files` - every file known to the torrent.
    /// * `wanted` - the set of file indexes the client currently wants.
    /// * `pieces` - every piece known to the torrent.
    pub fn recalculate(&mut self, files: &[FileMeta], wanted: &HashSet<FileIndex>, pieces: &[PieceMeta]) {
        self.file_rank.clear();
        self.piece_file_rank.clear();

        let ordered_wanted: Vec<&FileMeta> = files
            .iter()
            .filter(|file| wanted.contains(&file.index))
            .sorted_by(|a, b| compare_subpaths(&a.subpath, &b.subpath))
            .collect();

        for (rank, file) in ordered_wanted.iter().enumerate() {
            self.file_rank.insert(file.index, rank);
        }

        for piece in pieces {
            let piece_range = piece.torrent_byte_range();
            let rank = ordered_wanted
                .iter()
                .filter(|file| overlapping_range(file.torrent_byte_range(), piece_range.clone()).is_some())
                .filter_map(|file| self.file_rank.get(&file.index).copied())
                .min();

            if let Some(rank) = rank {
                self.piece_file_rank.insert(piece.index, rank);
                continue;
            }

            let overlaps_any_file = files
                .iter()
                .any(|file| overlapping_range(file.torrent_byte_range(), piece_range.clone()).is_some());
            if !overlaps_any_file {
                warn!("{}", WishlistError::NoOverlappingFile(piece.index));
            }
        }
    }

    /// Get the alphabetical rank of the given wanted file, or [None] if it is not currently wanted.
    pub fn file_rank(&self, file: FileIndex) -> Option<FileRank> {
        self.file_rank.get(&file).copied()
    }

    /// Get the alphabetical rank of the earliest wanted file that owns the given piece.
    /// Returns [`NO_FILE_RANK`] if no wanted file overlaps the piece.
    pub fn file_index_for_piece(&self, piece: PieceIndex) -> FileRank {
        self.piece_file_rank.get(&piece).copied().unwrap_or(NO_FILE_RANK)
    }
}

/// Split a subpath into its lowercased directory name and lowercased file name.
fn split_dirname_basename(path: &Path) -> (String, String) {
    let dirname = path
        .parent()
        .map(|p| p.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let basename = path
        .file_name()
        .map(|p| p.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    (dirname, basename)
}

/// Split a lowercased basename into its stem and extension (extension includes the leading dot).
fn split_stem_ext(basename: &str) -> (&str, &str) {
    match basename.rfind('.') {
        Some(idx) if idx > 0 => (&basename[..idx], &basename[idx..]),
        _ => (basename, ""),
    }
}

/// Compare two subpaths per the alphabetical file ordering rule:
/// dirname first, then basename with a prefix-wins tie-break on the stem.
pub(crate) fn compare_subpaths(a: &Path, b: &Path) -> Ordering {
    let (dir_a, base_a) = split_dirname_basename(a);
    let (dir_b, base_b) = split_dirname_basename(b);

    match dir_a.cmp(&dir_b) {
        Ordering::Equal => {}
        other => return other,
    }

    let (stem_a, ext_a) = split_stem_ext(&base_a);
    let (stem_b, ext_b) = split_stem_ext(&base_b);

    if ext_a == ext_b && stem_a != stem_b {
        let a_is_shorter = stem_a.len() < stem_b.len();
        let (shorter, longer) = if a_is_shorter { (stem_a, stem_b) } else { (stem_b, stem_a) };

        if longer.starts_with(shorter) {
            return if a_is_shorter { Ordering::Less } else { Ordering::Greater };
        }
    }

    base_a.cmp(&base_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(index: FileIndex, subpath: &str, offset: usize, length: usize) -> FileMeta {
        FileMeta {
            index,
            subpath: PathBuf::from(subpath),
            torrent_offset: offset,
            length,
            mime: None,
        }
    }

    fn piece(index: PieceIndex, offset: usize, length: usize) -> PieceMeta {
        PieceMeta { index, offset, length }
    }

    #[test]
    fn test_compare_subpaths_dirname_first() {
        let a = PathBuf::from("b/file.mkv");
        let b = PathBuf::from("a/file.mkv");

        assert_eq!(Ordering::Greater, compare_subpaths(&a, &b));
    }

    #[test]
    fn test_compare_subpaths_prefix_wins() {
        let a = PathBuf::from("Show.mkv");
        let b = PathBuf::from("Show.Bonus.mkv");

        assert_eq!(Ordering::Less, compare_subpaths(&a, &b));
        assert_eq!(Ordering::Greater, compare_subpaths(&b, &a));
    }

    #[test]
    fn test_compare_subpaths_case_insensitive() {
        let a = PathBuf::from("ALPHA.mkv");
        let b = PathBuf::from("beta.mkv");

        assert_eq!(Ordering::Less, compare_subpaths(&a, &b));
    }

    #[test]
    fn test_compare_subpaths_different_extension_falls_back_to_basename() {
        let a = PathBuf::from("show.mkv");
        let b = PathBuf::from("show.nfo");

        assert_eq!(Ordering::Less, compare_subpaths(&a, &b));
    }

    #[test]
    fn test_recalculate_assigns_dense_ranks_to_wanted_files_only() {
        let files = vec![
            file(0, "b.mkv", 0, 100),
            file(1, "a.mkv", 100, 100),
            file(2, "c.mkv", 200, 100),
        ];
        let wanted: HashSet<FileIndex> = [0, 1].into_iter().collect();
        let pieces = vec![piece(0, 0, 50), piece(1, 100, 50)];

        let mut order = FileOrder::new();
        order.recalculate(&files, &wanted, &pieces);

        assert_eq!(Some(1), order.file_rank(0));
        assert_eq!(Some(0), order.file_rank(1));
        assert_eq!(None, order.file_rank(2));
    }

    #[test]
    fn test_piece_file_rank_picks_earliest_wanted_overlapping_file() {
        let files = vec![file(0, "b.mkv", 0, 100), file(1, "a.mkv", 50, 100)];
        let wanted: HashSet<FileIndex> = [0, 1].into_iter().collect();
        // piece spans bytes 40..60, overlapping both files
        let pieces = vec![piece(0, 40, 20)];

        let mut order = FileOrder::new();
        order.recalculate(&files, &wanted, &pieces);

        // a.mkv (file 1) has rank 0, b.mkv (file 0) has rank 1; the piece should be credited
        // to the alphabetically earliest wanted file, i.e. rank 0.
        assert_eq!(0, order.file_index_for_piece(0));
    }

    #[test]
    fn test_piece_with_no_wanted_overlapping_file_is_sentinel() {
        let files = vec![file(0, "a.mkv", 0, 100)];
        let wanted: HashSet<FileIndex> = HashSet::new();
        let pieces = vec![piece(0, 0, 50)];

        let mut order = FileOrder::new();
        order.recalculate(&files, &wanted, &pieces);

        assert_eq!(NO_FILE_RANK, order.file_index_for_piece(0));
    }

    #[test]
    fn test_piece_overlapping_no_file_at_all_is_also_sentinel() {
        let files = vec![file(0, "a.mkv", 0, 100)];
        let wanted: HashSet<FileIndex> = [0].into_iter().collect();
        // piece at byte 200 doesn't overlap the only known file at all (a Mediator-side bug).
        let pieces = vec![piece(0, 200, 50)];

        let mut order = FileOrder::new();
        order.recalculate(&files, &wanted, &pieces);

        assert_eq!(NO_FILE_RANK, order.file_index_for_piece(0));
    }
}
