use crate::piece::{BlockIndex, BlockSpan, FileRank, PieceIndex, Priority};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

/// A wanted, not-yet-owned piece tracked by the [`crate::wishlist::Wishlist`].
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The piece this candidate tracks.
    pub piece: PieceIndex,
    /// The current block span covering the piece. Narrowed by a hash failure reset is undone by
    /// [`Candidate::reset_blocks`], which restores it from `raw_block_span`.
    pub block_span: BlockSpan,
    /// The block span of the piece as originally reported by the Mediator, kept so a bad-piece
    /// reset doesn't need to re-query it.
    pub raw_block_span: BlockSpan,
    /// The alphabetical rank of the earliest wanted file owning this piece.
    pub file_rank: FileRank,
    /// The effective priority of this piece, as reported by the Mediator.
    pub priority: Priority,
    /// Whether this piece lies in a wanted video file's tail region.
    pub is_in_file_tail: bool,
    /// Whether this piece belongs to a priority file (disc index, album cover).
    pub is_in_priority_file: bool,
    /// The blocks of this piece that are neither owned nor outstanding, and so can be requested
    /// immediately. Ordered so the low end is cheap to enumerate.
    pub unrequested: BTreeSet<BlockIndex>,
}

impl Candidate {
    /// Reset this candidate's block span back to its raw value and re-seed its unrequested set
    /// with every block that is not currently owned. Used after a hash validation failure.
    pub fn reset_blocks(&mut self, not_owned: impl Fn(BlockIndex) -> bool) {
        self.block_span = self.raw_block_span.clone();
        self.unrequested = self.block_span.clone().filter(|b| not_owned(*b)).collect();
    }

    /// The discrete ordering band within a file: priority files first, then tail pieces, then
    /// the rest. A priority-file piece that also happens to be in the tail is not split further
    /// by tail-ness — priority-file status alone places it in the top band.
    fn band(&self) -> u8 {
        if self.is_in_priority_file {
            0
        } else if self.is_in_file_tail {
            1
        } else {
            2
        }
    }

    fn sort_key(&self) -> (Reverse<Priority>, FileRank, u8, PieceIndex) {
        (Reverse(self.priority), self.file_rank, self.band(), self.piece)
    }
}

/// The ordered collection of [`Candidate`]s a [`crate::wishlist::Wishlist`] selects from.
///
/// Maintains three views over the same data: a sort-order vector of piece indexes, a hash map
/// from piece index to [`Candidate`] for O(1) membership, and a hash map from block index to
/// owning piece index so `sent_request`/`got_block`/... handlers don't need a linear scan.
#[derive(Debug, Default)]
pub struct CandidateSet {
    order: Vec<PieceIndex>,
    by_piece: HashMap<PieceIndex, Candidate>,
    block_owner: HashMap<BlockIndex, PieceIndex>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new candidate and keep the order invariant.
    pub fn insert(&mut self, candidate: Candidate) {
        for block in candidate.block_span.clone() {
            self.block_owner.insert(block, candidate.piece);
        }

        self.order.push(candidate.piece);
        self.by_piece.insert(candidate.piece, candidate);
        self.resort();
    }

    /// Remove the candidate for the given piece, if any.
    pub fn remove(&mut self, piece: PieceIndex) -> Option<Candidate> {
        let candidate = self.by_piece.remove(&piece)?;
        self.order.retain(|p| *p != piece);

        for block in candidate.block_span.clone() {
            self.block_owner.remove(&block);
        }

        Some(candidate)
    }

    /// Remove every candidate.
    pub fn clear(&mut self) {
        self.order.clear();
        self.by_piece.clear();
        self.block_owner.clear();
    }

    pub fn get(&self, piece: PieceIndex) -> Option<&Candidate> {
        self.by_piece.get(&piece)
    }

    pub fn get_mut(&mut self, piece: PieceIndex) -> Option<&mut Candidate> {
        self.by_piece.get_mut(&piece)
    }

    /// Find which candidate, if any, currently owns the given block.
    pub fn piece_for_block(&self, block: BlockIndex) -> Option<PieceIndex> {
        self.block_owner.get(&block).copied()
    }

    /// Re-sort the order vector. Call after mutating priority, file rank, or the boost flags of
    /// any candidate.
    pub fn resort(&mut self) {
        let by_piece = &self.by_piece;
        self.order
            .sort_by(|a, b| by_piece[a].sort_key().cmp(&by_piece[b].sort_key()));
    }

    /// Iterate candidates in selection order (best next first).
    pub fn iter_in_order(&self) -> impl Iterator<Item = &Candidate> {
        self.order.iter().map(move |piece| &self.by_piece[piece])
    }

    /// Iterate the piece indexes currently tracked, in no particular order.
    pub fn pieces(&self) -> impl Iterator<Item = PieceIndex> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(piece: PieceIndex, priority: Priority, file_rank: FileRank) -> Candidate {
        Candidate {
            piece,
            block_span: (piece * 4)..(piece * 4 + 4),
            raw_block_span: (piece * 4)..(piece * 4 + 4),
            file_rank,
            priority,
            is_in_file_tail: false,
            is_in_priority_file: false,
            unrequested: ((piece * 4)..(piece * 4 + 4)).collect(),
        }
    }

    #[test]
    fn test_insert_and_resort_orders_by_priority_then_file_rank_then_piece() {
        let mut set = CandidateSet::new();
        set.insert(candidate(2, Priority::Normal, 0));
        set.insert(candidate(0, Priority::High, 1));
        set.insert(candidate(1, Priority::High, 0));

        let order: Vec<_> = set.iter_in_order().map(|c| c.piece).collect();
        assert_eq!(vec![1, 0, 2], order);
    }

    #[test]
    fn test_priority_file_and_tail_break_ties_within_a_file() {
        let mut set = CandidateSet::new();
        let mut body = candidate(1, Priority::Normal, 0);
        let mut tail = candidate(2, Priority::Normal, 0);
        let mut priority_file = candidate(3, Priority::Normal, 0);
        tail.is_in_file_tail = true;
        priority_file.is_in_priority_file = true;
        body.is_in_file_tail = false;

        set.insert(body);
        set.insert(tail);
        set.insert(priority_file);

        let order: Vec<_> = set.iter_in_order().map(|c| c.piece).collect();
        assert_eq!(vec![3, 2, 1], order);
    }

    #[test]
    fn test_remove_drops_block_ownership() {
        let mut set = CandidateSet::new();
        set.insert(candidate(0, Priority::Normal, 0));

        assert_eq!(Some(0), set.piece_for_block(1));
        set.remove(0);
        assert_eq!(None, set.piece_for_block(1));
        assert!(set.is_empty());
    }

    #[test]
    fn test_piece_for_block_lookup() {
        let mut set = CandidateSet::new();
        set.insert(candidate(5, Priority::Normal, 0));

        assert_eq!(Some(5), set.piece_for_block(21));
        assert_eq!(None, set.piece_for_block(99));
    }
}
