use crate::candidate::{Candidate, CandidateSet};
use crate::mediator::{Mediator, MediatorEvent};
use crate::piece::{BlockIndex, BlockSpan, FileRank, PieceIndex, Priority};
use bit_vec::BitVec;
use fx_callback::Callback;
use log::{debug, trace, warn};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

/// The mutable state of a [`Wishlist`], guarded by a plain (non-async) lock so that neither
/// `next()` nor an event handler ever suspends, per the engine's single-threaded-per-torrent
/// scheduling model.
struct State {
    candidates: CandidateSet,
    outstanding: BitVec,
}

/// The stateful piece and block selection engine for a single torrent.
///
/// A [`Wishlist`] owns the sorted [`CandidateSet`] of wanted, not-yet-owned pieces and the
/// torrent-wide outstanding-request bitmap. It subscribes to its [`Mediator`]'s event stream on
/// construction and reacts to the ten named events described by [`MediatorEvent`]; the only
/// public entry point for a peer manager is [`Wishlist::next`].
pub struct Wishlist {
    state: Arc<RwLock<State>>,
    mediator: Arc<dyn Mediator>,
    dispatch_task: JoinHandle<()>,
}

impl Wishlist {
    /// Build the engine around the given [`Mediator`], subscribe to its event stream, and
    /// populate the initial candidate set from its current wanted/owned state.
    pub fn new(mediator: Arc<dyn Mediator>) -> Self {
        let mut candidates = CandidateSet::new();
        Self::rebuild_candidates(&mut candidates, &*mediator);

        let state = Arc::new(RwLock::new(State {
            candidates,
            outstanding: BitVec::from_elem(mediator.block_count(), false),
        }));

        let mut subscription = mediator.subscribe();
        let dispatch_state = state.clone();
        let dispatch_mediator = mediator.clone();
        let dispatch_task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let mut guard = dispatch_state
                    .write()
                    .expect("wishlist state lock should not be poisoned");
                Self::handle_event(&mut guard, &*dispatch_mediator, &*event);
            }
        });

        Self {
            state,
            mediator,
            dispatch_task,
        }
    }

    /// Select up to `n` blocks this peer can be asked for next, as merged contiguous spans.
    pub fn next(&self, n: usize, peer_has_piece: impl Fn(PieceIndex) -> bool) -> Vec<BlockSpan> {
        if n == 0 {
            return Vec::new();
        }

        let sequential = self.mediator.is_sequential_download();
        let state = self
            .state
            .read()
            .expect("wishlist state lock should not be poisoned");

        let mut picked = Self::scan(&state.candidates, &*self.mediator, n, &peer_has_piece, sequential, false);
        if picked.is_empty() {
            picked = Self::scan(&state.candidates, &*self.mediator, n, &peer_has_piece, sequential, true);
        }
        drop(state);

        Self::merge_spans(picked)
    }

    /// Convenience overload of [`Wishlist::next`] for a peer known to have every piece.
    pub fn next_from_any(&self, n: usize) -> Vec<BlockSpan> {
        self.next(n, |_| true)
    }

    fn rebuild_candidates(candidates: &mut CandidateSet, mediator: &dyn Mediator) {
        candidates.clear();

        for piece in 0..mediator.piece_count() {
            if mediator.client_wants_piece(piece) && !mediator.client_has_piece(piece) {
                candidates.insert(Self::new_candidate(mediator, piece));
            }
        }
    }

    fn new_candidate(mediator: &dyn Mediator, piece: PieceIndex) -> Candidate {
        let span = mediator.block_span(piece);
        let unrequested = span.clone().filter(|block| !mediator.client_has_block(*block)).collect();

        Candidate {
            piece,
            block_span: span.clone(),
            raw_block_span: span,
            file_rank: mediator.file_index_for_piece(piece),
            priority: mediator.priority(piece),
            is_in_file_tail: mediator.is_piece_in_file_tail(piece),
            is_in_priority_file: mediator.is_piece_in_priority_file(piece),
            unrequested,
        }
    }

    fn handle_event(state: &mut State, mediator: &dyn Mediator, event: &MediatorEvent) {
        trace!("handling mediator event: {}", event);

        match event {
            MediatorEvent::FilesWantedChanged { .. } => {
                debug!("wanted file set changed, rebuilding candidate set");
                Self::rebuild_candidates(&mut state.candidates, mediator);
            }
            MediatorEvent::PriorityChanged { .. } => {
                debug!("piece priorities changed, refreshing candidate set");
                for piece in state.candidates.pieces().collect::<Vec<_>>() {
                    if let Some(candidate) = state.candidates.get_mut(piece) {
                        candidate.priority = mediator.priority(piece);
                        candidate.file_rank = mediator.file_index_for_piece(piece);
                    }
                }
                state.candidates.resort();
            }
            MediatorEvent::SentRequest { blocks, .. } => {
                for block in blocks.clone() {
                    Self::set_outstanding(&mut state.outstanding, block, true);
                    if let Some(piece) = state.candidates.piece_for_block(block) {
                        if let Some(candidate) = state.candidates.get_mut(piece) {
                            candidate.unrequested.remove(&block);
                        }
                    }
                }
            }
            MediatorEvent::SentCancel { block, .. } => {
                // the block is not reinserted into the unrequested set here; see the crate's
                // design notes on why sent_cancel only clears the outstanding bit.
                Self::set_outstanding(&mut state.outstanding, *block, false);
            }
            MediatorEvent::GotReject { block, .. } => {
                Self::set_outstanding(&mut state.outstanding, *block, false);
                Self::reinstate_if_not_owned(state, mediator, *block);
            }
            MediatorEvent::GotChoke { requests, .. } => {
                for block in set_bits(requests) {
                    Self::set_outstanding(&mut state.outstanding, block, false);
                    Self::reinstate_if_not_owned(state, mediator, block);
                }
            }
            MediatorEvent::PeerDisconnect { requests, .. } => {
                for block in set_bits(requests) {
                    Self::set_outstanding(&mut state.outstanding, block, false);
                    Self::reinstate_if_not_owned(state, mediator, block);
                }
            }
            MediatorEvent::GotBlock { block } => {
                Self::set_outstanding(&mut state.outstanding, *block, false);
                if let Some(piece) = state.candidates.piece_for_block(*block) {
                    if let Some(candidate) = state.candidates.get_mut(piece) {
                        candidate.unrequested.remove(block);
                    }
                }
            }
            MediatorEvent::PieceCompleted { piece } => {
                trace!("piece {} completed, dropping its candidate", piece);
                state.candidates.remove(*piece);
            }
            MediatorEvent::GotBadPiece { piece } => {
                warn!("piece {} failed validation, resetting its blocks", piece);
                if let Some(candidate) = state.candidates.get_mut(*piece) {
                    candidate.reset_blocks(|block| !mediator.client_has_block(block));
                }
            }
        }
    }

    fn reinstate_if_not_owned(state: &mut State, mediator: &dyn Mediator, block: BlockIndex) {
        if mediator.client_has_block(block) {
            return;
        }

        if let Some(piece) = state.candidates.piece_for_block(block) {
            if let Some(candidate) = state.candidates.get_mut(piece) {
                candidate.unrequested.insert(block);
            }
        }
    }

    fn set_outstanding(outstanding: &mut BitVec, block: BlockIndex, value: bool) {
        if block < outstanding.len() {
            outstanding.set(block, value);
        }
    }

    fn scan(
        candidates: &CandidateSet,
        mediator: &dyn Mediator,
        n: usize,
        peer_has_piece: &impl Fn(PieceIndex) -> bool,
        sequential: bool,
        endgame: bool,
    ) -> Vec<BlockIndex> {
        let mut picked = Vec::new();
        let mut current_file: Option<(Priority, FileRank)> = None;

        for candidate in candidates.iter_in_order() {
            if picked.len() >= n {
                break;
            }
            if !peer_has_piece(candidate.piece) {
                continue;
            }
            if !endgame && candidate.unrequested.is_empty() {
                continue;
            }

            if sequential {
                let key = (candidate.priority, candidate.file_rank);
                match current_file {
                    None => current_file = Some(key),
                    Some(current) if current != key => {
                        if !picked.is_empty() {
                            break;
                        }
                        current_file = Some(key);
                    }
                    _ => {}
                }
            }

            let remaining = n - picked.len();
            if !endgame {
                for block in candidate.unrequested.iter().take(remaining) {
                    picked.push(*block);
                }
            } else {
                for block in candidate.block_span.clone() {
                    if picked.len() >= n {
                        break;
                    }
                    if mediator.client_has_block(block) {
                        continue;
                    }
                    picked.push(block);
                }
            }
        }

        picked
    }

    fn merge_spans(mut blocks: Vec<BlockIndex>) -> Vec<BlockSpan> {
        blocks.sort_unstable();
        blocks.dedup();

        let mut spans = Vec::new();
        let mut iter = blocks.into_iter();

        if let Some(first) = iter.next() {
            let mut start = first;
            let mut end = first + 1;

            for block in iter {
                if block == end {
                    end += 1;
                } else {
                    spans.push(start..end);
                    start = block;
                    end = block + 1;
                }
            }

            spans.push(start..end);
        }

        spans
    }
}

impl Drop for Wishlist {
    fn drop(&mut self) {
        self.dispatch_task.abort();
    }
}

fn set_bits(bits: &BitVec) -> impl Iterator<Item = BlockIndex> + '_ {
    bits.iter().enumerate().filter(|(_, set)| *set).map(|(index, _)| index)
}
