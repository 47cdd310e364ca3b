use crate::piece::{BlockIndex, BlockSpan, FileIndex, FileRank, PieceIndex, Priority};
use bit_vec::BitVec;
use derive_more::Display;
use fx_callback::Callback;
#[cfg(test)]
pub use mock::*;

/// A lightweight, opaque handle to a remote peer, shared with the rest of the torrent machinery.
pub type PeerHandle = fx_handle::Handle;

/// The ten events a [`Mediator`] publishes to a subscribed [`crate::wishlist::Wishlist`],
/// consolidated into a single enum per the torrent/peer event-enum idiom rather than ten
/// independently-registered callbacks.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum MediatorEvent {
    /// One or more files had their wanted flag toggled.
    #[display("{} file(s) had their wanted flag set to {}", files.len(), wanted)]
    FilesWantedChanged { files: Vec<FileIndex>, wanted: bool },
    /// One or more files had their priority changed.
    #[display("{} file(s) changed priority to {:?}", files.len(), priority)]
    PriorityChanged { files: Vec<FileIndex>, priority: Priority },
    /// A request for the given block span was sent to a peer.
    #[display("sent request for blocks {}..{} to peer {}", blocks.start, blocks.end, peer)]
    SentRequest { peer: PeerHandle, blocks: BlockSpan },
    /// A previously sent request for a block was cancelled.
    #[display("sent cancel for block {} to peer {}", block, peer)]
    SentCancel { peer: PeerHandle, block: BlockIndex },
    /// A peer rejected a previously sent request.
    #[display("peer {} rejected block {}", peer, block)]
    GotReject { peer: PeerHandle, block: BlockIndex },
    /// A peer choked the connection; its outstanding requests are listed in `requests`.
    #[display("peer {} choked the connection", peer)]
    GotChoke { peer: PeerHandle, requests: BitVec },
    /// A peer disconnected; its outstanding requests are listed in `requests`.
    #[display("peer {} disconnected", peer)]
    PeerDisconnect {
        peer: PeerHandle,
        have: BitVec,
        requests: BitVec,
    },
    /// A block has been received and written to storage.
    #[display("block {} received", block)]
    GotBlock { block: BlockIndex },
    /// A piece has passed hash validation and is now fully owned.
    #[display("piece {} completed", piece)]
    PieceCompleted { piece: PieceIndex },
    /// A piece failed hash validation; its storage has been reset.
    #[display("piece {} failed validation", piece)]
    GotBadPiece { piece: PieceIndex },
}

/// The capability set a torrent layer implements so a [`crate::wishlist::Wishlist`] can query it
/// and subscribe to its events, without depending on a concrete torrent type.
pub trait Mediator: Callback<MediatorEvent> + Send + Sync {
    /// True if every block of the piece is owned.
    fn client_has_piece(&self, piece: PieceIndex) -> bool;

    /// True if any wanted file overlaps the piece.
    fn client_wants_piece(&self, piece: PieceIndex) -> bool;

    /// True if the block is owned.
    fn client_has_block(&self, block: BlockIndex) -> bool;

    /// The alphabetical rank of the earliest wanted file owning this piece.
    fn file_index_for_piece(&self, piece: PieceIndex) -> FileRank;

    /// The block span `[begin, end)` covering this piece.
    fn block_span(&self, piece: PieceIndex) -> BlockSpan;

    /// The total number of pieces in the torrent.
    fn piece_count(&self) -> usize;

    /// The total number of blocks in the torrent.
    fn block_count(&self) -> usize;

    /// The effective priority of this piece, with any edge-piece boost already applied.
    fn priority(&self, piece: PieceIndex) -> Priority;

    /// True if this piece lies in a wanted file's tail region.
    fn is_piece_in_file_tail(&self, piece: PieceIndex) -> bool;

    /// True if this piece belongs to a priority file.
    fn is_piece_in_priority_file(&self, piece: PieceIndex) -> bool;

    /// True if the torrent is currently configured for sequential download.
    fn is_sequential_download(&self) -> bool;
}

#[cfg(test)]
mod mock {
    use super::*;
    use fx_callback::{Subscriber, Subscription};
    use mockall::mock;

    mock! {
        #[derive(Debug)]
        pub Mediator {}

        impl Mediator for Mediator {
            fn client_has_piece(&self, piece: PieceIndex) -> bool;
            fn client_wants_piece(&self, piece: PieceIndex) -> bool;
            fn client_has_block(&self, block: BlockIndex) -> bool;
            fn file_index_for_piece(&self, piece: PieceIndex) -> FileRank;
            fn block_span(&self, piece: PieceIndex) -> BlockSpan;
            fn piece_count(&self) -> usize;
            fn block_count(&self) -> usize;
            fn priority(&self, piece: PieceIndex) -> Priority;
            fn is_piece_in_file_tail(&self, piece: PieceIndex) -> bool;
            fn is_piece_in_priority_file(&self, piece: PieceIndex) -> bool;
            fn is_sequential_download(&self) -> bool;
        }

        impl Callback<MediatorEvent> for Mediator {
            fn subscribe(&self) -> Subscription<MediatorEvent>;
            fn subscribe_with(&self, subscriber: Subscriber<MediatorEvent>);
        }
    }
}
