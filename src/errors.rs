use crate::piece::PieceIndex;
use thiserror::Error;

/// The result type for the wishlist package.
pub type Result<T> = std::result::Result<T, WishlistError>;

/// Errors that can occur while constructing the [`crate::file_order::FileOrder`] or
/// [`crate::piece_policy::PiecePolicy`] tables from caller-supplied metadata.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WishlistError {
    /// The given piece does not overlap any known file.
    #[error("piece {0} does not overlap any known file")]
    NoOverlappingFile(PieceIndex),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overlapping_file_display() {
        let err = WishlistError::NoOverlappingFile(42);
        assert_eq!("piece 42 does not overlap any known file", err.to_string());
    }
}
