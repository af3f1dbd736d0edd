//! The error type shared by every fallible operation in this crate.

use std::error::Error;
use std::fmt;
use std::io;

/// An error opening, validating, or reading a patch from an `.npy` file.
///
/// Every failure is reported through one of these kinds; nothing is retried
/// internally, and no partially-filled buffer is ever returned. The stream is
/// closed before the error reaches the caller.
#[derive(Debug)]
pub enum PatchError {
    /// The file does not begin with the `.npy` magic string.
    BadMagic(String),
    /// The header version is not 1.0 or 2.0.
    UnsupportedVersion(String),
    /// The header failed the length-alignment check, is missing its trailing
    /// newline, or contains a malformed dict/tuple/str/bool literal.
    BadHeader(String),
    /// One of `descr`, `fortran_order`, or `shape` is absent from the header.
    MissingKey(String),
    /// The dtype descriptor is malformed or does not match the element type
    /// the caller requested.
    BadDtype(String),
    /// The header declares `'fortran_order': True`; only C-order data is
    /// readable.
    FortranOrderUnsupported(String),
    /// The array rank is below 2, a dimension is zero, or the patch
    /// shape/stride vectors are malformed.
    InvalidShape(String),
    /// The computed padding exceeds the patch shape on some axis, or the
    /// padded excess is not a multiple of the patch stride.
    InvalidPadding(String),
    /// The patch index (after the per-axis offset is applied) does not name
    /// an existing patch.
    PatchIndexOutOfRange(String),
    /// A q-space index is out of bounds or the list is not strictly
    /// increasing.
    QIndexOutOfRange(String),
    /// An error caused by I/O: open failure, short read, or seek failure.
    IoError(io::Error),
}

impl Error for PatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PatchError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::BadMagic(msg) => write!(f, "not an .npy file: {}", msg),
            PatchError::UnsupportedVersion(msg) => {
                write!(f, "unsupported .npy version: {}", msg)
            }
            PatchError::BadHeader(msg) => write!(f, "malformed .npy header: {}", msg),
            PatchError::MissingKey(msg) => write!(f, "missing header key: {}", msg),
            PatchError::BadDtype(msg) => write!(f, "dtype error: {}", msg),
            PatchError::FortranOrderUnsupported(msg) => {
                write!(f, "fortran-order data is unsupported: {}", msg)
            }
            PatchError::InvalidShape(msg) => write!(f, "invalid shape: {}", msg),
            PatchError::InvalidPadding(msg) => write!(f, "invalid padding: {}", msg),
            PatchError::PatchIndexOutOfRange(msg) => {
                write!(f, "patch index out of range: {}", msg)
            }
            PatchError::QIndexOutOfRange(msg) => {
                write!(f, "q-space index out of range: {}", msg)
            }
            PatchError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl From<io::Error> for PatchError {
    fn from(err: io::Error) -> PatchError {
        PatchError::IoError(err)
    }
}
