//! This crate extracts rectangular N-dimensional sub-blocks ("patches") from
//! arrays stored in the [`.npy`] file format, without loading the whole array
//! into memory.
//!
//! [`.npy`]: https://docs.scipy.org/doc/numpy/reference/generated/numpy.lib.format.html
//!
//! It is a data-loading primitive for tiled training pipelines: each request
//! names one patch of a fixed shape and receives a contiguous element buffer,
//! including virtual zero padding where the patch straddles the array
//! boundary. The leading axis of the stored array (the q-axis) is gathered
//! through an explicit index list rather than patched.
//!
//! See [`Patcher`] for the entry point. The supported element types are the
//! implementors of [`Element`]; only C-order (row-major) files are readable.

mod dtype;
mod error;
mod header;
mod patcher;
mod py_parse;

pub use crate::dtype::{DType, Element};
pub use crate::error::PatchError;
pub use crate::patcher::Patcher;
