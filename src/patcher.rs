//! The patch planner and reader.
//!
//! All per-axis vectors are stored innermost-first: index 0 is the
//! fastest-varying patched axis, so the recursive reader's arithmetic indexes
//! plainly. Caller-supplied vectors arrive outermost-first and are reversed
//! on entry; the introspection getters reverse on the way back out. The
//! q-axis never appears in the patched-axis vectors.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::mem;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};

use crate::dtype::{self, Element};
use crate::error::PatchError;
use crate::header::Header;

/// Streaming patch extractor for `.npy` files.
///
/// A `Patcher` opens the file, parses and validates the header, plans the
/// byte layout of one patch, and reads exactly the bytes that patch needs,
/// seeking over everything else. Regions of the patch that fall outside the
/// array (virtual padding) are left zeroed.
///
/// One instance holds one stream and one set of plan vectors, so it must not
/// be shared between threads mid-call; instances are cheap, so parallel
/// callers create one each. An instance may be reused for further calls with
/// a different file or different parameters.
///
/// # Example
///
/// ```no_run
/// use npy_patcher::Patcher;
/// # use npy_patcher::PatchError;
///
/// let mut patcher = Patcher::<f32>::new();
/// // 2x2 patches of a rank-3 dataset, q-slices 0 and 2, patch number 3.
/// let patch = patcher.get_patch("data.npy", &[0, 2], &[2, 2], &[2, 2], 3, None, None)?;
/// assert_eq!(patch.len(), 2 * 2 * 2);
/// # Ok::<_, PatchError>(())
/// ```
pub struct Patcher<T: Element> {
    filepath: PathBuf,
    data_shape: Vec<usize>,
    qspace_index: Vec<usize>,
    patch_shape: Vec<usize>,
    patch_stride: Vec<usize>,
    patch_num: Vec<usize>,
    num_patches: Vec<usize>,
    padding: Vec<usize>,
    data_strides: Vec<usize>,
    patch_strides: Vec<usize>,
    shifts: Vec<usize>,
    patch_size: usize,
    start: u64,
    pos: u64,
    marker: PhantomData<T>,
}

impl<T: Element> Default for Patcher<T> {
    fn default() -> Self {
        Patcher::new()
    }
}

impl<T: Element> Patcher<T> {
    pub fn new() -> Self {
        Patcher {
            filepath: PathBuf::new(),
            data_shape: Vec::new(),
            qspace_index: Vec::new(),
            patch_shape: Vec::new(),
            patch_stride: Vec::new(),
            patch_num: Vec::new(),
            num_patches: Vec::new(),
            padding: Vec::new(),
            data_strides: Vec::new(),
            patch_strides: Vec::new(),
            shifts: Vec::new(),
            patch_size: 0,
            start: 0,
            pos: 0,
            marker: PhantomData,
        }
    }

    /// Extracts one patch from the file at `path`.
    ///
    /// `qspace_indices` selects slices of the leading axis, in the order they
    /// should appear in the output; it must be strictly increasing.
    /// `patch_shape` and `patch_stride` have one entry per remaining axis,
    /// outermost-first. `patch_index` names the patch; it is decomposed into
    /// per-axis patch coordinates, to which `patch_index_offset` (if given)
    /// is added. `extra_padding` supplies additional `(left, right)` virtual
    /// padding per patched axis on top of the padding computed to make the
    /// patch grid cover the array.
    ///
    /// The returned buffer holds `qspace_indices.len() * patch_shape.iter().product()`
    /// elements in C order, q-slices outermost. Elements in padded regions
    /// are zero.
    #[allow(clippy::too_many_arguments)]
    pub fn get_patch<P: AsRef<Path>>(
        &mut self,
        path: P,
        qspace_indices: &[usize],
        patch_shape: &[usize],
        patch_stride: &[usize],
        patch_index: usize,
        extra_padding: Option<&[usize]>,
        patch_index_offset: Option<&[usize]>,
    ) -> Result<Vec<T>, PatchError> {
        let mut stream = self.prepare(
            path.as_ref(),
            qspace_indices,
            patch_shape,
            patch_stride,
            patch_index,
            extra_padding,
            patch_index_offset,
        )?;
        let mut patch = vec![T::ZERO; self.patch_size];
        self.read_patch(&mut stream, dtype::slice_as_bytes_mut(&mut patch))?;
        Ok(patch)
    }

    /// Like [`get_patch`](Patcher::get_patch), but shapes the buffer
    /// `[qspace_indices.len(), patch_shape...]`.
    #[allow(clippy::too_many_arguments)]
    pub fn get_patch_array<P: AsRef<Path>>(
        &mut self,
        path: P,
        qspace_indices: &[usize],
        patch_shape: &[usize],
        patch_stride: &[usize],
        patch_index: usize,
        extra_padding: Option<&[usize]>,
        patch_index_offset: Option<&[usize]>,
    ) -> Result<ArrayD<T>, PatchError> {
        let patch = self.get_patch(
            path,
            qspace_indices,
            patch_shape,
            patch_stride,
            patch_index,
            extra_padding,
            patch_index_offset,
        )?;
        let mut shape = Vec::with_capacity(patch_shape.len() + 1);
        shape.push(qspace_indices.len());
        shape.extend_from_slice(patch_shape);
        // The buffer length is the product of `shape` by construction.
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), patch).unwrap())
    }

    /// Runs the planner and stream positioning without reading any data.
    ///
    /// Afterwards the introspection getters describe the plan this request
    /// would execute. Intended for testing plans in isolation.
    #[allow(clippy::too_many_arguments)]
    pub fn debug_vars<P: AsRef<Path>>(
        &mut self,
        path: P,
        qspace_indices: &[usize],
        patch_shape: &[usize],
        patch_stride: &[usize],
        patch_index: usize,
        extra_padding: Option<&[usize]>,
        patch_index_offset: Option<&[usize]>,
    ) -> Result<(), PatchError> {
        self.prepare(
            path.as_ref(),
            qspace_indices,
            patch_shape,
            patch_stride,
            patch_index,
            extra_padding,
            patch_index_offset,
        )?;
        Ok(())
    }

    /// The data shape read from the file header, outermost-first.
    pub fn get_data_shape(&self) -> Vec<usize> {
        reversed(&self.data_shape)
    }

    /// The `(left, right)` padding per patched axis, outermost-first.
    pub fn get_padding(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.padding.len());
        for pair in self.padding.chunks(2).rev() {
            out.extend_from_slice(pair);
        }
        out
    }

    /// Byte strides of the source array, outermost-first. The last entry is
    /// the element size; the first is the q-axis stride.
    pub fn get_data_strides(&self) -> Vec<usize> {
        reversed(&self.data_strides)
    }

    /// Byte strides of one patch slab in the output buffer, outermost-first.
    pub fn get_patch_strides(&self) -> Vec<usize> {
        reversed(&self.patch_strides)
    }

    /// Bytes of real file data this patch contributes per axis,
    /// outermost-first.
    pub fn get_shift_lengths(&self) -> Vec<usize> {
        reversed(&self.shifts)
    }

    /// Number of patches along each patched axis, outermost-first.
    pub fn get_num_patches(&self) -> Vec<usize> {
        reversed(&self.num_patches)
    }

    /// The decomposed, offset-adjusted patch coordinates, outermost-first.
    pub fn get_patch_numbers(&self) -> Vec<usize> {
        reversed(&self.patch_num)
    }

    /// Absolute byte offset of this patch's first real element.
    pub fn get_stream_start(&self) -> u64 {
        self.start
    }

    /// Number of elements in the output buffer.
    pub fn get_patch_size(&self) -> usize {
        self.patch_size
    }

    /// Opens the file, validates the request, computes the plan, and leaves
    /// the stream at the patch's start offset.
    #[allow(clippy::too_many_arguments)]
    fn prepare(
        &mut self,
        path: &Path,
        qspace_indices: &[usize],
        patch_shape: &[usize],
        patch_stride: &[usize],
        patch_index: usize,
        extra_padding: Option<&[usize]>,
        patch_index_offset: Option<&[usize]>,
    ) -> Result<File, PatchError> {
        self.filepath = path.to_path_buf();
        let mut stream = File::open(path).map_err(|err| {
            PatchError::IoError(std::io::Error::new(
                err.kind(),
                format!("failed to open {}: {}", path.display(), err),
            ))
        })?;
        let header = Header::from_reader(&mut stream)?;
        let body_start = stream.stream_position()?;

        if header.fortran_order {
            return Err(PatchError::FortranOrderUnsupported(
                "file declares 'fortran_order': True".to_owned(),
            ));
        }
        let expected = T::dtype();
        if !header.dtype.matches(&expected) {
            return Err(PatchError::BadDtype(format!(
                "file holds '{}' but '{}' was requested",
                header.dtype, expected
            )));
        }

        let rank = header.shape.len();
        if rank < 2 {
            return Err(PatchError::InvalidShape(format!(
                "rank {} array; patch extraction requires rank >= 2",
                rank
            )));
        }
        if header.shape.contains(&0) {
            return Err(PatchError::InvalidShape(format!(
                "zero-length dimension in shape {:?}",
                header.shape
            )));
        }
        let num_axes = rank - 1;
        if patch_shape.len() != num_axes || patch_stride.len() != num_axes {
            return Err(PatchError::InvalidShape(format!(
                "patch shape/stride must have {} entries for a rank-{} array, got {}/{}",
                num_axes,
                rank,
                patch_shape.len(),
                patch_stride.len()
            )));
        }
        if patch_shape.contains(&0) || patch_stride.contains(&0) {
            return Err(PatchError::InvalidShape(
                "patch shape and stride entries must be >= 1".to_owned(),
            ));
        }

        if qspace_indices.is_empty() {
            return Err(PatchError::QIndexOutOfRange(
                "empty q-space index list".to_owned(),
            ));
        }
        for pair in qspace_indices.windows(2) {
            if pair[1] <= pair[0] {
                return Err(PatchError::QIndexOutOfRange(format!(
                    "indices must be strictly increasing, got {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        let q_len = header.shape[0];
        let &q_max = qspace_indices.last().unwrap();
        if q_max >= q_len {
            return Err(PatchError::QIndexOutOfRange(format!(
                "index {} exceeds q-axis length {}",
                q_max, q_len
            )));
        }

        // Normalize the optional vectors, reversing into innermost-first
        // order. The padding vector reverses in (left, right) pairs so each
        // pair keeps its orientation.
        let extra = match extra_padding {
            Some(extra) => {
                if extra.len() != 2 * num_axes {
                    return Err(PatchError::InvalidPadding(format!(
                        "extra padding must have {} entries, got {}",
                        2 * num_axes,
                        extra.len()
                    )));
                }
                let mut rev = Vec::with_capacity(extra.len());
                for pair in extra.chunks(2).rev() {
                    rev.extend_from_slice(pair);
                }
                rev
            }
            None => vec![0; 2 * num_axes],
        };
        let offset = match patch_index_offset {
            Some(offset) => {
                if offset.len() != num_axes {
                    return Err(PatchError::PatchIndexOutOfRange(format!(
                        "patch index offset must have {} entries, got {}",
                        num_axes,
                        offset.len()
                    )));
                }
                reversed(offset)
            }
            None => vec![0; num_axes],
        };

        self.set_init_vars(&header.shape, qspace_indices, patch_shape, patch_stride)?;
        self.set_padding(&extra)?;
        self.set_strides()?;
        self.set_num_patches();
        self.set_patch_numbers(patch_index, &offset)?;
        self.set_shift_lengths()?;
        self.move_stream_to_start(&mut stream, body_start)?;

        Ok(stream)
    }

    /// Stores the request vectors (reversed to innermost-first) and resets
    /// all per-request state.
    fn set_init_vars(
        &mut self,
        shape: &[usize],
        qspace_indices: &[usize],
        patch_shape: &[usize],
        patch_stride: &[usize],
    ) -> Result<(), PatchError> {
        self.data_shape = reversed(shape);
        self.qspace_index = qspace_indices.to_vec();
        self.patch_shape = reversed(patch_shape);
        self.patch_stride = reversed(patch_stride);

        let mut patch_size = self.qspace_index.len();
        for &len in &self.patch_shape {
            patch_size = patch_size.checked_mul(len).ok_or_else(|| {
                PatchError::InvalidShape(format!(
                    "patch size overflows for patch shape {:?}",
                    patch_shape
                ))
            })?;
        }
        self.patch_size = patch_size;

        self.patch_num.clear();
        self.num_patches.clear();
        self.padding.clear();
        self.data_strides.clear();
        self.patch_strides.clear();
        self.shifts.clear();
        self.start = 0;
        self.pos = 0;
        Ok(())
    }

    /// Computes the padding needed to cover each patched axis with a whole
    /// number of stride steps, plus any extra padding from the caller.
    ///
    /// The required pad is split evenly; an odd remainder goes to the left
    /// side.
    fn set_padding(&mut self, extra: &[usize]) -> Result<(), PatchError> {
        self.padding = vec![0; 2 * self.patch_shape.len()];

        for i in 0..self.patch_shape.len() {
            let data_len = self.data_shape[i];
            let patch_len = self.patch_shape[i];
            let stride = self.patch_stride[i];

            let required = if data_len <= patch_len {
                patch_len - data_len
            } else {
                // Smallest pad making the overhang a whole number of strides.
                let steps = (data_len - patch_len + stride - 1) / stride;
                steps * stride + patch_len - data_len
            };
            let left = required / 2 + required % 2;
            let right = required / 2;
            self.padding[2 * i] = left + extra[2 * i];
            self.padding[2 * i + 1] = right + extra[2 * i + 1];

            if self.padding[2 * i] > patch_len || self.padding[2 * i + 1] > patch_len {
                return Err(PatchError::InvalidPadding(format!(
                    "padding ({}, {}) exceeds patch length {} on axis {}",
                    self.padding[2 * i],
                    self.padding[2 * i + 1],
                    patch_len,
                    self.patch_shape.len() - 1 - i
                )));
            }
            let padded = data_len + self.padding[2 * i] + self.padding[2 * i + 1];
            if padded < patch_len || (padded - patch_len) % stride != 0 {
                return Err(PatchError::InvalidPadding(format!(
                    "padded length {} is not patch length {} plus a multiple of stride {}",
                    padded, patch_len, stride
                )));
            }
        }
        Ok(())
    }

    /// Byte strides through the source array and through one patch slab of
    /// the output buffer.
    fn set_strides(&mut self) -> Result<(), PatchError> {
        let item_size = mem::size_of::<T>();
        let overflow =
            || PatchError::InvalidShape("array byte size overflows".to_owned());

        self.data_strides = vec![0; self.data_shape.len()];
        self.data_strides[0] = item_size;
        for i in 1..self.data_shape.len() {
            self.data_strides[i] = self.data_strides[i - 1]
                .checked_mul(self.data_shape[i - 1])
                .ok_or_else(overflow)?;
        }

        self.patch_strides = vec![0; self.patch_shape.len()];
        self.patch_strides[0] = item_size;
        for i in 1..self.patch_shape.len() {
            self.patch_strides[i] = self.patch_strides[i - 1]
                .checked_mul(self.patch_shape[i - 1])
                .ok_or_else(overflow)?;
        }
        Ok(())
    }

    fn set_num_patches(&mut self) {
        self.num_patches = vec![0; self.patch_shape.len()];
        for i in 0..self.num_patches.len() {
            self.num_patches[i] = if self.data_shape[i] <= self.patch_shape[i] {
                1
            } else {
                let padded =
                    self.data_shape[i] + self.padding[2 * i] + self.padding[2 * i + 1];
                1 + (padded - self.patch_shape[i]) / self.patch_stride[i]
            };
        }
    }

    /// Decomposes the flat patch index into per-axis patch coordinates,
    /// after applying the per-axis offset.
    fn set_patch_numbers(
        &mut self,
        patch_index: usize,
        offset: &[usize],
    ) -> Result<(), PatchError> {
        let n = self.num_patches.len();
        let mut scale = vec![1; n];
        for i in 1..n {
            scale[i] = scale[i - 1] * self.num_patches[i - 1];
        }
        let total = scale[n - 1] * self.num_patches[n - 1];

        if patch_index >= total {
            return Err(PatchError::PatchIndexOutOfRange(format!(
                "index {} with {} patches",
                patch_index, total
            )));
        }
        let mut index = patch_index;
        for i in 0..n {
            if offset[i] >= self.num_patches[i] {
                return Err(PatchError::PatchIndexOutOfRange(format!(
                    "offset {} with {} patches on axis {}",
                    offset[i],
                    self.num_patches[i],
                    n - 1 - i
                )));
            }
            index += offset[i] * scale[i];
        }
        if index >= total {
            return Err(PatchError::PatchIndexOutOfRange(format!(
                "index {} after offset with {} patches",
                index, total
            )));
        }

        self.patch_num = vec![0; n];
        for i in (0..n).rev() {
            self.patch_num[i] = index / scale[i];
            index -= self.patch_num[i] * scale[i];
        }
        Ok(())
    }

    /// How many bytes of real file data this patch contributes along each
    /// axis: the full slab minus any virtual padding slab this patch
    /// coordinate touches. A patch covering a whole axis touches both.
    fn set_shift_lengths(&mut self) -> Result<(), PatchError> {
        self.shifts = vec![0; self.patch_shape.len()];
        for i in 0..self.shifts.len() {
            let mut shift = self.data_strides[i] * self.patch_shape[i];
            if self.patch_num[i] == 0 {
                shift = shift
                    .checked_sub(self.data_strides[i] * self.padding[2 * i])
                    .ok_or_else(|| padding_consumes_patch(i))?;
            }
            if self.patch_num[i] + 1 == self.num_patches[i] {
                shift = shift
                    .checked_sub(self.data_strides[i] * self.padding[2 * i + 1])
                    .ok_or_else(|| padding_consumes_patch(i))?;
            }
            self.shifts[i] = shift;
        }
        Ok(())
    }

    /// Seeks to the absolute offset of the patch's first real element.
    fn move_stream_to_start(
        &mut self,
        stream: &mut File,
        body_start: u64,
    ) -> Result<(), PatchError> {
        let mut pos = body_start;
        for i in 0..self.patch_shape.len() {
            if self.patch_num[i] != 0 {
                let forward =
                    self.data_strides[i] * self.patch_num[i] * self.patch_stride[i];
                let back = self.data_strides[i] * self.padding[2 * i];
                let rel = forward
                    .checked_sub(back)
                    .ok_or_else(|| padding_consumes_patch(i))?;
                pos += rel as u64;
            }
        }
        pos += (self.qspace_index[0] * self.data_strides[self.patch_shape.len()]) as u64;

        self.start = pos;
        self.pos = pos;
        stream.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Reads the patch body: one N-D slice per q-index, reseeking between
    /// q-slices.
    fn read_patch(&mut self, stream: &mut File, out: &mut [u8]) -> Result<(), PatchError> {
        let dim = self.patch_shape.len();
        let mut buf = 0;
        for i in 0..self.qspace_index.len() - 1 {
            self.read_nd_slice(stream, out, &mut buf, dim - 1)?;
            // Rewind the bytes the slice consumed, then jump whole q-slices.
            self.pos -= self.shifts[dim - 1] as u64;
            self.pos += ((self.qspace_index[i + 1] - self.qspace_index[i])
                * self.data_strides[dim]) as u64;
            stream.seek(SeekFrom::Start(self.pos))?;
        }
        self.read_nd_slice(stream, out, &mut buf, dim - 1)
    }

    /// Recursively reads one slice of rank `d + 1` rooted at the current
    /// buffer offset and stream position.
    fn read_nd_slice(
        &mut self,
        stream: &mut File,
        out: &mut [u8],
        buf: &mut usize,
        d: usize,
    ) -> Result<(), PatchError> {
        if d == 0 {
            return self.read_slice(stream, out, buf);
        }
        for i in 0..self.patch_shape[d] {
            if self.patch_num[d] == 0 && i < self.padding[2 * d] {
                // Left virtual slab: the destination advances, the stream
                // does not move.
                *buf += self.patch_strides[d];
            } else if self.patch_num[d] + 1 == self.num_patches[d]
                && i >= self.patch_shape[d] - self.padding[2 * d + 1]
            {
                // Right virtual slab.
                *buf += self.patch_strides[d];
            } else {
                self.read_nd_slice(stream, out, buf, d - 1)?;
                // Rewind to the row start, then advance one row along axis d.
                self.pos = self.pos - self.shifts[d - 1] as u64 + self.data_strides[d] as u64;
                stream.seek(SeekFrom::Start(self.pos))?;
            }
        }
        Ok(())
    }

    /// Base case: the innermost run of contiguous bytes.
    fn read_slice(
        &mut self,
        stream: &mut File,
        out: &mut [u8],
        buf: &mut usize,
    ) -> Result<(), PatchError> {
        if self.patch_num[0] == 0 && self.padding[0] > 0 {
            *buf += self.patch_strides[0] * self.padding[0];
        }
        if self.shifts[0] > 0 {
            stream
                .read_exact(&mut out[*buf..*buf + self.shifts[0]])
                .map_err(|err| {
                    PatchError::IoError(std::io::Error::new(
                        err.kind(),
                        format!(
                            "failed to read patch from {}: {}",
                            self.filepath.display(),
                            err
                        ),
                    ))
                })?;
            *buf += self.shifts[0];
            self.pos += self.shifts[0] as u64;
        }
        if self.patch_num[0] + 1 == self.num_patches[0] && self.padding[1] > 0 {
            *buf += self.patch_strides[0] * self.padding[1];
        }
        Ok(())
    }
}

fn reversed(v: &[usize]) -> Vec<usize> {
    v.iter().rev().copied().collect()
}

fn padding_consumes_patch(axis: usize) -> PatchError {
    PatchError::InvalidPadding(format!(
        "padding consumes the whole patch on innermost-first axis {}",
        axis
    ))
}
