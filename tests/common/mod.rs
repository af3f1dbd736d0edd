//! Fixture helpers shared by the integration tests.
//!
//! Patches are extracted from real files, so fixtures are written to a
//! tempdir. The expected values are computed the straightforward way: pad a
//! copy of the array with zeros, then slice the window the patch coordinates
//! select.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn, Slice};
use npy_patcher::Element;

/// Assembles a v1.0 `.npy` file around an arbitrary header dict, padding the
/// header so the body starts on a 64-byte boundary.
pub fn npy_bytes_with_dict(dict: &str, body: &[u8]) -> Vec<u8> {
    let mut arr_format = dict.to_owned();
    while (10 + arr_format.len() + 1) % 64 != 0 {
        arr_format.push(' ');
    }
    arr_format.push('\n');

    let mut out = Vec::new();
    out.extend_from_slice(b"\x93NUMPY");
    out.push(1);
    out.push(0);
    out.extend_from_slice(&(arr_format.len() as u16).to_le_bytes());
    out.extend_from_slice(arr_format.as_bytes());
    out.extend_from_slice(body);
    out
}

pub fn shape_tuple(shape: &[usize]) -> String {
    let mut out = String::from("(");
    for len in shape {
        out.push_str(&len.to_string());
        out.push_str(", ");
    }
    out.push(')');
    out
}

/// The raw bytes of an element slice in host order.
pub fn element_bytes<T: Element>(data: &[T]) -> Vec<u8> {
    // Sound because `Element` implementors are plain-old-data.
    let bytes = unsafe {
        std::slice::from_raw_parts(
            data.as_ptr().cast::<u8>(),
            data.len() * std::mem::size_of::<T>(),
        )
    };
    bytes.to_vec()
}

/// A complete C-order `.npy` file for `data` with the given shape.
pub fn npy_bytes<T: Element>(shape: &[usize], data: &[T]) -> Vec<u8> {
    assert_eq!(shape.iter().product::<usize>(), data.len());
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        T::dtype(),
        shape_tuple(shape)
    );
    npy_bytes_with_dict(&dict, &element_bytes(data))
}

pub fn write_npy<T: Element>(dir: &Path, name: &str, shape: &[usize], data: &[T]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, npy_bytes(shape, data)).unwrap();
    path
}

/// Computes the patch a request should produce: zero-pad the array, then for
/// each q-index slice the window at `coords * patch_stride`.
///
/// All vectors are outermost-first, as the caller supplies them; `padding`
/// is `(left, right)` pairs per patched axis.
pub fn expected_patch<T: Element>(
    data: &ArrayD<T>,
    qidx: &[usize],
    patch_shape: &[usize],
    patch_stride: &[usize],
    padding: &[usize],
    coords: &[usize],
) -> Vec<T> {
    let shape = data.shape().to_vec();
    let mut padded_shape = shape.clone();
    for i in 1..padded_shape.len() {
        padded_shape[i] += padding[2 * (i - 1)] + padding[2 * (i - 1) + 1];
    }

    let mut padded = ArrayD::from_elem(IxDyn(&padded_shape), T::ZERO);
    padded
        .slice_each_axis_mut(|ax| {
            let i = ax.axis.index();
            if i == 0 {
                Slice::from(..)
            } else {
                let left = padding[2 * (i - 1)] as isize;
                Slice::from(left..left + shape[i] as isize)
            }
        })
        .assign(data);

    let mut out = Vec::new();
    for &q in qidx {
        let window = padded.slice_each_axis(|ax| {
            let i = ax.axis.index();
            if i == 0 {
                Slice::from(q as isize..q as isize + 1)
            } else {
                let start = (coords[i - 1] * patch_stride[i - 1]) as isize;
                Slice::from(start..start + patch_shape[i - 1] as isize)
            }
        });
        out.extend(window.iter().copied());
    }
    out
}
