//! Dtype descriptors and the registry of readable element types.

use std::fmt;
use std::mem;

use num_complex::Complex;

use crate::error::PatchError;

pub(crate) const LITTLE_ENDIAN_CHAR: char = '<';
pub(crate) const BIG_ENDIAN_CHAR: char = '>';
pub(crate) const NO_ENDIAN_CHAR: char = '|';

/// Byte order of the host, determined at build time.
pub(crate) const HOST_ENDIAN_CHAR: char = if cfg!(target_endian = "big") {
    BIG_ENDIAN_CHAR
} else {
    LITTLE_ENDIAN_CHAR
};

/// A parsed `descr` field: byte order, kind, and element size in bytes.
///
/// `byte_order` is one of `<`, `>`, `|`; `kind` is one of `f`, `i`, `u`, `c`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DType {
    pub byte_order: char,
    pub kind: char,
    pub item_size: usize,
}

impl DType {
    /// Parses a typestring such as `<f4` or `|u1`.
    pub(crate) fn parse(typestring: &str) -> Result<DType, PatchError> {
        let mut chars = typestring.chars();
        let (byte_order, kind) = match (chars.next(), chars.next()) {
            (Some(b), Some(k)) => (b, k),
            _ => {
                return Err(PatchError::BadDtype(format!(
                    "typestring too short: {:?}",
                    typestring
                )))
            }
        };
        if !matches!(
            byte_order,
            LITTLE_ENDIAN_CHAR | BIG_ENDIAN_CHAR | NO_ENDIAN_CHAR
        ) {
            return Err(PatchError::BadDtype(format!(
                "bad byte order in typestring: {:?}",
                typestring
            )));
        }
        if !matches!(kind, 'f' | 'i' | 'u' | 'c') {
            return Err(PatchError::BadDtype(format!(
                "bad kind in typestring: {:?}",
                typestring
            )));
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PatchError::BadDtype(format!(
                "bad item size in typestring: {:?}",
                typestring
            )));
        }
        let item_size: usize = digits.parse().map_err(|_| {
            PatchError::BadDtype(format!("item size overflows: {:?}", typestring))
        })?;
        if item_size == 0 {
            return Err(PatchError::BadDtype(format!(
                "zero item size in typestring: {:?}",
                typestring
            )));
        }
        Ok(DType {
            byte_order,
            kind,
            item_size,
        })
    }

    /// Whether a file with descriptor `self` is readable as elements
    /// described by `expected`.
    ///
    /// Single-byte kinds compare byte order as `|`, so `<i1`, `>i1`, and
    /// `|i1` all match.
    pub(crate) fn matches(&self, expected: &DType) -> bool {
        self.kind == expected.kind
            && self.item_size == expected.item_size
            && (self.item_size == 1 || self.byte_order == expected.byte_order)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.byte_order, self.kind, self.item_size)
    }
}

/// An element type that patches can be extracted as.
///
/// The set of implementors is the registry of readable kinds; there is no
/// runtime dispatch over arbitrary dtypes.
///
/// # Safety
///
/// Implementors must be plain-old-data: every bit pattern must be a valid
/// value and the type must contain no padding bytes, since patch extraction
/// reads raw file bytes directly into buffers of `Self`.
pub unsafe trait Element: Copy + 'static {
    /// The zero value, used to initialize the regions of a patch covered by
    /// virtual padding.
    const ZERO: Self;

    /// The descriptor a file must carry to be readable as this type, in host
    /// byte order (`|` for single-byte types).
    fn dtype() -> DType;
}

macro_rules! impl_element {
    ($elem:ty, $kind:expr, $zero:expr) => {
        unsafe impl Element for $elem {
            const ZERO: Self = $zero;

            fn dtype() -> DType {
                let item_size = mem::size_of::<$elem>();
                DType {
                    byte_order: if item_size == 1 {
                        NO_ENDIAN_CHAR
                    } else {
                        HOST_ENDIAN_CHAR
                    },
                    kind: $kind,
                    item_size,
                }
            }
        }
    };
}

impl_element!(i8, 'i', 0);
impl_element!(i16, 'i', 0);
impl_element!(i32, 'i', 0);
impl_element!(i64, 'i', 0);

impl_element!(u8, 'u', 0);
impl_element!(u16, 'u', 0);
impl_element!(u32, 'u', 0);
impl_element!(u64, 'u', 0);

impl_element!(f32, 'f', 0.);
impl_element!(f64, 'f', 0.);

impl_element!(Complex<f32>, 'c', Complex { re: 0., im: 0. });
impl_element!(Complex<f64>, 'c', Complex { re: 0., im: 0. });

/// Casts `&mut [T]` to `&mut [u8]` so file bytes can be read straight into
/// an element buffer.
pub(crate) fn slice_as_bytes_mut<T: Element>(slice: &mut [T]) -> &mut [u8] {
    // This is sound because `Element` implementors are plain-old-data (see
    // the trait's safety contract), and slices never contain more than
    // `isize::MAX` bytes.
    unsafe {
        std::slice::from_raw_parts_mut(
            slice.as_mut_ptr().cast::<u8>(),
            slice.len() * mem::size_of::<T>(),
        )
    }
}
