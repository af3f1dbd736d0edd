//! Reading and parsing of the `.npy` file header.

use std::io;

use byteorder::{ByteOrder, LittleEndian};

use crate::dtype::DType;
use crate::error::PatchError;
use crate::py_parse;

/// Magic string to indicate npy format.
const MAGIC_STRING: &[u8] = b"\x93NUMPY";

#[allow(non_camel_case_types)]
enum Version {
    V1_0,
    V2_0,
}

impl Version {
    /// Number of bytes taken up by version number (1 byte for major version,
    /// 1 byte for minor version).
    const VERSION_NUM_BYTES: usize = 2;

    fn from_bytes(bytes: &[u8]) -> Result<Self, PatchError> {
        debug_assert_eq!(bytes.len(), Self::VERSION_NUM_BYTES);
        match (bytes[0], bytes[1]) {
            (0x01, 0x00) => Ok(Version::V1_0),
            (0x02, 0x00) => Ok(Version::V2_0),
            (major, minor) => Err(PatchError::UnsupportedVersion(format!(
                "{}.{}",
                major, minor
            ))),
        }
    }

    /// Number of bytes in representation of header length.
    fn header_len_num_bytes(&self) -> usize {
        match *self {
            Version::V1_0 => 2,
            Version::V2_0 => 4,
        }
    }

    /// Read header length.
    fn read_header_len<R: io::Read>(&self, mut reader: R) -> Result<usize, io::Error> {
        let mut buf = [0; 4];
        reader.read_exact(&mut buf[..self.header_len_num_bytes()])?;
        match *self {
            Version::V1_0 => Ok(LittleEndian::read_u16(&buf) as usize),
            Version::V2_0 => Ok(LittleEndian::read_u32(&buf) as usize),
        }
    }

    /// Total length in bytes of everything preceding the header string.
    fn prefix_num_bytes(&self) -> usize {
        MAGIC_STRING.len() + Self::VERSION_NUM_BYTES + self.header_len_num_bytes()
    }
}

/// The parsed contents of an `.npy` header.
#[derive(Clone, Debug)]
pub struct Header {
    pub dtype: DType,
    pub fortran_order: bool,
    /// Dimension lengths, outermost-first, exactly as written in the file.
    pub shape: Vec<usize>,
}

impl Header {
    /// Reads and parses the header, leaving `reader` positioned at the first
    /// byte of the array body.
    pub fn from_reader<R: io::Read>(mut reader: R) -> Result<Self, PatchError> {
        // Check for magic string.
        let mut buf = [0; 6];
        reader.read_exact(&mut buf)?;
        if buf != MAGIC_STRING {
            return Err(PatchError::BadMagic(format!(
                "file starts with {:?}",
                &buf[..]
            )));
        }

        // Get version number.
        let mut buf = [0; Version::VERSION_NUM_BYTES];
        reader.read_exact(&mut buf)?;
        let version = Version::from_bytes(&buf)?;

        // Get `HEADER_LEN` and verify the 64-byte alignment NumPy guarantees
        // for the start of the array body.
        let header_len = version.read_header_len(&mut reader)?;
        if (version.prefix_num_bytes() + header_len) % 64 != 0 {
            return Err(PatchError::BadHeader(format!(
                "prefix ({}) plus header length ({}) is not a multiple of 64",
                version.prefix_num_bytes(),
                header_len
            )));
        }

        // Read the dictionary describing the array's format.
        let mut buf = vec![0; header_len];
        reader.read_exact(&mut buf)?;
        let without_newline = match buf.split_last() {
            Some((&b'\n', rest)) => rest,
            Some(_) | None => {
                return Err(PatchError::BadHeader(
                    "newline missing at end of header".to_owned(),
                ))
            }
        };
        if !without_newline.is_ascii() {
            return Err(PatchError::BadHeader(
                "non-ascii byte in header".to_owned(),
            ));
        }
        // ASCII strings are always valid UTF-8.
        let header_str = unsafe { std::str::from_utf8_unchecked(without_newline) };

        Header::from_dict_str(header_str)
    }

    fn from_dict_str(header_str: &str) -> Result<Self, PatchError> {
        let dict = py_parse::parse_dict(header_str, &["descr", "fortran_order", "shape"])?;

        let dtype = DType::parse(py_parse::parse_str(&dict["descr"])?)?;
        let fortran_order = py_parse::parse_bool(&dict["fortran_order"])?;

        let mut shape = Vec::new();
        for item in py_parse::parse_tuple(&dict["shape"])? {
            let dim: usize = item.parse().map_err(|_| {
                PatchError::BadHeader(format!("bad dimension in shape tuple: {:?}", item))
            })?;
            shape.push(dim);
        }

        Ok(Header {
            dtype,
            fortran_order,
            shape,
        })
    }
}
