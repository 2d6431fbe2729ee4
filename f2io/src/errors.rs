// SPDX-License-Identifier: MIT

use core::fmt;

pub type F2IOResult<T = ()> = core::result::Result<T, F2IOError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F2IOError {
    /// The access reaches past the end of the device.
    OutOfBounds,
    Unsupported,
    /// The device refused a zone command or an off-pointer write.
    Zone(&'static str),
    Other(&'static str),
}

impl fmt::Display for F2IOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            F2IOError::OutOfBounds => f.write_str("access past the end of the device"),
            F2IOError::Unsupported => f.write_str("operation not supported by the device"),
            F2IOError::Zone(msg) => write!(f, "zone error: {msg}"),
            F2IOError::Other(msg) => f.write_str(msg),
        }
    }
}

impl core::error::Error for F2IOError {}
