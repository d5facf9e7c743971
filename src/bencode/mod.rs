//! Bencoding module
//!
//! Encoding and decoding of the bencoding format used by torrent files,
//! tracker responses and extension messages.

pub mod value;
pub mod decode;
pub mod encode;

pub use value::{Dict, Value};
pub use decode::{decode, decode_prefix, MAX_DEPTH};
pub use encode::encode;
