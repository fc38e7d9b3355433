pub mod compression;

pub use compression::{ContentEncoding, add_accept_encoding, compress_payload, decompress_body, detect_encoding};
