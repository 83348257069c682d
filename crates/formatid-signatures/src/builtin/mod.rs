//! Builtin signature set.
//!
//! A small PRONOM-style sample covering the archive formats the engine can
//! open, a few common document and image formats, and the container
//! signatures of office documents. Real deployments load a full signature
//! file with [`Registry::load_json`](crate::Registry::load_json).

pub mod pronom;

use crate::signature::SignatureFile;

/// Version label of the builtin set.
pub const BUILTIN_VERSION: &str = "builtin-1";

/// The builtin signature file.
pub fn signature_file() -> SignatureFile {
    let mut file = SignatureFile::new(BUILTIN_VERSION);
    pronom::load_pronom(&mut file);
    file
}
