use std::fmt::Display;

use serde_derive::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Git object identifier, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlobSha(pub String);

impl Display for BlobSha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobSha {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Compute the sha the remote object store will give to a blob with this content.
/// Git format: `blob <size>\0<content>`
pub fn predict_hash(content: &[u8]) -> BlobSha {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    BlobSha(hex::encode(hasher.finalize()))
}

pub fn predict_text_hash(content: &str) -> BlobSha {
    predict_hash(content.as_bytes())
}
