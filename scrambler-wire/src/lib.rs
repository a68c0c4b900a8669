#![doc(issue_tracker_base_url = "https://github.com/badnetwork/scrambler/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use thiserror::Error;

pub mod event;
pub mod keyed;

pub use event::DeltaEvent;
pub use keyed::Record;

#[derive(Debug, Error)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Invalid wire ID: {0}")]
    WireId(u8),
    #[error("Key too large: {0} bytes, max 65535")]
    KeyTooLarge(usize),
}
