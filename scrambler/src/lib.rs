#![doc(issue_tracker_base_url = "https://github.com/badnetwork/scrambler/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use scrambler_common::{Clock, MockClock, SystemClock};
pub use scrambler_engine::*;
pub use scrambler_relay::*;
pub use scrambler_wire::{keyed, DeltaEvent, Record};
