//! rollcall-core — Decision logic for face-embedding attendance.
//!
//! Holds the pure parts of the system: the embedding comparator, the
//! majority-vote enrollment decision, expiry bookkeeping and per-face vote
//! tallying. Storage, face extraction and notification are reached through
//! the traits in [`store`], [`extract`] and [`notify`].

pub mod compare;
pub mod consensus;
pub mod defaults;
pub mod expiry;
pub mod extract;
pub mod notify;
pub mod store;
pub mod tally;
pub mod types;

pub use compare::{distance, matches};
pub use consensus::{decide, Decision};
pub use extract::{ExtractError, FaceExtractor};
pub use notify::{LogNotifier, NotifyError, Notifier};
pub use store::{EmbeddingStore, MemoryStore, StoreError};
pub use tally::{match_faces, FoundFace, LectureReport, VoteTally};
pub use types::{
    DetectedFace, Detection, Embedding, EmbeddingId, EmbeddingRecord, Identity, IdentityError,
    ImageSize, Region, StoredEmbedding,
};
