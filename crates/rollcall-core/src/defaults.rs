//! Default operating values for the decision logic.
//!
//! The two tolerances are independent: classroom photos offer many more
//! comparison opportunities for a false positive than a single enrollment.

/// Embedding dimensionality of the bundled ArcFace model.
pub const DIMENSION: usize = 512;

/// Maximum distance for a candidate to agree with an existing embedding.
///
/// Calibrated for L2-normalized ArcFace vectors, where Euclidean distance
/// `d` and cosine similarity `c` satisfy `d = sqrt(2 - 2c)`. 1.1 admits
/// pairs with `c >= 0.395`, in line with the usual ArcFace cut of 0.40.
pub const ENROLLMENT_TOLERANCE: f32 = 1.1;

/// Maximum distance for a classroom face to vote for a roster embedding.
///
/// Stricter than enrollment: 1.0 admits pairs with `c >= 0.5`.
pub const LECTURE_TOLERANCE: f32 = 1.0;

/// Embeddings this many days old or older are evicted.
pub const VALIDITY_DAYS: i64 = 7;

/// Identities left with fewer embeddings than this are signalled.
pub const LOW_COVERAGE_THRESHOLD: usize = 3;

/// Roll numbers are nine characters long.
pub const IDENTITY_LEN: usize = 9;
