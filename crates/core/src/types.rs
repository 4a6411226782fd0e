/// Seeds are unsigned 64-bit, matching what diffusion samplers accept.
pub type Seed = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
