/// Counters of the draw packer, snapshot with [`crate::Context::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// `(start, count)` pairs that emitted at least one sub-draw.
    pub draws: u64,
    /// Hardware draws, after splitting.
    pub sub_draws: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub index_scans: u64,
    pub index_cache_hits: u64,
    pub clears: u64,
    pub jobs_submitted: u64,
}
