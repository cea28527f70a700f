use std::fmt::Debug;

/// Resident state of one spill partition, as seen by a [`SpillPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub partition: usize,
    pub resident_entries: usize,
    pub resident_bytes: usize,
    pub runs: usize,
}

/// Chooses which partition to spill when the table budget is exhausted.
///
/// Only partitions with resident entries are candidates; `None` means
/// nothing can be spilled.
pub trait SpillPolicy: Send + Debug {
    fn select_victim(&self, partitions: &[PartitionStats]) -> Option<usize>;
}

/// Spills the partition holding the most resident bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestResidentPolicy;

impl SpillPolicy for LargestResidentPolicy {
    fn select_victim(&self, partitions: &[PartitionStats]) -> Option<usize> {
        partitions
            .iter()
            .filter(|p| p.resident_entries > 0)
            // ties go to the lowest partition
            .rev()
            .max_by_key(|p| p.resident_bytes)
            .map(|p| p.partition)
    }
}

/// Spills the partition with the fewest runs so far, evening out merge
/// work across partitions. Ties go to the larger partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct FewestRunsPolicy;

impl SpillPolicy for FewestRunsPolicy {
    fn select_victim(&self, partitions: &[PartitionStats]) -> Option<usize> {
        partitions
            .iter()
            .filter(|p| p.resident_entries > 0)
            .min_by(|a, b| {
                a.runs
                    .cmp(&b.runs)
                    .then_with(|| b.resident_bytes.cmp(&a.resident_bytes))
                    .then_with(|| a.partition.cmp(&b.partition))
            })
            .map(|p| p.partition)
    }
}
