use crate::record::CompanyRecord;

/// A contiguous slice of the worklist owned by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub companies: Vec<CompanyRecord>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

/// Splits `items` into exactly `num_chunks` contiguous slices whose lengths
/// differ by at most one, the remainder going to the earliest slices.
///
/// Returns nothing when `num_chunks` is zero.
pub fn partition<T>(items: Vec<T>, num_chunks: usize) -> Vec<Vec<T>> {
    if num_chunks == 0 {
        return vec![];
    }

    let base = items.len() / num_chunks;
    let remainder = items.len() % num_chunks;

    let mut items = items.into_iter();
    (0..num_chunks)
        .map(|i| {
            let len = base + usize::from(i < remainder);
            items.by_ref().take(len).collect()
        })
        .collect()
}

pub(crate) fn chunks(worklist: Vec<CompanyRecord>, num_chunks: usize) -> Vec<Chunk> {
    partition(worklist, num_chunks)
        .into_iter()
        .enumerate()
        .map(|(index, companies)| Chunk { index, companies })
        .collect()
}
