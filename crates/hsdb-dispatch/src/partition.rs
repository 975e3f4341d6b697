/// A contiguous slice of a ranked list, tagged with its group index.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    pub group: usize,
    pub items: Vec<T>,
}

impl<T> Partition<T> {
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn len(&self) -> usize { self.items.len() }

    /// Same group, items transformed; items the closure rejects are dropped.
    pub fn filter_map<U>(self, f: impl FnMut(T) -> Option<U>) -> Partition<U> {
        Partition { group: self.group, items: self.items.into_iter().filter_map(f).collect() }
    }
}

/// Split `items` into exactly `group_count` contiguous blocks in rank order.
///
/// Block sizes differ by at most one; the `n % group_count` leftover items go
/// one each to the leading groups, so group 0 always holds the best item.
/// Missing items leave trailing groups empty.
///
/// ```
/// use hsdb_dispatch::partition;
/// let sizes: Vec<usize> = partition(&[1, 2, 3, 4, 5, 6, 7], 5).iter().map(|p| p.len()).collect();
/// assert_eq!(sizes, vec![2, 2, 1, 1, 1]);
/// ```
pub fn partition<T: Clone>(items: &[T], group_count: usize) -> Vec<Partition<T>> {
    let groups = group_count.max(1);
    let base = items.len() / groups;
    let extra = items.len() % groups;
    let mut start = 0;
    (0..groups)
        .map(|group| {
            let size = base + usize::from(group < extra);
            let part = Partition { group, items: items[start..start + size].to_vec() };
            start += size;
            part
        })
        .collect()
}
