//! Union-find grouping of qualifying pairs and deterministic primary
//! election.

use std::cmp::Ordering;

use mediadex_model::{DuplicateItem, SimilarityAnalysis};

use crate::dedup::metadata::quality_rank;

/// Disjoint-set union over candidate indices. Path-halving find with union
/// by rank; the resulting partition is independent of pair order.
#[derive(Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// A qualifying pair feeding the union step.
#[derive(Debug, Clone)]
pub struct ScoredPair {
    pub left: usize,
    pub right: usize,
    pub analysis: SimilarityAnalysis,
}

/// Partition candidate indices into groups of size >= 2.
///
/// Each returned component carries its member indices and the strongest
/// pair observed inside it (which decides confidence and detection method).
pub fn merge_pairs(item_count: usize, pairs: &[ScoredPair]) -> Vec<(Vec<usize>, SimilarityAnalysis)> {
    let mut dsu = UnionFind::new(item_count);
    for pair in pairs {
        dsu.union(pair.left, pair.right);
    }

    let mut components: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for index in 0..item_count {
        components.entry(dsu.find(index)).or_default().push(index);
    }

    let mut groups = Vec::new();
    for (root, members) in components {
        if members.len() < 2 {
            continue;
        }
        let strongest = pairs
            .iter()
            .filter(|pair| dsu.find(pair.left) == root)
            .map(|pair| &pair.analysis)
            .max_by(|a, b| {
                a.overall_score
                    .partial_cmp(&b.overall_score)
                    .unwrap_or(Ordering::Equal)
            })
            .cloned()
            .unwrap_or_default();
        groups.push((members, strongest));
    }

    groups
}

/// Index of the group's primary: greatest estimated quality, then largest
/// resolution, highest bitrate, largest file, earliest `last_modified`, and
/// finally smallest id. Deterministic for any input order.
pub fn elect_primary(items: &[&DuplicateItem]) -> usize {
    let mut best = 0usize;
    for candidate in 1..items.len() {
        if primary_order(items[candidate], items[best]) == Ordering::Greater {
            best = candidate;
        }
    }
    best
}

fn primary_order(a: &DuplicateItem, b: &DuplicateItem) -> Ordering {
    let quality = |item: &DuplicateItem| {
        item.metadata
            .quality
            .as_deref()
            .and_then(quality_rank)
            .unwrap_or(0)
    };
    let resolution = |item: &DuplicateItem| {
        item.metadata.width.unwrap_or(0) as i64 * item.metadata.height.unwrap_or(0) as i64
    };

    quality(a)
        .cmp(&quality(b))
        .then_with(|| resolution(a).cmp(&resolution(b)))
        .then_with(|| {
            a.metadata
                .bitrate
                .unwrap_or(0)
                .cmp(&b.metadata.bitrate.unwrap_or(0))
        })
        .then_with(|| a.size.cmp(&b.size))
        // Earlier copies outrank later ones, so the comparison flips.
        .then_with(|| b.last_modified.cmp(&a.last_modified))
        .then_with(|| b.file_id.as_i64().cmp(&a.file_id.as_i64()))
}
