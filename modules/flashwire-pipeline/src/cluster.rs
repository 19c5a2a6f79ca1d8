//! Per-flashpoint clustering: kNN graph over cosine similarity, connected
//! components via union-find, dense-ranked ids.
//!
//! Determinism contract: identical (entry, vector) inputs produce identical
//! cluster ids. Inputs are sorted by entry id before anything else, and the
//! component ranking breaks size ties on the smallest member id, never on
//! container iteration order.

use std::collections::HashMap;

use uuid::Uuid;

/// One entry's placement.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub entry_id: Uuid,
    pub cluster_uuid: Uuid,
    /// Dense rank within the flashpoint, 1-based.
    pub cluster_id: i32,
    /// Cosine similarity to the cluster centroid.
    pub similarity: f64,
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let (mut rx, mut ry) = (self.find(x), self.find(y));
        if rx == ry {
            return;
        }
        if self.rank[rx] < self.rank[ry] {
            std::mem::swap(&mut rx, &mut ry);
        }
        self.parent[ry] = rx;
        if self.rank[rx] == self.rank[ry] {
            self.rank[rx] += 1;
        }
    }
}

/// Cluster one flashpoint's unit vectors.
///
/// Edges connect each vector to its k nearest neighbours at or above the
/// cosine threshold; components become clusters. Singletons are valid
/// clusters. Zero inputs produce zero clusters.
pub fn cluster_vectors(
    items: &[(Uuid, Vec<f32>)],
    k: usize,
    threshold: f32,
) -> Vec<ClusterAssignment> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    let mut ordered: Vec<(Uuid, &[f32])> =
        items.iter().map(|(id, v)| (*id, v.as_slice())).collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut uf = UnionFind::new(n);
    let effective_k = k.min(n.saturating_sub(1));

    if effective_k > 0 {
        for i in 0..n {
            let mut sims: Vec<(usize, f32)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, dot(ordered[i].1, ordered[j].1)))
                .collect();
            // Highest similarity first; index ascending on exact ties.
            sims.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            for &(j, sim) in sims.iter().take(effective_k) {
                if sim >= threshold {
                    uf.union(i, j);
                }
            }
        }
    }

    // Gather components, keyed by root.
    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        components.entry(root).or_default().push(i);
    }

    // Rank: size descending, then smallest member entry id ascending. The
    // members within a component are already in ascending id order because
    // `ordered` is sorted.
    let mut ranked: Vec<Vec<usize>> = components.into_values().collect();
    ranked.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| ordered[a[0]].0.cmp(&ordered[b[0]].0))
    });

    let mut assignments = Vec::with_capacity(n);
    for (rank, members) in ranked.iter().enumerate() {
        let cluster_uuid = Uuid::new_v4();
        let centroid = centroid_of(members.iter().map(|&i| ordered[i].1), ordered[0].1.len());

        for &i in members {
            assignments.push(ClusterAssignment {
                entry_id: ordered[i].0,
                cluster_uuid,
                cluster_id: (rank + 1) as i32,
                similarity: dot(ordered[i].1, &centroid) as f64,
            });
        }
    }

    assignments
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Mean of unit vectors, re-normalized. A zero mean (pathological) falls
/// back to the first member so similarities stay defined.
fn centroid_of<'a>(vectors: impl Iterator<Item = &'a [f32]> + Clone, dim: usize) -> Vec<f32> {
    let mut centroid = vec![0f32; dim];
    let mut count = 0usize;
    for v in vectors.clone() {
        for (c, x) in centroid.iter_mut().zip(v.iter()) {
            *c += x;
        }
        count += 1;
    }
    if count == 0 {
        return centroid;
    }
    for c in centroid.iter_mut() {
        *c /= count as f32;
    }
    let norm: f32 = centroid.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for c in centroid.iter_mut() {
            *c /= norm;
        }
    } else if let Some(first) = vectors.clone().next() {
        centroid.copy_from_slice(first);
    }
    centroid
}
