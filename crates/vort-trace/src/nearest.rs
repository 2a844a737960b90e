//! Nearest-primary-point search used to seed the locator.
//!
//! Only primary points are indexed. Two implementations are provided: a
//! linear scan for verification and tiny meshes, and a box-pruned tree.

use vort_math::{Aabb3, Point3};
use vort_mesh::MeshSnapshot;

/// Approximate nearest primary point of a snapshot.
pub trait NearestNeighbor: Send + Sync {
    /// Nearest indexed point to `pos` and its distance.
    ///
    /// `guess` is a point index likely to be close (for example the
    /// previous ray's answer); it only bounds the initial search radius.
    /// Returns `None` for an empty index.
    fn find_nearest(&self, pos: &Point3, guess: Option<usize>) -> Option<(usize, f64)>;
}

/// Exhaustive scan over all primary points.
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    points: Vec<Point3>,
}

impl BruteForceIndex {
    /// Index the primaries of `snapshot`.
    pub fn new(snapshot: &MeshSnapshot) -> Self {
        Self {
            points: snapshot.points[..snapshot.num_primary]
                .iter()
                .map(|p| p.position)
                .collect(),
        }
    }
}

impl NearestNeighbor for BruteForceIndex {
    fn find_nearest(&self, pos: &Point3, _guess: Option<usize>) -> Option<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - pos).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, d2)| (i, d2.sqrt()))
    }
}

/// Node of a [`KdTree`].
#[derive(Debug, Clone)]
enum KdNode {
    Leaf {
        aabb: Aabb3,
        points: Vec<usize>,
    },
    Internal {
        aabb: Aabb3,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
}

impl KdNode {
    fn aabb(&self) -> &Aabb3 {
        match self {
            KdNode::Leaf { aabb, .. } | KdNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Median-split tree over primary points with bounding-box pruning.
#[derive(Debug, Clone)]
pub struct KdTree {
    root: Option<KdNode>,
    positions: Vec<Point3>,
}

/// Points per leaf.
const LEAF_SIZE: usize = 8;

impl KdTree {
    /// Build over the primaries of `snapshot`.
    pub fn build(snapshot: &MeshSnapshot) -> Self {
        let positions: Vec<Point3> = snapshot.points[..snapshot.num_primary]
            .iter()
            .map(|p| p.position)
            .collect();
        let mut ids: Vec<usize> = (0..positions.len()).collect();
        let root = if ids.is_empty() {
            None
        } else {
            Some(build_node(&positions, &mut ids))
        };
        Self { root, positions }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn search(&self, node: &KdNode, pos: &Point3, best: &mut (usize, f64)) {
        if box_distance2(node.aabb(), pos) >= best.1 {
            return;
        }
        match node {
            KdNode::Leaf { points, .. } => {
                for &i in points {
                    let d2 = (self.positions[i] - pos).norm_squared();
                    if d2 < best.1 {
                        *best = (i, d2);
                    }
                }
            }
            KdNode::Internal { left, right, .. } => {
                // Nearer child first so the far one is more likely pruned.
                let dl = box_distance2(left.aabb(), pos);
                let dr = box_distance2(right.aabb(), pos);
                if dl <= dr {
                    self.search(left, pos, best);
                    self.search(right, pos, best);
                } else {
                    self.search(right, pos, best);
                    self.search(left, pos, best);
                }
            }
        }
    }
}

impl NearestNeighbor for KdTree {
    fn find_nearest(&self, pos: &Point3, guess: Option<usize>) -> Option<(usize, f64)> {
        let root = self.root.as_ref()?;
        let mut best = match guess.and_then(|g| self.positions.get(g).map(|p| (g, p))) {
            // Nudge up so the guess itself is found again if nothing beats it.
            Some((g, p)) => (g, (p - pos).norm_squared() * (1.0 + 1e-12) + f64::MIN_POSITIVE),
            None => (0, f64::INFINITY),
        };
        self.search(root, pos, &mut best);
        Some((best.0, best.1.sqrt()))
    }
}

fn build_node(positions: &[Point3], ids: &mut [usize]) -> KdNode {
    let aabb = Aabb3::from_points(ids.iter().map(|&i| &positions[i]));

    if ids.len() <= LEAF_SIZE {
        return KdNode::Leaf {
            aabb,
            points: ids.to_vec(),
        };
    }

    let size = aabb.size();
    let axis = if size.x >= size.y && size.x >= size.z {
        0
    } else if size.y >= size.z {
        1
    } else {
        2
    };

    let mid = ids.len() / 2;
    ids.select_nth_unstable_by(mid, |&a, &b| positions[a][axis].total_cmp(&positions[b][axis]));
    let (left, right) = ids.split_at_mut(mid);

    KdNode::Internal {
        aabb,
        left: Box::new(build_node(positions, left)),
        right: Box::new(build_node(positions, right)),
    }
}

/// Squared distance from `p` to the closest point of `aabb`.
fn box_distance2(aabb: &Aabb3, p: &Point3) -> f64 {
    let mut d2 = 0.0;
    for k in 0..3 {
        let v = p[k];
        let excess = if v < aabb.min[k] {
            aabb.min[k] - v
        } else if v > aabb.max[k] {
            v - aabb.max[k]
        } else {
            0.0
        };
        d2 += excess * excess;
    }
    d2
}

#[cfg(test)]
mod tests {
    use super::*;
    use vort_mesh::testkit;

    #[test]
    fn test_brute_force_finds_owner() {
        let snap = testkit::lattice(3, 1.0);
        let index = BruteForceIndex::new(&snap);
        let (i, d) = index.find_nearest(&Point3::new(2.4, 0.6, 1.5), None).unwrap();
        assert_eq!(i, 2 + 3 * (0 + 3 * 1));
        assert!((d - (0.01f64 + 0.01).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_kdtree_matches_brute_force() {
        let snap = testkit::lattice(6, 0.5);
        let tree = KdTree::build(&snap);
        let brute = BruteForceIndex::new(&snap);
        assert_eq!(tree.len(), 216);

        let mut guess = None;
        for s in 0..200 {
            let f = s as f64;
            let pos = Point3::new(
                (f * 0.731).rem_euclid(3.0),
                (f * 1.379).rem_euclid(3.0),
                (f * 0.257).rem_euclid(3.0),
            );
            let (a, da) = tree.find_nearest(&pos, guess).unwrap();
            let (_, db) = brute.find_nearest(&pos, None).unwrap();
            assert!((da - db).abs() < 1e-9, "sample {s}: tree {da} brute {db}");
            guess = Some(a);
        }
    }

    #[test]
    fn test_kdtree_far_guess_still_exact() {
        let snap = testkit::lattice(4, 1.0);
        let tree = KdTree::build(&snap);
        let pos = Point3::new(0.2, 0.3, 0.1);
        let (i, _) = tree.find_nearest(&pos, Some(63)).unwrap();
        assert_eq!(i, 0);
        let (i, _) = tree.find_nearest(&pos, Some(0)).unwrap();
        assert_eq!(i, 0);
    }

    #[test]
    fn test_ghosts_not_indexed() {
        let snap = testkit::periodic_lattice(2, 1.0);
        let tree = KdTree::build(&snap);
        let (i, _) = tree.find_nearest(&Point3::new(-0.5, 0.5, 0.5), None).unwrap();
        assert!(snap.is_primary(i));
        assert_eq!(i, 0);
    }

    #[test]
    fn test_empty_index() {
        let mut snap = testkit::lattice(1, 1.0);
        snap.num_primary = 0;
        snap.points.clear();
        assert!(KdTree::build(&snap).find_nearest(&Point3::origin(), None).is_none());
        assert!(BruteForceIndex::new(&snap).find_nearest(&Point3::origin(), None).is_none());
    }
}
