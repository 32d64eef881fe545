//! # Track clusters
//!
//! Groups of tracks connected through crossovers. Offset corrections are only defined up to a
//! constant within each group, so the solver adds one constraint per cluster.
//!
//! Clusters are grown breadth-first from the lowest unassigned track id; cluster `0` therefore
//! always holds track `0`.

use std::collections::VecDeque;

use tracing::debug;

use super::records::SolverRecord;
use crate::bitmatrix::BitMatrix;

/// Cluster membership of every track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clusters {
    assignment: Vec<usize>,
    n_clusters: usize,
}

impl Clusters {
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Cluster id of `track`.
    pub fn cluster_of(&self, track: usize) -> usize {
        self.assignment[track]
    }

    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Tracks of `cluster`, ascending.
    pub fn members(&self, cluster: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignment
            .iter()
            .enumerate()
            .filter(move |(_, &c)| c == cluster)
            .map(|(track, _)| track)
    }
}

/// Symmetric `n_tracks × n_tracks` matrix with a bit set for every pair sharing a crossover.
pub fn adjacency(n_tracks: usize, records: &[SolverRecord]) -> BitMatrix {
    let mut adj = BitMatrix::new(n_tracks);
    for rec in records {
        adj.set_symmetric(rec.tracks[0], rec.tracks[1]);
    }
    adj
}

/// Partition the tracks into connected components of `adjacency`.
pub fn find_clusters(adjacency: &BitMatrix) -> Clusters {
    let n = adjacency.size();
    let mut assignment: Vec<Option<usize>> = vec![None; n];
    let mut n_clusters = 0;
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if assignment[seed].is_some() {
            continue;
        }
        let cluster = n_clusters;
        n_clusters += 1;
        assignment[seed] = Some(cluster);
        queue.push_back(seed);

        while let Some(track) = queue.pop_front() {
            for other in adjacency.row_ones(track) {
                if assignment[other].is_none() {
                    assignment[other] = Some(cluster);
                    queue.push_back(other);
                }
            }
        }
    }

    let clusters = Clusters {
        assignment: assignment.into_iter().map(|c| c.unwrap_or(0)).collect(),
        n_clusters,
    };
    if n_clusters > 1 {
        for c in 0..n_clusters {
            debug!(
                "Cluster {c}: tracks {:?}",
                clusters.members(c).collect::<Vec<_>>()
            );
        }
    } else {
        debug!("{n} tracks form a single connected cluster");
    }
    clusters
}
