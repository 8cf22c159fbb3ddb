//! Seeded synthetic multi-class classification data.
//!
//! Clusters of normally distributed points are placed on the vertices of a
//! hypercube spanning the informative features. Each cluster is sheared by a
//! random linear map, redundant features are random linear combinations of
//! the informative ones, the remaining features are pure noise, and a
//! fraction of labels is reassigned at random.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use hs_types::{DataError, Dataset, HsResult};

/// Parameters of the synthetic generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_informative: usize,
    pub n_redundant: usize,
    pub n_classes: usize,
    pub n_clusters_per_class: usize,
    /// Half side length of the hypercube the cluster centres sit on.
    pub class_sep: f64,
    /// Fraction of samples whose label is replaced by a random class.
    pub flip_y: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_samples: 10_000,
            n_features: 20,
            n_informative: 15,
            n_redundant: 3,
            n_classes: 3,
            n_clusters_per_class: 2,
            class_sep: 1.0,
            flip_y: 0.1,
            seed: 42,
        }
    }
}

impl SyntheticSpec {
    pub fn with_samples(mut self, n: usize) -> Self {
        self.n_samples = n;
        self
    }

    pub fn with_features(mut self, total: usize, informative: usize, redundant: usize) -> Self {
        self.n_features = total;
        self.n_informative = informative;
        self.n_redundant = redundant;
        self
    }

    pub fn with_classes(mut self, n: usize) -> Self {
        self.n_classes = n;
        self
    }

    pub fn with_flip_y(mut self, flip_y: f64) -> Self {
        self.flip_y = flip_y;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), DataError> {
        let invalid = |message: String| -> Result<(), DataError> {
            Err(DataError::InvalidGenerator { message })
        };

        if self.n_classes < 2 {
            return invalid(format!("n_classes must be >= 2, got {}", self.n_classes));
        }
        if self.n_informative == 0 {
            return invalid("n_informative must be > 0".to_string());
        }
        if self.n_informative + self.n_redundant > self.n_features {
            return invalid(format!(
                "n_informative ({}) + n_redundant ({}) exceeds n_features ({})",
                self.n_informative, self.n_redundant, self.n_features
            ));
        }
        if self.n_clusters_per_class == 0 {
            return invalid("n_clusters_per_class must be > 0".to_string());
        }
        let n_clusters = self.n_classes * self.n_clusters_per_class;
        if self.n_informative < 64 && n_clusters as u64 > 1u64 << self.n_informative {
            return invalid(format!(
                "{n_clusters} clusters do not fit on a hypercube of {} informative features",
                self.n_informative
            ));
        }
        if self.n_samples < n_clusters {
            return invalid(format!(
                "n_samples ({}) must be at least the number of clusters ({n_clusters})",
                self.n_samples
            ));
        }
        if !(0.0..=1.0).contains(&self.flip_y) {
            return invalid(format!("flip_y must be in [0, 1], got {}", self.flip_y));
        }
        if self.class_sep <= 0.0 {
            return invalid(format!("class_sep must be positive, got {}", self.class_sep));
        }
        Ok(())
    }

    /// Generate the dataset. The same spec always yields the same table.
    pub fn generate(&self) -> HsResult<Dataset> {
        self.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let n_inf = self.n_informative;
        let n_clusters = self.n_classes * self.n_clusters_per_class;

        let centroids = self.hypercube_vertices(&mut rng, n_clusters);
        let redundant_map = random_matrix(&mut rng, n_inf, self.n_redundant);

        let mut features = Vec::with_capacity(self.n_samples);
        let mut labels = Vec::with_capacity(self.n_samples);

        for (cluster, centroid) in centroids.iter().enumerate() {
            let mut size = self.n_samples / n_clusters;
            if cluster < self.n_samples % n_clusters {
                size += 1;
            }
            let shear = random_matrix(&mut rng, n_inf, n_inf);

            for _ in 0..size {
                let noise: Vec<f64> = (0..n_inf).map(|_| rng.sample(StandardNormal)).collect();
                let informative: Vec<f64> = (0..n_inf)
                    .map(|j| centroid[j] + (0..n_inf).map(|i| noise[i] * shear[i][j]).sum::<f64>())
                    .collect();

                let mut row = informative.clone();
                row.extend((0..self.n_redundant).map(|j| {
                    (0..n_inf)
                        .map(|i| informative[i] * redundant_map[i][j])
                        .sum::<f64>()
                }));
                let n_noise = self.n_features - n_inf - self.n_redundant;
                row.extend((0..n_noise).map(|_| rng.sample::<f64, _>(StandardNormal)));

                features.push(row);
                labels.push(cluster % self.n_classes);
            }
        }

        let mut flipped = 0usize;
        for label in labels.iter_mut() {
            if rng.gen::<f64>() < self.flip_y {
                *label = rng.gen_range(0..self.n_classes);
                flipped += 1;
            }
        }

        let mut order: Vec<usize> = (0..features.len()).collect();
        order.shuffle(&mut rng);
        let features: Vec<Vec<f64>> = order.iter().map(|&i| features[i].clone()).collect();
        let labels: Vec<usize> = order.iter().map(|&i| labels[i]).collect();

        info!(
            "Generated synthetic dataset: {} samples, {} features, {} classes ({} labels flipped)",
            self.n_samples, self.n_features, self.n_classes, flipped
        );

        Dataset::with_classes(features, labels, self.n_classes)
    }

    /// Distinct hypercube vertices in the informative subspace, scaled to
    /// `±class_sep`.
    fn hypercube_vertices(&self, rng: &mut ChaCha8Rng, count: usize) -> Vec<Vec<f64>> {
        let dims = self.n_informative;
        let mut seen: HashSet<Vec<bool>> = HashSet::with_capacity(count);
        let mut vertices = Vec::with_capacity(count);

        while vertices.len() < count {
            let bits: Vec<bool> = (0..dims).map(|_| rng.gen::<bool>()).collect();
            if seen.insert(bits.clone()) {
                vertices.push(
                    bits.iter()
                        .map(|&b| if b { self.class_sep } else { -self.class_sep })
                        .collect(),
                );
            }
        }

        vertices
    }
}

fn random_matrix(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| (0..cols).map(|_| rng.gen_range(-1.0..=1.0)).collect())
        .collect()
}
