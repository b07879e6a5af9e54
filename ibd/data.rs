//! # Pairwise Data Assembly Module
//!
//! This module is the exclusive entry point for user-provided sample data. It
//! reads the comma-delimited genotype table, validates it against a fixed
//! schema, and reduces it to the pairwise structures the statistical core
//! consumes: one geographic distance per unordered sample pair and, per marker,
//! the number of identical allele combinations (`ibd`) out of the number of
//! comparable ones (`total`).
//!
//! - Strict Schema: the first three columns are always `id`, then two
//!   coordinates (`x, y` or `latitude, longitude`), followed by one `a/b`
//!   genotype column per marker. Column names after the third are marker names.
//! - User-Centric Errors: every failure is assumed to be an input error, and
//!   `DataError` names the offending line, sample and marker.
//! - Read-Only Output: `PairwiseData` does not depend on model parameters; it
//!   is built once and shared by reference for the whole run.

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Mean Earth radius used by the spherical law of cosines.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Missing-allele synonyms, in substitution order. `nan` must be replaced
/// before `na`, otherwise `nan` would turn into `0n`.
pub const MISSING_ALLELE_TOKENS: [&str; 6] = ["none", "nan", "na", "x", "-", "."];

/// Allele code standing for "no data".
pub const MISSING_ALLELE: u32 = 0;

const ALLELE_DELIMITER: char = '/';
const LEADING_COLUMNS: usize = 3;

/// A diploid genotype as two integer-coded alleles.
pub type Genotype = [u32; 2];

/// How the two coordinate columns are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateMode {
    /// Cartesian `x, y`; distances are Euclidean in input units.
    Planar,
    /// `latitude, longitude` in decimal degrees; distances are great-circle
    /// distances in meters.
    Spherical,
}

impl fmt::Display for CoordinateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planar => f.write_str("planar"),
            Self::Spherical => f.write_str("spherical"),
        }
    }
}

impl FromStr for CoordinateMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planar" | "cartesian" | "euclidean" => Ok(Self::Planar),
            "spherical" | "geographic" | "latlon" => Ok(Self::Spherical),
            other => Err(DataError::UnknownCoordinateMode(other.to_string())),
        }
    }
}

/// One georeferenced individual.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: String,
    pub coordinates: [f64; 2],
}

/// A named marker with one genotype per sample, in sample order.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerLocus {
    pub name: String,
    pub genotypes: Vec<Genotype>,
}

/// Per-marker aggregate over all pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSummary {
    /// Sum of `total` over all pairs.
    pub tsz: f64,
    /// Background identity probability, `Σ ibd / tsz`.
    pub fbar: f64,
    /// `1 - fbar`.
    pub fbar_1: f64,
    /// Likelihood weight, `2 / (tsz - 1)`.
    pub weight: f64,
}

impl MarkerSummary {
    /// Aggregates one marker's per-pair counts.
    ///
    /// A marker whose total comparable count is exactly one has an undefined
    /// weight and is rejected, as is a marker with no comparable allele pairs.
    pub fn from_counts(
        marker: &str,
        ibd: ArrayView1<u32>,
        total: ArrayView1<u32>,
    ) -> Result<Self, DataError> {
        let tsz: f64 = total.iter().map(|&t| f64::from(t)).sum();
        let shared: f64 = ibd.iter().map(|&s| f64::from(s)).sum();

        if tsz == 0.0 {
            return Err(DataError::NoComparableAlleles {
                marker: marker.to_string(),
            });
        }
        if tsz == 1.0 {
            return Err(DataError::DegenerateMarkerWeight {
                marker: marker.to_string(),
            });
        }

        let fbar = shared / tsz;
        Ok(Self {
            tsz,
            fbar,
            fbar_1: 1.0 - fbar,
            weight: 2.0 / (tsz - 1.0),
        })
    }
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Error from the underlying CSV reader: {0}")]
    CsvError(#[from] csv::Error),
    #[error("The input file contains no header row.")]
    EmptyInput,
    #[error(
        "The header row has {columns} columns, but at least 3 (id, two coordinates) are required."
    )]
    MalformedHeader { columns: usize },
    #[error("The header row names no marker columns after the id and coordinate columns.")]
    NoMarkers,
    #[error(
        "Line {line} (sample '{sample}') has {found} columns, but the header declares {expected} (3 leading columns plus one per marker)."
    )]
    RowLengthMismatch {
        line: u64,
        sample: String,
        expected: usize,
        found: usize,
    },
    #[error("Line {line} (sample '{sample}') has an unparsable coordinate '{value}'.")]
    InvalidCoordinate {
        line: u64,
        sample: String,
        value: String,
    },
    #[error("Sample '{sample}' has a non-finite coordinate.")]
    NonFiniteCoordinate { sample: String },
    #[error(
        "Line {line} (sample '{sample}') has an invalid genotype '{value}' for marker '{marker}'. Expected two integer alleles separated by '/'."
    )]
    InvalidGenotype {
        line: u64,
        sample: String,
        marker: String,
        value: String,
    },
    #[error("At least two samples are required to form a pair, found {found}.")]
    TooFewSamples { found: usize },
    #[error("Marker '{marker}' has {found} genotypes, but there are {expected} samples.")]
    GenotypeCountMismatch {
        marker: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "Marker '{marker}' has a total comparable allele count of exactly 1 across all pairs, so its likelihood weight 2/(n-1) is undefined."
    )]
    DegenerateMarkerWeight { marker: String },
    #[error("Marker '{marker}' has no comparable (non-missing) allele pairs across all pairs.")]
    NoComparableAlleles { marker: String },
    #[error("Unrecognized coordinate mode '{0}'. Use 'planar' or 'spherical'.")]
    UnknownCoordinateMode(String),
    #[error("Expected {expected} pairwise distances, found {found}.")]
    DistanceCountMismatch { expected: usize, found: usize },
    #[error("Pairwise distance #{pair} is negative or not finite.")]
    InvalidDistance { pair: usize },
}

/// Geographic distance between two coordinates under the given mode.
pub fn distance(a: [f64; 2], b: [f64; 2], mode: CoordinateMode) -> f64 {
    match mode {
        CoordinateMode::Planar => (a[0] - b[0]).hypot(a[1] - b[1]),
        CoordinateMode::Spherical => great_circle_distance(a, b),
    }
}

/// Spherical law of cosines on `[latitude, longitude]` in degrees.
fn great_circle_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    if a == b {
        return 0.0;
    }
    let lat_a = a[0].to_radians();
    let lat_b = b[0].to_radians();
    let delta_lon = (b[1] - a[1]).to_radians();
    let cos_angle = lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * delta_lon.cos();
    cos_angle.clamp(-1.0, 1.0).acos() * EARTH_RADIUS_METERS
}

/// Counts identical and comparable allele combinations between two genotypes.
///
/// Each of the 2×2 combinations is compared; any combination touching a
/// missing allele is skipped. Returns `(ibd, total)`.
pub fn allele_pair_counts(first: Genotype, second: Genotype) -> (u32, u32) {
    let mut ibd = 0;
    let mut total = 0;
    for a in first.into_iter().filter(|&a| a != MISSING_ALLELE) {
        for b in second.into_iter().filter(|&b| b != MISSING_ALLELE) {
            total += 1;
            if a == b {
                ibd += 1;
            }
        }
    }
    (ibd, total)
}

/// Normalizes one allele token to its integer code, mapping missing-data
/// synonyms to `0`. Returns `None` when the token is not an integer.
pub fn normalize_allele(token: &str) -> Option<u32> {
    let mut normalized = token.trim().to_lowercase();
    for missing in MISSING_ALLELE_TOKENS {
        normalized = normalized.replace(missing, "0");
    }
    normalized.parse().ok()
}

/// Parses an `a/b` genotype field.
pub fn parse_genotype(field: &str) -> Option<Genotype> {
    let mut alleles = field.split(ALLELE_DELIMITER);
    let first = normalize_allele(alleles.next()?)?;
    let second = normalize_allele(alleles.next()?)?;
    if alleles.next().is_some() {
        return None;
    }
    Some([first, second])
}

/// All pairwise observations for one dataset.
///
/// Pairs are stored in condensed order `(0,1), (0,2), …, (0,n-1), (1,2), …`.
/// The count matrices have one row per pair and one column per marker.
#[derive(Debug, Clone)]
pub struct PairwiseData {
    samples: Vec<Sample>,
    marker_names: Vec<String>,
    mode: CoordinateMode,
    pairs: Vec<(usize, usize)>,
    distances: Array1<f64>,
    ibd: Array2<u32>,
    total: Array2<u32>,
    summaries: Vec<MarkerSummary>,
}

impl PairwiseData {
    /// Loads and assembles a genotype table from disk.
    pub fn from_path(path: impl AsRef<Path>, mode: CoordinateMode) -> Result<Self, DataError> {
        let path = path.as_ref();
        log::info!("Loading genotype table from {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), mode)
    }

    /// Parses a genotype table from any reader and assembles the pairs.
    pub fn from_reader<R: Read>(reader: R, mode: CoordinateMode) -> Result<Self, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = csv_reader.records();

        let header = records.next().ok_or(DataError::EmptyInput)??;
        if header.len() < LEADING_COLUMNS {
            return Err(DataError::MalformedHeader {
                columns: header.len(),
            });
        }
        let marker_names: Vec<String> = header
            .iter()
            .skip(LEADING_COLUMNS)
            .map(str::to_string)
            .collect();
        if marker_names.is_empty() {
            return Err(DataError::NoMarkers);
        }
        let expected_columns = LEADING_COLUMNS + marker_names.len();

        let mut samples = Vec::new();
        let mut genotypes: Vec<Vec<Genotype>> = vec![Vec::new(); marker_names.len()];

        for record in records {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            let sample = record.get(0).unwrap_or_default().to_string();

            if record.len() != expected_columns {
                return Err(DataError::RowLengthMismatch {
                    line,
                    sample,
                    expected: expected_columns,
                    found: record.len(),
                });
            }

            let mut coordinates = [0.0; 2];
            for (slot, value) in coordinates.iter_mut().zip(record.iter().skip(1)) {
                *slot = value.parse().map_err(|_| DataError::InvalidCoordinate {
                    line,
                    sample: sample.clone(),
                    value: value.to_string(),
                })?;
            }

            for ((column, name), field) in genotypes
                .iter_mut()
                .zip(&marker_names)
                .zip(record.iter().skip(LEADING_COLUMNS))
            {
                let genotype = parse_genotype(field).ok_or_else(|| DataError::InvalidGenotype {
                    line,
                    sample: sample.clone(),
                    marker: name.clone(),
                    value: field.to_string(),
                })?;
                column.push(genotype);
            }

            samples.push(Sample {
                id: sample,
                coordinates,
            });
        }

        let markers = marker_names
            .into_iter()
            .zip(genotypes)
            .map(|(name, genotypes)| MarkerLocus { name, genotypes })
            .collect();
        Self::from_parts(samples, markers, mode)
    }

    /// Assembles pairwise observations from in-memory samples and loci.
    pub fn from_parts(
        samples: Vec<Sample>,
        markers: Vec<MarkerLocus>,
        mode: CoordinateMode,
    ) -> Result<Self, DataError> {
        if samples.len() < 2 {
            return Err(DataError::TooFewSamples {
                found: samples.len(),
            });
        }
        if markers.is_empty() {
            return Err(DataError::NoMarkers);
        }
        if let Some(bad) = samples
            .iter()
            .find(|s| s.coordinates.iter().any(|c| !c.is_finite()))
        {
            return Err(DataError::NonFiniteCoordinate {
                sample: bad.id.clone(),
            });
        }
        if let Some(bad) = markers.iter().find(|m| m.genotypes.len() != samples.len()) {
            return Err(DataError::GenotypeCountMismatch {
                marker: bad.name.clone(),
                expected: samples.len(),
                found: bad.genotypes.len(),
            });
        }

        let pairs: Vec<(usize, usize)> = (0..samples.len()).tuple_combinations().collect();
        let distances = Array1::from(
            pairs
                .par_iter()
                .map(|&(i, j)| distance(samples[i].coordinates, samples[j].coordinates, mode))
                .collect::<Vec<f64>>(),
        );

        let mut ibd = Array2::<u32>::zeros((pairs.len(), markers.len()));
        let mut total = Array2::<u32>::zeros((pairs.len(), markers.len()));
        Zip::indexed(&mut ibd)
            .and(&mut total)
            .par_for_each(|(p, m), shared, compared| {
                let (i, j) = pairs[p];
                let genotypes = &markers[m].genotypes;
                (*shared, *compared) = allele_pair_counts(genotypes[i], genotypes[j]);
            });

        let marker_names: Vec<String> = markers.into_iter().map(|m| m.name).collect();
        let summaries = summarize_markers(&marker_names, ibd.view(), total.view())?;

        log::info!(
            "Assembled {} pairs from {} samples across {} markers ({} coordinates)",
            pairs.len(),
            samples.len(),
            marker_names.len(),
            mode
        );

        Ok(Self {
            samples,
            marker_names,
            mode,
            pairs,
            distances,
            ibd,
            total,
            summaries,
        })
    }

    /// Returns a copy of this dataset with the pairwise distances replaced,
    /// keeping all genetic counts. Used to probe distance (in)dependence.
    pub fn with_distances(&self, distances: Array1<f64>) -> Result<Self, DataError> {
        if distances.len() != self.pairs.len() {
            return Err(DataError::DistanceCountMismatch {
                expected: self.pairs.len(),
                found: distances.len(),
            });
        }
        if let Some(pair) = distances.iter().position(|d| !d.is_finite() || *d < 0.0) {
            return Err(DataError::InvalidDistance { pair });
        }
        Ok(Self {
            distances,
            ..self.clone()
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn marker_names(&self) -> &[String] {
        &self.marker_names
    }

    pub fn mode(&self) -> CoordinateMode {
        self.mode
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn n_markers(&self) -> usize {
        self.marker_names.len()
    }

    /// Sample indices `(i, j)`, `i < j`, for each pair row.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Pairwise distances in condensed order.
    pub fn distances(&self) -> ArrayView1<'_, f64> {
        self.distances.view()
    }

    /// Identical allele combinations, shape `(n_pairs, n_markers)`.
    pub fn ibd(&self) -> ArrayView2<'_, u32> {
        self.ibd.view()
    }

    /// Comparable allele combinations, shape `(n_pairs, n_markers)`.
    pub fn total(&self) -> ArrayView2<'_, u32> {
        self.total.view()
    }

    pub fn summaries(&self) -> &[MarkerSummary] {
        &self.summaries
    }

    /// Symmetric distance lookup by sample index; zero on the diagonal.
    pub fn distance_between(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let n = self.samples.len();
        let index = n * lo - lo * (lo + 1) / 2 + (hi - lo - 1);
        self.distances[index]
    }
}

fn summarize_markers(
    names: &[String],
    ibd: ArrayView2<u32>,
    total: ArrayView2<u32>,
) -> Result<Vec<MarkerSummary>, DataError> {
    names
        .iter()
        .enumerate()
        .map(|(m, name)| {
            let summary = MarkerSummary::from_counts(name, ibd.column(m), total.column(m))?;
            if summary.fbar == 0.0 || summary.fbar == 1.0 {
                log::warn!(
                    "Marker '{}' has background identity {:.1}; it carries no information about isolation by distance",
                    name,
                    summary.fbar
                );
            }
            Ok(summary)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    const TABLE: &str = "\
id,x,y,m1,m2
# a comment line
a,0,0,1/2,3/3
b,3,4,1/1,NA/3
c,6,8,2/2,nan/None
";

    #[test]
    fn missing_tokens_respect_precedence() {
        assert_eq!(normalize_allele("NaN"), Some(0));
        assert_eq!(normalize_allele("na"), Some(0));
        assert_eq!(normalize_allele("None"), Some(0));
        assert_eq!(normalize_allele("X"), Some(0));
        assert_eq!(normalize_allele("-"), Some(0));
        assert_eq!(normalize_allele("."), Some(0));
        assert_eq!(normalize_allele(" 17 "), Some(17));
        assert_eq!(normalize_allele("abc"), None);
        assert_eq!(normalize_allele(""), None);
    }

    #[test]
    fn genotype_requires_exactly_two_alleles() {
        assert_eq!(parse_genotype("12/14"), Some([12, 14]));
        assert_eq!(parse_genotype("NA/14"), Some([0, 14]));
        assert_eq!(parse_genotype("12"), None);
        assert_eq!(parse_genotype("1/2/3"), None);
    }

    #[test]
    fn allele_pair_counts_skip_missing() {
        assert_eq!(allele_pair_counts([1, 2], [1, 2]), (2, 4));
        assert_eq!(allele_pair_counts([1, 1], [1, 1]), (4, 4));
        assert_eq!(allele_pair_counts([0, 2], [2, 3]), (1, 2));
        assert_eq!(allele_pair_counts([0, 0], [2, 3]), (0, 0));
    }

    #[test]
    fn parses_table_and_assembles_pairs() {
        let data = PairwiseData::from_reader(TABLE.as_bytes(), CoordinateMode::Planar).unwrap();
        assert_eq!(data.n_samples(), 3);
        assert_eq!(data.n_pairs(), 3);
        assert_eq!(data.marker_names(), ["m1", "m2"]);
        let expected_pairs: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];
        assert_eq!(data.pairs(), expected_pairs);
        assert_eq!(data.distances(), array![5.0, 10.0, 5.0]);

        // m1: a=1/2 b=1/1 c=2/2
        assert_eq!(data.ibd().column(0), array![2u32, 2, 0]);
        assert_eq!(data.total().column(0), array![4u32, 4, 4]);
        // m2: a=3/3 b=0/3 c=0/0
        assert_eq!(data.ibd().column(1), array![2u32, 0, 0]);
        assert_eq!(data.total().column(1), array![2u32, 0, 0]);

        let m1 = data.summaries()[0];
        assert_relative_eq!(m1.tsz, 12.0);
        assert_relative_eq!(m1.fbar, 4.0 / 12.0);
        assert_relative_eq!(m1.fbar_1, 8.0 / 12.0);
        assert_relative_eq!(m1.weight, 2.0 / 11.0);
    }

    #[test]
    fn counts_never_exceed_totals() {
        let data = PairwiseData::from_reader(TABLE.as_bytes(), CoordinateMode::Planar).unwrap();
        for (shared, compared) in data.ibd().iter().zip(data.total().iter()) {
            assert!(shared <= compared);
        }
    }

    #[test]
    fn row_length_mismatch_names_the_row() {
        let table = "id,x,y,m1,m2\na,0,0,1/2,3/3\nb,1,1,1/1\n";
        let err = PairwiseData::from_reader(table.as_bytes(), CoordinateMode::Planar).unwrap_err();
        match err {
            DataError::RowLengthMismatch {
                line,
                sample,
                expected,
                found,
            } => {
                assert_eq!(line, 3);
                assert_eq!(sample, "b");
                assert_eq!(expected, 5);
                assert_eq!(found, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_bad_coordinates_and_genotypes() {
        let bad_coord = "id,x,y,m1\na,zero,0,1/2\nb,1,1,1/1\n";
        assert!(matches!(
            PairwiseData::from_reader(bad_coord.as_bytes(), CoordinateMode::Planar),
            Err(DataError::InvalidCoordinate { .. })
        ));
        let bad_genotype = "id,x,y,m1\na,0,0,1-2\nb,1,1,1/1\n";
        assert!(matches!(
            PairwiseData::from_reader(bad_genotype.as_bytes(), CoordinateMode::Planar),
            Err(DataError::InvalidGenotype { .. })
        ));
        let no_markers = "id,x,y\na,0,0\nb,1,1\n";
        assert!(matches!(
            PairwiseData::from_reader(no_markers.as_bytes(), CoordinateMode::Planar),
            Err(DataError::NoMarkers)
        ));
    }

    #[test]
    fn degenerate_marker_weight_is_an_error() {
        let ibd = array![1u32, 0];
        let total = array![1u32, 0];
        let err = MarkerSummary::from_counts("m", ibd.view(), total.view()).unwrap_err();
        assert!(matches!(err, DataError::DegenerateMarkerWeight { .. }));

        let none = array![0u32, 0];
        let err = MarkerSummary::from_counts("m", none.view(), none.view()).unwrap_err();
        assert!(matches!(err, DataError::NoComparableAlleles { .. }));
    }

    #[test]
    fn weight_is_defined_from_two_compared_alleles() {
        // Only a single compared allele in total makes the weight singular.
        let ibd = array![1u32, 0];
        let total = array![1u32, 1];
        let summary = MarkerSummary::from_counts("m", ibd.view(), total.view()).unwrap();
        assert_eq!(summary.tsz, 2.0);
        assert_eq!(summary.weight, 2.0);
        assert_eq!(summary.fbar, 0.5);
        assert_eq!(summary.fbar_1, 0.5);
    }

    #[test]
    fn distances_are_symmetric_with_zero_diagonal() {
        let samples = vec![
            Sample { id: "a".into(), coordinates: [45.0, 7.0] },
            Sample { id: "b".into(), coordinates: [45.5, 7.3] },
            Sample { id: "c".into(), coordinates: [-12.0, 130.0] },
            Sample { id: "d".into(), coordinates: [45.0, 7.0] },
        ];
        let marker = MarkerLocus {
            name: "m".into(),
            genotypes: vec![[1, 2], [2, 3], [1, 1], [3, 3]],
        };
        for mode in [CoordinateMode::Planar, CoordinateMode::Spherical] {
            let data = PairwiseData::from_parts(samples.clone(), vec![marker.clone()], mode).unwrap();
            for i in 0..4 {
                assert_eq!(data.distance_between(i, i), 0.0);
                for j in 0..4 {
                    assert_eq!(data.distance_between(i, j), data.distance_between(j, i));
                    assert_eq!(
                        distance(samples[i].coordinates, samples[j].coordinates, mode),
                        distance(samples[j].coordinates, samples[i].coordinates, mode)
                    );
                }
            }
            // Samples a and d share a location.
            assert_eq!(data.distance_between(0, 3), 0.0);
        }
    }

    #[test]
    fn spherical_distance_matches_known_arc() {
        // A quarter of a great circle along the equator.
        let d = distance([0.0, 0.0], [0.0, 90.0], CoordinateMode::Spherical);
        assert_relative_eq!(d, EARTH_RADIUS_METERS * std::f64::consts::FRAC_PI_2, max_relative = 1e-12);
    }

    #[test]
    fn coordinate_mode_parses_synonyms() {
        assert_eq!("Planar".parse::<CoordinateMode>().unwrap(), CoordinateMode::Planar);
        assert_eq!("latlon".parse::<CoordinateMode>().unwrap(), CoordinateMode::Spherical);
        assert!(matches!(
            "mercator".parse::<CoordinateMode>(),
            Err(DataError::UnknownCoordinateMode(_))
        ));
    }

    #[test]
    fn replacing_distances_validates_length() {
        let data = PairwiseData::from_reader(TABLE.as_bytes(), CoordinateMode::Planar).unwrap();
        assert!(data.with_distances(array![1.0, 2.0]).is_err());
        assert!(data.with_distances(array![1.0, -2.0, 3.0]).is_err());
        let moved = data.with_distances(array![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(moved.distances(), array![1.0, 2.0, 3.0]);
        assert_eq!(moved.ibd(), data.ibd());
    }
}
