use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use crate::chrom_list::ChromList;

/// Return the number of complete bins of size `bin_size` in `total_size`
///
/// Any incomplete bin at the end of the chromosome is excluded
///
pub fn get_complete_bin_count(total_size: u64, bin_size: u32) -> usize {
    (total_size / bin_size as u64) as usize
}

/// Strand-resolved read count observation for one genomic bin
///
/// Univariate analysis uses the strand total, strand-seq analysis models watson
/// and crick as two separate series.
///
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct StrandCounts {
    pub watson: u32,
    pub crick: u32,
}

impl StrandCounts {
    pub fn total(&self) -> u32 {
        self.watson + self.crick
    }
}

/// Vector over all bins in one chromosome
pub type ChromBinCounts = Vec<StrandCounts>;

/// Binned read counts for one sample over the whole genome
///
/// Produced by the external binning/correction step and deserialized here. Bins
/// are coordinate ordered within each chromosome, and each chromosome is
/// segmented independently, so counts never mix across chromosome boundaries.
///
#[derive(Deserialize, Serialize)]
pub struct GenomeBinCounts {
    pub sample_id: String,
    pub bin_size: u32,
    pub chrom_list: ChromList,

    /// Vector over chromosomes, indexed consistently with chrom_list
    pub chroms: Vec<ChromBinCounts>,

    /// Optional GC/mappability corrected count track with the same shape as `chroms`
    ///
    /// When present, fitting uses the rounded corrected values in place of the raw totals.
    ///
    pub corrected: Option<Vec<Vec<f64>>>,
}

impl GenomeBinCounts {
    /// Total count series used for univariate fitting of one chromosome
    pub fn univariate_series(&self, chrom_index: usize) -> Vec<u32> {
        match &self.corrected {
            Some(corrected) => corrected[chrom_index]
                .iter()
                .map(|x| x.round().max(0.0) as u32)
                .collect(),
            None => self.chroms[chrom_index]
                .iter()
                .map(|x| x.total())
                .collect(),
        }
    }

    /// Single-strand count series for one chromosome
    pub fn strand_series(&self, chrom_index: usize, watson: bool) -> Vec<u32> {
        self.chroms[chrom_index]
            .iter()
            .map(|x| if watson { x.watson } else { x.crick })
            .collect()
    }

    pub fn total_bin_count(&self) -> usize {
        self.chroms.iter().map(|x| x.len()).sum()
    }
}

/// Read one sample's binned counts from the messagepack format produced by the binning step
///
/// Errors are returned rather than escalated so that one bad input file can't
/// take down a multi-sample batch.
///
pub fn deserialize_genome_bin_counts(filename: &Utf8Path) -> SimpleResult<GenomeBinCounts> {
    let buf = match std::fs::read(filename) {
        Ok(x) => x,
        Err(error) => {
            bail!("Unable to open and read binned counts file: '{filename}': {error}");
        }
    };
    let mut counts: GenomeBinCounts = match rmp_serde::from_slice(&buf) {
        Ok(x) => x,
        Err(error) => {
            bail!("Unable to parse binned counts file: '{filename}': {error}");
        }
    };
    if counts.bin_size == 0 {
        bail!("Binned counts file has a zero bin size: '{filename}'");
    }
    if counts.chroms.len() != counts.chrom_list.data.len() {
        bail!(
            "Binned counts file chromosome count disagrees with its chromosome list: '{filename}'"
        );
    }
    for (chrom_info, chrom_counts) in counts.chrom_list.data.iter().zip(counts.chroms.iter()) {
        let expected_bins = get_complete_bin_count(chrom_info.length, counts.bin_size);
        if chrom_counts.len() != expected_bins {
            bail!(
                "Binned counts file has {} bins for chromosome '{}', expected {}: '{filename}'",
                chrom_counts.len(),
                chrom_info.label,
                expected_bins
            );
        }
    }
    if let Some(corrected) = &counts.corrected {
        let shape_matches = corrected.len() == counts.chroms.len()
            && corrected
                .iter()
                .zip(counts.chroms.iter())
                .all(|(a, b)| a.len() == b.len());
        if !shape_matches {
            bail!("Corrected count track shape disagrees with raw counts: '{filename}'");
        }
    }
    counts.chrom_list.rebuild_index();
    Ok(counts)
}
