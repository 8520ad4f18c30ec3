use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name and length of one chromosome
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChromInfo {
    pub label: String,
    pub length: u64,
}

/// Ordered chromosome names and lengths, as produced by the external binning step
///
/// Chromosome order here defines the chrom_index used throughout the segmentation
/// data structures.
///
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChromList {
    pub data: Vec<ChromInfo>,

    #[serde(skip)]
    pub label_to_index: HashMap<String, usize>,
}

impl ChromList {
    pub fn add_chrom(&mut self, label: &str, length: u64) {
        assert!(
            !self.label_to_index.contains_key(label),
            "Duplicate chromosome label '{label}'"
        );
        self.label_to_index
            .insert(label.to_string(), self.data.len());
        self.data.push(ChromInfo {
            label: label.to_string(),
            length,
        });
    }

    /// Rebuild the label index after deserialization
    pub fn rebuild_index(&mut self) {
        self.label_to_index = self
            .data
            .iter()
            .enumerate()
            .map(|(i, c)| (c.label.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrom_list() {
        let mut chrom_list = ChromList::default();
        chrom_list.add_chrom("chr1", 10000);
        chrom_list.add_chrom("chr2", 5000);

        assert_eq!(chrom_list.data.len(), 2);
        assert_eq!(chrom_list.label_to_index["chr2"], 1);
        assert_eq!(chrom_list.data[1].length, 5000);
    }
}
