//! MS features and their extracted ion chromatograms, as produced by an
//! external feature finder.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub mz: f64,
    #[serde(rename = "RT")]
    pub rt: f64,
    #[serde(rename = "RTstart")]
    pub rt_start: f64,
    #[serde(rename = "RTend")]
    pub rt_end: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    features: Vec<Feature>,
}

impl From<Vec<Feature>> for FeatureTable {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl FeatureTable {
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn read_csv<R: Read>(reader: R) -> crate::Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let features = reader.deserialize().collect::<Result<Vec<Feature>, _>>()?;
        Ok(Self { features })
    }

    pub fn read_csv_path(path: &Path) -> crate::Result<Self> {
        Self::read_csv(std::fs::File::open(path)?)
    }
}

/// Intensity trace of one feature, sorted by retention time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chromatogram {
    pub rt: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Chromatogram {
    pub fn new(samples: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut samples: Vec<(f64, f64)> = samples.into_iter().collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (rt, intensity) = samples.into_iter().unzip();
        Self { rt, intensity }
    }

    pub fn len(&self) -> usize {
        self.rt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rt.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ChromatogramSample {
    id: String,
    rt: f64,
    intensity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureChromatograms {
    traces: BTreeMap<String, Chromatogram>,
}

impl FromIterator<(String, Chromatogram)> for FeatureChromatograms {
    fn from_iter<I: IntoIterator<Item = (String, Chromatogram)>>(iter: I) -> Self {
        Self {
            traces: iter.into_iter().collect(),
        }
    }
}

impl FeatureChromatograms {
    pub fn get(&self, id: &str) -> Option<&Chromatogram> {
        self.traces.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, chromatogram: Chromatogram) {
        self.traces.insert(id.into(), chromatogram);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Long format: one `id,rt,intensity` row per sample, any order.
    pub fn read_csv<R: Read>(reader: R) -> crate::Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut grouped: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
        for sample in reader.deserialize::<ChromatogramSample>() {
            let sample = sample?;
            grouped.entry(sample.id).or_default().push((sample.rt, sample.intensity));
        }
        Ok(grouped
            .into_iter()
            .map(|(id, samples)| (id, Chromatogram::new(samples)))
            .collect())
    }

    pub fn read_csv_path(path: &Path) -> crate::Result<Self> {
        Self::read_csv(std::fs::File::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_columns_follow_ms_naming() {
        let csv = "id,mz,RT,RTstart,RTend\nf1,301.14,102.5,98.0,107.0\nf2,455.2,110,104,118\n";
        let table = FeatureTable::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let f2 = table.get("f2").unwrap();
        assert_eq!((f2.rt, f2.rt_start, f2.rt_end), (110.0, 104.0, 118.0));
        assert!(table.get("f3").is_none());
    }

    #[test]
    fn chromatograms_are_grouped_and_sorted() {
        let csv = "id,rt,intensity\nb,2,20\na,3,3\nb,1,10\na,1,1\na,2,2\n";
        let chroms = FeatureChromatograms::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(chroms.len(), 2);
        let a = chroms.get("a").unwrap();
        assert_eq!(a.rt, vec![1.0, 2.0, 3.0]);
        assert_eq!(a.intensity, vec![1.0, 2.0, 3.0]);
        assert_eq!(chroms.get("b").unwrap().intensity, vec![10.0, 20.0]);
    }
}
