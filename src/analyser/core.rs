use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::config::ExtractConfig;
use super::capture::{CaptureSegmenter, SliceDecoder};
use super::containers::{Numeric, Session};
use super::features::{FeatureExtractor, FieldDictionary};
use super::labels::LabelTable;
use super::utils::OrderedMap;

/// One retained session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureRow {
    pub label: String,
    pub missing_ccs_fin: bool,
    #[serde(flatten)]
    pub features: OrderedMap<Numeric>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunStats {
    pub sessions: usize,
    pub kept: usize,
    pub discarded: usize,
    pub unlabeled: usize,
    pub slices: usize,
    pub failed_slices: usize,
}

/// The feature table and field dictionary of a whole capture.
#[derive(Debug, Serialize)]
pub struct Dataset {
    pub rows: Vec<FeatureRow>,
    pub dictionary: FieldDictionary,
    pub stats: RunStats,
    pub config: ExtractConfig,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

impl Dataset {
    /// `label`, `missing_ccs_fin`, then every feature key in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: OrderedMap<()> = OrderedMap::new();
        columns.insert("label".to_string(), ());
        columns.insert("missing_ccs_fin".to_string(), ());
        for row in &self.rows {
            for key in row.features.keys() {
                if !columns.contains_key(key) {
                    columns.insert(key.to_string(), ());
                }
            }
        }
        columns.keys().map(str::to_string).collect()
    }
}

/// Runs extraction and labelling on one session. `None` when the session has too
/// few features to be a TLS key exchange.
pub fn analyse_session(
    extractor: &FeatureExtractor,
    labels: &LabelTable,
    session: &Session,
    min_features: usize,
) -> Option<(FeatureRow, FieldDictionary, bool)> {
    let label = labels.label_session(session);
    let extracted = extractor.extract(session);

    if extracted.len() < min_features {
        return None;
    }

    let row = FeatureRow {
        label: label.label,
        missing_ccs_fin: label.missing_ccs_fin,
        features: extracted.features,
    };
    Some((row, extracted.dictionary, label.matched))
}

/// Drives the segmenter to exhaustion and assembles the dataset.
pub fn analyse<D: SliceDecoder>(mut segmenter: CaptureSegmenter<D>, labels: &LabelTable, config: &ExtractConfig) -> Dataset {
    log::info!("Starting feature extraction.");
    let started = Utc::now();
    let extractor = FeatureExtractor::new();

    let mut rows = Vec::new();
    let mut dictionary = FieldDictionary::new();
    let mut stats = RunStats::default();

    for (index, session) in segmenter.by_ref() {
        stats.sessions += 1;
        match analyse_session(&extractor, labels, &session, config.min_features) {
            Some((row, session_dictionary, matched)) => {
                if !matched {
                    stats.unlabeled += 1;
                }
                rows.push(row);
                dictionary.extend(session_dictionary);
            }
            None => {
                log::info!("Ignoring session {index} containing no TLS key exchange");
                stats.discarded += 1;
            }
        }
    }

    stats.kept = rows.len();
    stats.slices = segmenter.slices_decoded();
    stats.failed_slices = segmenter.failed_slices();
    log::info!("Finished feature extraction: {} of {} sessions kept.", stats.kept, stats.sessions);

    Dataset {
        rows,
        dictionary,
        stats,
        config: config.clone(),
        started,
        finished: Utc::now(),
    }
}
