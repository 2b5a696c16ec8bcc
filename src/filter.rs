use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FilterConfig;
use crate::sequence::{PlasmidRecord, ambiguous_fraction, first_invalid};

/// Why a record was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    TooShort,
    TooLong,
    InvalidCharacter,
    TooAmbiguous,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub input: usize,
    pub kept: usize,
    pub too_short: usize,
    pub too_long: usize,
    pub invalid: usize,
    pub too_ambiguous: usize,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub mean_length: Option<f64>,
}

impl FilterReport {
    pub fn removed(&self) -> usize {
        self.input - self.kept
    }

    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::TooShort => self.too_short += 1,
            Rejection::TooLong => self.too_long += 1,
            Rejection::InvalidCharacter => self.invalid += 1,
            Rejection::TooAmbiguous => self.too_ambiguous += 1,
        }
    }
}

/// Classify a single record against the filter. The alphabet is checked
/// before the length bounds, which are inclusive.
fn check_record(record: &PlasmidRecord, cfg: &FilterConfig) -> Option<Rejection> {
    if first_invalid(&record.sequence).is_some() {
        return Some(Rejection::InvalidCharacter);
    }
    let len = record.len();
    if cfg.min_length.is_some_and(|min| len < min) {
        return Some(Rejection::TooShort);
    }
    if cfg.max_length.is_some_and(|max| len > max) {
        return Some(Rejection::TooLong);
    }
    if cfg
        .max_ambiguous_fraction
        .is_some_and(|limit| ambiguous_fraction(&record.sequence) > limit)
    {
        return Some(Rejection::TooAmbiguous);
    }
    None
}

/// Keep records passing the filter, preserving input order.
pub fn filter_records(
    records: Vec<PlasmidRecord>,
    cfg: &FilterConfig,
) -> Result<(Vec<PlasmidRecord>, FilterReport)> {
    let mut report = FilterReport {
        input: records.len(),
        ..FilterReport::default()
    };
    let mut kept = Vec::with_capacity(records.len());

    for record in records {
        match check_record(&record, cfg) {
            None => kept.push(record),
            Some(Rejection::InvalidCharacter) if !cfg.drop_invalid => {
                let (offset, ch) = first_invalid(&record.sequence).unwrap_or((0, '?'));
                bail!(
                    "record `{}` contains non-IUPAC character {ch:?} at position {offset}",
                    record.id
                );
            }
            Some(rejection) => {
                debug!("dropping {} ({rejection:?}, {} bp)", record.id, record.len());
                report.record(rejection);
            }
        }
    }

    report.kept = kept.len();
    if !kept.is_empty() {
        let lengths = kept.iter().map(PlasmidRecord::len);
        report.min_length = lengths.clone().min();
        report.max_length = lengths.clone().max();
        report.mean_length = Some(lengths.sum::<usize>() as f64 / kept.len() as f64);
    }

    Ok((kept, report))
}
