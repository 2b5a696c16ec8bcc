use serde::{Deserialize, Serialize};

/// Concrete bases in vocabulary order.
pub const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// A single plasmid sequence keyed by its dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlasmidRecord {
    pub id: String,
    pub sequence: String,
}

impl PlasmidRecord {
    /// Build a record, upper-casing the sequence and dropping whitespace.
    pub fn new(id: impl Into<String>, sequence: impl AsRef<str>) -> Self {
        Self {
            id: id.into(),
            sequence: normalize_sequence(sequence.as_ref()),
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

pub fn normalize_sequence(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !ch.is_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Bases an IUPAC nucleotide code may stand for, or `None` for characters
/// outside the alphabet.
pub fn iupac_bases(code: char) -> Option<&'static str> {
    let bases = match code {
        'A' => "A",
        'C' => "C",
        'G' => "G",
        'T' => "T",
        'B' => "CGT",
        'D' => "AGT",
        'H' => "ACT",
        'K' => "GT",
        'M' => "AC",
        'N' => "ACGT",
        'R' => "AG",
        'S' => "CG",
        'V' => "ACG",
        'W' => "AT",
        'Y' => "CT",
        _ => return None,
    };
    Some(bases)
}

pub fn is_valid_nucleotide(code: char) -> bool {
    iupac_bases(code).is_some()
}

pub fn is_ambiguous(code: char) -> bool {
    iupac_bases(code).is_some_and(|bases| bases.len() > 1)
}

/// First character outside the IUPAC alphabet, with its byte offset.
pub fn first_invalid(sequence: &str) -> Option<(usize, char)> {
    sequence
        .char_indices()
        .find(|(_, ch)| !is_valid_nucleotide(*ch))
}

pub fn ambiguous_fraction(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let ambiguous = sequence.chars().filter(|ch| is_ambiguous(*ch)).count();
    ambiguous as f64 / sequence.chars().count() as f64
}

/// GC fraction over concrete bases only; ambiguity codes are ignored.
pub fn gc_content(sequence: &str) -> f64 {
    let (gc, concrete) = sequence.chars().fold((0usize, 0usize), |(gc, concrete), ch| {
        match ch {
            'G' | 'C' => (gc + 1, concrete + 1),
            'A' | 'T' => (gc, concrete + 1),
            _ => (gc, concrete),
        }
    });
    if concrete == 0 {
        0.0
    } else {
        gc as f64 / concrete as f64
    }
}
