use anyhow::{Result, anyhow};
use rand::{Rng, RngCore};

use crate::sequence::{BASES, iupac_bases};

const EOS_ID: u32 = 4;
const PAD_ID: u32 = 5;
const VOCAB_SIZE: usize = 6;

/// Four-letter DNA vocabulary (`A C G T`) plus end-of-sequence and padding.
///
/// IUPAC ambiguity codes are resolved at encode time by drawing one of the
/// bases they stand for, so the same sequence can encode differently across
/// epochs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NucleotideTokenizer;

impl NucleotideTokenizer {
    pub fn new() -> Self {
        Self
    }

    pub fn base_id(base: char) -> Option<u32> {
        BASES.iter().position(|&b| b == base).map(|idx| idx as u32)
    }

    pub fn encode(&self, sequence: &str, add_eos: bool, rng: &mut dyn RngCore) -> Result<Vec<u32>> {
        let mut tokens = Vec::with_capacity(sequence.len() + usize::from(add_eos));
        for (pos, code) in sequence.chars().enumerate() {
            let code = code.to_ascii_uppercase();
            let choices = iupac_bases(code)
                .ok_or_else(|| anyhow!("character {code:?} at position {pos} is not a nucleotide"))?
                .as_bytes();
            let base = if choices.len() == 1 {
                choices[0]
            } else {
                choices[rng.gen_range(0..choices.len())]
            };
            let id = Self::base_id(base as char)
                .ok_or_else(|| anyhow!("unmapped base {:?}", base as char))?;
            tokens.push(id);
        }
        if add_eos {
            tokens.push(EOS_ID);
        }
        Ok(tokens)
    }

    /// Decode up to the first end-of-sequence token, skipping padding.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut dna = String::with_capacity(ids.len());
        for &id in ids {
            match id {
                EOS_ID => break,
                PAD_ID => continue,
                id => {
                    let base = BASES
                        .get(id as usize)
                        .ok_or_else(|| anyhow!("token id {id} out of range"))?;
                    dna.push(*base);
                }
            }
        }
        Ok(dna)
    }

    pub fn eos(&self) -> u32 {
        EOS_ID
    }

    pub fn pad(&self) -> u32 {
        PAD_ID
    }
}

impl super::Tokenizer for NucleotideTokenizer {
    fn encode(&self, text: &str, add_eos: bool, rng: &mut dyn RngCore) -> Result<Vec<u32>> {
        Self::encode(self, text, add_eos, rng)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Self::decode(self, ids)
    }

    fn len(&self) -> usize {
        VOCAB_SIZE
    }

    fn is_empty(&self) -> bool {
        false
    }

    fn eos_id(&self) -> Option<u32> {
        Some(EOS_ID)
    }

    fn pad_id(&self) -> Option<u32> {
        Some(PAD_ID)
    }
}

/// Rotate `tokens` by a uniformly random offset. Plasmids are circular, so
/// every rotation is an equally valid linearization.
pub fn random_roll<T>(tokens: &mut [T], rng: &mut dyn RngCore) -> usize {
    if tokens.is_empty() {
        return 0;
    }
    let shift = rng.gen_range(0..tokens.len());
    tokens.rotate_right(shift);
    shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn concrete_bases_encode_deterministically() {
        let mut rng = StdRng::seed_from_u64(0);
        let tokenizer = NucleotideTokenizer::new();
        let tokens = tokenizer.encode("acgt", true, &mut rng).expect("encode");
        assert_eq!(tokens, vec![0, 1, 2, 3, EOS_ID]);
        assert_eq!(tokenizer.decode(&tokens).expect("decode"), "ACGT");
    }

    #[test]
    fn ambiguity_codes_resolve_to_allowed_bases() {
        let mut rng = StdRng::seed_from_u64(7);
        let tokenizer = NucleotideTokenizer::new();
        let tokens = tokenizer.encode(&"R".repeat(200), false, &mut rng).expect("encode");
        assert!(tokens.iter().all(|&t| t == 0 || t == 2));
        assert!(tokens.contains(&0) && tokens.contains(&2));
    }

    #[test]
    fn invalid_characters_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = NucleotideTokenizer::new()
            .encode("ACXG", false, &mut rng)
            .unwrap_err();
        assert!(err.to_string().contains("position 2"));
    }

    #[test]
    fn decode_stops_at_eos_and_skips_padding() {
        let tokenizer = NucleotideTokenizer::new();
        let text = tokenizer
            .decode(&[0, PAD_ID, 3, EOS_ID, 1, 1])
            .expect("decode");
        assert_eq!(text, "AT");
        assert!(tokenizer.decode(&[9]).is_err());
    }

    #[test]
    fn roll_preserves_the_circular_sequence() {
        let mut rng = StdRng::seed_from_u64(3);
        let original: Vec<u32> = (0..16).collect();
        let mut rolled = original.clone();
        let shift = random_roll(&mut rolled, &mut rng);
        assert!(shift < original.len());
        let mut restored = rolled.clone();
        restored.rotate_left(shift);
        assert_eq!(restored, original);

        let mut empty: Vec<u32> = Vec::new();
        assert_eq!(random_roll(&mut empty, &mut rng), 0);
    }
}
