pub mod nucleotide;

use anyhow::Result;
use rand::RngCore;

pub use nucleotide::{NucleotideTokenizer, random_roll};

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str, add_eos: bool, rng: &mut dyn RngCore) -> Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> Result<String>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn eos_id(&self) -> Option<u32>;
    fn pad_id(&self) -> Option<u32>;
}
