//! Two-level content-addressed deduplication over a run's extracted bodies.
//!
//! Level one is an exact SHA-256 over canonicalized text. Level two is a
//! 128-permutation MinHash over word 5-shingles behind an LSH banding index
//! (16 bands x 8 rows), confirmed by the Jaccard estimate.
//!
//! Callers must feed entries in ascending entry-id order: within an
//! equivalence class the first registered entry is the representative, so
//! feed order is what makes "smallest id wins" hold.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

pub const NUM_PERMUTATIONS: usize = 128;
const SHINGLE_SIZE: usize = 5;
const LSH_BANDS: usize = 16;
const LSH_ROWS: usize = 8; // bands * rows == permutations

/// Verdict for one entry.
#[derive(Debug, Clone)]
pub struct DedupeVerdict {
    pub content_hash: String,
    pub signature_hex: String,
    pub duplicate_of: Option<Uuid>,
    pub exact: bool,
    pub similarity: f64,
}

impl DedupeVerdict {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinHashSignature(pub Vec<u64>);

impl MinHashSignature {
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 16);
        for lane in &self.0 {
            out.push_str(&format!("{lane:016x}"));
        }
        out
    }

    pub fn from_hex(hex_str: &str) -> Option<Self> {
        if hex_str.len() != NUM_PERMUTATIONS * 16 {
            return None;
        }
        let mut lanes = Vec::with_capacity(NUM_PERMUTATIONS);
        for i in 0..NUM_PERMUTATIONS {
            let lane = u64::from_str_radix(&hex_str[i * 16..(i + 1) * 16], 16).ok()?;
            lanes.push(lane);
        }
        Some(Self(lanes))
    }
}

/// In-memory dedupe index for one run, optionally seeded from prior runs
/// over the same target date.
pub struct DedupeIndex {
    threshold: f64,
    /// content hash -> first entry seen with it
    hashes: HashMap<String, Uuid>,
    /// registered (non-duplicate) signatures
    signatures: HashMap<Uuid, MinHashSignature>,
    /// (band index, band hash) -> entries in that bucket
    buckets: HashMap<(usize, u64), Vec<Uuid>>,
}

impl DedupeIndex {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            hashes: HashMap::new(),
            signatures: HashMap::new(),
            buckets: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Seed a previously-registered entry (from an earlier run) so new
    /// entries dedupe against it.
    pub fn seed(&mut self, entry_id: Uuid, content_hash: &str, signature_hex: Option<&str>) {
        self.hashes.entry(content_hash.to_string()).or_insert(entry_id);
        if let Some(hex_str) = signature_hex {
            if let Some(signature) = MinHashSignature::from_hex(hex_str) {
                self.register_signature(entry_id, signature);
            }
        }
    }

    /// Check one body and, when it is not a duplicate, register it.
    pub fn check_and_register(&mut self, entry_id: Uuid, text: &str) -> DedupeVerdict {
        let canonical = canonicalize(text);
        let content_hash = hex_sha256(&canonical);
        let signature = minhash(&canonical);
        let signature_hex = signature.to_hex();

        // Level 1: exact.
        if let Some(&original) = self.hashes.get(&content_hash) {
            if original != entry_id {
                return DedupeVerdict {
                    content_hash,
                    signature_hex,
                    duplicate_of: Some(original),
                    exact: true,
                    similarity: 1.0,
                };
            }
        }

        // Level 2: near, via banded candidates.
        let mut qualifying: Vec<(Uuid, f64)> = Vec::new();
        for candidate in self.candidates(&signature) {
            if candidate == entry_id {
                continue;
            }
            if let Some(other) = self.signatures.get(&candidate) {
                let similarity = jaccard_estimate(&signature, other);
                if similarity >= self.threshold {
                    qualifying.push((candidate, similarity));
                }
            }
        }

        if !qualifying.is_empty() {
            // Earliest registered entry wins.
            qualifying.sort_by(|a, b| a.0.cmp(&b.0));
            let (winner, similarity) = qualifying[0];
            // The distinct text still claims its hash so byte-identical
            // copies of *this* variant dedupe exactly next time.
            self.hashes.entry(content_hash.clone()).or_insert(entry_id);
            return DedupeVerdict {
                content_hash,
                signature_hex,
                duplicate_of: Some(winner),
                exact: false,
                similarity,
            };
        }

        // Unique: register fully.
        self.hashes.insert(content_hash.clone(), entry_id);
        self.register_signature(entry_id, signature);

        DedupeVerdict {
            content_hash,
            signature_hex,
            duplicate_of: None,
            exact: false,
            similarity: 0.0,
        }
    }

    fn register_signature(&mut self, entry_id: Uuid, signature: MinHashSignature) {
        for (band, band_hash) in band_hashes(&signature) {
            self.buckets.entry((band, band_hash)).or_default().push(entry_id);
        }
        self.signatures.insert(entry_id, signature);
    }

    fn candidates(&self, signature: &MinHashSignature) -> Vec<Uuid> {
        let mut out = Vec::new();
        for (band, band_hash) in band_hashes(signature) {
            if let Some(bucket) = self.buckets.get(&(band, band_hash)) {
                for &id in bucket {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }
}

/// Canonical text form for hashing: unicode-decomposed, lowercased,
/// punctuation stripped, whitespace collapsed.
pub fn canonicalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.nfkd() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if !ch.is_alphanumeric() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }

    out
}

pub fn hex_sha256(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// MinHash over word shingles. Stable across runs and platforms: the hash
/// family derives from fixed splitmix64 seeds, never from process state.
pub fn minhash(canonical: &str) -> MinHashSignature {
    let words: Vec<&str> = canonical.split(' ').filter(|w| !w.is_empty()).collect();
    let mut lanes = vec![u64::MAX; NUM_PERMUTATIONS];

    let mut apply = |shingle_hash: u64| {
        for (i, lane) in lanes.iter_mut().enumerate() {
            let h = splitmix64(shingle_hash ^ PERM_SEEDS[i]);
            if h < *lane {
                *lane = h;
            }
        }
    };

    if words.len() < SHINGLE_SIZE {
        if !words.is_empty() {
            apply(fnv1a64(canonical.as_bytes()));
        }
    } else {
        for window in words.windows(SHINGLE_SIZE) {
            let mut hasher = 0xcbf29ce484222325u64; // FNV offset basis
            for word in window {
                hasher = fnv1a64_continue(hasher, word.as_bytes());
                hasher = fnv1a64_continue(hasher, b" ");
            }
            apply(hasher);
        }
    }

    MinHashSignature(lanes)
}

/// Fraction of matching lanes approximates the Jaccard similarity of the
/// underlying shingle sets.
pub fn jaccard_estimate(a: &MinHashSignature, b: &MinHashSignature) -> f64 {
    let matching = a.0.iter().zip(b.0.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / NUM_PERMUTATIONS as f64
}

fn band_hashes(signature: &MinHashSignature) -> impl Iterator<Item = (usize, u64)> + '_ {
    (0..LSH_BANDS).map(move |band| {
        let start = band * LSH_ROWS;
        let mut h = 0xcbf29ce484222325u64;
        for lane in &signature.0[start..start + LSH_ROWS] {
            h = fnv1a64_continue(h, &lane.to_le_bytes());
        }
        (band, h)
    })
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    fnv1a64_continue(0xcbf29ce484222325, bytes)
}

fn fnv1a64_continue(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Fixed per-permutation seeds, generated once from a splitmix64 chain.
static PERM_SEEDS: std::sync::LazyLock<[u64; NUM_PERMUTATIONS]> = std::sync::LazyLock::new(|| {
    let mut seeds = [0u64; NUM_PERMUTATIONS];
    let mut state = 0x5DEECE66D_u64;
    for seed in seeds.iter_mut() {
        state = splitmix64(state);
        *seed = state;
    }
    seeds
});

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    const BODY: &str = "Negotiators from both delegations met in the capital on Tuesday \
        to discuss a phased withdrawal of forces from the contested region, with observers \
        from three neighbouring states attending the closed session at the presidential palace. \
        Diplomats familiar with the agenda said the first round focused on the demarcation of \
        the buffer zone and the timetable for rotating monitoring teams along the ridge line. \
        A second round scheduled for next month is expected to cover prisoner exchanges and \
        the reopening of the rail corridor that has been closed since the spring offensive. \
        Humanitarian organisations welcomed the resumption of talks but cautioned that supply \
        routes into the valley remain blocked and that winter stockpiles are already running low.";

    #[test]
    fn canonicalize_is_whitespace_and_case_insensitive() {
        let a = canonicalize("Hello,   World!\nSecond line.");
        let b = canonicalize("hello world second LINE");
        assert_eq!(a, b);
        assert_eq!(a, "hello world second line");
    }

    #[test]
    fn exact_duplicates_detected_across_formatting() {
        let mut index = DedupeIndex::new(0.8);
        let first = index.check_and_register(id(1), BODY);
        assert!(!first.is_duplicate());

        let reformatted = BODY.to_uppercase().replace(' ', "  ");
        let second = index.check_and_register(id(2), &reformatted);
        assert!(second.exact);
        assert_eq!(second.duplicate_of, Some(id(1)));
        assert_eq!(second.similarity, 1.0);
        assert_eq!(second.content_hash, first.content_hash);
    }

    #[test]
    fn near_duplicate_paraphrase_is_flagged() {
        let mut index = DedupeIndex::new(0.8);
        index.check_and_register(id(1), BODY);

        // Light edit: one word changed, everything else shared.
        let near = BODY.replace("Tuesday", "Wednesday");
        let verdict = index.check_and_register(id(2), &near);
        assert!(verdict.is_duplicate());
        assert!(!verdict.exact);
        assert_eq!(verdict.duplicate_of, Some(id(1)));
        assert!(verdict.similarity >= 0.8);
    }

    #[test]
    fn unrelated_texts_stay_unique() {
        let mut index = DedupeIndex::new(0.8);
        index.check_and_register(id(1), BODY);
        let other = "Commodity prices rallied sharply after the central bank unexpectedly \
            cut its benchmark rate, prompting exporters to revise their shipping schedules \
            for the remainder of the quarter across all major ports.";
        let verdict = index.check_and_register(id(2), other);
        assert!(!verdict.is_duplicate());
    }

    #[test]
    fn earliest_entry_wins_as_representative() {
        let mut index = DedupeIndex::new(0.8);
        index.check_and_register(id(5), BODY);
        index.check_and_register(
            id(7),
            "A completely different report about grain shipments moving through the \
             southern corridor after months of interrupted rail service and port closures.",
        );
        let verdict = index.check_and_register(id(9), &BODY.replace("Tuesday", "Friday"));
        assert_eq!(verdict.duplicate_of, Some(id(5)));
    }

    #[test]
    fn signature_hex_round_trips() {
        let signature = minhash(&canonicalize(BODY));
        let restored = MinHashSignature::from_hex(&signature.to_hex()).unwrap();
        assert_eq!(signature, restored);
        assert!(MinHashSignature::from_hex("zz").is_none());
    }

    #[test]
    fn seeded_entries_participate_in_dedupe() {
        let mut first_run = DedupeIndex::new(0.8);
        let verdict = first_run.check_and_register(id(1), BODY);

        let mut second_run = DedupeIndex::new(0.8);
        second_run.seed(id(1), &verdict.content_hash, Some(&verdict.signature_hex));

        let exact = second_run.check_and_register(id(2), BODY);
        assert_eq!(exact.duplicate_of, Some(id(1)));

        let near = second_run.check_and_register(id(3), &BODY.replace("capital", "city"));
        assert_eq!(near.duplicate_of, Some(id(1)));
    }

    #[test]
    fn jaccard_estimate_tracks_overlap() {
        let a = minhash(&canonicalize(BODY));
        let b = minhash(&canonicalize(&BODY.replace("Tuesday", "Wednesday")));
        let c = minhash(&canonicalize("totally unrelated text with nothing shared at all"));
        assert!(jaccard_estimate(&a, &b) > 0.7);
        assert!(jaccard_estimate(&a, &c) < 0.2);
        assert_eq!(jaccard_estimate(&a, &a), 1.0);
    }

    #[test]
    fn minhash_deterministic_across_calls() {
        let a = minhash(&canonicalize(BODY));
        let b = minhash(&canonicalize(BODY));
        assert_eq!(a, b);
    }

    #[test]
    fn synthetic_near_duplicates_are_caught() {
        // Single-word substitutions at varying positions keep the true
        // Jaccard around 0.9; the estimator must flag nearly all of them.
        let words: Vec<&str> = BODY.split_whitespace().collect();
        let mut caught = 0u32;
        let trials = 20u32;

        for trial in 0..trials {
            let mut index = DedupeIndex::new(0.8);
            index.check_and_register(id(1), BODY);

            let position = (trial as usize * 7 + 3) % words.len();
            let mut variant = words.clone();
            let replacement = "REPLACED";
            variant[position] = replacement;
            let variant_text = variant.join(" ");

            if index.check_and_register(id(2), &variant_text).is_duplicate() {
                caught += 1;
            }
        }

        assert!(
            caught as f64 / trials as f64 >= 0.95,
            "only {caught}/{trials} near-duplicates flagged"
        );
    }

    #[test]
    fn short_texts_hash_without_panicking() {
        let mut index = DedupeIndex::new(0.8);
        let verdict = index.check_and_register(id(1), "one two three");
        assert!(!verdict.is_duplicate());
        let dup = index.check_and_register(id(2), "one two three");
        assert!(dup.exact);
    }
}
