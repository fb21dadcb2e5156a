//! Feature-hashing embedder. Pure and stable across processes: every feature is hashed with
//! BLAKE3 into one of [`EMBEDDING_DIM`] signed buckets and the result is L2-normalized.

use unicode_segmentation::UnicodeSegmentation;

pub const EMBEDDING_DIM: usize = 256;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const SIGNATURE_WEIGHT: f32 = 0.25;
const SIGNATURE_BUCKETS: usize = 4;

pub fn embed(text: &str) -> Vec<f32> {
	let mut vec = vec![0.0_f32; EMBEDDING_DIM];
	let tokens = tokens(text);

	for token in &tokens {
		add_feature(&mut vec, b"w", token.as_bytes(), UNIGRAM_WEIGHT);
	}
	for pair in tokens.windows(2) {
		let bigram = format!("{} {}", pair[0], pair[1]);

		add_feature(&mut vec, b"b", bigram.as_bytes(), BIGRAM_WEIGHT);
	}

	// Exact-text signature keeps inputs that share every token (case, punctuation) apart.
	let digest = feature_hash(b"s", text.as_bytes());

	for idx in 0..SIGNATURE_BUCKETS {
		let bucket = digest[idx * 2] as usize % EMBEDDING_DIM;
		let sign = if digest[16 + idx] & 1 == 0 { 1.0 } else { -1.0 };

		vec[bucket] += sign * SIGNATURE_WEIGHT;
	}

	normalize(&mut vec);

	vec
}

pub(crate) fn tokens(text: &str) -> Vec<String> {
	text.unicode_words().map(str::to_lowercase).collect()
}

fn add_feature(vec: &mut [f32], tag: &[u8], feature: &[u8], weight: f32) {
	let digest = feature_hash(tag, feature);
	let raw = u64::from_le_bytes([
		digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
	]);
	let bucket = (raw % EMBEDDING_DIM as u64) as usize;
	let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

	vec[bucket] += sign * weight;
}

fn feature_hash(tag: &[u8], feature: &[u8]) -> [u8; 32] {
	let mut hasher = blake3::Hasher::new();

	hasher.update(tag);
	hasher.update(&[0]);
	hasher.update(feature);

	*hasher.finalize().as_bytes()
}

fn normalize(vec: &mut [f32]) {
	let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in vec.iter_mut() {
			*value /= norm;
		}
	}
}
