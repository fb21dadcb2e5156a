use std::collections::HashSet;

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::{Evidence, embedder};

pub const NO_EVIDENCE_ANSWER: &str =
	"I could not find anything in the provided documents that answers this question.";

const MAX_PIECES: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Answer {
	pub text: String,
	/// Verbatim evidence sentences, in answer order.
	pub pieces: Vec<String>,
	pub grounded: bool,
}

struct Candidate<'a> {
	overlap: usize,
	rank: usize,
	position: usize,
	sentence: &'a str,
}

/// Builds an extractive answer from `evidence`, which must already be ranked best first. Every
/// piece is copied verbatim from one evidence text.
pub fn compose(question: &str, evidence: &[Evidence]) -> Answer {
	if evidence.is_empty() {
		return Answer { text: NO_EVIDENCE_ANSWER.to_string(), pieces: Vec::new(), grounded: false };
	}

	let terms = embedder::tokens(question)
		.into_iter()
		.filter(|token| token.chars().count() > 1)
		.collect::<HashSet<_>>();
	let mut candidates = Vec::new();

	for (rank, item) in evidence.iter().enumerate() {
		for (position, sentence) in item.text.split_sentence_bounds().enumerate() {
			let sentence = sentence.trim();

			if sentence.is_empty() {
				continue;
			}

			let words = embedder::tokens(sentence).into_iter().collect::<HashSet<_>>();
			let overlap = terms.iter().filter(|term| words.contains(*term)).count();

			candidates.push(Candidate { overlap, rank, position, sentence });
		}
	}

	candidates.sort_by(|a, b| {
		b.overlap.cmp(&a.overlap).then(a.rank.cmp(&b.rank)).then(a.position.cmp(&b.position))
	});

	let mut seen = HashSet::new();
	let mut pieces = Vec::new();

	for candidate in candidates.iter().filter(|c| c.overlap > 0) {
		if pieces.len() == MAX_PIECES {
			break;
		}
		if seen.insert(candidate.sentence) {
			pieces.push(candidate.sentence.to_string());
		}
	}

	// Nothing overlaps the question; fall back to the lead sentence of the best passage.
	if pieces.is_empty()
		&& let Some(lead) = candidates.iter().min_by_key(|c| (c.rank, c.position))
	{
		pieces.push(lead.sentence.to_string());
	}
	if pieces.is_empty() {
		return Answer { text: NO_EVIDENCE_ANSWER.to_string(), pieces, grounded: false };
	}

	Answer { text: pieces.join(" "), pieces, grounded: true }
}
