use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lxp_domain::BoxFuture;

use crate::{Chunker, EMBEDDING_DIM, Result, embed};

pub const UPSERT_BATCH_SIZE: usize = 128;

/// Nearest-neighbour store addressed by collection name.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	/// Creates the collection when missing. Idempotent.
	fn ensure_collection<'a>(
		&'a self,
		collection: &'a str,
		dim: usize,
	) -> BoxFuture<'a, Result<()>>;

	/// Inserts or overwrites points by id.
	fn upsert<'a>(&'a self, collection: &'a str, points: Vec<Point>) -> BoxFuture<'a, Result<()>>;

	/// Top-`limit` points by similarity. A missing collection yields no points.
	fn query<'a>(
		&'a self,
		collection: &'a str,
		vector: Vec<f32>,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredPoint>>>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
	pub file_id: Uuid,
	pub filename: String,
	pub ordinal: u32,
	pub text: String,
	pub start: u64,
	pub end: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
	pub id: Uuid,
	pub vector: Vec<f32>,
	pub payload: ChunkPayload,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredPoint {
	pub id: Uuid,
	pub score: f32,
	pub payload: ChunkPayload,
}

#[derive(Clone, Copy, Debug)]
pub struct Document<'a> {
	pub file_id: Uuid,
	pub filename: &'a str,
	pub text: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexReport {
	pub collection: String,
	pub file_id: Uuid,
	pub points: usize,
	pub truncated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
	pub text: String,
	pub score: f32,
	pub filename: String,
	pub file_id: Uuid,
	pub ordinal: u32,
}

pub fn collection_name(vectorstore_id: Uuid) -> String {
	format!("vs_{vectorstore_id}")
}

/// Stable point identity for a chunk, so re-indexing overwrites instead of duplicating.
pub fn point_id(file_id: Uuid, ordinal: u32) -> Uuid {
	let name = format!("{file_id}:{ordinal}");

	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub async fn index_document<I>(
	index: &I,
	vectorstore_id: Uuid,
	document: Document<'_>,
	chunker: &Chunker,
	max_points: usize,
) -> Result<IndexReport>
where
	I: VectorIndex + ?Sized,
{
	let collection = collection_name(vectorstore_id);

	index.ensure_collection(&collection, EMBEDDING_DIM).await?;

	let mut batch = Vec::with_capacity(UPSERT_BATCH_SIZE);
	let mut points = 0_usize;
	let mut truncated = false;

	for chunk in chunker.chunks(document.text) {
		if points >= max_points {
			truncated = true;

			break;
		}

		batch.push(Point {
			id: point_id(document.file_id, chunk.ordinal),
			vector: embed(chunk.text),
			payload: ChunkPayload {
				file_id: document.file_id,
				filename: document.filename.to_string(),
				ordinal: chunk.ordinal,
				text: chunk.text.to_string(),
				start: chunk.start as u64,
				end: chunk.end as u64,
			},
		});

		points += 1;

		if batch.len() == UPSERT_BATCH_SIZE {
			index.upsert(&collection, std::mem::take(&mut batch)).await?;
		}
	}

	if !batch.is_empty() {
		index.upsert(&collection, batch).await?;
	}
	if truncated {
		tracing::warn!(
			file_id = %document.file_id,
			max_points,
			"Document exceeds the per-file point limit. Trailing chunks were not indexed."
		);
	}

	Ok(IndexReport { collection, file_id: document.file_id, points, truncated })
}

/// Embeds `query` and returns up to `k` evidence chunks, best first. Equal scores are ordered by
/// ascending ordinal.
pub async fn retrieve<I>(
	index: &I,
	vectorstore_id: Uuid,
	query: &str,
	k: usize,
) -> Result<Vec<Evidence>>
where
	I: VectorIndex + ?Sized,
{
	if k == 0 {
		return Ok(Vec::new());
	}

	let collection = collection_name(vectorstore_id);
	// Ties at the cutoff are resolved here, not by the index, so fetch past `k`.
	let limit = k.saturating_mul(4).max(k.saturating_add(UPSERT_BATCH_SIZE));
	let mut hits = index.query(&collection, embed(query), limit).await?;

	hits.sort_by(|a, b| {
		cmp_f32_desc(a.score, b.score)
			.then_with(|| a.payload.ordinal.cmp(&b.payload.ordinal))
			.then_with(|| a.payload.file_id.cmp(&b.payload.file_id))
	});
	hits.truncate(k);

	Ok(hits
		.into_iter()
		.map(|hit| Evidence {
			text: hit.payload.text,
			score: hit.score,
			filename: hit.payload.filename,
			file_id: hit.payload.file_id,
			ordinal: hit.payload.ordinal,
		})
		.collect())
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
