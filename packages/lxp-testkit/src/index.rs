use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, Ordering},
	},
};

use uuid::Uuid;

use lxp_domain::BoxFuture;
use lxp_retrieval::{Error, Point, Result, ScoredPoint, VectorIndex, index::cmp_f32_desc};

struct Collection {
	dim: usize,
	points: BTreeMap<Uuid, Point>,
}

/// Exact cosine search over in-memory collections.
#[derive(Default)]
pub struct MemoryIndex {
	collections: Mutex<HashMap<String, Collection>>,
	failing: AtomicBool,
}
impl MemoryIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// While set, every call fails as an unreachable index would.
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn point_count(&self, collection: &str) -> usize {
		self.lock().get(collection).map(|c| c.points.len()).unwrap_or(0)
	}

	/// Points ordered by id.
	pub fn points(&self, collection: &str) -> Vec<Point> {
		self.lock()
			.get(collection)
			.map(|c| c.points.values().cloned().collect())
			.unwrap_or_default()
	}

	pub fn has_collection(&self, collection: &str) -> bool {
		self.lock().contains_key(collection)
	}

	fn check(&self) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(Error::Index { message: "Vector index is unavailable.".to_string() });
		}

		Ok(())
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<String, Collection>> {
		self.collections.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl VectorIndex for MemoryIndex {
	fn ensure_collection<'a>(
		&'a self,
		collection: &'a str,
		dim: usize,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.check()?;

			let mut collections = self.lock();

			match collections.get(collection) {
				Some(existing) if existing.dim == dim => {},
				_ => {
					collections
						.insert(collection.to_string(), Collection { dim, points: BTreeMap::new() });
				},
			}

			Ok(())
		})
	}

	fn upsert<'a>(&'a self, collection: &'a str, points: Vec<Point>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.check()?;

			let mut collections = self.lock();
			let Some(target) = collections.get_mut(collection) else {
				return Err(Error::Index {
					message: format!("Collection {collection:?} does not exist."),
				});
			};

			for point in points {
				if point.vector.len() != target.dim {
					return Err(Error::Index {
						message: format!(
							"Vector has {} dimensions; collection expects {}.",
							point.vector.len(),
							target.dim
						),
					});
				}

				target.points.insert(point.id, point);
			}

			Ok(())
		})
	}

	fn query<'a>(
		&'a self,
		collection: &'a str,
		vector: Vec<f32>,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<ScoredPoint>>> {
		Box::pin(async move {
			self.check()?;

			let collections = self.lock();
			let Some(target) = collections.get(collection) else {
				return Ok(Vec::new());
			};
			let mut hits = target
				.points
				.values()
				.map(|point| ScoredPoint {
					id: point.id,
					score: cosine(&vector, &point.vector),
					payload: point.payload.clone(),
				})
				.collect::<Vec<_>>();

			hits.sort_by(|a, b| {
				cmp_f32_desc(a.score, b.score)
					.then_with(|| a.payload.ordinal.cmp(&b.payload.ordinal))
			});
			hits.truncate(limit);

			Ok(hits)
		})
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}
