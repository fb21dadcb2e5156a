use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		CreateCollectionBuilder, Distance, PointStruct, Query, QueryPointsBuilder,
		UpsertPointsBuilder, Value, VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
		vectors_config::Config as VectorsConfigKind,
	},
};
use uuid::Uuid;

use lxp_domain::BoxFuture;
use lxp_retrieval::{ChunkPayload, Point, ScoredPoint, VectorIndex};

use crate::Result;

pub struct QdrantStore {
	pub client: Qdrant,
}
impl QdrantStore {
	pub fn new(cfg: &lxp_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client })
	}

	async fn collection_dim(&self, collection: &str) -> Result<Option<u64>> {
		let info = self.client.collection_info(collection).await?;
		let size = info
			.result
			.and_then(|info| info.config)
			.and_then(|config| config.params)
			.and_then(|params| params.vectors_config)
			.and_then(|vectors| vectors.config)
			.and_then(|config| match config {
				VectorsConfigKind::Params(params) => Some(params.size),
				VectorsConfigKind::ParamsMap(_) => None,
			});

		Ok(size)
	}

	async fn create(&self, collection: &str, dim: usize) -> Result<()> {
		let builder = CreateCollectionBuilder::new(collection)
			.vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine));

		match self.client.create_collection(builder).await {
			Ok(_) => Ok(()),
			// Another worker may have created it between the existence check and this call.
			Err(err) =>
				if self.client.collection_exists(collection).await? {
					Ok(())
				} else {
					Err(err.into())
				},
		}
	}

	async fn ensure(&self, collection: &str, dim: usize) -> Result<()> {
		if !self.client.collection_exists(collection).await? {
			return self.create(collection, dim).await;
		}

		match self.collection_dim(collection).await? {
			Some(size) if size == dim as u64 => Ok(()),
			size => {
				tracing::warn!(
					collection,
					existing_dim = ?size,
					expected_dim = dim,
					"Vector collection has a mismatched dimension. Recreating."
				);

				self.client.delete_collection(collection).await?;
				self.create(collection, dim).await
			},
		}
	}

	async fn upsert_points(&self, collection: &str, points: Vec<Point>) -> Result<()> {
		let points = points.into_iter().map(to_point_struct).collect::<Vec<_>>();
		let upsert = UpsertPointsBuilder::new(collection, points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	async fn query_points(
		&self,
		collection: &str,
		vector: Vec<f32>,
		limit: usize,
	) -> Result<Vec<ScoredPoint>> {
		if !self.client.collection_exists(collection).await? {
			return Ok(Vec::new());
		}

		let search = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(vector))
			.limit(limit as u64)
			.with_payload(true);
		let response = self.client.query(search).await?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			let id = point.id.as_ref().and_then(|id| match &id.point_id_options {
				Some(PointIdOptions::Uuid(raw)) => Uuid::parse_str(raw).ok(),
				_ => None,
			});
			let (Some(id), Some(payload)) = (id, from_payload(&point.payload)) else {
				tracing::warn!(collection, "Skipping vector point with malformed payload.");

				continue;
			};

			out.push(ScoredPoint { id, score: point.score, payload });
		}

		Ok(out)
	}
}
impl VectorIndex for QdrantStore {
	fn ensure_collection<'a>(
		&'a self,
		collection: &'a str,
		dim: usize,
	) -> BoxFuture<'a, lxp_retrieval::Result<()>> {
		Box::pin(async move { self.ensure(collection, dim).await.map_err(index_error) })
	}

	fn upsert<'a>(
		&'a self,
		collection: &'a str,
		points: Vec<Point>,
	) -> BoxFuture<'a, lxp_retrieval::Result<()>> {
		Box::pin(async move { self.upsert_points(collection, points).await.map_err(index_error) })
	}

	fn query<'a>(
		&'a self,
		collection: &'a str,
		vector: Vec<f32>,
		limit: usize,
	) -> BoxFuture<'a, lxp_retrieval::Result<Vec<ScoredPoint>>> {
		Box::pin(async move {
			self.query_points(collection, vector, limit).await.map_err(index_error)
		})
	}
}

fn index_error(err: crate::Error) -> lxp_retrieval::Error {
	lxp_retrieval::Error::Index { message: err.to_string() }
}

fn to_point_struct(point: Point) -> PointStruct {
	let mut payload = HashMap::new();

	payload.insert("file_id".to_string(), Value::from(point.payload.file_id.to_string()));
	payload.insert("filename".to_string(), Value::from(point.payload.filename));
	payload.insert("ordinal".to_string(), Value::from(point.payload.ordinal as i64));
	payload.insert("text".to_string(), Value::from(point.payload.text));
	payload.insert("start".to_string(), Value::from(point.payload.start as i64));
	payload.insert("end".to_string(), Value::from(point.payload.end as i64));

	PointStruct::new(point.id.to_string(), point.vector, Payload::from(payload))
}

fn from_payload(payload: &HashMap<String, Value>) -> Option<ChunkPayload> {
	Some(ChunkPayload {
		file_id: Uuid::parse_str(&payload_string(payload, "file_id")?).ok()?,
		filename: payload_string(payload, "filename")?,
		ordinal: u32::try_from(payload_i64(payload, "ordinal")?).ok()?,
		text: payload_string(payload, "text")?,
		start: u64::try_from(payload_i64(payload, "start")?).ok()?,
		end: u64::try_from(payload_i64(payload, "end")?).ok()?,
	})
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match &payload.get(key)?.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		_ => None,
	}
}
