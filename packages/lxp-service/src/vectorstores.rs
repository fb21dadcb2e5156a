use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use lxp_retrieval::{Evidence, VectorIndex, collection_name, retrieve};
use lxp_storage::{
	VectorstoreCatalog,
	models::{NewFile, Vectorstore, VectorstoreFile},
};

use crate::{Error, Result};

pub const MAX_QUERY_TOP_K: usize = 50;

#[derive(Clone, Debug, Serialize)]
pub struct VectorstoreView {
	pub id: Uuid,
	pub collection: String,
	pub created_by: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl From<Vectorstore> for VectorstoreView {
	fn from(store: Vectorstore) -> Self {
		Self {
			id: store.vectorstore_id,
			collection: collection_name(store.vectorstore_id),
			created_by: store.created_by,
			created_at: store.created_at,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct VectorstoreDetail {
	#[serde(flatten)]
	pub store: VectorstoreView,
	pub files: Vec<FileView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FileView {
	pub file_id: Uuid,
	pub filename: String,
	pub content_hash: String,
	pub chars: usize,
	pub uploaded_by: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl From<VectorstoreFile> for FileView {
	fn from(file: VectorstoreFile) -> Self {
		Self {
			file_id: file.file_id,
			chars: file.body.chars().count(),
			filename: file.filename,
			content_hash: file.content_hash,
			uploaded_by: file.uploaded_by,
			created_at: file.created_at,
		}
	}
}

pub async fn create_vectorstore(
	catalog: &dyn VectorstoreCatalog,
	created_by: Option<&str>,
) -> Result<VectorstoreView> {
	let created_by = created_by.map(str::trim).filter(|user| !user.is_empty());
	let store = catalog.create_vectorstore(Uuid::new_v4(), created_by).await?;

	tracing::info!(vectorstore_id = %store.vectorstore_id, "Vectorstore created.");

	Ok(store.into())
}

pub async fn get_vectorstore(
	catalog: &dyn VectorstoreCatalog,
	vectorstore_id: Uuid,
) -> Result<VectorstoreDetail> {
	let store = require_vectorstore(catalog, vectorstore_id).await?;
	let files = catalog.list_files(vectorstore_id).await?;

	Ok(VectorstoreDetail {
		store: store.into(),
		files: files.into_iter().map(FileView::from).collect(),
	})
}

/// Stores a UTF-8 text file. Re-uploading identical content keeps the existing file id, so
/// re-indexing overwrites its points instead of duplicating them.
pub async fn upload_file(
	catalog: &dyn VectorstoreCatalog,
	vectorstore_id: Uuid,
	filename: &str,
	uploaded_by: Option<&str>,
	body: &str,
) -> Result<FileView> {
	let filename = filename.trim();

	if filename.is_empty() {
		return Err(Error::invalid("filename", "must be non-empty."));
	}
	if body.trim().is_empty() {
		return Err(Error::invalid("body", "must contain text."));
	}

	require_vectorstore(catalog, vectorstore_id).await?;

	let content_hash = blake3::hash(body.as_bytes()).to_hex().to_string();
	let stored = catalog
		.upsert_file(&NewFile {
			file_id: Uuid::new_v4(),
			vectorstore_id,
			filename,
			content_hash: &content_hash,
			body,
			uploaded_by: uploaded_by.map(str::trim).filter(|user| !user.is_empty()),
		})
		.await?;

	tracing::info!(
		vectorstore_id = %vectorstore_id,
		file_id = %stored.file_id,
		"Vectorstore file stored."
	);

	Ok(stored.into())
}

/// Synchronous nearest-neighbour lookup, outside the job pipeline.
pub async fn query_vectorstore(
	catalog: &dyn VectorstoreCatalog,
	index: &dyn VectorIndex,
	vectorstore_id: Uuid,
	query: &str,
	top_k: usize,
) -> Result<Vec<Evidence>> {
	let query = query.trim();

	if query.is_empty() {
		return Err(Error::invalid("query", "must be non-empty."));
	}
	if top_k == 0 || top_k > MAX_QUERY_TOP_K {
		return Err(Error::invalid("top_k", format!("must be between 1 and {MAX_QUERY_TOP_K}.")));
	}

	require_vectorstore(catalog, vectorstore_id).await?;

	Ok(retrieve(index, vectorstore_id, query, top_k).await?)
}

pub(crate) async fn require_vectorstore(
	catalog: &dyn VectorstoreCatalog,
	vectorstore_id: Uuid,
) -> Result<Vectorstore> {
	catalog.fetch_vectorstore(vectorstore_id).await?.ok_or_else(|| Error::NotFound {
		message: format!("Vectorstore {vectorstore_id} does not exist."),
	})
}
