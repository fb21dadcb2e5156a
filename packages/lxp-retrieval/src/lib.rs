pub mod chunker;
pub mod compose;
pub mod embedder;
pub mod index;

mod error;

pub use chunker::{Chunker, Chunks, TextChunk};
pub use compose::{Answer, NO_EVIDENCE_ANSWER, compose};
pub use embedder::{EMBEDDING_DIM, embed};
pub use error::{Error, Result};
pub use index::{
	ChunkPayload, Document, Evidence, IndexReport, Point, ScoredPoint, UPSERT_BATCH_SIZE,
	VectorIndex, collection_name, index_document, point_id, retrieve,
};
