use serde_json::json;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use lxp_domain::{SubFunction, TaskMessage};
use lxp_retrieval::{Answer, Document, collection_name, compose, index_document, retrieve};
use lxp_storage::models::VectorstoreFile;

use crate::{
	GenerationRequest,
	worker::{HandlerError, Outcome, WorkerContext},
};

pub(crate) async fn run(ctx: WorkerContext, task: TaskMessage) -> Result<Outcome, HandlerError> {
	match task.sub_function {
		SubFunction::Assist => assist(&ctx, &task).await,
		SubFunction::Index => index(&ctx, &task).await,
		SubFunction::Galaxy | SubFunction::Coach | SubFunction::Translate =>
			generate(&ctx, &task).await,
	}
}

async fn assist(ctx: &WorkerContext, task: &TaskMessage) -> Result<Outcome, HandlerError> {
	let prompt = require_prompt(task)?;
	let vectorstore_id = require_vectorstore_id(task)?;

	ensure_vectorstore(ctx, vectorstore_id).await?;

	let evidence = retrieve(ctx.index.as_ref(), vectorstore_id, prompt, ctx.top_k).await?;
	let answer = compose(prompt, &evidence);

	Ok(Outcome {
		chunks: answer_chunks(&answer),
		result: json!({
			"answer": answer.text,
			"evidence": evidence,
			"sub_function": SubFunction::Assist.as_str(),
		}),
	})
}

async fn index(ctx: &WorkerContext, task: &TaskMessage) -> Result<Outcome, HandlerError> {
	let vectorstore_id = require_vectorstore_id(task)?;

	ensure_vectorstore(ctx, vectorstore_id).await?;

	let files = select_files(ctx.catalog.list_files(vectorstore_id).await?, &task.payload.files);

	if files.is_empty() {
		return Err(HandlerError::Terminal(format!(
			"Vectorstore {vectorstore_id} has no files to index."
		)));
	}

	let mut indexed = 0_usize;
	let mut reports = Vec::with_capacity(files.len());

	for file in &files {
		let document =
			Document { file_id: file.file_id, filename: &file.filename, text: &file.body };
		let report = index_document(
			ctx.index.as_ref(),
			vectorstore_id,
			document,
			&ctx.chunker,
			ctx.max_points_per_file,
		)
		.await?;

		indexed += report.points;

		reports.push(json!({
			"file_id": file.file_id,
			"filename": file.filename,
			"points": report.points,
			"truncated": report.truncated,
		}));
	}

	tracing::info!(
		vectorstore_id = %vectorstore_id,
		files = files.len(),
		indexed,
		"Vectorstore indexed."
	);

	Ok(Outcome {
		chunks: Vec::new(),
		result: json!({
			"indexed": indexed,
			"files": reports,
			"collection": collection_name(vectorstore_id),
		}),
	})
}

async fn generate(ctx: &WorkerContext, task: &TaskMessage) -> Result<Outcome, HandlerError> {
	let prompt = require_prompt(task)?;
	let evidence = match task.payload.vectorstore_id {
		Some(vectorstore_id) => {
			ensure_vectorstore(ctx, vectorstore_id).await?;

			retrieve(ctx.index.as_ref(), vectorstore_id, prompt, ctx.top_k).await?
		},
		None => Vec::new(),
	};
	let request = GenerationRequest {
		sub_function: task.sub_function,
		prompt,
		evidence: &evidence,
		params: &task.payload.params,
	};
	let text = ctx.generator.generate(&request).await?;

	if text.trim().is_empty() {
		return Err(HandlerError::Terminal("Generator returned no text.".to_string()));
	}

	Ok(Outcome {
		chunks: sentence_chunks(&text),
		result: json!({ "text": text, "evidence": evidence }),
	})
}

fn require_prompt(task: &TaskMessage) -> Result<&str, HandlerError> {
	task.payload.prompt.as_deref().map(str::trim).filter(|prompt| !prompt.is_empty()).ok_or_else(
		|| HandlerError::Terminal(format!("A prompt is required for {}.", task.sub_function)),
	)
}

fn require_vectorstore_id(task: &TaskMessage) -> Result<Uuid, HandlerError> {
	task.payload.vectorstore_id.ok_or_else(|| {
		HandlerError::Terminal(format!("A vectorstore_id is required for {}.", task.sub_function))
	})
}

async fn ensure_vectorstore(ctx: &WorkerContext, vectorstore_id: Uuid) -> Result<(), HandlerError> {
	match ctx.catalog.fetch_vectorstore(vectorstore_id).await? {
		Some(_) => Ok(()),
		None =>
			Err(HandlerError::Terminal(format!("Vectorstore {vectorstore_id} does not exist."))),
	}
}

/// Narrows `files` to the requested ids or filenames. An empty request keeps every file.
fn select_files(files: Vec<VectorstoreFile>, requested: &[String]) -> Vec<VectorstoreFile> {
	if requested.is_empty() {
		return files;
	}

	files
		.into_iter()
		.filter(|file| {
			requested.iter().any(|wanted| {
				wanted.trim() == file.filename || wanted.trim() == file.file_id.to_string()
			})
		})
		.collect()
}

/// One chunk per answer piece. Concatenated, the chunks equal the answer text.
fn answer_chunks(answer: &Answer) -> Vec<String> {
	answer
		.pieces
		.iter()
		.enumerate()
		.map(|(i, piece)| if i == 0 { piece.clone() } else { format!(" {piece}") })
		.collect()
}

/// Sentence-sized chunks that concatenate back to `text` exactly.
fn sentence_chunks(text: &str) -> Vec<String> {
	text.split_sentence_bounds().filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use super::*;

	fn file(filename: &str) -> VectorstoreFile {
		VectorstoreFile {
			file_id: Uuid::new_v4(),
			vectorstore_id: Uuid::nil(),
			filename: filename.to_string(),
			content_hash: String::new(),
			body: "text".to_string(),
			uploaded_by: None,
			created_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn sentence_chunks_reassemble_text() {
		let text = "First sentence. Second one!  Third?";
		let chunks = sentence_chunks(text);

		assert_eq!(chunks.len(), 3);
		assert_eq!(chunks.concat(), text);
	}

	#[test]
	fn answer_chunks_reassemble_answer() {
		let answer = Answer {
			text: "One. Two.".to_string(),
			pieces: vec!["One.".to_string(), "Two.".to_string()],
			grounded: true,
		};

		assert_eq!(answer_chunks(&answer).concat(), answer.text);
	}

	#[test]
	fn file_selection_matches_names_and_ids() {
		let files = vec![file("a.txt"), file("b.txt")];
		let wanted = vec![files[1].file_id.to_string()];

		assert_eq!(select_files(files.clone(), &[]).len(), 2);
		assert_eq!(select_files(files.clone(), &["a.txt".to_string()])[0].filename, "a.txt");
		assert_eq!(select_files(files, &wanted)[0].filename, "b.txt");
	}
}
