use uuid::Uuid;

use lxp_service::{Error, get_vectorstore, query_vectorstore, upload_file};

use super::Harness;

const ORBITS: &str = "Mars takes 687 Earth days to orbit the Sun.";
const TIDES: &str = "Tides rise and fall twice a day because of the Moon.";

#[tokio::test]
async fn identical_upload_keeps_the_file_id() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[]).await;
	let first = upload_file(harness.catalog.as_ref(), vectorstore_id, "orbits.txt", None, ORBITS)
		.await
		.expect("Upload failed.");
	let second =
		upload_file(harness.catalog.as_ref(), vectorstore_id, "planets.txt", Some("bob"), ORBITS)
			.await
			.expect("Upload failed.");

	assert_eq!(first.file_id, second.file_id);
	assert_eq!(first.content_hash, second.content_hash);
	assert_eq!(second.chars, ORBITS.chars().count());

	let detail =
		get_vectorstore(harness.catalog.as_ref(), vectorstore_id).await.expect("Lookup failed.");

	assert_eq!(detail.files.len(), 1);
	assert_eq!(detail.files[0].filename, "planets.txt");
	assert_eq!(detail.store.collection, format!("vs_{vectorstore_id}"));
}

#[tokio::test]
async fn empty_upload_is_rejected() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[]).await;
	let err = upload_file(harness.catalog.as_ref(), vectorstore_id, "blank.txt", None, "  \n")
		.await
		.expect_err("Blank body should be rejected.");

	assert!(matches!(err, Error::InvalidRequest { ref field, .. } if field == "body"));
}

#[tokio::test]
async fn unknown_vectorstore_is_not_found() {
	let harness = Harness::new().await;
	let missing = Uuid::new_v4();

	assert!(matches!(
		get_vectorstore(harness.catalog.as_ref(), missing).await,
		Err(Error::NotFound { .. })
	));
	assert!(matches!(
		upload_file(harness.catalog.as_ref(), missing, "a.txt", None, ORBITS).await,
		Err(Error::NotFound { .. })
	));
	assert!(matches!(
		query_vectorstore(harness.catalog.as_ref(), harness.index.as_ref(), missing, "Mars", 3)
			.await,
		Err(Error::NotFound { .. })
	));
}

#[tokio::test]
async fn query_arguments_are_validated() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[("orbits.txt", ORBITS)]).await;
	let catalog = harness.catalog.as_ref();
	let index = harness.index.as_ref();

	assert!(matches!(
		query_vectorstore(catalog, index, vectorstore_id, "   ", 3).await,
		Err(Error::InvalidRequest { ref field, .. }) if field == "query"
	));
	assert!(matches!(
		query_vectorstore(catalog, index, vectorstore_id, "Mars", 0).await,
		Err(Error::InvalidRequest { ref field, .. }) if field == "top_k"
	));
	assert!(matches!(
		query_vectorstore(catalog, index, vectorstore_id, "Mars", 51).await,
		Err(Error::InvalidRequest { ref field, .. }) if field == "top_k"
	));
}

#[tokio::test]
async fn unindexed_vectorstore_returns_no_evidence() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[("orbits.txt", ORBITS)]).await;
	let hits =
		query_vectorstore(harness.catalog.as_ref(), harness.index.as_ref(), vectorstore_id, "Mars", 3)
			.await
			.expect("Query failed.");

	assert!(hits.is_empty());
}

#[tokio::test]
async fn exact_chunk_text_ranks_first() {
	let harness = Harness::new().await;
	let vectorstore_id =
		harness.indexed_vectorstore(&[("orbits.txt", ORBITS), ("tides.txt", TIDES)]).await;
	let hits =
		query_vectorstore(harness.catalog.as_ref(), harness.index.as_ref(), vectorstore_id, TIDES, 5)
			.await
			.expect("Query failed.");

	assert_eq!(hits.len(), 2);
	assert_eq!(hits[0].filename, "tides.txt");
	assert_eq!(hits[0].text, TIDES);
	assert!((hits[0].score - 1.0).abs() < 1e-4);
	assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn catalog_rejects_files_for_a_missing_vectorstore() {
	let harness = Harness::new().await;
	let file = lxp_storage::models::NewFile {
		file_id: Uuid::new_v4(),
		vectorstore_id: Uuid::new_v4(),
		filename: "orbits.txt",
		content_hash: "hash-1",
		body: ORBITS,
		uploaded_by: None,
	};
	let err = lxp_storage::VectorstoreCatalog::upsert_file(harness.catalog.as_ref(), &file)
		.await
		.expect_err("Upload into a missing vectorstore should fail.");

	assert!(matches!(err, lxp_storage::Error::NotFound(_)));
	assert!(matches!(Error::from(err), Error::NotFound { .. }));
}
