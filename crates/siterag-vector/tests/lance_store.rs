#![cfg(feature = "lance")]

use siterag_core::error::Error;
use siterag_core::traits::ContentStore;
use siterag_core::types::{Chunk, ContentFilters, Meta};
use siterag_vector::{LanceStore, DEFAULT_TABLE};
use tempfile::TempDir;

fn chunk(org: &str, doc: &str, idx: usize, embedding: Option<Vec<f32>>) -> Chunk {
	let mut metadata = Meta::new();
	metadata.insert("domain".to_string(), "a.com".to_string());
	Chunk {
		id: format!("{}:{}", doc, idx),
		document_id: doc.to_string(),
		org_id: org.to_string(),
		chunk_index: idx,
		content: format!("chunk {} of {}", idx, doc),
		start_char: idx * 10,
		end_char: idx * 10 + 8,
		embedding,
		metadata,
	}
}

#[tokio::test]
async fn lance_round_trip_search_and_replace() {
	let tmp = TempDir::new().unwrap();
	let store = LanceStore::open(tmp.path().to_str().unwrap(), DEFAULT_TABLE, 3).await.unwrap();
	let chunks = vec![
		chunk("org-a", "doc", 0, Some(vec![1.0, 0.0, 0.0])),
		chunk("org-a", "doc", 1, Some(vec![0.0, 1.0, 0.0])),
		chunk("org-a", "doc", 2, None),
	];
	store.upsert_chunks("doc", "org-a", chunks.clone()).await.unwrap();
	store.upsert_chunks("doc", "org-b", vec![chunk("org-b", "doc", 0, Some(vec![1.0, 0.0, 0.0]))]).await.unwrap();

	assert_eq!(store.get_chunks_by_org("org-a", &ContentFilters::default()).await.unwrap(), chunks);

	let hits = store.search_vector("org-a", &[1.0, 0.0, 0.0], 5, &ContentFilters::default()).await.unwrap();
	assert_eq!(hits.len(), 2);
	assert_eq!(hits[0].chunk_id, "doc:0");
	assert!((hits[0].score - 1.0).abs() < 1e-4);
	assert!(hits.iter().all(|h| h.org_id == "org-a"));

	store.upsert_chunks("doc", "org-a", vec![chunk("org-a", "doc", 0, None)]).await.unwrap();
	let stats = store.stats("org-a").await.unwrap();
	assert_eq!((stats.chunks, stats.embedded_chunks), (1, 0));
	assert_eq!(store.stats("org-b").await.unwrap().chunks, 1);

	assert!(matches!(
		store.search_lexical("org-a", "chunk", 5, &ContentFilters::default()).await,
		Err(Error::Unsupported(_))
	));
}
