use siterag_core::config::EmbeddingConfig;
use siterag_core::similarity::cosine_similarity;
use siterag_embed::{get_default_embedder, EmbeddingProvider, DEFAULT_DIM};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let config = EmbeddingConfig { use_fake: true, ..EmbeddingConfig::default() };
    let embedder = get_default_embedder(&config).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), DEFAULT_DIM);
    assert_eq!(embedder.dim(), DEFAULT_DIM);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn provider_embeds_queries_and_chunks_alike() {
    let config = EmbeddingConfig { use_fake: true, max_chars: 64, ..EmbeddingConfig::default() };
    let provider = EmbeddingProvider::new(get_default_embedder(&config).unwrap(), &config);
    let chunk = provider.embed("Our refund policy covers thirty days.").expect("chunk vector");
    let query = provider.embed("refund policy").expect("query vector");
    let unrelated = provider.embed("office parking rules").expect("unrelated vector");
    assert!(cosine_similarity(&query, &chunk) > cosine_similarity(&query, &unrelated));

    // beyond max_chars only the prefix counts
    let long = format!("{} {}", "word ".repeat(20), "tail");
    let prefix: String = long.chars().take(64).collect();
    assert_eq!(provider.embed(&long), provider.embed(&prefix));
}
