//! Ranking and lifecycle properties of the similarity search service.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use prodsim::{
    BuildError, CatalogError, HashingEmbedder, IndexState, InMemoryProductStore, ProductId,
    ProductRecord, SearchError, ServiceConfig, SimilaritySearchService,
};

use super::common::{
    FailingEmbedder, KeywordEmbedder, OverlapTrackingEmbedder, ScriptedStore, SlowEmbedder,
    mixed_catalog, shoe_catalog,
};

fn ids(results: &[prodsim::SearchResult]) -> Vec<i64> {
    results.iter().map(|r| r.id.get()).collect()
}

fn hashing_service(products: Vec<ProductRecord>) -> SimilaritySearchService {
    let store = InMemoryProductStore::from_products(products).unwrap();
    SimilaritySearchService::new(Arc::new(store), Arc::new(HashingEmbedder::default()))
}

#[test]
fn test_red_sneakers_example() {
    let store = ScriptedStore::with_products(shoe_catalog());
    let service = SimilaritySearchService::new(store, Arc::new(KeywordEmbedder));

    let top = service.search("red sneakers", 2).unwrap();
    assert_eq!(ids(&top), vec![1, 2]);

    let all = service.search("red sneakers", 3).unwrap();
    assert_eq!(ids(&all), vec![1, 2, 3]);
    assert!(all[0].score > all[1].score);
    assert!(all[1].score > all[2].score);
    assert!((all[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn test_result_count_is_min_of_k_and_catalog_size() {
    let catalog = mixed_catalog();
    let n = catalog.len();
    let service = hashing_service(catalog);

    for k in [1_i64, 3, 7, 20, i64::MAX] {
        let results = service.search("shoes", k).unwrap();
        let expected = usize::try_from(k).unwrap().min(n);
        assert_eq!(results.len(), expected, "top_k = {k}");
    }

    assert!(service.search("shoes", 0).unwrap().is_empty());
    assert!(service.search("shoes", -4).unwrap().is_empty());
    // Non-positive k still triggers the lazy build
    assert_eq!(service.state(), IndexState::Ready);
}

#[test]
fn test_scores_descending_with_ties_by_ascending_id() {
    let service = hashing_service(vec![
        ProductRecord::new(7, "blue suede boots"),
        ProductRecord::new(3, "blue suede boots"),
        ProductRecord::new(12, "all-season radial car tires"),
        ProductRecord::new(5, "blue suede boots"),
    ]);

    let results = service.search("blue suede boots", 4).unwrap();
    assert_eq!(ids(&results[..3]), vec![3, 5, 7]);
    assert_eq!(results[0].score, results[1].score);
    assert_eq!(results[1].score, results[2].score);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for result in &results {
        assert!((-1.0..=1.0).contains(&result.score));
    }
}

#[test]
fn test_self_similarity_ranks_first() {
    let catalog = mixed_catalog();
    let service = hashing_service(catalog.clone());

    for product in &catalog {
        let results = service.search(&product.description, 1).unwrap();
        assert_eq!(results[0].id, product.id, "query: {}", product.description);
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_blank_query_rejected() {
    let service = hashing_service(mixed_catalog());
    for query in ["", "   ", "\n\t"] {
        assert!(matches!(
            service.search(query, 3),
            Err(SearchError::InvalidQuery)
        ));
    }
    assert_eq!(service.build_count(), 0);
}

#[test]
fn test_refresh_drops_removed_products() {
    let store = Arc::new(InMemoryProductStore::from_products(mixed_catalog()).unwrap());
    let service = SimilaritySearchService::new(store.clone(), Arc::new(HashingEmbedder::default()));

    let before = service.search("hiking boots", 7).unwrap();
    assert!(before.iter().any(|r| r.id == ProductId::new(11)));

    store.remove(ProductId::new(11));
    service.refresh().unwrap();

    let after = service.search("hiking boots", 7).unwrap();
    assert_eq!(after.len(), 6);
    assert!(after.iter().all(|r| r.id != ProductId::new(11)));
    assert_eq!(service.metadata().unwrap().generation, 2);
}

#[test]
fn test_refresh_with_empty_catalog_keeps_previous_index() {
    let store = Arc::new(InMemoryProductStore::from_products(shoe_catalog()).unwrap());
    let service = SimilaritySearchService::new(store.clone(), Arc::new(KeywordEmbedder));
    service.initialize().unwrap();

    store.replace_all(Vec::new()).unwrap();
    let error = service.refresh().unwrap_err();
    assert!(matches!(*error, BuildError::EmptyCorpus));

    assert_eq!(service.state(), IndexState::Ready);
    assert_eq!(service.entry_count(), 3);
    assert_eq!(service.metadata().unwrap().generation, 1);
    assert_eq!(ids(&service.search("red shoes", 1).unwrap()), vec![1]);
}

#[test]
fn test_failed_refresh_keeps_serving() {
    let store = ScriptedStore::with_products(shoe_catalog());
    let service = SimilaritySearchService::new(store.clone(), Arc::new(KeywordEmbedder));
    service.initialize().unwrap();

    store.set_failing(true);
    let error = service.refresh().unwrap_err();
    assert!(matches!(*error, BuildError::Store(CatalogError::Backend(_))));
    assert!(error.is_retryable());

    assert_eq!(ids(&service.search("car wheels", 1).unwrap()), vec![3]);

    store.set_failing(false);
    service.refresh().unwrap();
    assert_eq!(service.metadata().unwrap().generation, 2);
}

#[test]
fn test_failed_lazy_build_surfaces_as_index_unavailable() {
    let store = ScriptedStore::with_products(shoe_catalog());
    store.set_failing(true);
    let service = SimilaritySearchService::new(store.clone(), Arc::new(KeywordEmbedder));

    let error = service.search("red shoes", 1).unwrap_err();
    assert_eq!(error.status_code(), "SERVICE_UNAVAILABLE");
    match error {
        SearchError::IndexUnavailable { source } => {
            assert!(matches!(*source, BuildError::Store(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.state(), IndexState::Empty);

    // The next search retries the build
    store.set_failing(false);
    assert_eq!(ids(&service.search("red shoes", 1).unwrap()), vec![1]);
    assert_eq!(store.list_calls(), 2);
}

#[test]
fn test_concurrent_first_searches_build_once() {
    let store = ScriptedStore::with_products(mixed_catalog());
    let embedder = SlowEmbedder {
        inner: HashingEmbedder::default(),
        delay: Duration::from_millis(100),
    };
    let service = SimilaritySearchService::new(store.clone(), Arc::new(embedder));
    let barrier = Barrier::new(4);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    service.search("trail running shoes", 3).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(store.list_calls(), 1);
    assert_eq!(service.build_count(), 1);
    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
}

#[test]
fn test_concurrent_searches_are_deterministic() {
    let service = hashing_service(mixed_catalog());
    service.initialize().unwrap();
    let expected = service.search("waterproof boots", 5).unwrap();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..20 {
                    assert_eq!(service.search("waterproof boots", 5).unwrap(), expected);
                }
            });
        }
    });
    assert_eq!(service.build_count(), 1);
}

#[test]
fn test_searches_keep_serving_during_refresh() {
    let store = Arc::new(InMemoryProductStore::from_products(mixed_catalog()).unwrap());
    let embedder = SlowEmbedder {
        inner: HashingEmbedder::default(),
        delay: Duration::from_millis(20),
    };
    let service = SimilaritySearchService::new(store.clone(), Arc::new(embedder));
    service.initialize().unwrap();

    store.upsert(ProductRecord::new(17, "Running shoes for road racing"));

    std::thread::scope(|s| {
        s.spawn(|| service.refresh().unwrap());
        s.spawn(|| {
            for _ in 0..5 {
                let results = service.search("running shoes", 3).unwrap();
                assert_eq!(results.len(), 3);
            }
        });
    });

    assert_eq!(service.entry_count(), 8);
    assert_eq!(service.metadata().unwrap().generation, 2);
}

#[test]
fn test_build_timeout_publishes_nothing() {
    let store = ScriptedStore::with_products(mixed_catalog());
    let embedder = SlowEmbedder {
        inner: HashingEmbedder::default(),
        delay: Duration::from_millis(500),
    };
    let config = ServiceConfig {
        build_timeout: Some(Duration::from_millis(50)),
        ..ServiceConfig::default()
    };
    let service = SimilaritySearchService::with_config(store, Arc::new(embedder), config);

    let error = service.initialize().unwrap_err();
    assert!(matches!(*error, BuildError::Timeout { .. }));
    assert_eq!(error.status_code(), "BUILD_TIMEOUT");

    // Nothing is published while the worker is still embedding
    assert_eq!(service.state(), IndexState::Building);
    assert!(service.current_index().is_none());
}

#[test]
fn test_timed_out_build_never_overlaps_the_next_one() {
    let store = ScriptedStore::with_products(mixed_catalog());
    let embedder = Arc::new(OverlapTrackingEmbedder::new(Duration::from_millis(300)));
    let config = ServiceConfig {
        build_timeout: Some(Duration::from_millis(50)),
        ..ServiceConfig::default()
    };
    let service = SimilaritySearchService::with_config(store.clone(), embedder.clone(), config);

    let first = service.initialize().unwrap_err();
    assert!(matches!(*first, BuildError::Timeout { .. }));

    // The first worker is still running, so this waits on it instead of
    // starting a second build
    let second = service.initialize().unwrap_err();
    assert!(matches!(*second, BuildError::Timeout { .. }));
    assert_eq!(service.build_count(), 1);
    assert_eq!(store.list_calls(), 1);

    std::thread::sleep(Duration::from_millis(400));

    // The late result is adopted rather than rebuilt
    service.initialize().unwrap();
    assert_eq!(service.build_count(), 1);
    assert_eq!(service.state(), IndexState::Ready);
    assert_eq!(service.entry_count(), mixed_catalog().len());
    assert_eq!(embedder.max_overlap(), 1);
}

#[test]
fn test_refresh_after_timeout_waits_for_straggler() {
    let store = ScriptedStore::with_products(mixed_catalog());
    let embedder = Arc::new(OverlapTrackingEmbedder::new(Duration::from_millis(250)));
    let config = ServiceConfig {
        build_timeout: Some(Duration::from_millis(100)),
        ..ServiceConfig::default()
    };
    let service = SimilaritySearchService::with_config(store.clone(), embedder.clone(), config);

    assert!(service.initialize().is_err());
    std::thread::sleep(Duration::from_millis(250));

    // Refresh drains the late build (generation 1) before embedding the
    // current catalog, which times out again on its own worker
    let _ = service.refresh();
    assert_eq!(service.metadata().unwrap().generation, 1);
    assert_eq!(service.build_count(), 2);
    assert_eq!(embedder.max_overlap(), 1);
}

#[test]
fn test_concurrent_searches_share_one_failed_build() {
    let store = ScriptedStore::with_products(mixed_catalog());
    let embedder = FailingEmbedder {
        delay: Duration::from_millis(200),
    };
    let service = SimilaritySearchService::new(store.clone(), Arc::new(embedder));
    let barrier = Barrier::new(4);

    let outcomes: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    service.search("trail running shoes", 3)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(service.build_count(), 1);
    assert_eq!(store.list_calls(), 1);
    for outcome in outcomes {
        match outcome {
            Err(SearchError::IndexUnavailable { source }) => {
                assert!(matches!(*source, BuildError::Embedding(_)));
            }
            other => panic!("expected an unavailable index, got {other:?}"),
        }
    }
    assert_eq!(service.state(), IndexState::Empty);
}

#[test]
fn test_similar_to_product_excludes_query_product() {
    let store = ScriptedStore::with_products(shoe_catalog());
    let service = SimilaritySearchService::new(store, Arc::new(KeywordEmbedder));

    let results = service.similar_to_product(ProductId::new(2), 2).unwrap();
    assert_eq!(ids(&results), vec![1, 3]);

    let error = service
        .similar_to_product(ProductId::new(404), 2)
        .unwrap_err();
    assert_eq!(error.status_code(), "NOT_FOUND");
}

#[test]
fn test_punctuation_only_text_does_not_break_the_index() {
    let mut catalog = mixed_catalog();
    catalog.push(ProductRecord::new(99, "---"));
    let service = hashing_service(catalog);

    let results = service.search("???", 3).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(service.entry_count(), 8);

    let own = service.search("---", 1).unwrap();
    assert_eq!(ids(&own), vec![99]);
}
