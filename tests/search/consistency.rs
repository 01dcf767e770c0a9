//! Index/mapping consistency across mutations and restarts.

use drift_engine::Store;

fn seed() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path(), false).unwrap();
    store
        .set("doc1", "Python is a high level programming language")
        .unwrap();
    store.set("doc2", "JavaScript is used for web").unwrap();
    store
        .set("s1", "The quick brown fox jumps over the lazy dog")
        .unwrap();
    store.set("s2", "A lazy dog sleeps").unwrap();
    (dir, store)
}

#[test]
fn every_key_is_findable_by_all_three_searches() {
    let (_dir, store) = seed();

    for (key, value) in store.entries() {
        // Phrase: the full value is a substring of itself.
        assert!(
            store.phrase_search(&value).contains(&key),
            "phrase_search misses {key}"
        );

        // Full text: any token of the value finds the key.
        let token = value.split_whitespace().next().unwrap();
        assert!(
            store
                .full_text_search(token, 100)
                .iter()
                .any(|(k, _)| k == &key),
            "full_text_search misses {key}"
        );

        // Semantic: the exact value scores at least as high as any other key.
        let ranked = store.semantic_search(&value, 100);
        let own = ranked.iter().find(|(k, _)| k == &key).unwrap().1;
        assert!(
            ranked.iter().all(|(_, score)| own >= *score),
            "semantic_search ranks another key above {key}"
        );
    }
}

#[test]
fn full_text_scenario_python_programming() {
    let (_dir, store) = seed();

    let results = store.full_text_search("python programming", 10);
    assert!(results.iter().any(|(k, s)| k == "doc1" && *s > 0.0));
    assert!(results.iter().all(|(k, _)| k != "doc2"));
}

#[test]
fn phrase_scenario_lazy_dog() {
    let (_dir, store) = seed();

    let results = store.phrase_search("lazy dog");
    assert_eq!(results, vec!["s1".to_string(), "s2".to_string()]);
}

#[test]
fn overwrite_removes_old_tokens_from_search() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path(), false).unwrap();

    store.set("k", "ephemeral words").unwrap();
    store.set("k", "entirely different tokens").unwrap();

    assert!(store.full_text_search("ephemeral", 10).is_empty());
    assert!(store.phrase_search("ephemeral words").is_empty());
    let results = store.full_text_search("different", 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "k");
}

#[test]
fn delete_removes_key_from_all_searches() {
    let (_dir, store) = seed();
    store.delete("s2").unwrap();

    assert!(store
        .full_text_search("sleeps", 10)
        .iter()
        .all(|(k, _)| k != "s2"));
    assert!(store.phrase_search("lazy dog sleeps").is_empty());
    assert!(store
        .semantic_search("A lazy dog sleeps", 100)
        .iter()
        .all(|(k, _)| k != "s2"));
    assert_eq!(store.phrase_search("lazy dog"), vec!["s1".to_string()]);
}

#[test]
fn saved_indexes_reload_bit_identical() {
    let (dir, store) = seed();
    let full_text = store.full_text_search("lazy dog", 10);
    let semantic = store.semantic_search("a sleepy dog", 10);
    let phrases = store.phrase_search("programming language");
    store.save_indexes().unwrap();
    drop(store);

    let store = Store::open(dir.path(), false).unwrap();
    assert_eq!(store.full_text_search("lazy dog", 10), full_text);
    assert_eq!(store.semantic_search("a sleepy dog", 10), semantic);
    assert_eq!(store.phrase_search("programming language"), phrases);
}

#[test]
fn rebuilt_indexes_find_everything_saved_ones_do() {
    let (dir, store) = seed();
    store.save_indexes().unwrap();
    let saved_results = store.full_text_search("lazy", 10);
    drop(store);

    // Remove the index file: the store must rebuild from the mapping.
    std::fs::remove_file(dir.path().join("indexes.json")).unwrap();
    let store = Store::open(dir.path(), false).unwrap();
    let rebuilt: Vec<String> = store
        .full_text_search("lazy", 10)
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    let saved: Vec<String> = saved_results.into_iter().map(|(k, _)| k).collect();

    // Insertion order (and thus tie-breaks) may differ after a rebuild,
    // but the same keys must be found with the same top result set.
    let mut rebuilt_sorted = rebuilt.clone();
    rebuilt_sorted.sort();
    let mut saved_sorted = saved.clone();
    saved_sorted.sort();
    assert_eq!(rebuilt_sorted, saved_sorted);
}

#[test]
fn searches_reflect_state_after_restart_without_saved_indexes() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path(), false).unwrap();
        store.set("a", "alpha beta").unwrap();
        store.set("b", "alpha gamma").unwrap();
        store.delete("a").unwrap();
        // No save_indexes: reopen rebuilds from the recovered mapping.
    }

    let store = Store::open(dir.path(), false).unwrap();
    let results = store.full_text_search("alpha", 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "b");
    assert!(store.phrase_search("beta").is_empty());
}
