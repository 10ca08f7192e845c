use super::*;
use crate::config::StorageSettings;
use std::fs;

fn t(id: &str) -> Track {
    Track::new(id, format!("Song {id}"), format!("https://media.example/watch?v={id}"))
        .with_duration(200)
        .with_thumbnail(format!("https://i.example/{id}.jpg"))
}

fn storage(dir: &Path) -> StorageSettings {
    StorageSettings {
        data_dir: Some(dir.to_path_buf()),
        ..StorageSettings::default()
    }
}

#[test]
fn saved_playlist_loads_back_in_order_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    let queue: Vec<Track> = ["a", "b", "c", "d", "e"].into_iter().map(t).collect();

    store.save("Focus", &queue).unwrap();
    assert_eq!(store.load("Focus").unwrap(), queue);

    let reopened = PlaylistStore::open(&storage(dir.path())).unwrap();
    let loaded = reopened.load("Focus").unwrap();
    assert_eq!(loaded.len(), 5);
    let ids: Vec<&str> = loaded.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c", "d", "e"]);
    assert_eq!(loaded, queue);
}

#[test]
fn saved_playlist_is_independent_of_later_queue_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    let mut queue = vec![t("a"), t("b")];
    store.save("Mix", &queue).unwrap();
    queue.push(t("c"));
    queue.remove(0);
    assert_eq!(store.load("Mix").unwrap(), vec![t("a"), t("b")]);
}

#[test]
fn names_are_sorted_and_delete_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    store.save("zeta", &[t("a")]).unwrap();
    store.save("alpha", &[t("b")]).unwrap();
    assert_eq!(store.list_names(), ["alpha", "zeta"]);

    assert!(store.delete("zeta").unwrap());
    assert!(!store.delete("zeta").unwrap());
    let reopened = PlaylistStore::open(&storage(dir.path())).unwrap();
    assert_eq!(reopened.list_names(), ["alpha"]);
}

#[test]
fn empty_name_or_queue_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    assert!(matches!(store.save("  ", &[t("a")]), Err(Error::InvalidArgument(_))));
    assert!(matches!(store.save("x", &[]), Err(Error::InvalidArgument(_))));
    assert!(store.list_names().is_empty());
}

#[test]
fn failed_write_leaves_memory_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let mut store = PlaylistStore::open(&storage(&data)).unwrap();
    store.save("keep", &[t("a")]).unwrap();

    // Replace the data directory with a plain file so writes fail.
    fs::remove_dir_all(&data).unwrap();
    fs::write(&data, b"not a directory").unwrap();

    let err = store.save("lost", &[t("b")]).unwrap_err();
    assert!(matches!(err, Error::Persistence { .. }));
    assert_eq!(store.list_names(), ["keep"]);
    assert!(store.delete("keep").is_err());
    assert_eq!(store.list_names(), ["keep"]);
    assert!(store.record_search("lofi").is_err());
    assert!(store.recent_searches(10).is_empty());
}

#[test]
fn malformed_entries_are_skipped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("playlists.json"),
        r#"{
  "Mixed": [
    {"id": "a", "title": "Song a", "durationSeconds": 10, "sourceRef": "https://m/a"},
    {"title": "no id", "sourceRef": "https://m/x"},
    {"id": "b", "title": "Song b", "sourceRef": ""},
    42,
    {"id": "c", "title": "Legacy c", "duration": 212.6,
     "webpage_url": "https://m/c", "thumbnail": null}
  ],
  "NotAList": {"oops": true}
}"#,
    )
    .unwrap();

    let store = PlaylistStore::open(&storage(dir.path())).unwrap();
    assert_eq!(store.list_names(), ["Mixed"]);
    let tracks = store.load("Mixed").unwrap();
    let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["a", "c"]);
    assert_eq!(tracks[1].duration_seconds, 213);
    assert_eq!(tracks[1].source_ref, "https://m/c");
}

#[test]
fn corrupt_files_are_moved_aside_and_the_store_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let settings = storage(dir.path());
    fs::write(settings.playlists_path(), "{not json").unwrap();
    fs::write(settings.history_path(), r#"{"query": "x"}"#).unwrap();

    let mut store = PlaylistStore::open(&settings).unwrap();
    assert!(store.list_names().is_empty());
    assert!(store.recent_searches(5).is_empty());
    assert_eq!(store.quarantined().len(), 2);
    assert!(!settings.playlists_path().exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("playlists.json.corrupt")).unwrap(),
        "{not json"
    );

    store.save("Fresh", &[t("a")]).unwrap();
    let reopened = PlaylistStore::open(&settings).unwrap();
    assert_eq!(reopened.list_names(), ["Fresh"]);
    assert!(reopened.quarantined().is_empty());
}

#[test]
fn export_then_import_round_trips_named_playlists() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    store.save("Road", &[t("a"), t("b")]).unwrap();

    let file = dir.path().join("road.json");
    store.export("Road", &file).unwrap();
    let exported: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(exported["name"], "Road");
    assert_eq!(exported["tracks"].as_array().unwrap().len(), 2);

    store.delete("Road").unwrap();
    assert_eq!(store.import(&file).unwrap(), "Road");
    assert_eq!(store.load("Road").unwrap(), vec![t("a"), t("b")]);

    assert!(store.export("missing", &file).is_err());
}

#[test]
fn bare_array_import_gets_generated_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    let file = dir.path().join("bare.json");
    fs::write(&file, serde_json::to_string(&vec![t("x"), t("y")]).unwrap()).unwrap();

    let name = store.import(&file).unwrap();
    assert!(name.starts_with("Imported_"));
    assert_eq!(store.load(&name).unwrap().len(), 2);

    fs::write(&file, r#"{"name": "broken", "tracks": "nope"}"#).unwrap();
    assert!(store.import(&file).is_err());
    assert_eq!(store.list_names(), [name]);
}

#[test]
fn history_is_capped_and_promotes_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();

    for i in 0..50 {
        store.record_search(&format!("query {i}")).unwrap();
    }
    assert_eq!(store.history().len(), 50);

    store.record_search("query 50").unwrap();
    assert_eq!(store.history().len(), 50);
    let all = store.recent_searches(100);
    assert_eq!(all[0].query_text, "query 50");
    assert!(all.iter().all(|e| e.query_text != "query 0"));

    store.record_search("query 10").unwrap();
    let all = store.recent_searches(100);
    assert_eq!(all.len(), 50);
    assert_eq!(all[0].query_text, "query 10");
    assert_eq!(all.iter().filter(|e| e.query_text == "query 10").count(), 1);

    let reopened = PlaylistStore::open(&storage(dir.path())).unwrap();
    let top: Vec<String> = reopened.recent_searches(2).into_iter().map(|e| e.query_text).collect();
    assert_eq!(top, ["query 10", "query 50"]);
}

#[test]
fn legacy_history_of_plain_strings_is_read_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("search_history.json"), r#"["old", "newer", "newest"]"#).unwrap();
    let history = SearchHistory::open(dir.path().join("search_history.json"), 2).unwrap();
    let q: Vec<String> = history.recent(10).into_iter().map(|e| e.query_text).collect();
    assert_eq!(q, ["newest", "newer"]);
}

#[test]
fn blank_queries_are_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PlaylistStore::open(&storage(dir.path())).unwrap();
    assert!(store.record_search("   ").is_err());
    assert!(store.history().is_empty());
}
