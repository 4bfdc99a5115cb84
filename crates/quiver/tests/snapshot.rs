//! Snapshot persistence and startup rebuild.

use quiver::{ChunkDraft, Database, ErrorKind, IndexConfig, Metadata};

#[test]
fn test_snapshot_roundtrip_rebuilds_indexes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");

    let library_id;
    let document_id;
    {
        let db = Database::open(&path).expect("open fresh");
        let library = db
            .libraries()
            .create("persisted", 3, IndexConfig::lsh_default(), Metadata::new())
            .expect("create library");
        library_id = library.id;

        let (document, _) = db
            .documents()
            .create_with_chunks(
                library_id,
                Metadata::new(),
                vec![
                    ChunkDraft::new(0, "alpha", vec![1.0, 0.0, 0.0]),
                    ChunkDraft::new(1, "beta", vec![0.0, 1.0, 0.0]),
                ],
            )
            .expect("create document");
        document_id = document.id;

        db.save().expect("save");
    }

    let db = Database::open(&path).expect("reopen");

    let library = db.libraries().get(library_id).expect("library survived");
    assert_eq!(library.name, "persisted");
    assert_eq!(library.index_config, IndexConfig::lsh_default());

    let document = db.documents().get(document_id).expect("document survived");
    assert_eq!(document.library_id, library_id);

    // Indexes are rebuilt from chunks, not persisted: search works at once.
    let hits = db
        .search()
        .search(library_id, &[1.0, 0.0, 0.0], 1, None)
        .expect("search after reload");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "alpha");
}

#[test]
fn test_reloaded_database_resumes_id_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");

    let old_chunk_id;
    {
        let db = Database::open(&path).expect("open fresh");
        let library = db
            .libraries()
            .create("ids", 2, IndexConfig::Flat, Metadata::new())
            .expect("create library");
        old_chunk_id = db
            .chunks()
            .create(library.id, None, ChunkDraft::new(0, "old", vec![1.0, 0.0]))
            .expect("create chunk")
            .id;
        db.save().expect("save");
    }

    let db = Database::open(&path).expect("reopen");
    let library = db.libraries().list().expect("list")[0].clone();
    let new_chunk = db
        .chunks()
        .create(library.id, None, ChunkDraft::new(1, "new", vec![0.0, 1.0]))
        .expect("create chunk");

    assert!(new_chunk.id.as_u64() > old_chunk_id.as_u64());
}

#[test]
fn test_mutations_after_reload_keep_working() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");

    {
        let db = Database::open(&path).expect("open fresh");
        let library = db
            .libraries()
            .create("alive", 2, IndexConfig::ivf_default(), Metadata::new())
            .expect("create library");
        db.chunks()
            .create(library.id, None, ChunkDraft::new(0, "seed", vec![1.0, 0.0]))
            .expect("create chunk");
        db.save().expect("save");
    }

    let db = Database::open(&path).expect("reopen");
    let library = db.libraries().list().expect("list")[0].clone();

    // Version history survives the reload: the library is still at v1.
    let updated = db
        .libraries()
        .update_config(library.id, IndexConfig::Flat, library.version)
        .expect("swap config after reload");
    assert_eq!(updated.version, library.version + 1);

    let chunk = db
        .chunks()
        .create(library.id, None, ChunkDraft::new(1, "fresh", vec![0.0, 1.0]))
        .expect("create chunk");
    let hits = db
        .search()
        .search(library.id, &[0.0, 1.0], 1, None)
        .expect("search");
    assert_eq!(hits[0].chunk_id, chunk.id);
}

#[test]
fn test_corrupt_snapshot_fails_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(&path, b"{ not json").expect("write garbage");

    let err = Database::open(&path).expect_err("corrupt snapshot");
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn test_missing_snapshot_opens_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::open(dir.path().join("absent.json")).expect("open");
    assert!(db.libraries().list().expect("list").is_empty());
}
