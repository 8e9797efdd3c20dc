use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use db_blobstore::{BlobExtractor, BlobStore, Compression, migrations};

const TABLE: &str = "shared_files";
const WRITERS: usize = 8;

fn open_pool(dir: &tempfile::TempDir) -> Pool<SqliteConnectionManager> {
    let manager = SqliteConnectionManager::file(dir.path().join("store.db"))
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(30)));
    let pool = Pool::builder()
        .max_size(WRITERS as u32)
        .build(manager)
        .expect("build pool");
    let conn = pool.get().expect("get connection");
    migrations::create_table(&conn, TABLE).expect("create table");
    pool
}

fn pooled_store(
    pool: &Pool<SqliteConnectionManager>,
) -> BlobStore<r2d2::PooledConnection<SqliteConnectionManager>> {
    BlobStore::builder()
        .connection(pool.get().expect("get connection"))
        .table_name(TABLE)
        .compression(Compression::Fast)
        .blob_extractor(BlobExtractor::MemoryBuffered)
        .build()
        .expect("build store")
}

#[test]
fn racing_writers_on_one_path_have_a_single_winner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let pool = &pool;
                scope.spawn(move || {
                    let store = pooled_store(pool);
                    store
                        .write_bytes("/race/winner.txt", format!("writer {i}"))
                        .map(|()| i)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("writer thread"))
            .collect()
    });

    let winners: Vec<usize> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1, "{results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), "already_exists");
    }

    let store = pooled_store(&pool);
    let content = store
        .get("/race/winner.txt")
        .expect("get")
        .read_to_vec()
        .expect("read");
    assert_eq!(content, format!("writer {}", winners[0]).into_bytes());
}

#[test]
fn writers_on_distinct_paths_all_succeed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    std::thread::scope(|scope| {
        for i in 0..WRITERS {
            let pool = &pool;
            scope.spawn(move || {
                let store = pooled_store(pool);
                store
                    .write_bytes(&format!("/parallel/{i}.txt"), vec![b'x'; 1024 * (i + 1)])
                    .expect("write");
            });
        }
    });

    let store = pooled_store(&pool);
    let files = store.list("/parallel", false).expect("list");
    assert_eq!(files.len(), WRITERS);
    for file in files {
        let handle = store.handle(file);
        let len = handle.content_length().expect("length");
        assert_eq!(handle.read_to_vec().expect("read").len() as u64, len);
    }
}
