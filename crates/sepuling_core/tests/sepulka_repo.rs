use rusqlite::Connection;
use sepuling_core::{
    DieselSepulkaRepository, RepoError, RepoResult, Sepulka, SepulkaRepository,
    SepulkaValidationError, SqliteSepulkaRepository, Touch,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;
use uuid::Uuid;

type Opener = fn(&Path) -> Box<dyn SepulkaRepository>;

fn open_sql(path: &Path) -> Box<dyn SepulkaRepository> {
    Box::new(SqliteSepulkaRepository::open(path).unwrap())
}

fn open_orm(path: &Path) -> Box<dyn SepulkaRepository> {
    Box::new(DieselSepulkaRepository::open(path.to_str().unwrap()).unwrap())
}

struct Fixture {
    _dir: TempDir,
    path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sepulkas.db");
        Self { _dir: dir, path }
    }

    /// Reads the full stored row, bypassing the projections under test.
    fn stored(&self, sepulka: &Sepulka) -> Option<Sepulka> {
        let conn = Connection::open(&self.path).unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT external_id, revision, created_at, updated_at
                 FROM sepulkas
                 WHERE internal_id = ?1;",
            )
            .unwrap();
        let mut rows = stmt.query([sepulka.internal_id.to_string()]).unwrap();
        let row = rows.next().unwrap()?;
        Some(
            Sepulka::new(
                sepulka.internal_id,
                row.get::<_, String>(0).unwrap(),
                row.get(1).unwrap(),
                row.get(2).unwrap(),
                row.get(3).unwrap(),
            )
            .unwrap(),
        )
    }

    fn row_count(&self) -> i64 {
        let conn = Connection::open(&self.path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM sepulkas;", [], |row| row.get(0))
            .unwrap()
    }
}

fn sample(external_id: &str, now: i64) -> Sepulka {
    Sepulka::new(Uuid::new_v4(), external_id, 0, now, now).unwrap()
}

fn add_returns_record_unchanged(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = sample("e-add", 1_000);

    let saved = repo.add(&sepulka).unwrap();

    assert_eq!(saved, sepulka);
    assert_eq!(fixture.stored(&sepulka), Some(sepulka));
}

fn find_by_external_id_resolves_internal_id(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo.add(&sample("e-exists", 1_000)).unwrap();

    let existence = repo.find_by_external_id("e-exists").unwrap().unwrap();

    assert_eq!(existence.internal_id, sepulka.internal_id);
    assert_eq!(existence.external_id, "e-exists");
}

fn find_by_internal_id_returns_preview(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo.add(&sample("e-preview", 1_234)).unwrap();

    let preview = repo.find_by_internal_id(sepulka.internal_id).unwrap().unwrap();

    assert_eq!(preview.internal_id, sepulka.internal_id);
    assert_eq!(preview.external_id, "e-preview");
    assert_eq!(preview.created_at, 1_234);
}

fn finders_report_miss_as_none(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    repo.add(&sample("e-present", 1_000)).unwrap();

    assert_eq!(repo.find_by_external_id("e-absent").unwrap(), None);
    assert_eq!(repo.find_by_internal_id(Uuid::new_v4()).unwrap(), None);
}

fn reads_are_idempotent(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo.add(&sample("e-idem", 1_000)).unwrap();

    let first_existence = repo.find_by_external_id("e-idem").unwrap();
    let second_existence = repo.find_by_external_id("e-idem").unwrap();
    let first_preview = repo.find_by_internal_id(sepulka.internal_id).unwrap();
    let second_preview = repo.find_by_internal_id(sepulka.internal_id).unwrap();

    assert_eq!(first_existence, second_existence);
    assert_eq!(first_preview, second_preview);
}

fn duplicate_external_id_is_rejected_and_original_kept(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let original = repo.add(&sample("e-dup", 1_000)).unwrap();

    let err = repo.add(&sample("e-dup", 5_000)).unwrap_err();

    assert!(
        matches!(err, RepoError::DuplicateKey { column: Some(ref column) } if column == "external_id"),
        "unexpected error: {err:?}"
    );
    assert_eq!(fixture.row_count(), 1);
    assert_eq!(fixture.stored(&original), Some(original));
}

fn duplicate_internal_id_is_rejected(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let original = repo.add(&sample("e-first", 1_000)).unwrap();
    let clash = Sepulka::new(original.internal_id, "e-second", 0, 2_000, 2_000).unwrap();

    let err = repo.add(&clash).unwrap_err();

    assert!(
        matches!(err, RepoError::DuplicateKey { column: Some(ref column) } if column == "internal_id"),
        "unexpected error: {err:?}"
    );
    assert_eq!(repo.find_by_external_id("e-second").unwrap(), None);
}

fn invalid_record_never_reaches_storage(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let mut invalid = sample("e-invalid", 1_000);
    invalid.updated_at = 999;

    let err = repo.add(&invalid).unwrap_err();

    assert!(matches!(
        err,
        RepoError::Validation(SepulkaValidationError::UpdatedBeforeCreated { .. })
    ));
    assert_eq!(fixture.row_count(), 0);
}

fn updates_advance_revision_and_updated_at(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo.add(&sample("e-mono", 1_000)).unwrap();

    for step in 0..3_i64 {
        let touch = Touch::new(step, 2_000 + step).unwrap();
        repo.update_by(sepulka.internal_id, &touch).unwrap();
    }

    let stored = fixture.stored(&sepulka).unwrap();
    assert_eq!(stored.revision, 3);
    assert_eq!(stored.updated_at, 2_002);
    assert_eq!(stored.created_at, 1_000);
}

fn stale_revision_fails_with_contention(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo.add(&sample("e1", 1_000)).unwrap();
    assert_eq!(sepulka.revision, 0);
    assert_eq!(sepulka.created_at, sepulka.updated_at);

    repo.update_by(sepulka.internal_id, &sepulka.touch(1_500))
        .unwrap();
    let stored = fixture.stored(&sepulka).unwrap();
    assert_eq!(stored.revision, 1);
    assert!(stored.updated_at > sepulka.updated_at);

    let err = repo
        .update_by(sepulka.internal_id, &sepulka.touch(1_800))
        .unwrap_err();
    assert!(
        matches!(
            err,
            RepoError::Contention { internal_id, observed_revision: 0 } if internal_id == sepulka.internal_id
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(fixture.stored(&sepulka), Some(stored));
}

fn unknown_id_fails_with_contention(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);

    let err = repo
        .update_by(Uuid::new_v4(), &Touch::new(0, 1_000).unwrap())
        .unwrap_err();

    assert!(err.is_contention());
}

fn negative_touch_revision_is_rejected(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo.add(&sample("e-neg", 1_000)).unwrap();
    let touch = Touch {
        revision: -1,
        updated_at: 2_000,
    };

    let err = repo.update_by(sepulka.internal_id, &touch).unwrap_err();

    assert!(matches!(
        err,
        RepoError::Validation(SepulkaValidationError::NegativeRevision(-1))
    ));
}

fn terminal_revision_is_never_advanced(open: Opener) {
    let fixture = Fixture::new();
    let repo = open(&fixture.path);
    let sepulka = repo
        .add(&Sepulka::new(Uuid::new_v4(), "e-max", i64::MAX, 1_000, 1_000).unwrap())
        .unwrap();

    let err = repo
        .update_by(sepulka.internal_id, &sepulka.touch(2_000))
        .unwrap_err();

    assert!(
        matches!(
            err,
            RepoError::Validation(SepulkaValidationError::RevisionExhausted)
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(fixture.stored(&sepulka), Some(sepulka));
}

fn concurrent_updates_have_exactly_one_winner(open: Opener) {
    let fixture = Fixture::new();
    let sepulka = open(&fixture.path).add(&sample("e-race", 1_000)).unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = (0..2_i64)
        .map(|worker| {
            let barrier = Arc::clone(&barrier);
            let path = fixture.path.clone();
            let internal_id = sepulka.internal_id;
            thread::spawn(move || -> RepoResult<()> {
                let repo = open(&path);
                barrier.wait();
                repo.update_by(internal_id, &Touch::new(0, 2_000 + worker).unwrap())
            })
        })
        .collect();
    let results: Vec<RepoResult<()>> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    let loser = results
        .iter()
        .find_map(|result| result.as_ref().err())
        .unwrap();
    assert!(loser.is_contention(), "unexpected error: {loser:?}");

    let repo = open(&fixture.path);
    repo.update_by(sepulka.internal_id, &Touch::new(1, 3_000).unwrap())
        .unwrap();
    let stored = fixture.stored(&sepulka).unwrap();
    assert_eq!(stored.revision, 2);
    assert_eq!(stored.updated_at, 3_000);
}

macro_rules! repository_contract {
    ($backend:ident, $open:ident, [$($case:ident),* $(,)?]) => {
        mod $backend {
            $(
                #[test]
                fn $case() {
                    super::$case(super::$open);
                }
            )*
        }
    };
}

repository_contract!(
    sql,
    open_sql,
    [
        add_returns_record_unchanged,
        find_by_external_id_resolves_internal_id,
        find_by_internal_id_returns_preview,
        finders_report_miss_as_none,
        reads_are_idempotent,
        duplicate_external_id_is_rejected_and_original_kept,
        duplicate_internal_id_is_rejected,
        invalid_record_never_reaches_storage,
        updates_advance_revision_and_updated_at,
        stale_revision_fails_with_contention,
        unknown_id_fails_with_contention,
        negative_touch_revision_is_rejected,
        terminal_revision_is_never_advanced,
        concurrent_updates_have_exactly_one_winner,
    ]
);

repository_contract!(
    orm,
    open_orm,
    [
        add_returns_record_unchanged,
        find_by_external_id_resolves_internal_id,
        find_by_internal_id_returns_preview,
        finders_report_miss_as_none,
        reads_are_idempotent,
        duplicate_external_id_is_rejected_and_original_kept,
        duplicate_internal_id_is_rejected,
        invalid_record_never_reaches_storage,
        updates_advance_revision_and_updated_at,
        stale_revision_fails_with_contention,
        unknown_id_fails_with_contention,
        negative_touch_revision_is_rejected,
        terminal_revision_is_never_advanced,
        concurrent_updates_have_exactly_one_winner,
    ]
);
