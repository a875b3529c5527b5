use super::{LockRegistry, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const EMPTY_COLLECTION: &[u8] = b"[]";

/// A collection of records persisted as one pretty-printed JSON array on disk.
///
/// Every operation (read, full rewrite, read-modify-write) holds the file's
/// lock from the [`LockRegistry`] for its whole duration, so operations on one
/// path are totally ordered no matter how many stores point at it. Writes go
/// to a temp file in the same directory which is then renamed over the target.
///
/// Once the lock is acquired the work runs to completion on the blocking pool,
/// even if the caller stops waiting; cancellation only takes effect while
/// still queued for the lock.
pub struct JsonFileStore<T> {
    path: Arc<PathBuf>,
    registry: LockRegistry,
    _records: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonFileStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            registry: self.registry.clone(),
            _records: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for JsonFileStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish()
    }
}

impl<T> JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Binds a store to `path`. Nothing is touched on disk until first use.
    pub fn open(path: impl AsRef<Path>, registry: &LockRegistry) -> Result<Self, StoreError> {
        let raw = path.as_ref();
        if raw.to_string_lossy().trim().is_empty() {
            return Err(StoreError::InvalidPath("file path is required".to_string()));
        }

        let absolute = std::path::absolute(raw).map_err(|source| StoreError::io(raw, source))?;
        let normalized = normalize(&absolute);
        if normalized.file_name().is_none() || normalized.parent().is_none() {
            return Err(StoreError::InvalidPath(format!(
                "'{}' does not name a file",
                raw.display()
            )));
        }

        Ok(Self {
            path: Arc::new(normalized),
            registry: registry.clone(),
            _records: PhantomData,
        })
    }

    /// Normalized absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the whole collection, creating an empty file if none exists.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn read_all(&self) -> Result<Vec<T>, StoreError> {
        self.with_file(|path| load(path)).await?
    }

    /// Replaces the whole collection.
    #[instrument(skip(self, items), fields(path = %self.path.display(), count = items.len()))]
    pub async fn write_all(&self, items: Vec<T>) -> Result<(), StoreError> {
        self.with_file(move |path| persist(path, &items)).await?
    }

    /// Read-modify-write under one lock acquisition. The (possibly mutated)
    /// collection is written back and `transform`'s return value handed out.
    pub async fn update<R, F>(&self, transform: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.try_update(move |items| Ok::<R, StoreError>(transform(items)))
            .await
    }

    /// Like [`update`](Self::update) for transforms that can fail. On `Err`
    /// nothing is written and the error is returned as is.
    #[instrument(skip(self, transform), fields(path = %self.path.display()))]
    pub async fn try_update<R, E, F>(&self, transform: F) -> Result<R, E>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        self.with_file(move |path: &Path| -> Result<R, E> {
            let mut items = load(path)?;
            let result = transform(&mut items)?;
            persist(path, &items)?;
            Ok(result)
        })
        .await?
    }

    /// Runs `op` on the blocking pool while holding this file's lock.
    async fn with_file<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Path) -> R + Send + 'static,
        R: Send + 'static,
    {
        let lock = self.registry.lock_for(&self.path);
        let guard = lock.lock_owned().await;

        let path = self.path.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(&path)
        });

        match task.await {
            Ok(result) => Ok(result),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(StoreError::TaskAborted(err.to_string())),
        }
    }
}

/// Resolves `.` and `..` lexically so that spellings of one path share a lock.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidPath(format!("no directory for '{}'", path.display())))?;
    fs::create_dir_all(dir).map_err(|source| StoreError::io(dir, source))
}

fn ensure_file(path: &Path) -> Result<(), StoreError> {
    ensure_parent_dir(path)?;
    let exists = path
        .try_exists()
        .map_err(|source| StoreError::io(path, source))?;
    if !exists {
        debug!(path = %path.display(), "Creating empty collection file");
        fs::write(path, EMPTY_COLLECTION).map_err(|source| StoreError::io(path, source))?;
    }
    Ok(())
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    ensure_file(path)?;
    let raw = fs::read(path).map_err(|source| StoreError::io(path, source))?;
    Ok(parse_or_empty(path, &raw))
}

fn parse_or_empty<T: DeserializeOwned>(path: &Path, raw: &[u8]) -> Vec<T> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }
    // `null` reads as an empty collection too. Invalid UTF-8 is a parse error here.
    match serde_json::from_slice::<Option<Vec<T>>>(raw) {
        Ok(items) => items.unwrap_or_default(),
        Err(err) => {
            // Contents are dropped; the next write replaces the file.
            warn!(path = %path.display(), "Unreadable collection file, treating as empty: {}", err);
            Vec::new()
        }
    }
}

fn persist<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_vec_pretty(items)?;

    let tmp = sibling_path(path, "tmp")?;
    if let Err(err) = write_synced(&tmp, &json) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    replace(&tmp, path)?;
    debug!(path = %path.display(), count = items.len(), "Collection written");
    Ok(())
}

/// `<dir>/<file name>.<random>.<ext>`, next to the target so rename stays on one volume.
fn sibling_path(path: &Path, ext: &str) -> Result<PathBuf, StoreError> {
    let name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidPath(format!("'{}' does not name a file", path.display())))?;
    let mut sibling = name.to_os_string();
    sibling.push(format!(".{}.{}", Uuid::new_v4().simple(), ext));
    Ok(path.with_file_name(sibling))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path).map_err(|source| StoreError::io(path, source))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|source| StoreError::io(path, source))
}

fn replace(tmp: &Path, target: &Path) -> Result<(), StoreError> {
    replace_with(tmp, target, |from, to| fs::rename(from, to))
}

/// Moves `tmp` over `target`. At every step one of the two files holds a
/// complete collection; the old content is only dropped once the new one is in place.
fn replace_with<M>(tmp: &Path, target: &Path, rename: M) -> Result<(), StoreError>
where
    M: Fn(&Path, &Path) -> io::Result<()>,
{
    // rename() swaps an existing target atomically, and a missing target is a plain move.
    let Err(err) = rename(tmp, target) else {
        return Ok(());
    };
    debug!(target = %target.display(), "Atomic rename failed ({}), moving old file aside", err);

    let backup = sibling_path(target, "bak")?;
    match rename(target, &backup) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            // Nothing to preserve.
            return rename(tmp, target).map_err(|source| {
                let _ = fs::remove_file(tmp);
                StoreError::io(target, source)
            });
        }
        Err(e) => {
            let _ = fs::remove_file(tmp);
            return Err(StoreError::io(target, e));
        }
    }

    match rename(tmp, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(&backup) {
                warn!(backup = %backup.display(), "Failed to remove previous collection: {}", e);
            }
            Ok(())
        }
        Err(source) => {
            match rename(&backup, target) {
                Ok(()) => {
                    let _ = fs::remove_file(tmp);
                }
                Err(e) => warn!(
                    backup = %backup.display(),
                    tmp = %tmp.display(),
                    "Could not restore collection, both copies left on disk: {}",
                    e
                ),
            }
            Err(StoreError::io(target, source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        id: i32,
        body_text: String,
    }

    fn note(id: i32, text: &str) -> Note {
        Note {
            id,
            body_text: text.to_string(),
        }
    }

    fn store_in(dir: &TempDir, name: &str) -> JsonFileStore<Note> {
        JsonFileStore::open(dir.path().join(name), &LockRegistry::new()).unwrap()
    }

    #[test]
    fn open_rejects_blank_paths() {
        let registry = LockRegistry::new();
        for path in ["", "   "] {
            let result = JsonFileStore::<Note>::open(path, &registry);
            assert!(matches!(result, Err(StoreError::InvalidPath(_))), "path {path:?}");
        }
        assert!(matches!(
            JsonFileStore::<Note>::open("/", &registry),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn open_normalizes_to_absolute_path() {
        let dir = TempDir::new().unwrap();
        let spelled = dir.path().join("a").join("..").join(".").join("notes.json");
        let store = JsonFileStore::<Note>::open(&spelled, &LockRegistry::new()).unwrap();
        assert!(store.path().is_absolute());
        assert_eq!(store.path(), dir.path().join("notes.json"));
    }

    #[tokio::test]
    async fn read_all_bootstraps_missing_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("notes.json");
        let store = JsonFileStore::<Note>::open(&path, &LockRegistry::new()).unwrap();

        assert!(store.read_all().await.unwrap().is_empty());
        assert_eq!(fs::read(&path).unwrap(), EMPTY_COLLECTION);

        // Second call sees the same empty collection.
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        fs::write(store.path(), b"{ this is not json").unwrap();

        assert!(store.read_all().await.unwrap().is_empty());

        // An update after corruption starts over from an empty collection.
        store.update(|items| items.push(note(1, "fresh"))).await.unwrap();
        assert_eq!(store.read_all().await.unwrap(), vec![note(1, "fresh")]);
    }

    #[tokio::test]
    async fn blank_and_null_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");

        fs::write(store.path(), b"   \n").unwrap();
        assert!(store.read_all().await.unwrap().is_empty());

        fs::write(store.path(), b"null").unwrap();
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn binary_garbage_reads_as_empty_and_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        fs::write(store.path(), [0xff, 0xfe, 0x00, 0x9f, 0x92]).unwrap();

        assert!(store.read_all().await.unwrap().is_empty());

        store.update(|items| items.push(note(1, "after"))).await.unwrap();
        assert_eq!(store.read_all().await.unwrap(), vec![note(1, "after")]);
    }

    /// Rename that fails on the listed call numbers (1-based) and delegates otherwise.
    fn flaky_rename(
        failing: &'static [usize],
    ) -> (impl Fn(&Path, &Path) -> io::Result<()>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let rename = move |from: &Path, to: &Path| {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if failing.contains(&call) {
                return Err(io::Error::new(ErrorKind::PermissionDenied, "rename refused"));
            }
            fs::rename(from, to)
        };
        (rename, calls)
    }

    fn leftovers(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn replace_falls_back_to_moving_old_file_aside() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("notes.json");
        let tmp = dir.path().join("notes.json.new.tmp");
        fs::write(&target, b"[\"old\"]").unwrap();
        fs::write(&tmp, b"[\"new\"]").unwrap();

        let (rename, calls) = flaky_rename(&[1]);
        replace_with(&tmp, &target, rename).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(fs::read(&target).unwrap(), b"[\"new\"]");
        assert_eq!(leftovers(&dir), vec!["notes.json".to_string()]);
    }

    #[test]
    fn failed_fallback_restores_old_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("notes.json");
        let tmp = dir.path().join("notes.json.new.tmp");
        fs::write(&target, b"[\"old\"]").unwrap();
        fs::write(&tmp, b"[\"new\"]").unwrap();

        // Both moves of tmp onto the target fail.
        let (rename, _) = flaky_rename(&[1, 3]);
        let result = replace_with(&tmp, &target, rename);

        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_eq!(fs::read(&target).unwrap(), b"[\"old\"]");
        assert_eq!(leftovers(&dir), vec!["notes.json".to_string()]);
    }

    #[test]
    fn failed_restore_keeps_both_copies() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("notes.json");
        let tmp = dir.path().join("notes.json.new.tmp");
        fs::write(&target, b"[\"old\"]").unwrap();
        fs::write(&tmp, b"[\"new\"]").unwrap();

        let (rename, _) = flaky_rename(&[1, 3, 4]);
        assert!(replace_with(&tmp, &target, rename).is_err());

        assert_eq!(fs::read(&tmp).unwrap(), b"[\"new\"]");
        let backups: Vec<String> = leftovers(&dir)
            .into_iter()
            .filter(|name| name.ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(dir.path().join(&backups[0])).unwrap(), b"[\"old\"]");
    }

    #[tokio::test]
    async fn write_all_round_trips_and_is_pretty_printed() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        let items = vec![note(2, "second"), note(1, "first")];

        store.write_all(items.clone()).await.unwrap();
        assert_eq!(store.read_all().await.unwrap(), items);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains('\n'));
        assert!(raw.contains("\"bodyText\""));

        // Writing back what was read leaves the contents as they were.
        let read = store.read_all().await.unwrap();
        store.write_all(read).await.unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), raw);
    }

    #[tokio::test]
    async fn writes_leave_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        for i in 0..5 {
            store.update(move |items| items.push(note(i, "x"))).await.unwrap();
        }

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("notes.json")]);
    }

    #[tokio::test]
    async fn update_returns_transform_result() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        store.write_all(vec![note(1, "a"), note(2, "b")]).await.unwrap();

        let removed = store
            .update(|items| {
                let before = items.len();
                items.retain(|n| n.id != 1);
                before - items.len()
            })
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.read_all().await.unwrap(), vec![note(2, "b")]);
    }

    #[tokio::test]
    async fn failed_transform_leaves_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        store.write_all(vec![note(1, "keep")]).await.unwrap();
        let before = fs::read(store.path()).unwrap();

        let result: Result<(), StoreError> = store
            .try_update(|items| {
                items.clear();
                Err(StoreError::InvalidPath("rejected".to_string()))
            })
            .await;

        assert!(matches!(result, Err(StoreError::InvalidPath(msg)) if msg == "rejected"));
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn panicking_transform_propagates_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, "notes.json");
        store.write_all(vec![note(1, "keep")]).await.unwrap();

        let panicking = store.clone();
        let outcome = tokio::spawn(async move {
            panicking
                .update(|items| -> usize {
                    items.clear();
                    panic!("transform blew up");
                })
                .await
        })
        .await;
        assert!(outcome.unwrap_err().is_panic());

        // Lock was released and the file is untouched.
        assert_eq!(store.read_all().await.unwrap(), vec![note(1, "keep")]);
    }

    #[tokio::test]
    async fn io_failures_surface_as_errors() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"i am a file").unwrap();

        let store =
            JsonFileStore::<Note>::open(blocker.join("notes.json"), &LockRegistry::new()).unwrap();
        assert!(matches!(store.read_all().await, Err(StoreError::Io { .. })));
        assert!(matches!(
            store.write_all(vec![note(1, "x")]).await,
            Err(StoreError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_before_lock_does_not_run() {
        let dir = TempDir::new().unwrap();
        let registry = LockRegistry::new();
        let store = JsonFileStore::<Note>::open(dir.path().join("notes.json"), &registry).unwrap();
        store.write_all(vec![note(1, "keep")]).await.unwrap();

        let lock = registry.lock_for(store.path());
        let held = lock.lock().await;

        let ran = Arc::new(AtomicBool::new(false));
        let waiting = {
            let store = store.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                store
                    .update(move |items| {
                        ran.store(true, Ordering::SeqCst);
                        items.clear();
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        waiting.abort();
        assert!(waiting.await.unwrap_err().is_cancelled());
        drop(held);

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(store.read_all().await.unwrap(), vec![note(1, "keep")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        const WRITERS: i32 = 32;
        let dir = TempDir::new().unwrap();
        let registry = LockRegistry::new();

        let mut handles = Vec::new();
        for i in 0..WRITERS {
            // Separate store instances, differently spelled paths, one shared registry.
            let path = if i % 2 == 0 {
                dir.path().join("notes.json")
            } else {
                dir.path().join(".").join("notes.json")
            };
            let store = JsonFileStore::<Note>::open(path, &registry).unwrap();
            handles.push(tokio::spawn(async move {
                store
                    .update(move |items| {
                        let id = items.iter().map(|n| n.id).max().unwrap_or(0) + 1;
                        items.push(note(id, &format!("writer {i}")));
                        id
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let store = store_in(&dir, "notes.json");
        let mut ids: Vec<i32> = store.read_all().await.unwrap().iter().map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=WRITERS).collect::<Vec<_>>());
        assert_eq!(registry.len(), 1);
    }
}
