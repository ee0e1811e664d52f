//! JSON Lines journal [`ProvenanceStore`] for single-node deployments.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{self, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{ProvenanceLocation, ProvenanceStore, StoreError, StoreFuture},
	watermark::{ProvenanceRecord, SignatureToken},
};

/// Appends one JSON record per line and keeps an in-memory index for lookups.
///
/// Each append writes the full line and syncs it before the index is updated, so a record is
/// either durable and visible or absent. A torn trailing line left by a crash is discarded
/// when the journal is reopened, and bytes left behind by a failed write are cut before the
/// next append.
///
/// Disk I/O runs on Tokio's blocking pool while appends are serialized by an async lock, so a
/// stalled disk only delays writers and the caller's deadline still applies. Lookups are served
/// from the index and never wait for I/O.
#[derive(Clone, Debug)]
pub struct FileProvenanceStore {
	journal: Arc<Journal>,
	writer: Arc<AsyncMutex<()>>,
}
impl FileProvenanceStore {
	/// Opens (or creates) a journal at the provided path, eagerly loading existing records.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let index = Journal::load(&path)?;

		Ok(Self {
			journal: Arc::new(Journal { path, index: RwLock::new(index) }),
			writer: Default::default(),
		})
	}

	/// Journal path.
	pub fn path(&self) -> &Path {
		&self.journal.path
	}

	/// Number of records in the journal.
	pub fn len(&self) -> usize {
		self.journal.index.read().records.len()
	}

	/// Returns true if the journal holds no records.
	pub fn is_empty(&self) -> bool {
		self.journal.index.read().records.is_empty()
	}
}
impl ProvenanceStore for FileProvenanceStore {
	fn append(&self, record: ProvenanceRecord) -> StoreFuture<'_, ProvenanceLocation> {
		Box::pin(async move {
			let mut line = serde_json::to_vec(&record).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize provenance record: {e}"),
			})?;

			line.push(b'\n');

			let writer = self.writer.lock_arc().await;
			let journal = self.journal.clone();

			// The guard moves into the blocking task so an abandoned write still excludes the
			// next one until it finishes.
			tokio::task::spawn_blocking(move || {
				let _writer = writer;

				journal.append(record, &line)
			})
			.await
			.map_err(|e| StoreError::Backend {
				message: format!("Journal writer task failed: {e}"),
			})?
		})
	}

	fn lookup<'a>(
		&'a self,
		signature: &'a SignatureToken,
	) -> StoreFuture<'a, Option<ProvenanceRecord>> {
		Box::pin(async move { Ok(self.journal.index.read().records.get(signature).cloned()) })
	}
}

#[derive(Debug, Default)]
struct JournalIndex {
	records: HashMap<SignatureToken, ProvenanceRecord>,
	lines: u64,
	// Length of the journal up to and including its last committed line.
	committed: u64,
}

#[derive(Debug)]
struct Journal {
	path: PathBuf,
	index: RwLock<JournalIndex>,
}
impl Journal {
	fn load(path: &Path) -> Result<JournalIndex, StoreError> {
		if !path.exists() {
			return Ok(JournalIndex::default());
		}

		let contents = fs::read_to_string(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let complete_len = contents.rfind('\n').map_or(0, |idx| idx + 1);

		if complete_len < contents.len() {
			truncate_torn_tail(path, complete_len)?;
		}

		let mut index = JournalIndex { committed: complete_len as u64, ..Default::default() };

		for (idx, line) in contents[..complete_len].lines().enumerate() {
			index.lines += 1;

			if line.trim().is_empty() {
				continue;
			}

			let record: ProvenanceRecord =
				serde_json::from_str(line).map_err(|e| StoreError::Serialization {
					message: format!("Failed to parse {} line {}: {e}", path.display(), idx + 1),
				})?;

			if index.records.contains_key(&record.signature) {
				return Err(StoreError::Serialization {
					message: format!(
						"Duplicate signature {} at {} line {}",
						record.signature,
						path.display(),
						idx + 1
					),
				});
			}

			index.records.insert(record.signature, record);
		}

		Ok(index)
	}

	// Callers hold the store's writer lock, so the index cannot change between the conflict
	// check and the commit below.
	fn append(
		&self,
		record: ProvenanceRecord,
		line: &[u8],
	) -> Result<ProvenanceLocation, StoreError> {
		let (committed, line_no) = {
			let index = self.index.read();

			if index.records.contains_key(&record.signature) {
				return Err(StoreError::conflict(&record.signature));
			}

			(index.committed, index.lines + 1)
		};
		let mut file =
			OpenOptions::new().create(true).append(true).open(&self.path).map_err(|e| {
				StoreError::Backend {
					message: format!("Failed to open {}: {e}", self.path.display()),
				}
			})?;

		write_line(&mut file, committed, line).map_err(|e| StoreError::Backend {
			message: format!("Failed to append to {}: {e}", self.path.display()),
		})?;

		let mut index = self.index.write();

		index.lines = line_no;
		index.committed = committed + line.len() as u64;
		index.records.insert(record.signature, record);

		Ok(ProvenanceLocation::new(format!("file://{}#{line_no}", self.path.display())))
	}
}

/// File operations needed to append a journal line and roll it back.
trait JournalFile
where
	Self: Write,
{
	fn end(&mut self) -> io::Result<u64>;

	fn cut(&mut self, len: u64) -> io::Result<()>;

	fn sync(&mut self) -> io::Result<()>;
}
impl JournalFile for File {
	fn end(&mut self) -> io::Result<u64> {
		Ok(self.metadata()?.len())
	}

	fn cut(&mut self, len: u64) -> io::Result<()> {
		self.set_len(len)
	}

	fn sync(&mut self) -> io::Result<()> {
		self.sync_data()
	}
}

/// Appends `line` after the last committed line, leaving no partial bytes on failure.
fn write_line<F>(file: &mut F, committed: u64, line: &[u8]) -> io::Result<()>
where
	F: JournalFile,
{
	// Anything past the committed length is residue of an earlier failed append.
	if file.end()? != committed {
		file.cut(committed)?;
	}

	let written = file.write_all(line).and_then(|()| file.flush()).and_then(|()| file.sync());

	if let Err(e) = written {
		// A failed cut is retried by the residue check on the next append.
		let _ = file.cut(committed);

		return Err(e);
	}

	Ok(())
}

fn truncate_torn_tail(path: &Path, complete_len: usize) -> Result<(), StoreError> {
	let file = OpenOptions::new().write(true).open(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to open {} for repair: {e}", path.display()),
	})?;

	file.set_len(complete_len as u64).map_err(|e| StoreError::Backend {
		message: format!("Failed to truncate torn tail of {}: {e}", path.display()),
	})?;
	file.sync_all().map_err(|e| StoreError::Backend {
		message: format!("Failed to sync {}: {e}", path.display()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create journal directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process, time::Duration as StdDuration};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{
		crypto::{KeyRing, SecretKey},
		id::{Identity, KeyId},
		watermark::WatermarkSigner,
	};

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"provenance_gateway_journal_{label}_{}_{}.jsonl",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_record(prompt: &str) -> ProvenanceRecord {
		let ring = KeyRing::new(
			KeyId::new("primary").expect("Key id fixture should be valid."),
			SecretKey::new("journal-key").expect("Key fixture should be non-empty."),
		);
		let identity = Identity::new("alice").expect("Identity fixture should be valid.");
		let (_, record) = WatermarkSigner::new(&ring)
			.sign(prompt, &identity, OffsetDateTime::UNIX_EPOCH + Duration::seconds(1000))
			.expect("Signing fixture should succeed.");

		record
	}

	#[test]
	fn append_and_reload_round_trip() {
		let path = temp_path("reload");
		let store = FileProvenanceStore::open(&path).expect("Failed to open journal.");
		let first = build_record("first prompt");
		let second = build_record("second prompt");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for journal test.");
		let location = rt.block_on(store.append(first.clone())).expect("First append failed.");

		assert_eq!(location.as_str(), format!("file://{}#1", path.display()));

		rt.block_on(store.append(second.clone())).expect("Second append failed.");
		drop(store);

		let reopened = FileProvenanceStore::open(&path).expect("Failed to reopen journal.");
		let fetched = rt
			.block_on(reopened.lookup(&second.signature))
			.expect("Lookup should succeed.")
			.expect("Journal lost record after reopen.");

		assert_eq!(fetched, second);
		assert_eq!(reopened.len(), 2);

		let third = rt
			.block_on(reopened.append(build_record("third prompt")))
			.expect("Append after reopen failed.");

		assert!(third.as_str().ends_with("#3"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary journal {}: {e}", path.display())
		});
	}

	#[test]
	fn duplicate_signatures_conflict() {
		let path = temp_path("conflict");
		let store = FileProvenanceStore::open(&path).expect("Failed to open journal.");
		let record = build_record("prompt");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for journal test.");

		rt.block_on(store.append(record.clone())).expect("First append failed.");

		let err = rt
			.block_on(store.append(record))
			.expect_err("Second append with the same signature must fail.");

		assert!(matches!(err, StoreError::Conflict { .. }));
		assert_eq!(
			fs::read_to_string(&path).expect("Journal should be readable.").lines().count(),
			1
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary journal {}: {e}", path.display())
		});
	}

	#[test]
	fn torn_tail_is_discarded_on_open() {
		let path = temp_path("torn");
		let record = build_record("intact");
		let mut contents =
			serde_json::to_string(&record).expect("Record fixture should serialize.");

		contents.push('\n');
		contents.push_str("{\"promptHash\":\"2cf2");
		fs::write(&path, &contents).expect("Failed to seed torn journal.");

		let store = FileProvenanceStore::open(&path).expect("Torn tail should be tolerated.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for journal test.");

		assert_eq!(store.len(), 1);

		rt.block_on(store.append(build_record("after repair"))).expect("Append failed.");

		let reopened = FileProvenanceStore::open(&path).expect("Repaired journal should load.");

		assert_eq!(reopened.len(), 2);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary journal {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_interior_lines_are_rejected() {
		let path = temp_path("corrupt");

		fs::write(&path, "not json\n").expect("Failed to seed corrupt journal.");

		assert!(matches!(
			FileProvenanceStore::open(&path),
			Err(StoreError::Serialization { message }) if message.contains("line 1")
		));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary journal {}: {e}", path.display())
		});
	}

	/// In-memory journal whose writes fail once `accept` bytes have been taken.
	struct FlakyFile {
		contents: Vec<u8>,
		accept: usize,
	}
	impl Write for FlakyFile {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			if self.accept == 0 {
				return Err(io::Error::other("no space left on device"));
			}

			let taken = buf.len().min(self.accept);

			self.contents.extend_from_slice(&buf[..taken]);
			self.accept -= taken;

			Ok(taken)
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}
	impl JournalFile for FlakyFile {
		fn end(&mut self) -> io::Result<u64> {
			Ok(self.contents.len() as u64)
		}

		fn cut(&mut self, len: u64) -> io::Result<()> {
			self.contents.truncate(len as usize);

			Ok(())
		}

		fn sync(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	#[test]
	fn failed_writes_leave_no_partial_line() {
		let mut file = FlakyFile { contents: b"{\"a\":1}\n".to_vec(), accept: 4 };
		let committed = file.contents.len() as u64;

		assert!(write_line(&mut file, committed, b"{\"b\":2}\n").is_err());
		assert_eq!(file.contents, b"{\"a\":1}\n");

		file.accept = usize::MAX;

		write_line(&mut file, committed, b"{\"b\":2}\n").expect("Retry should append cleanly.");

		assert_eq!(file.contents, b"{\"a\":1}\n{\"b\":2}\n");
	}

	#[test]
	fn residue_from_failed_writes_is_cut_before_appending() {
		let path = temp_path("residue");
		let store = FileProvenanceStore::open(&path).expect("Failed to open journal.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for journal test.");

		rt.block_on(store.append(build_record("first"))).expect("First append failed.");

		// Partial line a failed write could not roll back.
		OpenOptions::new()
			.append(true)
			.open(&path)
			.and_then(|mut file| file.write_all(b"{\"promptHash\":\"2c"))
			.expect("Failed to seed residue.");

		let location =
			rt.block_on(store.append(build_record("second"))).expect("Second append failed.");

		assert!(location.as_str().ends_with("#2"));

		let reopened = FileProvenanceStore::open(&path).expect("Journal should stay loadable.");

		assert_eq!(reopened.len(), 2);
		assert_eq!(
			fs::read_to_string(&path).expect("Journal should be readable.").lines().count(),
			2
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary journal {}: {e}", path.display())
		});
	}

	#[cfg(unix)]
	#[test]
	fn stalled_writes_do_not_outlive_deadlines() {
		// std
		use std::{process::Command, time::Instant};

		let path = temp_path("stalled");
		let store = FileProvenanceStore::open(&path).expect("Failed to open journal.");
		let status = Command::new("mkfifo").arg(&path).status().expect("mkfifo should run.");

		assert!(status.success(), "mkfifo failed for {}.", path.display());

		// Opening a FIFO for writing blocks until a reader shows up.
		let record = build_record("stalled");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for journal test.");
		let deadline = StdDuration::from_millis(250);
		let started = Instant::now();
		let appended = rt.block_on(async { tokio::time::timeout(deadline, store.append(record.clone())).await });

		assert!(appended.is_err(), "Append on a stalled journal should hit the deadline.");
		assert!(started.elapsed() < StdDuration::from_secs(2));

		let looked_up =
			rt.block_on(async { tokio::time::timeout(deadline, store.lookup(&record.signature)).await });

		assert!(matches!(looked_up, Ok(Ok(None))), "Lookups should not wait for the writer.");

		// The read end releases the stalled writer.
		drop(File::open(&path).expect("FIFO read end should open."));
		rt.shutdown_timeout(StdDuration::from_secs(5));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary FIFO {}: {e}", path.display())
		});
	}
}
