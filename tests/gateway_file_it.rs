// std
use std::{env, fs, path::PathBuf, process, time::Duration as StdDuration};
// crates.io
use time::{OffsetDateTime, macros};
// self
use provenance_gateway::{
	config::{ENV_KEY, ENV_STORAGE_BACKEND, ENV_STORAGE_PATH, GatewayConfig},
	error::Error,
	gateway::{DetectionRequest, Gateway, GenerationRequest},
	store::StoreError,
	watermark::{ProvenanceRecord, TokenId},
};

fn temp_path(label: &str) -> PathBuf {
	let unique = format!(
		"provenance_gateway_it_{label}_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique).join("journal.jsonl")
}

fn file_config(path: &PathBuf) -> GatewayConfig {
	let path = path.display().to_string();
	let vars = [(ENV_KEY, "k1"), (ENV_STORAGE_BACKEND, "file"), (ENV_STORAGE_PATH, path.as_str())];

	GatewayConfig::from_lookup(|name| {
		vars.iter().find(|(key, _)| *key == name).map(|(_, value)| value.to_string())
	})
	.expect("File-backed configuration should load.")
}

fn whitespace_ids(text: &str) -> Vec<TokenId> {
	text.split_whitespace().filter_map(|word| word.parse().ok()).collect()
}

#[tokio::test]
async fn journal_survives_restart() -> color_eyre::Result<()> {
	let path = temp_path("restart");
	let gateway = Gateway::new(file_config(&path))?;
	let issued = gateway
		.issue_at(
			GenerationRequest::new("alice", "hello"),
			macros::datetime!(1970-01-01 00:16:40 UTC),
		)
		.await?;

	assert_eq!(issued.signature.encode(), "SpCFYzwdY1nRY4Ng4MZ5FXFcI1Dhwo1OQGHweNT5H-4");
	assert_eq!(issued.location.as_str(), format!("file://{}#1", path.display()));

	drop(gateway);

	let journal = fs::read_to_string(&path)?;
	let stored: ProvenanceRecord = serde_json::from_str(journal.trim_end())?;

	assert_eq!(stored, issued.record);
	assert!(journal.contains("\"algoVersion\":\"HMAC-SHA256-v1\""));

	let restarted = Gateway::new(file_config(&path))?;
	let report = restarted
		.detect(DetectionRequest::new("1 2 3", issued.signature.encode()), &whitespace_ids)
		.await?;

	assert!(report.record_found);
	assert_eq!(report.record, Some(issued.record));
	assert_eq!(report.signed_by.map(String::from).as_deref(), Some("primary"));

	if let Some(dir) = path.parent() {
		fs::remove_dir_all(dir)?;
	}

	Ok(())
}

#[tokio::test]
async fn replayed_requests_conflict_instead_of_overwriting() -> color_eyre::Result<()> {
	let path = temp_path("replay");
	let gateway = Gateway::new(file_config(&path))?;
	let now = macros::datetime!(2026-10-17 09:30 UTC);

	gateway.issue_at(GenerationRequest::new("alice", "hello"), now).await?;

	let err = gateway
		.issue_at(GenerationRequest::new("alice", "hello\r\n"), now)
		.await
		.expect_err("An identical signature must not be recorded twice.");

	assert!(err.to_string().contains("already exists"), "Unexpected error: {err}.");
	assert_eq!(fs::read_to_string(&path)?.lines().count(), 1);

	if let Some(dir) = path.parent() {
		fs::remove_dir_all(dir)?;
	}

	Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn stalled_journals_fail_within_the_store_deadline() -> color_eyre::Result<()> {
	// std
	use std::process::Command;

	let path = temp_path("stalled");
	let gateway = Gateway::new(file_config(&path))?;

	// A FIFO without a reader blocks the journal open indefinitely.
	assert!(Command::new("mkfifo").arg(&path).status()?.success());

	let outcome = tokio::time::timeout(
		StdDuration::from_secs(3),
		gateway.issue(GenerationRequest::new("alice", "hello")),
	)
	.await
	.expect("The store deadline should end the request well before three seconds.");

	assert!(
		matches!(outcome, Err(Error::Storage(StoreError::Timeout { timeout_ms: 250, .. }))),
		"Unexpected outcome: {outcome:?}."
	);

	let report = gateway
		.detect(
			DetectionRequest::new("1 2 3", "SpCFYzwdY1nRY4Ng4MZ5FXFcI1Dhwo1OQGHweNT5H-4"),
			&whitespace_ids,
		)
		.await?;

	assert!(!report.record_found);

	// The read end releases the stalled writer so the runtime can shut down.
	drop(fs::File::open(&path)?);

	if let Some(dir) = path.parent() {
		fs::remove_dir_all(dir)?;
	}

	Ok(())
}
