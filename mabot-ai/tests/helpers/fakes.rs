//! Scripted collaborator fakes
//!
//! Every fake answers from a per-file queue of scripted results and falls back
//! to a success default once the queue is empty. Calls are recorded per file id
//! so tests can assert exactly which remote calls happened.

use mabot_ai::db::ledger::SqliteLedger;
use mabot_ai::error::{LedgerError, RemoteError};
use mabot_ai::models::{
    AiAnalysis, AnalysisRecord, CandidateFile, ContentRef, FileContext, LedgerEntry, QuarantinedFile,
};
use mabot_ai::types::{
    Analyzer, Collaborators, ContentStore, Destination, Discovery, Ledger, SpreadsheetSink, Transcriber,
    WarehouseSink,
};
use mabot_ai::{RetryPolicy, RunCoordinator};
use mabot_common::AppConfig;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const VALID_ANALYSIS: &str = r#"{
    "Opening Pitch Score": 8,
    "Product Pitch Score": 7,
    "Cross-Sell / Opportunity Handling": 6,
    "Closing Effectiveness": 5,
    "Negotiation Strength": 4,
    "Deal Status": "Follow-up",
    "Overall Sentiment": "Positive"
}"#;

/// Install a test subscriber once (output only shown for failing tests)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mabot_ai=debug")
        .with_test_writer()
        .try_init();
}

/// Retry policy with millisecond delays
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        jitter: Duration::ZERO,
    }
}

pub fn candidate(id: &str) -> CandidateFile {
    let mut file = CandidateFile::new(
        id,
        FileContext {
            city: "Pune".to_string(),
            member: "Asha".to_string(),
            file_name: format!("Green Acres {} 12-03-2025.m4a", id),
        },
        ContentRef(id.to_string()),
    );
    file.mime_type = Some("audio/mp4".to_string());
    file
}

pub fn analysis() -> AiAnalysis {
    AiAnalysis::from_model_text(VALID_ANALYSIS).unwrap()
}

/// Per-key queue of scripted results plus a call log
pub struct Script<T> {
    queued: Mutex<HashMap<String, VecDeque<Result<T, RemoteError>>>>,
    calls: Mutex<Vec<String>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Script<T> {
    pub fn push(&self, key: &str, result: Result<T, RemoteError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queue the same error `times` times
    pub fn fail(&self, key: &str, err: RemoteError, times: usize) {
        for _ in 0..times {
            self.push(key, Err(err.clone()));
        }
    }

    fn next(&self, key: &str, default: impl FnOnce() -> Result<T, RemoteError>) -> Result<T, RemoteError> {
        self.calls.lock().unwrap().push(key.to_string());
        let scripted = self
            .queued
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or_else(default)
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

/// Files currently sitting in the inbox, shared by discovery and the store
pub type Inbox = Arc<Mutex<Vec<CandidateFile>>>;

pub struct FakeDiscovery {
    inbox: Inbox,
    pub calls: Script<()>,
}

impl FakeDiscovery {
    pub fn new(inbox: Inbox) -> Self {
        Self {
            inbox,
            calls: Script::default(),
        }
    }

    /// Put a file (back) in the inbox
    pub fn offer(&self, file: CandidateFile) {
        self.inbox.lock().unwrap().push(file);
    }
}

#[async_trait::async_trait]
impl Discovery for FakeDiscovery {
    async fn list_candidate_files(&self) -> Result<Vec<CandidateFile>, RemoteError> {
        self.calls.next("discovery", || Ok(()))?;
        Ok(self.inbox.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    pub file_id: String,
    pub destination: Destination,
    pub note: Option<String>,
}

/// A successful move takes the file out of the inbox
#[derive(Default)]
pub struct FakeStore {
    pub downloads: Script<Vec<u8>>,
    pub moves_script: Script<()>,
    inbox: Inbox,
    moves: Mutex<Vec<MoveRecord>>,
    quarantined: Mutex<Vec<QuarantinedFile>>,
    restored: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new(inbox: Inbox) -> Self {
        Self {
            inbox,
            ..Default::default()
        }
    }

    pub fn moves(&self) -> Vec<MoveRecord> {
        self.moves.lock().unwrap().clone()
    }

    pub fn add_quarantined(&self, file: QuarantinedFile) {
        self.quarantined.lock().unwrap().push(file);
    }

    pub fn restored(&self) -> Vec<String> {
        self.restored.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContentStore for FakeStore {
    async fn download(&self, content_ref: &ContentRef) -> Result<Vec<u8>, RemoteError> {
        let key = content_ref.0.clone();
        self.downloads
            .next(&key, || Ok(format!("audio:{}", key).into_bytes()))
    }

    async fn move_file(
        &self,
        file: &CandidateFile,
        destination: Destination,
        note: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.moves_script.next(&file.id, || Ok(()))?;
        self.inbox.lock().unwrap().retain(|f| f.id != file.id);
        self.moves.lock().unwrap().push(MoveRecord {
            file_id: file.id.clone(),
            destination,
            note: note.map(str::to_string),
        });
        Ok(())
    }

    async fn list_quarantined(&self) -> Result<Vec<QuarantinedFile>, RemoteError> {
        Ok(self.quarantined.lock().unwrap().clone())
    }

    async fn restore(&self, file: &QuarantinedFile) -> Result<(), RemoteError> {
        self.quarantined.lock().unwrap().retain(|q| q.id != file.id);
        self.restored.lock().unwrap().push(file.id.clone());
        Ok(())
    }
}

/// Answers with a transcript that carries the file id and some PII
#[derive(Default)]
pub struct FakeTranscriber {
    pub script: Script<String>,
}

#[async_trait::async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, bytes: &[u8], _mime_type: &str) -> Result<String, RemoteError> {
        let raw = String::from_utf8_lossy(bytes).into_owned();
        let key = raw.strip_prefix("audio:").unwrap_or(&raw).to_string();
        self.script.next(&key, || {
            Ok(format!(
                "id={} We covered tally and inventory. Call me on 98765 43210 or mail asha@example.com",
                key
            ))
        })
    }
}

#[derive(Default)]
pub struct FakeAnalyzer {
    pub script: Script<AiAnalysis>,
    transcripts: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn transcripts(&self) -> Vec<String> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, transcript: &str) -> Result<AiAnalysis, RemoteError> {
        self.transcripts.lock().unwrap().push(transcript.to_string());
        let key = transcript
            .split_whitespace()
            .find_map(|w| w.strip_prefix("id="))
            .unwrap_or("")
            .to_string();
        self.script.next(&key, || Ok(analysis()))
    }
}

/// Spreadsheet or warehouse sink
#[derive(Default)]
pub struct FakeSink {
    pub script: Script<()>,
    rows: Mutex<Vec<AnalysisRecord>>,
}

impl FakeSink {
    pub fn rows(&self) -> Vec<AnalysisRecord> {
        self.rows.lock().unwrap().clone()
    }

    fn write(&self, record: &AnalysisRecord) -> Result<(), RemoteError> {
        self.script.next(&record.file_id, || Ok(()))?;
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SpreadsheetSink for FakeSink {
    async fn write_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError> {
        self.write(record)
    }
}

#[async_trait::async_trait]
impl WarehouseSink for FakeSink {
    async fn insert_row(&self, record: &AnalysisRecord) -> Result<(), RemoteError> {
        self.write(record)
    }
}

/// Ledger whose writes never get acknowledged
pub struct FailingLedger;

#[async_trait::async_trait]
impl Ledger for FailingLedger {
    async fn is_processed(&self, _file_id: &str) -> Result<bool, LedgerError> {
        Ok(false)
    }

    async fn processed_ids(&self) -> Result<HashSet<String>, LedgerError> {
        Ok(HashSet::new())
    }

    async fn record(&self, _entry: &LedgerEntry) -> Result<(), LedgerError> {
        Err(LedgerError::Store("disk I/O error".to_string()))
    }

    async fn entry(&self, _file_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(None)
    }
}

/// Fakes for every remote collaborator plus a real SQLite ledger
pub struct Harness {
    pub discovery: Arc<FakeDiscovery>,
    pub store: Arc<FakeStore>,
    pub transcriber: Arc<FakeTranscriber>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub spreadsheet: Arc<FakeSink>,
    pub warehouse: Arc<FakeSink>,
    pub ledger: Arc<SqliteLedger>,
    pub pool: SqlitePool,
    _dir: TempDir,
}

impl Harness {
    pub async fn new(files: Vec<CandidateFile>) -> Self {
        let (dir, pool) = super::create_test_db().await.unwrap();
        let inbox: Inbox = Arc::new(Mutex::new(files));
        Self {
            discovery: Arc::new(FakeDiscovery::new(inbox.clone())),
            store: Arc::new(FakeStore::new(inbox)),
            transcriber: Arc::new(FakeTranscriber::default()),
            analyzer: Arc::new(FakeAnalyzer::default()),
            spreadsheet: Arc::new(FakeSink::default()),
            warehouse: Arc::new(FakeSink::default()),
            ledger: Arc::new(SqliteLedger::new(pool.clone())),
            pool,
            _dir: dir,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            discovery: self.discovery.clone(),
            store: self.store.clone(),
            transcriber: self.transcriber.clone(),
            analyzer: self.analyzer.clone(),
            spreadsheet: self.spreadsheet.clone(),
            warehouse: self.warehouse.clone(),
            ledger: self.ledger.clone(),
        }
    }

    /// Coordinator over these fakes with a 3-attempt millisecond retry policy
    pub fn coordinator(&self, config: AppConfig) -> RunCoordinator {
        RunCoordinator::new(Arc::new(config), self.collaborators()).with_retry_policy(fast_retry(3))
    }

    /// Per-file pipeline calls made so far (download, transcribe, analyze, both sinks)
    pub fn remote_calls_for(&self, file_id: &str) -> usize {
        self.store.downloads.calls_for(file_id)
            + self.transcriber.script.calls_for(file_id)
            + self.analyzer.script.calls_for(file_id)
            + self.spreadsheet.script.calls_for(file_id)
            + self.warehouse.script.calls_for(file_id)
    }
}
