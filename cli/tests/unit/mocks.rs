//! Hand-written port mocks shared by the unit tests.
//!
//! Every mock records what it was asked so tests can assert on the calls a
//! service made, not just on its return value.

#![allow(clippy::expect_used, dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use hatchery_cli::application::ports::{
    ConfigPusher, EscalationNotifier, InstanceRepository, KnowledgeSearch, ProgressReporter,
    RemoteShell, RepairAgent, SecretsStore,
};
use hatchery_cli::domain::config::Secrets;
use hatchery_cli::domain::error::TransportError;
use hatchery_cli::domain::remediation::{
    EscalationNotice, PriorSolution, RepairReport, RepairRequest,
};
use hatchery_common::{Instance, NotifyTarget};

// ── Remote shell ──────────────────────────────────────────────────────────────

type Response = Result<String, TransportError>;

/// `RemoteShell` answering by script content.
///
/// Rules are tried in insertion order; the first whose needle occurs in the
/// script answers. Each rule holds a queue of responses, and its last
/// response repeats once the queue is down to one.
#[derive(Default)]
pub struct ScriptedShell {
    rules: Mutex<Vec<(String, VecDeque<Response>)>>,
    scripts: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer scripts containing `needle` with `stdout`.
    pub fn on(self, needle: &str, stdout: &str) -> Self {
        self.push_rule(needle, Ok(stdout.to_string()));
        self
    }

    /// Fail scripts containing `needle` at the transport level.
    pub fn on_err(self, needle: &str, err: TransportError) -> Self {
        self.push_rule(needle, Err(err));
        self
    }

    fn push_rule(&self, needle: &str, response: Response) {
        let mut rules = self.rules.lock().expect("lock");
        if let Some((_, queue)) = rules.iter_mut().find(|(n, _)| n == needle) {
            queue.push_back(response);
        } else {
            rules.push((needle.to_string(), VecDeque::from([response])));
        }
    }

    /// Every script run so far, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().expect("lock").clone()
    }

    /// Number of scripts run that contain `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.scripts().iter().filter(|s| s.contains(needle)).count()
    }
}

impl RemoteShell for ScriptedShell {
    async fn run_script(&self, instance: &Instance, script: &str) -> Result<String, TransportError> {
        self.scripts.lock().expect("lock").push(script.to_string());
        let mut rules = self.rules.lock().expect("lock");
        let Some((_, queue)) = rules.iter_mut().find(|(n, _)| script.contains(n.as_str())) else {
            return Err(TransportError::Unreachable {
                instance: instance.name.clone(),
                reason: "no scripted response".to_string(),
            });
        };
        if queue.len() > 1 {
            queue.pop_front().expect("non-empty")
        } else {
            queue.front().cloned().expect("non-empty")
        }
    }
}

/// Shell that must never be used.
pub struct NoShell;

impl RemoteShell for NoShell {
    async fn run_script(&self, instance: &Instance, _: &str) -> Result<String, TransportError> {
        panic!("no remote session expected for {}", instance.name)
    }
}

// ── Instance store ────────────────────────────────────────────────────────────

/// In-memory `InstanceRepository` that counts writes.
#[derive(Default)]
pub struct MemoryRepo {
    records: Mutex<BTreeMap<String, Instance>>,
    puts: Mutex<usize>,
}

impl MemoryRepo {
    pub fn with(instances: impl IntoIterator<Item = Instance>) -> Self {
        let repo = Self::default();
        {
            let mut records = repo.records.lock().expect("lock");
            for instance in instances {
                records.insert(instance.name.clone(), instance);
            }
        }
        repo
    }

    pub fn stored(&self, name: &str) -> Instance {
        self.records
            .lock()
            .expect("lock")
            .get(name)
            .cloned()
            .expect("instance stored")
    }

    pub fn put_count(&self) -> usize {
        *self.puts.lock().expect("lock")
    }
}

impl InstanceRepository for MemoryRepo {
    async fn get(&self, name: &str) -> Result<Option<Instance>> {
        Ok(self.records.lock().expect("lock").get(name).cloned())
    }

    async fn put(&self, instance: &Instance) -> Result<()> {
        *self.puts.lock().expect("lock") += 1;
        self.records
            .lock()
            .expect("lock")
            .insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        Ok(self.records.lock().expect("lock").values().cloned().collect())
    }
}

// ── Secrets ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySecrets {
    docs: Mutex<BTreeMap<String, Secrets>>,
}

impl MemorySecrets {
    pub fn with(name: &str, pairs: &[(&str, &str)]) -> Self {
        let store = Self::default();
        store.docs.lock().expect("lock").insert(
            name.to_string(),
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        store
    }

    pub fn doc(&self, name: &str) -> Secrets {
        self.docs
            .lock()
            .expect("lock")
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl SecretsStore for MemorySecrets {
    async fn load(&self, name: &str) -> Result<Secrets> {
        Ok(self.doc(name))
    }

    async fn save(&self, name: &str, secrets: &Secrets) -> Result<()> {
        self.docs
            .lock()
            .expect("lock")
            .insert(name.to_string(), secrets.clone());
        Ok(())
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

/// `ConfigPusher` that records pushes and returns fixed keys.
#[derive(Default)]
pub struct RecordingPusher {
    pub pushes: Mutex<Vec<String>>,
    pub fail: bool,
}

impl ConfigPusher for RecordingPusher {
    async fn push(&self, instance: &Instance) -> Result<Vec<String>> {
        self.pushes.lock().expect("lock").push(instance.name.clone());
        if self.fail {
            anyhow::bail!("no secrets stored for {}", instance.name);
        }
        Ok(vec!["anthropic.apiKey".to_string(), "gateway.token".to_string()])
    }
}

impl RecordingPusher {
    pub fn count(&self) -> usize {
        self.pushes.lock().expect("lock").len()
    }
}

#[derive(Default)]
pub struct RecordingKnowledge {
    pub queries: Mutex<Vec<String>>,
    pub fail: bool,
}

impl KnowledgeSearch for RecordingKnowledge {
    async fn search(&self, query: &str) -> Result<Vec<PriorSolution>> {
        self.queries.lock().expect("lock").push(query.to_string());
        if self.fail {
            anyhow::bail!("knowledge service returned HTTP 503");
        }
        Ok(vec![PriorSolution {
            title: "Gateway crash loop".to_string(),
            solution: "systemctl restart agent-gateway".to_string(),
            score: 0.82,
        }])
    }
}

impl RecordingKnowledge {
    pub fn count(&self) -> usize {
        self.queries.lock().expect("lock").len()
    }
}

/// `RepairAgent` returning a canned report, or failing when `report` is
/// `None`.
#[derive(Default)]
pub struct RecordingAgent {
    pub requests: Mutex<Vec<RepairRequest>>,
    pub report: Option<RepairReport>,
}

impl RecordingAgent {
    pub fn returning(report: RepairReport) -> Self {
        Self {
            requests: Mutex::default(),
            report: Some(report),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

impl RepairAgent for RecordingAgent {
    async fn repair(&self, _: &Instance, request: &RepairRequest) -> Result<RepairReport> {
        self.requests.lock().expect("lock").push(request.clone());
        match &self.report {
            Some(report) => Ok(report.clone()),
            None => anyhow::bail!("claude CLI exited 1"),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<EscalationNotice>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.notices.lock().expect("lock").len()
    }
}

impl EscalationNotifier for RecordingNotifier {
    async fn notify(&self, _: &NotifyTarget, notice: &EscalationNotice) -> Result<()> {
        self.notices.lock().expect("lock").push(notice.clone());
        if self.fail {
            anyhow::bail!("no bot token configured");
        }
        Ok(())
    }
}

// ── Progress ──────────────────────────────────────────────────────────────────

pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn step(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warn(&self, _: &str) {}
}
