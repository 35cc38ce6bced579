//! Access-policy probes for the founder and connection tables.
//!
//! A probe case names who acts, what they try, against whose row, and whether the
//! backend's row-level security should let it through. Observations are classified
//! from the outside:
//! 1. A permission-denied error is a denial.
//! 2. A read or write that touches zero rows is a denial (RLS hides rows instead of
//!    failing the statement).
//! 3. Any other error is also a denial, with the error kept as detail, except that an
//!    insert failing on a table constraint got past RLS and counts as allowed.
use crate::client::BackendClient;
use crate::errors::AppError;
use crate::models::{FounderProfile, NewFounderProfile};
use crate::report;
use crate::rest_client;
use crate::schema::{self, founders};
use chrono::Utc;
use serde_json::json;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::Select => "SELECT",
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        };
        write!(f, "{}", verb)
    }
}

/// Whose row a case is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The actor's own row.
    Own,
    /// Another user's row flagged visible.
    Other,
    /// Another user's row flagged not visible.
    Hidden,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Target::Own => "own row",
            Target::Other => "other user's visible row",
            Target::Hidden => "other user's hidden row",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Allowed,
    Denied,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Allowed => write!(f, "allowed"),
            Expectation::Denied => write!(f, "denied"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeCase {
    pub actor: String,
    pub operation: Operation,
    pub target: Target,
    pub expected: Expectation,
}

impl ProbeCase {
    pub fn new(
        actor: impl Into<String>,
        operation: Operation,
        target: Target,
        expected: Expectation,
    ) -> Self {
        Self {
            actor: actor.into(),
            operation,
            target,
            expected,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{} {} {} (expect {})",
            self.actor, self.operation, self.target, self.expected
        )
    }
}

/// What the backend actually did.
#[derive(Debug, Clone)]
pub struct Observation {
    pub outcome: Expectation,
    pub detail: Option<String>,
}

impl Observation {
    pub fn allowed(detail: impl Into<String>) -> Self {
        Self {
            outcome: Expectation::Allowed,
            detail: Some(detail.into()),
        }
    }

    pub fn denied(detail: impl Into<String>) -> Self {
        Self {
            outcome: Expectation::Denied,
            detail: Some(detail.into()),
        }
    }

    /// Classifies a row-returning call. Zero rows counts as denied.
    pub fn from_rows<T>(result: &Result<Vec<T>, AppError>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => Self::denied("0 rows"),
            Ok(rows) => Self::allowed(format!("{} row(s)", rows.len())),
            Err(e) => Self::from_error(e),
        }
    }

    /// Classifies an insert. Constraints are checked after RLS, so a constraint error
    /// means the policy let the row through.
    pub fn from_insert<T>(result: &Result<Vec<T>, AppError>) -> Self {
        match result {
            Err(e) if e.is_constraint_violation() => {
                Self::allowed(format!("reached constraints, RLS did not refuse: {}", e))
            }
            other => Self::from_rows(other),
        }
    }

    pub fn from_option<T>(result: &Result<Option<T>, AppError>) -> Self {
        match result {
            Ok(Some(_)) => Self::allowed("1 row"),
            Ok(None) => Self::denied("0 rows"),
            Err(e) => Self::from_error(e),
        }
    }

    /// Classifies a call with no row result. Success counts as allowed.
    pub fn from_unit<T>(result: &Result<T, AppError>) -> Self {
        match result {
            Ok(_) => Self::allowed("ok"),
            Err(e) => Self::from_error(e),
        }
    }

    fn from_error(e: &AppError) -> Self {
        if e.is_permission_denied() {
            Self::denied(e.to_string())
        } else {
            tracing::warn!("Probe saw a non-RLS error: {}", e);
            Self::denied(format!("other error: {}", e))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub case: ProbeCase,
    pub observed: Observation,
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        self.case.expected == self.observed.outcome
    }
}

/// Collects probe outcomes and prints one line per case.
#[derive(Debug, Default)]
pub struct ProbeReport {
    pub title: String,
    pub outcomes: Vec<ProbeOutcome>,
}

impl ProbeReport {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        report::section(&title);
        Self {
            title,
            outcomes: Vec::new(),
        }
    }

    /// Records an outcome, prints its line, and returns whether it matched.
    pub fn record(&mut self, case: ProbeCase, observed: Observation) -> bool {
        let outcome = ProbeOutcome { case, observed };
        let passed = outcome.passed();
        let detail = outcome.observed.detail.as_deref().unwrap_or("");
        let line = format!(
            "{} → {} [{}]",
            outcome.case.label(),
            outcome.observed.outcome,
            detail
        );
        report::check(passed, line);
        self.outcomes.push(outcome);
        passed
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn print_summary(&self) {
        report::section(&format!("{} summary", self.title));
        println!("  {} passed, {} failed", self.passed(), self.failed());
        for failure in self.failures() {
            report::fail(failure.case.label());
        }
    }

    /// Process exit code: 0 when every case matched, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Expected founder-table policy for an authenticated actor, excluding deletes.
pub fn founder_matrix(actor: &str) -> Vec<ProbeCase> {
    use Expectation::*;
    use Operation::*;
    use Target::*;

    vec![
        ProbeCase::new(actor, Select, Own, Allowed),
        ProbeCase::new(actor, Select, Other, Allowed),
        ProbeCase::new(actor, Select, Hidden, Denied),
        ProbeCase::new(actor, Insert, Other, Denied),
        ProbeCase::new(actor, Insert, Hidden, Denied),
        ProbeCase::new(actor, Update, Own, Allowed),
        ProbeCase::new(actor, Update, Other, Denied),
        ProbeCase::new(actor, Update, Hidden, Denied),
    ]
}

/// Delete cases, ordered so the actor's own row goes last.
pub fn founder_delete_cases(actor: &str) -> Vec<ProbeCase> {
    vec![
        ProbeCase::new(actor, Operation::Delete, Target::Other, Expectation::Denied),
        ProbeCase::new(actor, Operation::Delete, Target::Hidden, Expectation::Denied),
        ProbeCase::new(actor, Operation::Delete, Target::Own, Expectation::Allowed),
    ]
}

/// Expected founder-table policy for the anonymous role.
pub fn anonymous_founder_matrix() -> Vec<ProbeCase> {
    use Expectation::*;
    use Operation::*;
    use Target::*;

    vec![
        ProbeCase::new("anonymous", Select, Hidden, Denied),
        ProbeCase::new("anonymous", Insert, Other, Denied),
        ProbeCase::new("anonymous", Update, Other, Denied),
        ProbeCase::new("anonymous", Delete, Other, Denied),
    ]
}

/// Runs founder-table cases as one client against three fixed rows.
pub struct FounderProbe {
    client: BackendClient,
    own: Option<FounderProfile>,
    other: FounderProfile,
    hidden: FounderProfile,
    leaked: Vec<Uuid>,
    deleted: Vec<Uuid>,
}

impl FounderProbe {
    /// `own` is `None` for the anonymous role.
    pub fn new(
        client: BackendClient,
        own: Option<FounderProfile>,
        other: FounderProfile,
        hidden: FounderProfile,
    ) -> Self {
        Self {
            client,
            own,
            other,
            hidden,
            leaked: Vec::new(),
            deleted: Vec::new(),
        }
    }

    fn row(&self, target: Target) -> Option<&FounderProfile> {
        match target {
            Target::Own => self.own.as_ref(),
            Target::Other => Some(&self.other),
            Target::Hidden => Some(&self.hidden),
        }
    }

    /// The client the cases run as. Rows it leaks must be cleaned up with it.
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub async fn observe(
        &mut self,
        actor: &str,
        operation: Operation,
        target: Target,
    ) -> Observation {
        let Some(row) = self.row(target).cloned() else {
            return Observation::denied("no row for this target");
        };

        let query = self.client.from(schema::FOUNDERS_TABLE);
        match operation {
            Operation::Select => {
                let result = query
                    .eq(founders::ID, row.id)
                    .execute::<FounderProfile>()
                    .await;
                Observation::from_rows(&result)
            }
            Operation::Insert => {
                // Impersonation attempt: a second row claiming the target's user id
                let mut payload = NewFounderProfile::probe(
                    row.user_id,
                    format!("Impersonated by {}", actor),
                    true,
                );
                payload.bio = Some(format!(
                    "Leaked insert by {} ({}) at {}",
                    actor,
                    self.client.identity(),
                    Utc::now()
                ));
                let result = query.insert::<FounderProfile, _>(&payload).await;
                if let Ok(rows) = &result {
                    self.leaked.extend(rows.iter().map(|r| r.id));
                }
                Observation::from_insert(&result)
            }
            Operation::Update => {
                let patch = rest_client::patch(&[(
                    founders::BIO,
                    json!(format!("Edited by {} at {}", actor, Utc::now())),
                )]);
                let result = query
                    .eq(founders::ID, row.id)
                    .update::<FounderProfile, _>(&patch)
                    .await;
                Observation::from_rows(&result)
            }
            Operation::Delete => {
                let result = query
                    .eq(founders::ID, row.id)
                    .delete::<FounderProfile>()
                    .await;
                if let Ok(rows) = &result {
                    self.deleted.extend(rows.iter().map(|r| r.id));
                }
                Observation::from_rows(&result)
            }
        }
    }

    /// Runs every case and records it in `report`.
    pub async fn run(&mut self, report: &mut ProbeReport, cases: Vec<ProbeCase>) {
        for case in cases {
            let observed = self.observe(&case.actor, case.operation, case.target).await;
            report.record(case, observed);
        }
    }

    /// Ids of rows that an insert case managed to create; the caller must clean these up.
    pub fn take_leaked(&mut self) -> Vec<Uuid> {
        std::mem::take(&mut self.leaked)
    }

    /// Ids of rows that a delete case actually removed.
    pub fn take_deleted(&mut self) -> Vec<Uuid> {
        std::mem::take(&mut self.deleted)
    }
}
