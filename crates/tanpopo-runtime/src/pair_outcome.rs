use tanpopo_github::{bot_comment::bot_marker, PullRequest};

/// What happened to one (task, repository) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairResult {
    PullRequest { url: String, number: u64 },
    NoChanges,
    Failed(String),
}

impl PairResult {
    /// Folds a publication attempt into a result; errors keep their full
    /// context chain.
    pub fn from_publication(result: anyhow::Result<Option<PullRequest>>) -> Self {
        match result {
            Ok(Some(pull_request)) => Self::PullRequest {
                url: pull_request.html_url,
                number: pull_request.number,
            },
            Ok(None) => Self::NoChanges,
            Err(error) => Self::Failed(format!("{error:#}")),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// One-line markdown rendering used in comments.
    pub fn render(&self) -> String {
        match self {
            Self::PullRequest { url, .. } => url.clone(),
            Self::NoChanges => "no changes".to_string(),
            Self::Failed(message) => format!("failed: {}", single_line(message)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    pub task_id: String,
    pub repository: String,
    pub result: PairResult,
}

/// Outcome of one dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<PairOutcome>,
    /// Structural problems such as an unreadable task or malformed metadata.
    pub precondition_failures: Vec<String>,
}

impl DispatchReport {
    /// The run fails on any precondition failure, or when pairs were attempted
    /// and none of them succeeded.
    pub fn is_failure(&self) -> bool {
        if !self.precondition_failures.is_empty() {
            return true;
        }
        !self.outcomes.is_empty() && self.outcomes.iter().all(|outcome| outcome.result.is_failure())
    }

    pub fn failed_pairs(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_failure())
            .count()
    }
}

/// `- owner/name: result` lines for a results block.
pub fn render_pair_results(outcomes: &[PairOutcome]) -> String {
    outcomes
        .iter()
        .map(|outcome| format!("- {}: {}", outcome.repository, outcome.result.render()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aggregate comment posted on a pull request once every pair was attempted.
pub fn render_summary_comment(bot: &str, report: &DispatchReport) -> String {
    let mut body = format!("{}\n## :robot: {bot}\n", bot_marker(bot));
    if report.outcomes.is_empty() && report.precondition_failures.is_empty() {
        body.push_str("No task was applied.\n");
        return body;
    }
    for failure in &report.precondition_failures {
        body.push_str(&format!("- :warning: {}\n", single_line(failure)));
    }
    for outcome in &report.outcomes {
        body.push_str(&format!(
            "- `{}` on {}: {}\n",
            outcome.task_id,
            outcome.repository,
            outcome.result.render()
        ));
    }
    body
}

fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}
