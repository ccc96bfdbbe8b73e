//! Task application, pull-request publication and webhook dispatch.
//!
//! One [`BotRuntime`] handles one webhook delivery: it classifies nothing
//! itself, but takes a [`tanpopo_github::WebhookEvent`] and drives every
//! implicated (task, repository) pair through clone, script or agent loop and
//! publication, one pair at a time.

mod bot_runtime;
mod pair_outcome;
mod publication;
mod runtime_config;
mod task_application;
#[cfg(test)]
mod test_support;

pub use bot_runtime::BotRuntime;
pub use pair_outcome::{
    render_pair_results, render_summary_comment, DispatchReport, PairOutcome, PairResult,
};
pub use publication::{publish, pull_request_body, PublishRequest};
pub use runtime_config::BotRuntimeConfig;
pub use task_application::{
    apply_task_to_repository, build_seed_message, TaskApplication, SEED_PROMPT_HEADER,
};
