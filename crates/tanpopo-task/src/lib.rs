//! Task definitions: loading, repository lists, fixed scripts and discovery.

mod impacted_tasks;
mod repository_list;
mod task_definition;
mod task_script;

pub use impacted_tasks::impacted_task_dirs;
pub use repository_list::parse_repository_list;
pub use task_definition::{
    parse_task_title, TaskDefinition, REPOSITORIES_FILE, TASK_README, TASK_SCRIPT,
};
pub use task_script::run_task_script;
