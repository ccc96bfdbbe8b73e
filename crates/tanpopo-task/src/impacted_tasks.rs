/// Task directories touched by `changed_paths`, in first-seen order.
///
/// A task directory is the first path segment below `tasks_root`; files placed
/// directly in the root are not tasks.
pub fn impacted_task_dirs<S: AsRef<str>>(changed_paths: &[S], tasks_root: &str) -> Vec<String> {
    let root = tasks_root.trim_matches('/');
    let mut dirs: Vec<String> = Vec::new();
    for path in changed_paths {
        let Some(rest) = path
            .as_ref()
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            continue;
        };
        let Some((task_name, _file)) = rest.split_once('/') else {
            continue;
        };
        if task_name.is_empty() {
            continue;
        }
        let dir = format!("{root}/{task_name}");
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}
