//! Machine-managed regions of issue and review comments.
//!
//! Every bot comment starts with `<!-- {bot} -->` or `<!-- {bot} {json} -->`.
//! Checklists use literal `- [ ]` / `- [x]` markdown task syntax.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CHECKED_PREFIXES: [&str; 2] = ["- [x] ", "- [X] "];
const UNCHECKED_PREFIX: &str = "- [ ] ";
const RERUN_LABEL: &str = "Re-run";

/// Metadata embedded in a marker line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentMetadata {
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

pub fn bot_marker(bot: &str) -> String {
    format!("<!-- {bot} -->")
}

pub fn bot_marker_with_metadata(bot: &str, metadata: &CommentMetadata) -> Result<String> {
    let json = serde_json::to_string(metadata).context("failed to encode comment metadata")?;
    Ok(format!("<!-- {bot} {json} -->"))
}

/// Delimiter of the results block inside a bot comment.
pub fn results_marker(bot: &str) -> String {
    format!("<!-- {bot} results -->")
}

/// Whether `body` opens with one of this bot's markers.
pub fn is_bot_comment(body: &str, bot: &str) -> bool {
    let Some(rest) = body.trim_start().strip_prefix(&format!("<!-- {bot} ")) else {
        return false;
    };
    rest.starts_with("-->") || rest.starts_with('{')
}

/// Reads the JSON metadata of the leading marker.
///
/// Returns `Ok(None)` for a plain marker or a foreign comment; malformed JSON
/// is an error.
pub fn parse_marker_metadata(body: &str, bot: &str) -> Result<Option<CommentMetadata>> {
    let first_line = body.trim_start().lines().next().unwrap_or_default().trim();
    let Some(rest) = first_line.strip_prefix(&format!("<!-- {bot} ")) else {
        return Ok(None);
    };
    let Some(inner) = rest.strip_suffix("-->") else {
        return Ok(None);
    };
    let inner = inner.trim();
    if !inner.starts_with('{') {
        return Ok(None);
    }
    let metadata = serde_json::from_str::<CommentMetadata>(inner)
        .with_context(|| format!("malformed bot comment metadata: {inner}"))?;
    Ok(Some(metadata))
}

/// Text after each `- [x] ` line, in document order.
pub fn find_checked_repositories(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim_start();
            CHECKED_PREFIXES
                .iter()
                .find_map(|prefix| line.strip_prefix(prefix))
        })
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrites every `- [x] ` into `- [ ] `.
pub fn uncheck_all(body: &str) -> String {
    CHECKED_PREFIXES
        .iter()
        .fold(body.to_string(), |text, prefix| {
            text.replace(prefix, UNCHECKED_PREFIX)
        })
}

/// Replaces the first `marker ... marker` block with `content`. A lone marker
/// is closed right after the inserted content; without any marker a new block
/// is appended.
pub fn inject_between_markers(body: &str, marker: &str, content: &str) -> String {
    if let Some(start) = body.find(marker) {
        let inner_start = start + marker.len();
        let content = content.trim_end();
        return match body[inner_start..].find(marker) {
            Some(relative_end) => {
                let end = inner_start + relative_end;
                format!("{}\n{content}\n{}", &body[..inner_start], &body[end..])
            }
            None => format!(
                "{}\n{content}\n{marker}{}",
                &body[..inner_start],
                &body[inner_start..]
            ),
        };
    }

    let mut output = body.to_string();
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(&format!("{marker}\n{}\n{marker}\n", content.trim_end()));
    output
}

/// Checklist of the given repositories, all unchecked. `archived_skipped`
/// repositories left out of the list are counted in a trailing note.
pub fn render_checklist_comment<S: AsRef<str>>(
    bot: &str,
    repositories: &[S],
    archived_skipped: usize,
) -> String {
    let lines = repositories
        .iter()
        .map(|repository| format!("{UNCHECKED_PREFIX}{}", repository.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");
    let mut body = format!("{}\n## :robot: {bot}\n{lines}\n", bot_marker(bot));
    match archived_skipped {
        0 => {}
        1 => body.push_str("\n_1 archived repository is not listed._\n"),
        count => {
            body.push_str(&format!("\n_{count} archived repositories are not listed._\n"))
        }
    }
    body
}

/// Per-repository review comment carrying the latest result and a re-run box.
pub fn render_rerun_comment(
    bot: &str,
    metadata: &CommentMetadata,
    result: &str,
) -> Result<String> {
    let marker = bot_marker_with_metadata(bot, metadata)?;
    let results = results_marker(bot);
    Ok(format!(
        "{marker}\n### :robot: {}\n{results}\n{}\n{results}\n{UNCHECKED_PREFIX}{RERUN_LABEL}\n",
        metadata.repository,
        result.trim_end()
    ))
}

/// Whether the re-run box of a review comment is checked.
pub fn is_rerun_requested(body: &str) -> bool {
    body.lines().any(|line| {
        let line = line.trim();
        CHECKED_PREFIXES
            .iter()
            .any(|prefix| line.strip_prefix(prefix) == Some(RERUN_LABEL))
    })
}

#[cfg(test)]
mod tests {
    use super::{
        bot_marker, find_checked_repositories, inject_between_markers, is_bot_comment,
        is_rerun_requested, parse_marker_metadata, render_checklist_comment, render_rerun_comment,
        results_marker, uncheck_all, CommentMetadata,
    };

    const BOT: &str = "tanpopo-bot";

    #[test]
    fn unit_find_checked_repositories_returns_checked_entries_in_order() {
        let comment = "<!-- tanpopo-bot -->
## :robot: tanpopo-bot
- [x] int128/foo
- [ ] int128/bar
- [x] int128/baz
";
        assert_eq!(
            find_checked_repositories(comment),
            vec!["int128/foo", "int128/baz"]
        );
    }

    #[test]
    fn functional_checked_marker_is_case_insensitive() {
        assert_eq!(
            find_checked_repositories("- [X] octo/a\n  - [x] octo/b\n- [x]   \n"),
            vec!["octo/a", "octo/b"]
        );
    }

    #[test]
    fn unit_uncheck_all_only_touches_checkboxes() {
        let body = "intro - [x] inline\n- [x] octo/a\n- [X] octo/b\n- [ ] octo/c\nplain [x] text";
        assert_eq!(
            uncheck_all(body),
            "intro - [ ] inline\n- [ ] octo/a\n- [ ] octo/b\n- [ ] octo/c\nplain [x] text"
        );
    }

    #[test]
    fn functional_checklist_comment_notes_skipped_archived_repositories() {
        let body = render_checklist_comment(BOT, &["octo/a"], 2);
        assert_eq!(
            body,
            "<!-- tanpopo-bot -->\n## :robot: tanpopo-bot\n- [ ] octo/a\n\n_2 archived repositories are not listed._\n"
        );
        assert!(render_checklist_comment(BOT, &["octo/a"], 1)
            .ends_with("_1 archived repository is not listed._\n"));
        assert_eq!(find_checked_repositories(&body), Vec::<String>::new());
    }

    #[test]
    fn functional_checklist_comment_matches_expected_layout() {
        let body = render_checklist_comment(BOT, &["octo/a", "octo/b"], 0);
        assert_eq!(
            body,
            "<!-- tanpopo-bot -->\n## :robot: tanpopo-bot\n- [ ] octo/a\n- [ ] octo/b\n"
        );
        assert!(is_bot_comment(&body, BOT));
        assert!(!is_bot_comment("<!-- tanpopo-bot-other -->", BOT));
        assert!(!is_bot_comment("hello", BOT));
    }

    #[test]
    fn unit_inject_replaces_only_first_block() {
        let marker = results_marker(BOT);
        let body = format!(
            "head\n{marker}\nold\n{marker}\nmiddle\n{marker}\nsecond\n{marker}\ntail"
        );
        let injected = inject_between_markers(&body, &marker, "new");
        assert_eq!(
            injected,
            format!("head\n{marker}\nnew\n{marker}\nmiddle\n{marker}\nsecond\n{marker}\ntail")
        );
    }

    #[test]
    fn unit_inject_appends_block_when_marker_missing() {
        let marker = results_marker(BOT);
        assert_eq!(
            inject_between_markers("body", &marker, "result"),
            format!("body\n{marker}\nresult\n{marker}\n")
        );
        assert_eq!(
            inject_between_markers("", &marker, "result"),
            format!("{marker}\nresult\n{marker}\n")
        );
    }

    #[test]
    fn regression_lone_marker_is_closed_in_place_and_user_text_survives() {
        let marker = results_marker(BOT);
        let body = format!("keep me\n{marker}\nuser text\n- [ ] Re-run\n");

        let first = inject_between_markers(&body, &marker, "first result");
        assert_eq!(
            first,
            format!("keep me\n{marker}\nfirst result\n{marker}\nuser text\n- [ ] Re-run\n")
        );
        assert_eq!(first.matches(marker.as_str()).count(), 2);

        let second = inject_between_markers(&first, &marker, "second result");
        assert_eq!(
            second,
            format!("keep me\n{marker}\nsecond result\n{marker}\nuser text\n- [ ] Re-run\n")
        );
    }

    #[test]
    fn functional_metadata_round_trips_through_rerun_comment() {
        let metadata = CommentMetadata {
            repository: "octo/app".to_string(),
            task: None,
        };
        let body = render_rerun_comment(BOT, &metadata, "Created octo/app#1").expect("render");

        assert!(body.starts_with("<!-- tanpopo-bot {\"repository\":\"octo/app\"} -->\n"));
        assert!(is_bot_comment(&body, BOT));
        assert_eq!(
            parse_marker_metadata(&body, BOT).expect("parse"),
            Some(metadata)
        );
        assert!(!is_rerun_requested(&body));
        assert!(is_rerun_requested(&body.replace("- [ ] Re-run", "- [x] Re-run")));
    }

    #[test]
    fn regression_malformed_metadata_is_an_error() {
        let error = parse_marker_metadata("<!-- tanpopo-bot {\"repository\": -->\nbody", BOT)
            .expect_err("malformed");
        assert!(error.to_string().contains("malformed bot comment metadata"));

        assert_eq!(
            parse_marker_metadata(&bot_marker(BOT), BOT).expect("plain marker"),
            None
        );
        assert_eq!(
            parse_marker_metadata("<!-- other {\"repository\":\"x/y\"} -->", BOT)
                .expect("foreign"),
            None
        );
    }
}
