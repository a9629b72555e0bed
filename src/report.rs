//! Human-readable summary and follow-up commands for a finished run.

use crate::excise::Outcome;

/// Render the result of a run, including manual cleanup steps.
pub fn render(outcome: &Outcome) -> String {
    let repo = shell_quote(&outcome.repo_path.display().to_string());
    let branch = &outcome.branch;
    let count = outcome.removed.len();

    let mut out = if outcome.is_dry_run() {
        format!(
            "Dry run: would remove {count} {} from '{branch}' ({} kept).\n",
            plural(count),
            outcome.kept
        )
    } else {
        format!(
            "Removed {count} {} from '{branch}' ({} kept, {} rewritten).\n",
            plural(count),
            outcome.kept,
            outcome.rewritten
        )
    };
    for commit in &outcome.removed {
        out.push_str(&format!("  - {} {}\n", commit.id.short(), commit.summary));
    }

    if !outcome.unreachable.is_empty() {
        out.push_str(&format!("\nIgnored (not in the history of '{branch}'):\n"));
        for id in &outcome.unreachable {
            out.push_str(&format!("  - {id}\n"));
        }
    }

    let Some(new_tip) = &outcome.new_tip else {
        return out;
    };
    out.push_str(&format!(
        "\nBranch '{branch}' moved from {} to {}.\n",
        outcome.old_tip.short(),
        new_tip.short()
    ));

    if let Some(backup) = &outcome.backup {
        out.push_str(&format!("Backup branch: {backup}\n"));
    }

    if let Some(warning) = &outcome.worktree_warning {
        out.push_str(&format!(
            "\nWarning: the working tree could not be updated to the new tip: {warning}\n\
             After saving any local work, run:\n  git -C {repo} reset --hard\n"
        ));
    }

    out.push_str("\nNote: the old history is still reachable until you discard it.\n");
    out.push_str("To remove it permanently, run:\n");
    if let Some(original_ref) = &outcome.original_ref {
        out.push_str(&format!("  git -C {repo} update-ref -d {original_ref}\n"));
    }
    if let Some(backup) = &outcome.backup {
        out.push_str(&format!("  git -C {repo} branch -D {backup}\n"));
    }
    out.push_str(&format!("  git -C {repo} reflog expire --expire=now --all\n"));
    out.push_str(&format!("  git -C {repo} gc --prune=now --aggressive\n"));

    out.push_str("\nIMPORTANT: if this branch is shared, the remote copy must be force-updated:\n");
    out.push_str(&format!("  git -C {repo} push --force-with-lease origin {branch}\n"));

    out
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "commit" } else { "commits" }
}

fn shell_quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@".contains(c));
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}
