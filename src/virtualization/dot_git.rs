//! Classification of paths inside the `.git` control folder.

pub const DOT_GIT_ROOT: &str = ".git";
const INDEX: &str = ".git/index";
const HEAD: &str = ".git/HEAD";
const LOGS_HEAD: &str = ".git/logs/HEAD";
const REFS_HEADS_ROOT: &str = ".git/refs/heads/";
const INFO_EXCLUDE: &str = ".git/info/exclude";
const LOCK_EXTENSION: &str = ".lock";

const GIT_ATTRIBUTES: &str = ".gitattributes";
const GIT_IGNORE: &str = ".gitignore";

/// A control file whose change affects engine-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotGitFile {
    Index,
    LogsHead,
    HeadOrLocalBranch,
    Exclude,
}

fn normalize(relative_path: &str) -> String {
    relative_path.replace('\\', "/").trim_start_matches('/').to_string()
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    text.len() >= suffix.len()
        && text.is_char_boundary(text.len() - suffix.len())
        && text[text.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

pub fn is_path_inside_dot_git(relative_path: &str) -> bool {
    let path = normalize(relative_path);
    path.eq_ignore_ascii_case(DOT_GIT_ROOT) || starts_with_ignore_case(&path, ".git/")
}

fn is_head_or_local_branch(path: &str) -> bool {
    !ends_with_ignore_case(path, LOCK_EXTENSION)
        && (path.eq_ignore_ascii_case(HEAD) || starts_with_ignore_case(path, REFS_HEADS_ROOT))
}

/// Control file affected by a write, rename or hard link to `relative_path`.
pub fn classify_changed(relative_path: &str) -> Option<DotGitFile> {
    let path = normalize(relative_path);
    if path.eq_ignore_ascii_case(INDEX) {
        Some(DotGitFile::Index)
    } else if path.eq_ignore_ascii_case(LOGS_HEAD) {
        Some(DotGitFile::LogsHead)
    } else if is_head_or_local_branch(&path) {
        Some(DotGitFile::HeadOrLocalBranch)
    } else if path.eq_ignore_ascii_case(INFO_EXCLUDE) {
        Some(DotGitFile::Exclude)
    } else {
        None
    }
}

/// Control file affected by deleting `relative_path`. Deleting the index or
/// the HEAD log is not reported.
pub fn classify_deleted(relative_path: &str) -> Option<DotGitFile> {
    let path = normalize(relative_path);
    if is_head_or_local_branch(&path) {
        Some(DotGitFile::HeadOrLocalBranch)
    } else if path.eq_ignore_ascii_case(INFO_EXCLUDE) {
        Some(DotGitFile::Exclude)
    } else {
        None
    }
}

/// `.gitattributes` and `.gitignore` are always materialized in full.
pub fn is_special_git_file(file_name: &str) -> bool {
    file_name.eq_ignore_ascii_case(GIT_ATTRIBUTES) || file_name.eq_ignore_ascii_case(GIT_IGNORE)
}
