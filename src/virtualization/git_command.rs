//! Recognizes the git command that currently holds the repository lock.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GitVerbs: u32 {
        const OTHER = 1 << 0;
        const ADD_OR_STAGE = 1 << 1;
        const CHECKOUT = 1 << 2;
        const COMMIT = 1 << 3;
        const MOVE = 1 << 4;
        const RESET = 1 << 5;
        const STATUS = 1 << 6;
        const UPDATE_INDEX = 1 << 7;
    }
}

impl GitVerbs {
    /// Verbs that may run while placeholders are being created.
    pub const CAN_CREATE_PLACEHOLDER: GitVerbs = GitVerbs::ADD_OR_STAGE
        .union(GitVerbs::MOVE)
        .union(GitVerbs::STATUS);

    fn from_verb(verb: &str) -> GitVerbs {
        match verb {
            "add" | "stage" => GitVerbs::ADD_OR_STAGE,
            "checkout" => GitVerbs::CHECKOUT,
            "commit" => GitVerbs::COMMIT,
            "mv" => GitVerbs::MOVE,
            "reset" => GitVerbs::RESET,
            "status" => GitVerbs::STATUS,
            "update-index" => GitVerbs::UPDATE_INDEX,
            _ => GitVerbs::OTHER,
        }
    }
}

/// Source of the command line of the git process holding the lock.
pub trait GitLock: Send + Sync {
    /// `None` when no git command currently holds the lock.
    fn locked_git_command(&self) -> Option<String>;
}

/// Parsed `git <verb> ...` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandLineParser {
    parts: Vec<String>,
}

impl GitCommandLineParser {
    pub fn new(command: Option<&str>) -> Self {
        let parts = command
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self { parts }
    }

    /// True for a command line whose program is git and that has a verb.
    pub fn is_valid_git_command(&self) -> bool {
        match self.parts.first() {
            Some(program) if self.parts.len() >= 2 => is_git_program(program),
            _ => false,
        }
    }

    pub fn verb(&self) -> Option<GitVerbs> {
        if !self.is_valid_git_command() {
            return None;
        }
        self.parts
            .get(1)
            .map(|verb| GitVerbs::from_verb(&verb.to_ascii_lowercase()))
    }

    pub fn is_verb(&self, verbs: GitVerbs) -> bool {
        self.verb().is_some_and(|verb| verbs.intersects(verb))
    }

    pub fn arguments(&self) -> &[String] {
        self.parts.get(2..).unwrap_or(&[])
    }
}

fn is_git_program(program: &str) -> bool {
    let program = program.trim_matches('"').to_ascii_lowercase();
    let name = program.rsplit(['/', '\\']).next().unwrap_or(&program);
    name == "git" || name == "git.exe"
}
