use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommandError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

impl Display for GitCommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitCommandError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitCommandError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
        }
    }
}

impl Error for GitCommandError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Commit authorship override applied per commit invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CommitAuthor {
    fn config_args(&self) -> Vec<String> {
        let (Some(name), Some(email)) = (&self.name, &self.email) else {
            return Vec::new();
        };
        vec![
            "-c".to_string(),
            format!("user.name={name}"),
            "-c".to_string(),
            format!("user.email={email}"),
        ]
    }
}

/// Thin wrapper over git against one working tree. All repository side
/// effects of the daemon go through here.
#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    branch: String,
    remote: String,
    author: CommitAuthor,
    push_token: Option<String>,
    executor: E,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self::with_executor(repo_path, branch, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(
        repo_path: impl Into<PathBuf>,
        branch: impl Into<String>,
        executor: E,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            branch: branch.into(),
            remote: "origin".to_string(),
            author: CommitAuthor::default(),
            push_token: None,
            executor,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_author(mut self, author: CommitAuthor) -> Self {
        self.author = author;
        self
    }

    pub fn with_push_token(mut self, token: Option<String>) -> Self {
        self.push_token = token;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Any staged, unstaged, or untracked changes in the working tree.
    pub fn has_changes(&self) -> Result<bool, GitCommandError> {
        let output = self.run(vec!["status".to_string(), "--porcelain".to_string()])?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Stage everything, including deletions and untracked files.
    pub fn stage_all(&self) -> Result<(), GitCommandError> {
        self.run(vec!["add".to_string(), "-A".to_string()]).map(|_| ())
    }

    /// Paths staged for the next commit.
    pub fn changed_files(&self) -> Result<Vec<String>, GitCommandError> {
        let output = self.run(vec![
            "diff".to_string(),
            "--cached".to_string(),
            "--name-only".to_string(),
        ])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Textual staged diff, uncolored.
    pub fn staged_diff(&self) -> Result<String, GitCommandError> {
        self.run(vec!["diff".to_string(), "--cached".to_string(), "--no-color".to_string()])
            .map(|output| output.stdout)
    }

    /// Create a commit and return the resulting hash.
    pub fn commit(&self, message: &str) -> Result<String, GitCommandError> {
        let mut args = self.author.config_args();
        args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
        self.run(args)?;

        let head = self.run(vec!["rev-parse".to_string(), "HEAD".to_string()])?;
        Ok(head.stdout.trim().to_string())
    }

    pub fn current_branch(&self) -> Result<String, GitCommandError> {
        let output =
            self.run(vec!["rev-parse".to_string(), "--abbrev-ref".to_string(), "HEAD".to_string()])?;
        Ok(output.stdout.trim().to_string())
    }

    pub fn last_commit_message(&self) -> Result<String, GitCommandError> {
        let output =
            self.run(vec!["log".to_string(), "-1".to_string(), "--pretty=%B".to_string()])?;
        Ok(output.stdout.trim().to_string())
    }

    pub fn commit_count(&self) -> Result<u64, GitCommandError> {
        let output =
            self.run(vec!["rev-list".to_string(), "--count".to_string(), "HEAD".to_string()])?;
        Ok(output.stdout.trim().parse().unwrap_or(0))
    }

    /// Push the branch, retrying up to `retry_attempts` times with a
    /// fixed delay between attempts. Exhausting all attempts returns
    /// `false` rather than an error: a failed push leaves the commit
    /// intact locally.
    pub async fn push(&self, retry_attempts: u32, retry_delay: Duration) -> bool {
        if let Err(error) = self.ensure_authenticated_remote() {
            warn!(error = %error, "failed to prepare remote for push");
            return false;
        }

        for attempt in 1..=retry_attempts.max(1) {
            match self.run(vec![
                "push".to_string(),
                self.remote.clone(),
                self.branch.clone(),
            ]) {
                Ok(_) => {
                    info!(remote = %self.remote, branch = %self.branch, "pushed to remote");
                    return true;
                }
                Err(error) => {
                    warn!(
                        attempt,
                        max_attempts = retry_attempts,
                        error = %error,
                        "push attempt failed"
                    );
                    if attempt < retry_attempts {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }

        false
    }

    /// Rewrite the remote URL to carry the configured token, only when a
    /// token is present and the URL does not already embed a credential.
    /// Skipping the rewrite on already-credentialed URLs keeps repeated
    /// runs from stacking credentials.
    fn ensure_authenticated_remote(&self) -> Result<(), GitCommandError> {
        let Some(token) = &self.push_token else {
            return Ok(());
        };

        let current = self
            .run(vec!["remote".to_string(), "get-url".to_string(), self.remote.clone()])?
            .stdout
            .trim()
            .to_string();

        let Some(authenticated) = with_embedded_token(&current, token) else {
            return Ok(());
        };

        self.run(vec![
            "remote".to_string(),
            "set-url".to_string(),
            self.remote.clone(),
            authenticated,
        ])?;
        debug!(remote = %self.remote, "embedded push token into remote url");
        Ok(())
    }

    fn run(&self, args: Vec<String>) -> Result<GitCommandOutput, GitCommandError> {
        let command = format!("git {}", args.join(" "));
        let result = self.executor.execute("git", &args, &self.repo_path).map_err(|error| {
            GitCommandError::SpawnFailed { command: command.clone(), message: error.to_string() }
        })?;

        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitCommandError::CommandFailed { command, code: result.code, stderr })
    }
}

/// Embed `token` as the userinfo of an http(s) remote URL. Returns None
/// when the URL is not http(s) or already carries a credential.
pub fn with_embedded_token(remote_url: &str, token: &str) -> Option<String> {
    let mut url = Url::parse(remote_url).ok()?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return None;
    }
    if !url.username().is_empty() || url.password().is_some() {
        return None;
    }
    url.set_username(token).ok()?;
    Some(url.to_string())
}
