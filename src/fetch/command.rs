//! External automation fetcher: runs an operator-supplied command (typically a browser script)
//! that drops one file into the working directory, and watches the directory for completion.

use log::debug;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use super::watcher::{CompletionWatcher, DirLister, DownloadState, FsLister, classify_snapshot};
use super::{ArtifactFetcher, ExecutionContext, FetchError, FetchPhase};

const PLACEHOLDER_URL: &str = "{url}";
const PLACEHOLDER_DIR: &str = "{dir}";
const PLACEHOLDER_PROFILE: &str = "{profile}";
const PLACEHOLDER_SLOT: &str = "{slot}";

#[derive(Clone, Debug)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl CommandFetcher {
    /// Parse a whitespace-separated command template, e.g. `fetch.py {url} {dir} --profile {profile}`.
    pub fn from_template(
        template: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("fetch command template is empty"))?;
        let args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains(PLACEHOLDER_URL)) {
            anyhow::bail!("fetch command template must contain {PLACEHOLDER_URL}");
        }
        if !args.iter().any(|a| a.contains(PLACEHOLDER_DIR)) {
            anyhow::bail!("fetch command template must contain {PLACEHOLDER_DIR}");
        }
        Ok(Self {
            program,
            args,
            timeout,
            poll_interval,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with placeholders substituted for one call.
    pub fn render_args(&self, locator: &str, working_dir: &Path, ctx: &ExecutionContext) -> Vec<String> {
        let dir = working_dir.to_string_lossy();
        let profile = ctx.profile_dir.to_string_lossy();
        let slot = ctx.slot_id.to_string();
        self.args
            .iter()
            .map(|a| {
                a.replace(PLACEHOLDER_URL, locator)
                    .replace(PLACEHOLDER_DIR, &dir)
                    .replace(PLACEHOLDER_PROFILE, &profile)
                    .replace(PLACEHOLDER_SLOT, &slot)
            })
            .collect()
    }

    fn spawn(&self, locator: &str, working_dir: &Path, ctx: &ExecutionContext) -> Result<Child, FetchError> {
        Command::new(&self.program)
            .args(self.render_args(locator, working_dir, ctx))
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FetchError::LaunchFailure(format!("{}: {}", self.program, e)))
    }
}

/// The file to hand back once the child has exited: a fresh snapshot wins over the first sighting,
/// so a rename done right before exit is picked up.
fn settled_output(working_dir: &Path, seen: PathBuf) -> PathBuf {
    match FsLister
        .list(working_dir)
        .map(|files| classify_snapshot(&files))
    {
        Ok(DownloadState::Complete(path)) => path,
        _ => seen,
    }
}

/// Kill and reap a child that is still running.
fn stop_child(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl ArtifactFetcher for CommandFetcher {
    fn launch(&self, ctx: &ExecutionContext) -> Result<(), FetchError> {
        which::which(&self.program)
            .map_err(|e| FetchError::LaunchFailure(format!("{}: {}", self.program, e)))?;
        std::fs::create_dir_all(&ctx.profile_dir).map_err(|e| {
            FetchError::LaunchFailure(format!("profile {}: {}", ctx.profile_dir.display(), e))
        })
    }

    fn fetch(
        &self,
        locator: &str,
        working_dir: &Path,
        ctx: &ExecutionContext,
        on_phase: &dyn Fn(FetchPhase),
    ) -> Result<PathBuf, FetchError> {
        on_phase(FetchPhase::Loading);
        let mut child = self.spawn(locator, working_dir, ctx)?;
        debug!("slot {}: spawned {} (pid {})", ctx.slot_id, self.program, child.id());

        let mut watcher = CompletionWatcher::on_disk(working_dir, self.timeout, self.poll_interval);
        let mut last_bytes = None;
        let result = loop {
            let state = watcher.poll().clone();
            match state {
                DownloadState::Complete(path) => match child.try_wait() {
                    // A tool writing straight to the final name may still be appending.
                    Ok(None) if watcher.expired() => {
                        break Err(FetchError::DownloadTimeout(self.timeout));
                    }
                    Ok(None) => {}
                    Ok(Some(_)) | Err(_) => {
                        let path = settled_output(working_dir, path);
                        on_phase(FetchPhase::Complete);
                        break Ok(path);
                    }
                },
                DownloadState::TimedOut => break Err(FetchError::DownloadTimeout(self.timeout)),
                DownloadState::InProgress { partial_bytes } => {
                    if last_bytes != Some(partial_bytes) {
                        on_phase(FetchPhase::Downloading {
                            bytes: partial_bytes,
                        });
                        last_bytes = Some(partial_bytes);
                    }
                }
                DownloadState::Waiting => {
                    if let Ok(Some(status)) = child.try_wait() {
                        // Exited without leaving anything: one last look, then give up.
                        if let DownloadState::Complete(path) = watcher.poll().clone() {
                            on_phase(FetchPhase::Complete);
                            break Ok(path);
                        }
                        break Err(FetchError::ElementNotFound(format!(
                            "{} exited ({}) without producing a file",
                            self.program, status
                        )));
                    }
                }
            }
            watcher.pause();
        };
        stop_child(&mut child);
        result
    }
}
