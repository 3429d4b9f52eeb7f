//! Direct HTTP fetcher: downloads a shared link through its direct-download form.
//!
//! A shared *folder* link answers `dl=1` with a zip of the whole folder. The fetcher then keeps
//! only the folder's first file (root level first, then by name) and drops the archive, so every
//! item still yields exactly one artifact.

use crossbeam_channel::{TryRecvError, bounded};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_DISPOSITION;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use url::Url;

use super::watcher::{CompletionWatcher, DownloadState};
use super::{ArtifactFetcher, ExecutionContext, FetchError, FetchPhase};
use crate::utils::config::FetchConsts;

/// Hosts whose shared links switch to a direct download with `dl=1`.
const DIRECT_DOWNLOAD_HOSTS: &[&str] = &["dropbox.com", "dropboxusercontent.com"];
/// Path prefixes of shared-folder (not single-file) links on those hosts.
const FOLDER_PATH_PREFIXES: &[&str] = &["/scl/fo/", "/sh/"];
/// Name the folder archive is moved to before its first entry is unpacked next to it.
const STAGED_ARCHIVE_NAME: &str = ".folder-archive.zip";

pub struct HttpFetcher {
    client: Client,
    download_timeout: Duration,
    poll_interval: Duration,
}

impl HttpFetcher {
    pub fn new(
        user_agent: &str,
        page_timeout: Duration,
        download_timeout: Duration,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(page_timeout)
            // The completion watcher enforces `download_timeout`; this only reaps a stuck transfer.
            .timeout(download_timeout + page_timeout)
            .build()?;
        Ok(Self {
            client,
            download_timeout,
            poll_interval,
        })
    }

    fn open(&self, url: &str) -> Result<Response, FetchError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                FetchError::PageLoadTimeout(e.to_string())
            } else {
                FetchError::Transfer(e.to_string())
            }
        })?;
        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(FetchError::ElementNotFound(format!(
                "HTTP {} for {}",
                response.status(),
                url
            ))),
            s => Err(FetchError::Transfer(format!("HTTP {} for {}", s, url))),
        }
    }
}

fn is_direct_download_host(url: &Url) -> bool {
    url.host_str()
        .map(|h| DIRECT_DOWNLOAD_HOSTS.iter().any(|d| h == *d || h.ends_with(&format!(".{d}"))))
        .unwrap_or(false)
}

/// True for a shared-folder link on a direct-download host.
pub fn is_shared_folder_link(locator: &str) -> bool {
    Url::parse(locator)
        .map(|url| {
            is_direct_download_host(&url)
                && FOLDER_PATH_PREFIXES.iter().any(|p| url.path().starts_with(p))
        })
        .unwrap_or(false)
}

/// Rewrite a shared link to its direct-download form. Other URLs pass through unchanged.
pub fn direct_download_url(locator: &str) -> String {
    let Ok(mut url) = Url::parse(locator) else {
        return locator.to_string();
    };
    if !is_direct_download_host(&url) {
        return locator.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "dl")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("dl", "1");
    url.to_string()
}

fn archive_error(archive: &Path, e: impl std::fmt::Display) -> FetchError {
    FetchError::Transfer(format!("folder archive {}: {}", archive.display(), e))
}

/// Unpack the first file of a folder archive into `dest_dir` and remove the archive.
///
/// "First" is the shallowest file, ties broken by case-insensitive name, which is the order a
/// shared-folder grid lists its entries in by default.
pub fn extract_first_entry(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf, FetchError> {
    let staged = dest_dir.join(STAGED_ARCHIVE_NAME);
    std::fs::rename(archive_path, &staged).map_err(|e| archive_error(archive_path, e))?;
    let result = unpack_first(&staged, dest_dir);
    let _ = std::fs::remove_file(&staged);
    result
}

fn unpack_first(staged: &Path, dest_dir: &Path) -> Result<PathBuf, FetchError> {
    let file = File::open(staged).map_err(|e| archive_error(staged, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(staged, e))?;

    let mut first: Option<(usize, String, usize, String)> = None;
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|e| archive_error(staged, e))?;
        if entry.is_dir() {
            continue;
        }
        let Some(path) = entry.enclosed_name() else {
            continue;
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let candidate = (path.components().count(), name.to_lowercase(), index, name.to_string());
        if first.as_ref().is_none_or(|best| candidate < *best) {
            first = Some(candidate);
        }
    }
    let Some((_, _, index, name)) = first else {
        return Err(FetchError::ElementNotFound(
            "shared folder archive contains no files".to_string(),
        ));
    };

    let dest = dest_dir.join(sanitize_filename(&name));
    let mut entry = archive.by_index(index).map_err(|e| archive_error(staged, e))?;
    let mut out = File::create(&dest).map_err(|e| archive_error(staged, e))?;
    io::copy(&mut entry, &mut out).map_err(|e| archive_error(staged, e))?;
    debug!("unpacked {} from folder archive", name);
    Ok(dest)
}

/// Filename from `Content-Disposition` (`filename="..."`), if any.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let rest = part.strip_prefix("filename=")?;
        let name = rest.trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Keep only the final path component and drop characters that are unsafe in file names.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        FetchConsts::FALLBACK_FILENAME.to_string()
    } else {
        cleaned
    }
}

fn artifact_name(response: &Response) -> String {
    if let Some(name) = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
    {
        return sanitize_filename(&name);
    }
    let from_url = response
        .url()
        .path_segments()
        .and_then(|mut segs| segs.next_back().map(str::to_string))
        .filter(|s| !s.is_empty());
    sanitize_filename(from_url.as_deref().unwrap_or(FetchConsts::FALLBACK_FILENAME))
}

/// Stream the body into `<final>.part`, then rename. Runs on the transfer thread.
fn write_body(mut response: Response, final_path: &Path) -> io::Result<()> {
    let mut part_name = final_path.as_os_str().to_owned();
    part_name.push(".part");
    let part_path = PathBuf::from(part_name);
    let mut file = File::create(&part_path)?;
    io::copy(&mut response, &mut file)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&part_path, final_path)
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(
        &self,
        locator: &str,
        working_dir: &Path,
        ctx: &ExecutionContext,
        on_phase: &dyn Fn(FetchPhase),
    ) -> Result<PathBuf, FetchError> {
        on_phase(FetchPhase::Loading);
        let url = direct_download_url(locator);
        debug!("slot {}: GET {}", ctx.slot_id, url);
        let response = self.open(&url)?;

        on_phase(FetchPhase::Locating);
        let final_path = working_dir.join(artifact_name(&response));

        on_phase(FetchPhase::Downloading { bytes: 0 });
        let (done_tx, done_rx) = bounded::<io::Result<()>>(1);
        let target = final_path.clone();
        thread::spawn(move || {
            let _ = done_tx.send(write_body(response, &target));
        });

        // The transfer thread decides completion; the watcher reports progress and enforces the
        // timeout. The final name may itself look like a partial download (`x.tmp`).
        let mut watcher =
            CompletionWatcher::on_disk(working_dir, self.download_timeout, self.poll_interval);
        let mut last_bytes = None;
        loop {
            match done_rx.try_recv() {
                Ok(Ok(())) => break,
                Ok(Err(e)) => return Err(FetchError::Transfer(e.to_string())),
                Err(TryRecvError::Disconnected) => {
                    return Err(FetchError::Transfer("transfer thread exited".to_string()));
                }
                Err(TryRecvError::Empty) => {}
            }
            match watcher.poll().clone() {
                DownloadState::InProgress { partial_bytes } if last_bytes != Some(partial_bytes) => {
                    on_phase(FetchPhase::Downloading {
                        bytes: partial_bytes,
                    });
                    last_bytes = Some(partial_bytes);
                }
                _ if watcher.expired() => {
                    return Err(FetchError::DownloadTimeout(self.download_timeout));
                }
                _ => {}
            }
            watcher.pause();
        }

        let is_zip = final_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        let artifact = if is_zip && is_shared_folder_link(locator) {
            extract_first_entry(&final_path, working_dir)?
        } else {
            final_path
        };
        on_phase(FetchPhase::Complete);
        Ok(artifact)
    }
}
