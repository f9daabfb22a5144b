//! Proxy generation and audio extraction as tracked background jobs

use std::path::PathBuf;
use std::sync::Arc;

use crate::services::transcoder::Transcoder;

use super::{JobHandle, JobKind, JobRunner};

/// Submit a proxy-generation batch and return its job id immediately
pub fn spawn_proxy(
    runner: &JobRunner,
    transcoder: Arc<Transcoder>,
    sources: Vec<PathBuf>,
    res_factor: u32,
    alpha: bool,
) -> String {
    runner.submit(JobKind::Proxy, move |mut handle| async move {
        handle.update(|s| s.progress.total = sources.len());
        for source in sources {
            start_item(&mut handle, &source);
            let result = transcoder.create_proxy(&source, res_factor, alpha).await;
            finish_item(&mut handle, &source, result);
        }
        handle
    })
}

/// Submit an audio-extraction batch and return its job id immediately
pub fn spawn_audio_extract(
    runner: &JobRunner,
    transcoder: Arc<Transcoder>,
    sources: Vec<PathBuf>,
    out_dir: Option<PathBuf>,
) -> String {
    runner.submit(JobKind::AudioExtract, move |mut handle| async move {
        handle.update(|s| s.progress.total = sources.len());
        for source in sources {
            start_item(&mut handle, &source);
            let result = transcoder.extract_audio(&source, out_dir.as_deref()).await;
            finish_item(&mut handle, &source, result);
        }
        handle
    })
}

fn start_item(handle: &mut JobHandle, source: &PathBuf) {
    handle.update(|s| {
        s.progress.current = Some(source.to_string_lossy().to_string());
        s.progress.percent = None;
    });
}

fn finish_item(
    handle: &mut JobHandle,
    source: &PathBuf,
    result: crate::error::Result<PathBuf>,
) {
    match result {
        Ok(output) => handle.update(|s| {
            s.progress.completed += 1;
            s.outputs.push(output.to_string_lossy().to_string());
        }),
        Err(e) => handle.update(|s| {
            s.progress.completed += 1;
            s.errors.push(format!("{}: {}", source.display(), e));
        }),
    }
}
