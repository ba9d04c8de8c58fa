//! Turning the prompts file and reference directory into jobs.

use std::path::Path;

use genbatch_core::prompt::{decorate_prompt, match_references};
use genbatch_core::{ImageReference, Job};

use crate::config::WorkerConfig;

/// File extensions accepted as reference images.
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// A prompt read from the prompts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptLine {
    /// 1-based line number, used as the job id.
    pub number: usize,
    pub text: String,
}

/// Non-blank lines of `contents`, numbered by their line in the file.
pub fn parse_prompts(contents: &str) -> Vec<PromptLine> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let text = line.trim();
            (!text.is_empty()).then(|| PromptLine {
                number: idx + 1,
                text: text.to_string(),
            })
        })
        .collect()
}

pub async fn read_prompts(path: &Path) -> std::io::Result<Vec<PromptLine>> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(parse_prompts(&contents))
}

/// Image files directly inside `dir`, named by file stem and sorted by name.
pub async fn load_reference_library(dir: &Path) -> std::io::Result<Vec<ImageReference>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut library = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if !is_image || !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        library.push(ImageReference::LocalFile { name, path });
    }
    library.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(library)
}

/// One job per prompt: decorated with the configured style and ratio, with
/// every library image whose name the decorated prompt mentions attached.
pub fn build_jobs(config: &WorkerConfig, prompts: &[PromptLine], library: &[ImageReference]) -> Vec<Job> {
    let credential = config.credential_for(config.model);
    prompts
        .iter()
        .map(|line| {
            let prompt = decorate_prompt(
                &line.text,
                config.style.as_deref(),
                config.image_ratio.as_deref(),
            );
            let references = match_references(&prompt, library);
            if !references.is_empty() {
                tracing::debug!(
                    job_id = line.number,
                    references = references.len(),
                    "Attached reference images",
                );
            }
            Job::new(line.number.to_string(), prompt, credential.clone())
                .with_platform(config.platform)
                .with_model(config.model)
                .with_max_retries(config.retry_count)
                .with_references(references)
        })
        .collect()
}
