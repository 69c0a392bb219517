use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use import_logging::{human_size, import_error, import_info};
use tempfile::NamedTempFile;
use thiserror::Error;
use url::Url;

use crate::dirs::{path_join, DirectoryManager};
use crate::fetch::Fetcher;
use crate::markdown::{AssetUsage, MarkdownConverter, MarkdownError};
use crate::persist::{Persist, PersistMetadata};
use crate::sources::{BlueskyUser, FediverseUser, YouTubeUser};
use crate::transform::HtmlTransformer;
use crate::types::{ContentEntry, SourceKind};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Markdown(#[from] MarkdownError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub cleaned: usize,
    pub assets: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Drives one entry through the pipeline: assign an output path, localize
/// assets, convert to Markdown, write, clean up unused assets, and
/// optionally publish.
pub struct Importer {
    fetcher: Arc<Fetcher>,
    transformer: HtmlTransformer,
    markdown: MarkdownConverter,
    persist: Option<Arc<Persist>>,
    directory_manager: DirectoryManager,
    output_folder: String,
    dry_run: bool,
    safe_mode: bool,
    verbose: bool,
    imported: usize,
    skipped: usize,
    failed: usize,
}

impl Importer {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            transformer: HtmlTransformer::new(fetcher.clone()),
            fetcher,
            markdown: MarkdownConverter::new(),
            persist: None,
            directory_manager: DirectoryManager::new(),
            output_folder: ".".to_string(),
            dry_run: false,
            safe_mode: true,
            verbose: true,
            imported: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn set_output_folder(&mut self, folder: impl Into<String>) {
        self.output_folder = folder.into();
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
        self.directory_manager.set_dry_run(dry_run);
    }

    pub fn set_safe_mode(&mut self, safe_mode: bool) {
        self.safe_mode = safe_mode;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
        self.markdown.set_verbose(verbose);
    }

    pub fn set_persist(&mut self, persist: Arc<Persist>) {
        self.persist = Some(persist);
    }

    /// Access to conversion policy knobs (preserved selectors, formatters).
    pub fn markdown_mut(&mut self) -> &mut MarkdownConverter {
        &mut self.markdown
    }

    /// Output path for an entry: the origin-specific slug (video id,
    /// profile post id) or the entry URL's pathname, under the output
    /// folder, with a Markdown extension.
    pub fn entry_file_path(&self, entry: &ContentEntry) -> String {
        let slug = entry_path_slug(entry);
        format!("{}.md", path_join(&[&self.output_folder, &slug]))
    }

    pub async fn import_entry(&mut self, entry: &mut ContentEntry) -> Result<(), ImportError> {
        let file_path = self.entry_file_path(entry);
        entry.file_path = Some(file_path.clone());

        // Asset localization must complete before conversion: the keep and
        // delete sets work on localized URLs.
        let (document, usage) = if entry.content_type.treat_as_html() {
            let localized = self.transformer.transform(&entry.content, entry).await;
            self.markdown.to_markdown(&localized, entry)
        } else {
            (entry.content.clone(), AssetUsage::default())
        };

        if self.safe_mode && Path::new(&file_path).exists() {
            if self.verbose {
                import_info!("Skipping file (no --overwrite) {file_path} from {}", entry.url);
            }
            self.skipped += 1;
        } else {
            self.directory_manager.create_directory_for_path(&file_path)?;
            if self.verbose {
                let dry = if self.dry_run { " (dry run)" } else { "" };
                import_info!(
                    "Importing file{dry} {file_path} ({}) from {}",
                    human_size(document.len()),
                    entry.url
                );
            }
            if !self.dry_run {
                write_atomic(&file_path, document.as_bytes())?;
                self.imported += 1;
            }

            if !entry.is_draft() {
                if let Some(persist) = &self.persist {
                    if persist.can_persist() {
                        let metadata = PersistMetadata {
                            url: Some(entry.url.clone()),
                            kind: Some("file".to_string()),
                        };
                        if let Err(err) = persist
                            .persist_file(&file_path, document.as_bytes(), metadata)
                            .await
                        {
                            import_error!("Error persisting file {file_path}: {err}");
                        }
                    }
                }
            }
        }

        // Remove downloaded srcset variants that did not survive the
        // simplification. Once per entry, even when the write was skipped.
        self.markdown.cleanup(usage)?;
        Ok(())
    }

    /// Imports every entry. A failure aborts only the affected entry.
    pub async fn import_entries(&mut self, entries: &mut [ContentEntry]) -> ImportSummary {
        for entry in entries.iter_mut() {
            if let Err(err) = self.import_entry(entry).await {
                import_error!("Error importing {}: {err}", entry.url);
                self.failed += 1;
            }
        }
        self.summary()
    }

    pub fn summary(&self) -> ImportSummary {
        let fetch_counts = self.fetcher.counts();
        ImportSummary {
            imported: self.imported,
            skipped: self.skipped,
            cleaned: self.markdown.cleaned_count(),
            assets: fetch_counts.assets,
            failed: self.failed,
            errors: fetch_counts.errors,
        }
    }
}

fn entry_path_slug(entry: &ContentEntry) -> String {
    let kind = entry
        .origin
        .as_ref()
        .map(|origin| origin.kind)
        .unwrap_or(entry.kind);

    let hinted = match kind {
        SourceKind::YouTube => YouTubeUser::file_path_from_url(&entry.url),
        SourceKind::Fediverse => FediverseUser::file_path_from_url(&entry.url),
        SourceKind::Bluesky => BlueskyUser::file_path_from_url(&entry.url),
        _ => None,
    };
    if let Some(hint) = hinted {
        return hint;
    }

    match Url::parse(&entry.url) {
        Ok(url) => {
            let segments: Vec<&str> = url
                .path()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .collect();
            if segments.is_empty() {
                "index".to_string()
            } else {
                segments.join("/")
            }
        }
        Err(_) => "index".to_string(),
    }
}

/// Writes via a temp file in the target directory, then renames into place.
fn write_atomic(file_path: &str, content: &[u8]) -> io::Result<()> {
    let path = Path::new(file_path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;

    if path.exists() {
        fs::remove_file(path)?;
    }
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
