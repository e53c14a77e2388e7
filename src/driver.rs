//! Rewrites image references in files
//!
//! [TagUpdater] ties the pieces together: it scans buffers with the
//! reference pattern, resolves each repository's new tag, fetches the
//! matching digest and splices both back in. Registry lookups are cached per
//! repository for the lifetime of the updater, so a run over many files asks
//! for each image's tags only once.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::domain::reference::{DIGEST_GROUP, REPOSITORY_GROUP, TAG_GROUP};
use crate::domain::{ReferencePattern, VersionConstraint};
use crate::error::{Result, UpdateTagsError};
use crate::registry::Registry;
use crate::resolver::VersionResolver;
use crate::rewrite::replace_all_submatch;
use crate::ui;

/// Compiled settings for a run
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub pattern: ReferencePattern,
    pub constraints: HashMap<String, VersionConstraint>,
    /// Constraints that also retag opaque tags such as "latest"
    pub enforce: HashMap<String, VersionConstraint>,
    /// Report updates without writing files
    pub dry_run: bool,
}

/// Registry state of one repository, filled lazily
#[derive(Debug, Default)]
struct Lookups {
    token: Option<Option<String>>,
    tags: Option<Vec<String>>,
    digests: HashMap<String, String>,
}

impl Lookups {
    fn token<R: Registry + ?Sized>(&mut self, registry: &R, repository: &str) -> Result<Option<String>> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let token = registry.auth_token(repository)?;
        self.token = Some(token.clone());
        Ok(token)
    }

    fn tags<R: Registry + ?Sized>(&mut self, registry: &R, repository: &str) -> Result<&[String]> {
        if self.tags.is_none() {
            let token = self.token(registry, repository)?;
            self.tags = Some(registry.list_tags(repository, token.as_deref())?);
        } else {
            tracing::debug!(repository, "tag list cache hit");
        }
        Ok(self.tags.as_deref().unwrap_or_default())
    }

    fn digest<R: Registry + ?Sized>(
        &mut self,
        registry: &R,
        repository: &str,
        tag: &str,
    ) -> Result<String> {
        if let Some(digest) = self.digests.get(tag) {
            return Ok(digest.clone());
        }
        let token = self.token(registry, repository)?;
        let digest = registry.fetch_digest(repository, token.as_deref(), tag)?;
        self.digests.insert(tag.to_string(), digest.clone());
        Ok(digest)
    }
}

/// Everything needed to resolve tags of one repository
#[derive(Debug)]
pub struct RepositoryContext {
    pub name: String,
    pub constraint: Option<VersionConstraint>,
    pub enforce: bool,
    lookups: Lookups,
}

impl RepositoryContext {
    /// Build the context for `name`; an enforce entry takes precedence over
    /// a plain constraint for the same image.
    pub fn new(name: &str, options: &UpdateOptions) -> Self {
        let (constraint, enforce) = match options.enforce.get(name) {
            Some(constraint) => (Some(constraint.clone()), true),
            None => (options.constraints.get(name).cloned(), false),
        };

        RepositoryContext {
            name: name.to_string(),
            constraint,
            enforce,
            lookups: Lookups::default(),
        }
    }

    /// Resolve the new tag and digest for one occurrence of this repository
    fn update<R: Registry + ?Sized>(
        &mut self,
        registry: &R,
        old_tag: &str,
        old_digest: &str,
    ) -> Result<ReferenceUpdate> {
        let resolver = VersionResolver::new(&self.name, self.constraint.as_ref(), self.enforce);

        let new_tag = if resolver.keeps_tag(old_tag) {
            old_tag.to_string()
        } else {
            let tags = self.lookups.tags(registry, &self.name)?;
            resolver.latest(tags)?
        };
        let new_digest = self.lookups.digest(registry, &self.name, &new_tag)?;

        Ok(ReferenceUpdate {
            repository: self.name.clone(),
            old_tag: old_tag.to_string(),
            new_tag,
            old_digest: old_digest.to_string(),
            new_digest,
        })
    }
}

/// Outcome for a single reference occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceUpdate {
    pub repository: String,
    pub old_tag: String,
    pub new_tag: String,
    pub old_digest: String,
    pub new_digest: String,
}

impl ReferenceUpdate {
    /// Whether the tag or the digest moved
    pub fn changed(&self) -> bool {
        self.old_tag != self.new_tag || self.old_digest != self.new_digest
    }
}

/// A rewritten buffer and the references found in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRewrite {
    pub data: Vec<u8>,
    pub updates: Vec<ReferenceUpdate>,
}

impl FileRewrite {
    pub fn changed(&self) -> bool {
        self.updates.iter().any(ReferenceUpdate::changed)
    }
}

/// Counters for a run over one or more roots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub references_found: usize,
    pub references_updated: usize,
}

impl UpdateSummary {
    fn record(&mut self, rewrite: &FileRewrite) {
        self.files_scanned += 1;
        if rewrite.changed() {
            self.files_changed += 1;
        }
        self.references_found += rewrite.updates.len();
        self.references_updated += rewrite.updates.iter().filter(|u| u.changed()).count();
    }

    /// Add the counters of another run
    pub fn merge(&mut self, other: UpdateSummary) {
        self.files_scanned += other.files_scanned;
        self.files_changed += other.files_changed;
        self.references_found += other.references_found;
        self.references_updated += other.references_updated;
    }
}

/// Updates pinned image references against a registry
pub struct TagUpdater<R: Registry> {
    registry: R,
    options: UpdateOptions,
    repositories: HashMap<String, RepositoryContext>,
}

impl<R: Registry> TagUpdater<R> {
    pub fn new(registry: R, options: UpdateOptions) -> Self {
        TagUpdater {
            registry,
            options,
            repositories: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// Rewrite every reference in `data`.
    ///
    /// Fails on the first reference that cannot be resolved; the error names
    /// the repository and tag.
    pub fn rewrite_buffer(&mut self, data: &[u8]) -> Result<FileRewrite> {
        let TagUpdater {
            registry,
            options,
            repositories,
        } = self;
        let (registry, options) = (&*registry, &*options);
        let mut updates = Vec::new();

        let data = replace_all_submatch(options.pattern.regex(), data, |groups| {
            let repository = String::from_utf8_lossy(groups.get(REPOSITORY_GROUP)).into_owned();
            let old_tag = String::from_utf8_lossy(groups.get(TAG_GROUP)).into_owned();
            let old_digest = String::from_utf8_lossy(groups.get(DIGEST_GROUP)).into_owned();

            let context = repositories
                .entry(repository.clone())
                .or_insert_with(|| RepositoryContext::new(&repository, options));
            let update = context
                .update(registry, &old_tag, &old_digest)
                .map_err(|e| e.in_reference(&repository, &old_tag))?;

            tracing::debug!(
                repository = %update.repository,
                old = %update.old_tag,
                new = %update.new_tag,
                "resolved reference"
            );

            if update.new_tag != update.old_tag {
                groups.set(TAG_GROUP, update.new_tag.as_bytes());
            }
            if update.new_digest != update.old_digest {
                groups.set(DIGEST_GROUP, update.new_digest.as_bytes());
            }
            updates.push(update);
            Ok::<_, UpdateTagsError>(())
        })?;

        Ok(FileRewrite { data, updates })
    }

    /// Rewrite a single file in place.
    ///
    /// The file is only written when a reference changed, and never when
    /// any reference in it failed to resolve.
    pub fn update_file(&mut self, path: &Path) -> Result<FileRewrite> {
        let data = fs::read(path).map_err(|e| UpdateTagsError::io(path, e))?;
        let rewrite = self.rewrite_buffer(&data).map_err(|e| e.in_file(path))?;

        if !rewrite.changed() {
            tracing::debug!(path = %path.display(), references = rewrite.updates.len(), "unchanged");
            return Ok(rewrite);
        }

        ui::display_file_path(path);
        for update in rewrite.updates.iter().filter(|u| u.changed()) {
            ui::display_reference_update(update);
        }

        if !self.options.dry_run {
            fs::write(path, &rewrite.data).map_err(|e| UpdateTagsError::io(path, e))?;
        }
        Ok(rewrite)
    }

    /// Update every regular file under `root` (or `root` itself if it is a
    /// file). `.git` directories are skipped.
    pub fn update_path(&mut self, root: &Path) -> Result<UpdateSummary> {
        let mut summary = UpdateSummary::default();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_git_dir(entry));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rewrite = self.update_file(entry.path())?;
            summary.record(&rewrite);
        }

        Ok(summary)
    }
}

fn is_git_dir(entry: &DirEntry) -> bool {
    let skip = entry.file_type().is_dir() && entry.file_name() == ".git";
    if skip {
        tracing::debug!(path = %entry.path().display(), "skipping git directory");
    }
    skip
}
