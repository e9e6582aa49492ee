//! Directory-backed portable service.
//!
//! Each instance owns one category and one directory under the site root.
//! Export copies every file of that directory into archive records keyed by
//! the file's relative path; import writes the records back. Both directions
//! walk keys in ascending order and store the last processed key as checkpoint
//! progress, so an interrupted run resumes after that key.

use crate::config::ServiceSpec;
use crate::models::{CategoryName, ExportRequest, Job, PAGES_CATEGORY};
use crate::portability::{PortableService, ServiceContext};
use crate::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

/// Moves the files of `<site_dir>/<directory>` into or out of an archive.
#[derive(Debug, Clone)]
pub struct DirectoryService {
    category: CategoryName,
    parent: Option<CategoryName>,
    priority: i32,
    root: PathBuf,
}

impl DirectoryService {
    /// Creates a service from a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the category is blank or the
    /// directory is not a relative path inside the site root.
    pub fn new(spec: &ServiceSpec, site_dir: &Path) -> Result<Self> {
        let category = CategoryName::parse(&spec.category)?;
        let directory = spec.directory.clone().unwrap_or_else(|| category.key());
        let relative = relative_path(&directory)?;
        Ok(Self {
            parent: CategoryName::parent(&spec.parent),
            priority: spec.priority,
            root: site_dir.join(relative),
            category,
        })
    }

    /// Directory this service reads from and writes to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn filters_pages(&self) -> bool {
        self.category == PAGES_CATEGORY
    }

    /// Runs `step` for every key after the checkpoint's progress.
    ///
    /// Stops early on cancellation or when a checkpoint update asks to stop.
    /// Returns the number of keys processed in this invocation.
    fn process<F>(&self, ctx: &mut ServiceContext<'_>, keys: &[String], mut step: F) -> Result<u64>
    where
        F: FnMut(&ServiceContext<'_>, &str) -> Result<()>,
    {
        let resume_after = ctx.checkpoint().progress.clone();
        ctx.checkpoint_mut().total_items = to_u64(keys.len());

        let mut processed = 0;
        for key in keys
            .iter()
            .filter(|key| resume_after.is_empty() || key.as_str() > resume_after.as_str())
        {
            if ctx.is_cancelled() {
                debug!(category = %self.category, "Cancelled");
                ctx.request_stop();
                break;
            }
            step(&*ctx, key)?;
            processed += 1;

            let checkpoint = ctx.checkpoint_mut();
            checkpoint.progress.clone_from(key);
            checkpoint.processed_items += 1;
            if ctx.update_checkpoint()? {
                debug!(category = %self.category, last = %key, "Stop requested");
                break;
            }
        }
        Ok(processed)
    }
}

impl PortableService for DirectoryService {
    fn category(&self) -> CategoryName {
        self.category.clone()
    }

    fn parent(&self) -> Option<CategoryName> {
        self.parent.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    #[instrument(skip_all, fields(category = %self.category, job_id = %job.id))]
    fn export_data(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        job: &Job,
        request: &ExportRequest,
    ) -> Result<()> {
        let keys: Vec<String> = list_files(&self.root)?
            .into_iter()
            .filter(|key| !self.filters_pages() || request.includes_page(page_path(key)))
            .collect();

        let processed = self.process(ctx, &keys, |ctx, key| {
            let path = self.root.join(relative_path(key)?);
            let bytes = fs::read(&path)
                .map_err(|e| Error::operation("read_site_file", format!("{}: {e}", path.display())))?;
            ctx.archive().put_record(&self.category, key, &bytes)
        })?;

        ctx.result()
            .add_summary("Files", format!("{}: {processed}", self.category));
        Ok(())
    }

    #[instrument(skip_all, fields(category = %self.category, job_id = %job.id))]
    fn import_data(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        job: &Job,
        _exported: &ExportRequest,
    ) -> Result<()> {
        let keys = ctx.archive().record_keys(&self.category)?;

        let processed = self.process(ctx, &keys, |ctx, key| {
            let payload = ctx
                .archive()
                .record(&self.category, key)?
                .ok_or_else(|| Error::NotFound(format!("record {}/{key}", self.category)))?;
            let path = self.root.join(relative_path(key)?);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::operation("create_site_dir", format!("{}: {e}", parent.display())))?;
            }
            fs::write(&path, payload)
                .map_err(|e| Error::operation("write_site_file", format!("{}: {e}", path.display())))
        })?;

        ctx.result()
            .add_summary("Files", format!("{}: {processed}", self.category));
        Ok(())
    }
}

/// Validates a `/`-separated relative path that must stay inside its root.
fn relative_path(key: &str) -> Result<PathBuf> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && !key.contains('\\')
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if valid {
        Ok(path.to_path_buf())
    } else {
        Err(Error::InvalidInput(format!("'{key}' is not a relative path")))
    }
}

/// Lists regular files below `root` as sorted `/`-separated relative keys.
///
/// A missing root yields no files.
fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    if root.is_dir() {
        collect_files(root, "", &mut keys)?;
    }
    keys.sort();
    Ok(keys)
}

fn collect_files(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
    let read_err = |e: std::io::Error| Error::operation("read_site_dir", format!("{}: {e}", dir.display()));
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let file_type = entry.file_type().map_err(read_err)?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &key, keys)?;
        } else if file_type.is_file() {
            keys.push(key);
        }
    }
    Ok(())
}

/// Page path of a file key: the key without its file extension.
fn page_path(key: &str) -> &str {
    let name_start = key.rfind('/').map_or(0, |slash| slash + 1);
    match key.rfind('.') {
        Some(dot) if dot > name_start => key.get(..dot).unwrap_or(key),
        _ => key,
    }
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("about.html", "about" ; "simple")]
    #[test_case("docs/install.md", "docs/install" ; "nested")]
    #[test_case("docs/README", "docs/README" ; "no extension")]
    #[test_case("v1.2/notes", "v1.2/notes" ; "dot in directory")]
    #[test_case(".hidden", ".hidden" ; "dotfile")]
    fn test_page_path(key: &str, expected: &str) {
        assert_eq!(page_path(key), expected);
    }

    #[test_case("pages" ; "plain")]
    #[test_case("docs/install.md" ; "nested")]
    fn test_relative_path_accepts(key: &str) {
        assert!(relative_path(key).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("/etc/passwd" ; "absolute")]
    #[test_case("../escape" ; "parent")]
    #[test_case("a/../../b" ; "nested parent")]
    #[test_case("a\\b" ; "backslash")]
    fn test_relative_path_rejects(key: &str) {
        assert!(relative_path(key).is_err());
    }

    #[test]
    fn test_list_files_sorted_and_nested() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("docs/c.txt"), "c").unwrap();

        assert_eq!(list_files(dir.path()).unwrap(), vec!["a.txt", "b.txt", "docs/c.txt"]);
        assert!(list_files(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_new_from_spec() {
        let site = Path::new("/srv/site");
        let mut spec = ServiceSpec::child("Page-Versions", "pages", 5);
        let service = DirectoryService::new(&spec, site).unwrap();
        assert_eq!(service.root(), Path::new("/srv/site/page-versions"));
        assert_eq!(service.parent(), Some(CategoryName::new("PAGES")));
        assert_eq!(service.priority(), 5);

        spec.directory = Some("../elsewhere".to_string());
        assert!(DirectoryService::new(&spec, site).is_err());
        assert!(DirectoryService::new(&ServiceSpec::root(" ", 0), site).is_err());
    }
}
