// Copyright 2025 Archon (https://github.com/archon-engine)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! git2-based [`GitBackend`] implementation.
//!
//! Everything runs in-process through libgit2. `git2::Repository` is not
//! `Sync`, so the handle lives behind a mutex; operations are short and
//! the engine serializes mutations anyway.
//!
//! LFS note: libgit2 cannot shell out to `git-lfs`, so "LFS init" writes
//! the `filter.lfs.*` config entries and tracking patterns go to
//! `.gitattributes` — the same state `git lfs install`/`git lfs track`
//! produce, which downstream tooling consumes.

use crate::backend::{
    CommitInfo, FileChange, FileChangeKind, GitBackend, RepoStatus, TagInfo,
};
use crate::error::{VcsError, VcsResult};
use archon_core::Author;
use chrono::{DateTime, Utc};
use git2::{
    build::CheckoutBuilder, Delta, IndexAddOption, ObjectType, Repository, Signature,
    StatusOptions,
};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const GITIGNORE_BODY: &str = ".archon/\nbackups/\n*.tmp\n";

pub struct Git2Backend {
    repo: Mutex<Repository>,
    workdir: PathBuf,
}

fn time_to_utc(time: git2::Time) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

impl Git2Backend {
    /// Initialize a fresh repository (idempotent) and seed `.gitignore`
    /// so caches, backups, and temp files stay untracked.
    pub fn init(workdir: impl AsRef<Path>) -> VcsResult<Self> {
        let workdir = workdir.as_ref().to_path_buf();
        let repo = Repository::init(&workdir)?;
        let gitignore = workdir.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, GITIGNORE_BODY)?;
        }
        debug!(path = %workdir.display(), "initialized repository");
        Ok(Self {
            repo: Mutex::new(repo),
            workdir,
        })
    }

    /// Open an existing repository.
    pub fn open(workdir: impl AsRef<Path>) -> VcsResult<Self> {
        let workdir = workdir.as_ref().to_path_buf();
        let repo = Repository::open(&workdir)
            .map_err(|_| VcsError::NotARepository(workdir.display().to_string()))?;
        Ok(Self {
            repo: Mutex::new(repo),
            workdir,
        })
    }

    /// Whether `path` already hosts a repository.
    pub fn repository_exists(path: impl AsRef<Path>) -> bool {
        Repository::open(path.as_ref()).is_ok()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn signature(author: &Author) -> VcsResult<Signature<'static>> {
        Ok(Signature::now(&author.name, &author.email)?)
    }
}

impl GitBackend for Git2Backend {
    fn is_repository(&self) -> bool {
        true
    }

    fn status(&self) -> VcsResult<RepoStatus> {
        let repo = self.repo.lock();
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .exclude_submodules(true);
        let statuses = repo.statuses(Some(&mut options))?;
        let dirty_paths: Vec<String> = statuses
            .iter()
            .filter_map(|entry| entry.path().map(String::from))
            .collect();
        Ok(RepoStatus {
            clean: dirty_paths.is_empty(),
            dirty_paths,
        })
    }

    fn stage_all(&self) -> VcsResult<()> {
        let repo = self.repo.lock();
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str, author: &Author) -> VcsResult<String> {
        let repo = self.repo.lock();
        let signature = Self::signature(author)?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        debug!(commit = %oid, "committed");
        Ok(oid.to_string())
    }

    fn tag(&self, name: &str, message: &str) -> VcsResult<()> {
        let repo = self.repo.lock();
        let head = repo
            .head()
            .map_err(|_| VcsError::EmptyRepository)?
            .peel(ObjectType::Commit)?;
        let tagger = Self::signature(&Author::default())?;
        repo.tag(name, &head, &tagger, message, false)?;
        Ok(())
    }

    fn list_tags(&self) -> VcsResult<Vec<TagInfo>> {
        let repo = self.repo.lock();
        let names = repo.tag_names(None)?;
        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            let object = match repo.revparse_single(&format!("refs/tags/{name}")) {
                Ok(object) => object,
                Err(_) => continue,
            };
            let info = match object.as_tag() {
                Some(tag) => TagInfo {
                    name: name.to_string(),
                    target: tag.target_id().to_string(),
                    message: tag.message().unwrap_or("").trim_end().to_string(),
                    created_at: tag
                        .tagger()
                        .map(|sig| time_to_utc(sig.when()))
                        .unwrap_or_default(),
                },
                None => {
                    let commit = object.peel_to_commit()?;
                    TagInfo {
                        name: name.to_string(),
                        target: commit.id().to_string(),
                        message: String::new(),
                        created_at: time_to_utc(commit.time()),
                    }
                }
            };
            tags.push(info);
        }
        Ok(tags)
    }

    fn delete_tag(&self, name: &str) -> VcsResult<()> {
        let repo = self.repo.lock();
        repo.tag_delete(name)
            .map_err(|_| VcsError::SnapshotNotFound(name.to_string()))
    }

    fn checkout(&self, reference: &str) -> VcsResult<()> {
        let repo = self.repo.lock();
        let object = repo
            .revparse_single(reference)
            .map_err(|_| VcsError::RefNotFound(reference.to_string()))?;
        let mut builder = CheckoutBuilder::new();
        builder.force();
        repo.checkout_tree(&object, Some(&mut builder))?;
        Ok(())
    }

    fn history(&self, limit: usize) -> VcsResult<Vec<CommitInfo>> {
        let repo = self.repo.lock();
        if repo.head().is_err() {
            return Ok(Vec::new());
        }
        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        let mut commits = Vec::new();
        for oid in walk {
            if commits.len() >= limit {
                break;
            }
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            commits.push(CommitInfo {
                id: oid.to_string(),
                message: commit.summary().unwrap_or("").to_string(),
                author: commit.author().name().unwrap_or("").to_string(),
                created_at: time_to_utc(commit.time()),
            });
        }
        Ok(commits)
    }

    fn read_file_at(&self, reference: &str, path: &str) -> VcsResult<Option<Vec<u8>>> {
        let repo = self.repo.lock();
        let spec = format!("{reference}:{path}");
        let result = match repo.revparse_single(&spec) {
            Ok(object) => Ok(object.as_blob().map(|blob| blob.content().to_vec())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        };
        result
    }

    fn list_dir_at(&self, reference: &str, dir: &str) -> VcsResult<Vec<String>> {
        let repo = self.repo.lock();
        let spec = format!("{reference}:{dir}");
        let object = match repo.revparse_single(&spec) {
            Ok(object) => object,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let Some(tree) = object.as_tree() else {
            return Ok(Vec::new());
        };
        Ok(tree
            .iter()
            .filter_map(|entry| entry.name().map(String::from))
            .collect())
    }

    fn diff_paths(&self, ref_a: &str, ref_b: &str) -> VcsResult<Vec<FileChange>> {
        let repo = self.repo.lock();
        let tree_a = repo
            .revparse_single(ref_a)
            .map_err(|_| VcsError::RefNotFound(ref_a.to_string()))?
            .peel_to_tree()?;
        let tree_b = repo
            .revparse_single(ref_b)
            .map_err(|_| VcsError::RefNotFound(ref_b.to_string()))?
            .peel_to_tree()?;
        let diff = repo.diff_tree_to_tree(Some(&tree_a), Some(&tree_b), None)?;
        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let kind = match delta.status() {
                Delta::Added => FileChangeKind::Added,
                Delta::Deleted => FileChangeKind::Removed,
                _ => FileChangeKind::Modified,
            };
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            changes.push(FileChange { path, kind });
        }
        Ok(changes)
    }

    fn set_remote_url(&self, url: &str) -> VcsResult<()> {
        let repo = self.repo.lock();
        if repo.find_remote("origin").is_ok() {
            repo.remote_set_url("origin", url)?;
        } else {
            repo.remote("origin", url)?;
        }
        Ok(())
    }

    fn get_remote_url(&self) -> VcsResult<Option<String>> {
        let repo = self.repo.lock();
        let result = match repo.find_remote("origin") {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        };
        result
    }

    fn init_lfs(&self) -> VcsResult<()> {
        let repo = self.repo.lock();
        let mut config = repo.config()?;
        config.set_str("filter.lfs.clean", "git-lfs clean -- %f")?;
        config.set_str("filter.lfs.smudge", "git-lfs smudge -- %f")?;
        config.set_str("filter.lfs.process", "git-lfs filter-process")?;
        config.set_bool("filter.lfs.required", true)?;
        Ok(())
    }

    fn track_lfs_pattern(&self, pattern: &str) -> VcsResult<()> {
        let attributes = self.workdir.join(".gitattributes");
        let line = format!("{pattern} filter=lfs diff=lfs merge=lfs -text");
        let current = fs::read_to_string(&attributes).unwrap_or_default();
        if current.lines().any(|existing| existing.trim() == line) {
            return Ok(());
        }
        let mut body = current;
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        body.push_str(&line);
        body.push('\n');
        fs::write(&attributes, body)?;
        Ok(())
    }

    fn is_lfs_enabled(&self) -> VcsResult<bool> {
        let repo = self.repo.lock();
        let config = repo.config()?;
        Ok(config.get_string("filter.lfs.clean").is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, Git2Backend) {
        let dir = TempDir::new().unwrap();
        let backend = Git2Backend::init(dir.path()).unwrap();
        (dir, backend)
    }

    fn write_and_commit(dir: &TempDir, backend: &Git2Backend, name: &str, body: &str) -> String {
        fs::write(dir.path().join(name), body).unwrap();
        backend.stage_all().unwrap();
        backend.commit(&format!("add {name}"), &Author::default()).unwrap()
    }

    #[test]
    fn test_init_commit_history() {
        let (dir, backend) = backend();
        assert!(Git2Backend::repository_exists(dir.path()));
        assert!(backend.history(10).unwrap().is_empty());

        write_and_commit(&dir, &backend, "a.txt", "one");
        write_and_commit(&dir, &backend, "b.txt", "two");

        let history = backend.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "add b.txt");
    }

    #[test]
    fn test_status_reflects_dirty_tree() {
        let (dir, backend) = backend();
        write_and_commit(&dir, &backend, "a.txt", "one");
        assert!(backend.status().unwrap().clean);

        fs::write(dir.path().join("a.txt"), "changed").unwrap();
        let status = backend.status().unwrap();
        assert!(!status.clean);
        assert_eq!(status.dirty_paths, vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_annotated_tags_round_trip() {
        let (dir, backend) = backend();
        let commit = write_and_commit(&dir, &backend, "a.txt", "one");
        backend.tag("v1", "first cut").unwrap();

        let tags = backend.list_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1");
        assert_eq!(tags[0].target, commit);
        assert_eq!(tags[0].message, "first cut");

        // Duplicate tag names are a git error.
        assert!(backend.tag("v1", "again").is_err());

        backend.delete_tag("v1").unwrap();
        assert!(backend.list_tags().unwrap().is_empty());
        assert!(matches!(
            backend.delete_tag("v1"),
            Err(VcsError::SnapshotNotFound(_))
        ));
        // The commit survives tag deletion.
        assert_eq!(backend.history(10).unwrap()[0].id, commit);
    }

    #[test]
    fn test_read_file_and_list_dir_at_ref() {
        let (dir, backend) = backend();
        fs::create_dir_all(dir.path().join("nodes")).unwrap();
        fs::write(dir.path().join("nodes/x.json"), "{}").unwrap();
        backend.stage_all().unwrap();
        backend.commit("seed", &Author::default()).unwrap();
        backend.tag("v1", "").unwrap();

        fs::write(dir.path().join("nodes/y.json"), "{}").unwrap();
        backend.stage_all().unwrap();
        backend.commit("more", &Author::default()).unwrap();

        assert_eq!(backend.list_dir_at("v1", "nodes").unwrap(), vec!["x.json"]);
        let mut head = backend.list_dir_at("HEAD", "nodes").unwrap();
        head.sort();
        assert_eq!(head, vec!["x.json", "y.json"]);
        assert_eq!(
            backend.read_file_at("v1", "nodes/x.json").unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(backend.read_file_at("v1", "nodes/y.json").unwrap(), None);
    }

    #[test]
    fn test_checkout_restores_working_tree() {
        let (dir, backend) = backend();
        write_and_commit(&dir, &backend, "a.txt", "original");
        backend.tag("v1", "").unwrap();
        write_and_commit(&dir, &backend, "a.txt", "rewritten");

        backend.checkout("v1").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "original");
    }

    #[test]
    fn test_diff_paths() {
        let (dir, backend) = backend();
        write_and_commit(&dir, &backend, "keep.txt", "same");
        write_and_commit(&dir, &backend, "mod.txt", "v1");
        backend.tag("before", "").unwrap();
        fs::write(dir.path().join("mod.txt"), "v2").unwrap();
        fs::write(dir.path().join("new.txt"), "hello").unwrap();
        backend.stage_all().unwrap();
        backend.commit("change", &Author::default()).unwrap();

        let changes = backend.diff_paths("before", "HEAD").unwrap();
        let find = |p: &str| changes.iter().find(|c| c.path == p).map(|c| c.kind);
        assert_eq!(find("mod.txt"), Some(FileChangeKind::Modified));
        assert_eq!(find("new.txt"), Some(FileChangeKind::Added));
        assert_eq!(find("keep.txt"), None);
    }

    #[test]
    fn test_remote_and_lfs_plumbing() {
        let (dir, backend) = backend();
        assert_eq!(backend.get_remote_url().unwrap(), None);
        backend.set_remote_url("https://example.com/repo.git").unwrap();
        assert_eq!(
            backend.get_remote_url().unwrap().as_deref(),
            Some("https://example.com/repo.git")
        );

        assert!(!backend.is_lfs_enabled().unwrap());
        backend.init_lfs().unwrap();
        assert!(backend.is_lfs_enabled().unwrap());

        backend.track_lfs_pattern("attachments/**").unwrap();
        backend.track_lfs_pattern("attachments/**").unwrap();
        let attrs = fs::read_to_string(dir.path().join(".gitattributes")).unwrap();
        assert_eq!(attrs.matches("attachments/**").count(), 1);
    }
}
