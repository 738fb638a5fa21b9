//! Workspace stager
//!
//! Materializes the minimal file set one execution needs into a fresh,
//! uniquely named temporary directory:
//! - every `visible` file, always
//! - `grading` files and course-level global files for the grade command
//! - `solution` files when the reference solution is being exercised
//!
//! Missing files are reported individually and never abort staging.

use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

use crate::core::{CommandKind, ValidationError};
use crate::task::TaskDescriptor;

/// What to stage for one execution
#[derive(Debug, Clone, Copy)]
pub struct StagePlan<'a> {
    pub kind: CommandKind,
    /// Also copy the task's solution files
    pub with_solution: bool,
    /// Files relative to `course_root`, copied for the grade command only
    pub global_files: &'a [String],
    pub course_root: Option<&'a Path>,
}

impl<'a> StagePlan<'a> {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            with_solution: false,
            global_files: &[],
            course_root: None,
        }
    }

    pub fn with_solution(mut self, value: bool) -> Self {
        self.with_solution = value;
        self
    }

    pub fn with_global_files(mut self, files: &'a [String], course_root: Option<&'a Path>) -> Self {
        self.global_files = files;
        self.course_root = course_root;
        self
    }
}

/// Ephemeral directory owned by exactly one execution.
///
/// Removed when dropped, whichever way the execution ended.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("access-ws-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now, logging instead of failing
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove workspace {:?}: {}", path, e);
        }
    }
}

/// A staged workspace plus the per-file problems found while staging
#[derive(Debug)]
pub struct Staged {
    pub workspace: Workspace,
    pub errors: Vec<ValidationError>,
}

/// Stage the files required by `plan` for `task`
pub async fn stage(task: &TaskDescriptor, plan: &StagePlan<'_>) -> Result<Staged, ValidationError> {
    let workspace = Workspace::new().map_err(|e| ValidationError::Workspace {
        task: task.root.clone(),
        reason: e.to_string(),
    })?;

    let mut sources: Vec<(PathBuf, &str)> = Vec::new();
    for file in &task.files.visible {
        sources.push((task.root.clone(), file.as_str()));
    }
    if plan.kind == CommandKind::Grade {
        for file in &task.files.grading {
            sources.push((task.root.clone(), file.as_str()));
        }
    }
    if plan.with_solution {
        for file in &task.files.solution {
            sources.push((task.root.clone(), file.as_str()));
        }
    }

    let mut errors = Vec::new();

    if plan.kind == CommandKind::Grade {
        match plan.course_root {
            Some(root) => {
                for file in plan.global_files {
                    sources.push((root.to_path_buf(), file.as_str()));
                }
            }
            None => {
                for file in plan.global_files {
                    errors.push(ValidationError::MissingStagedFile {
                        task: task.root.clone(),
                        file: format!("{} (no course root given)", file),
                    });
                }
            }
        }
    }

    for (base, rel) in sources {
        if let Err(e) = copy_into(&base, rel, workspace.path()).await {
            errors.push(match e {
                CopyError::Missing => ValidationError::MissingStagedFile {
                    task: task.root.clone(),
                    file: rel.to_string(),
                },
                CopyError::Escapes => ValidationError::ManifestViolation {
                    task: task.root.clone(),
                    message: format!("{} points outside of its root", rel),
                },
                CopyError::Io(reason) => ValidationError::Workspace {
                    task: task.root.clone(),
                    reason: format!("copying {}: {}", rel, reason),
                },
            });
        }
    }

    debug!(
        "Staged {} for {:?} in {:?} ({} problems)",
        plan.kind,
        task.root,
        workspace.path(),
        errors.len()
    );

    Ok(Staged { workspace, errors })
}

enum CopyError {
    Missing,
    Escapes,
    Io(std::io::Error),
}

/// Copy `base/rel` to `dest/rel`, creating intermediate directories
async fn copy_into(base: &Path, rel: &str, dest: &Path) -> Result<(), CopyError> {
    let rel_path = Path::new(rel);
    if !is_contained(rel_path) {
        return Err(CopyError::Escapes);
    }

    let source = base.join(rel_path);
    if !fs::metadata(&source)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        return Err(CopyError::Missing);
    }

    let target = dest.join(rel_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await.map_err(CopyError::Io)?;
    }
    fs::copy(&source, &target).await.map_err(CopyError::Io)?;
    Ok(())
}

/// Only plain relative paths may be staged
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
