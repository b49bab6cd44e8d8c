//! Asset lookup: resolve `\includegraphics` targets against an assets directory.
//!
//! The normaliser only asks "does this asset exist?"; the driver asks for the
//! copy. Both go through [`AssetResolver`] so tests can swap in an in-memory
//! resolver and the server can point every request at one shared directory.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Filesystem-facing capability consumed by the normaliser and the driver.
pub trait AssetResolver: Send + Sync {
    /// `true` when `name` refers to an existing asset file.
    fn asset_exists(&self, name: &str) -> bool;

    /// Copy `name` into `destination_dir`, keeping its relative path so the
    /// `\includegraphics{...}` argument still resolves from there.
    fn copy_asset(&self, name: &str, destination_dir: &Path) -> io::Result<()>;

    /// Async form of [`copy_asset`](Self::copy_asset) used by the driver.
    /// Resolvers that touch the disk should move the copy off the runtime.
    fn stage_asset<'a>(
        &'a self,
        name: &'a str,
        destination_dir: &'a Path,
    ) -> BoxFuture<'a, io::Result<()>> {
        async move { self.copy_asset(name, destination_dir) }.boxed()
    }
}

/// Resolver backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name` inside the assets directory, or `None` if the name
    /// would escape it (absolute paths, `..`, drive prefixes).
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let relative = confined_relative(name)?;
        Some(self.root.join(relative))
    }
}

impl AssetResolver for AssetDir {
    fn asset_exists(&self, name: &str) -> bool {
        self.locate(name).is_some_and(|p| p.is_file())
    }

    fn copy_asset(&self, name: &str, destination_dir: &Path) -> io::Result<()> {
        let source = self.locate(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("asset name '{}' escapes the assets directory", name),
            )
        })?;
        // `locate` succeeded, so the relative form is known to be clean.
        let target = destination_dir.join(confined_relative(name).unwrap_or_default());
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, &target)?;
        debug!("Staged asset {} -> {}", source.display(), target.display());
        Ok(())
    }

    fn stage_asset<'a>(
        &'a self,
        name: &'a str,
        destination_dir: &'a Path,
    ) -> BoxFuture<'a, io::Result<()>> {
        let resolver = self.clone();
        let name = name.to_string();
        let destination_dir = destination_dir.to_path_buf();
        async move {
            tokio::task::spawn_blocking(move || resolver.copy_asset(&name, &destination_dir))
                .await
                .map_err(io::Error::other)?
        }
        .boxed()
    }
}

/// Reject names that are absolute or climb out of their base directory.
fn confined_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
