//! Change notifications for a directory tree, read from inotify on a
//! dedicated thread and forwarded to the async watcher.

use std::{
    path::{Path, PathBuf},
    thread::JoinHandle,
};

use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;
#[cfg(target_os = "linux")]
use {
    anyhow::Context,
    nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor},
    std::collections::HashMap,
    tracing::warn,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEvent {
    /// A file was closed after writing, or moved into the tree.
    Written(PathBuf),
    /// Events may have been missed; the whole tree has to be scanned.
    Rescan,
    /// Notifications stopped and will not resume.
    Unavailable(String),
}

#[cfg(target_os = "linux")]
fn add_tree(
    inotify: &Inotify,
    dir: &Path,
    mask: AddWatchFlags,
    dirs: &mut HashMap<WatchDescriptor, PathBuf>,
) -> Result<()> {
    let wd = inotify
        .add_watch(dir, mask)
        .with_context(|| format!("inotify add watch {} failed", dir.display()))?;
    dirs.insert(wd, dir.to_path_buf());
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            add_tree(inotify, &entry.path(), mask, dirs)?;
        }
    }
    Ok(())
}

/// Watches `root` and every directory below it, including ones created
/// later, until the receiving side of `tx` goes away.
#[cfg(target_os = "linux")]
pub fn spawn_watch_thread(root: &Path, tx: UnboundedSender<DirEvent>) -> Result<JoinHandle<()>> {
    let watch_mask =
        AddWatchFlags::IN_CREATE | AddWatchFlags::IN_CLOSE_WRITE | AddWatchFlags::IN_MOVED_TO;

    let inotify = Inotify::init(InitFlags::IN_CLOEXEC).context("inotify init failed")?;
    let mut dirs = HashMap::new();
    add_tree(&inotify, root, watch_mask, &mut dirs)?;

    Ok(std::thread::spawn(move || loop {
        let events = match inotify.read_events() {
            Ok(events) => events,
            Err(error) => {
                let _ = tx.send(DirEvent::Unavailable(format!(
                    "inotify read failed: {error}"
                )));
                return;
            }
        };

        for event in events {
            if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
                if tx.send(DirEvent::Rescan).is_err() {
                    return;
                }
                continue;
            }
            if event.mask.contains(AddWatchFlags::IN_IGNORED) {
                dirs.remove(&event.wd);
                continue;
            }
            let Some(path) = dirs
                .get(&event.wd)
                .zip(event.name.as_ref())
                .map(|(dir, name)| dir.join(name))
            else {
                continue;
            };

            let signal = if event.mask.contains(AddWatchFlags::IN_ISDIR) {
                // Files may land in a new directory before its watch exists.
                if let Err(e) = add_tree(&inotify, &path, watch_mask, &mut dirs) {
                    warn!(dir = %path.display(), "unable to watch new directory: {:?}", e);
                }
                Some(DirEvent::Rescan)
            } else if event
                .mask
                .intersects(AddWatchFlags::IN_CLOSE_WRITE | AddWatchFlags::IN_MOVED_TO)
            {
                Some(DirEvent::Written(path))
            } else {
                None
            };
            if let Some(signal) = signal {
                if tx.send(signal).is_err() {
                    return;
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
pub fn spawn_watch_thread(_root: &Path, _tx: UnboundedSender<DirEvent>) -> Result<JoinHandle<()>> {
    Err(anyhow::anyhow!(
        "directory notifications are unavailable on this platform"
    ))
}
