//! Event sources owned by the watch loop.

use std::path::{Path, PathBuf};

use core_events::{AsyncEventSource, Event};
use core_images::CacheUpdated;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Emits `Event::SourceChanged` when the watched file is written, created or
/// removed. The parent directory is watched so atomic saves (write to temp,
/// rename over) are seen.
pub struct FileWatchSource {
    path: PathBuf,
}

impl FileWatchSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_relevant(event: &notify::Event, target: &Path) -> bool {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == target.file_name())
}

impl AsyncEventSource for FileWatchSource {
    fn name(&self) -> &'static str {
        "file_watch"
    }

    fn spawn(self: Box<Self>, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        let path = self.path;
        tokio::spawn(async move {
            let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<()>();
            let target = path.clone();
            let watcher = notify::recommended_watcher(
                move |res: Result<notify::Event, notify::Error>| match res {
                    Ok(event) if is_relevant(&event, &target) => {
                        let _ = raw_tx.send(());
                    }
                    Ok(_) => {}
                    Err(err) => warn!(target: "runtime.watch", error = %err, "notify_error"),
                },
            );
            let mut watcher = match watcher {
                Ok(w) => w,
                Err(err) => {
                    warn!(target: "runtime.watch", error = %err, "watcher_create_failed");
                    return;
                }
            };
            let dir = watch_dir(&path);
            if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                warn!(target: "runtime.watch", dir = %dir.display(), error = %err, "watch_failed");
                return;
            }
            info!(target: "runtime.watch", path = %path.display(), "watching_source");

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    changed = raw_rx.recv() => {
                        if changed.is_none() {
                            break;
                        }
                        debug!(target: "runtime.watch", "source_changed");
                        if tx.send(Event::SourceChanged(path.clone())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            drop(watcher);
        })
    }
}

/// Forwards image cache completions into the event channel.
pub struct ImageUpdateSource {
    updates: broadcast::Receiver<CacheUpdated>,
}

impl ImageUpdateSource {
    pub fn new(updates: broadcast::Receiver<CacheUpdated>) -> Self {
        Self { updates }
    }
}

impl AsyncEventSource for ImageUpdateSource {
    fn name(&self) -> &'static str {
        "image_updates"
    }

    fn spawn(self: Box<Self>, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        let mut updates = self.updates;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    update = updates.recv() => match update {
                        Ok(CacheUpdated { base_uri, uri }) => {
                            if tx.send(Event::ImageReady { base_uri, uri }).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(target: "runtime.images", skipped, "image_updates_lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::time::Duration;

    #[test]
    fn only_mutations_of_the_target_are_relevant() {
        let target = Path::new("/docs/notes.md");
        let modify = notify::Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/docs/notes.md"));
        assert!(is_relevant(&modify, target));

        let other = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/docs/other.md"));
        assert!(!is_relevant(&other, target));

        let access = notify::Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/docs/notes.md"));
        assert!(!is_relevant(&access, target));
    }

    #[test]
    fn bare_file_name_watches_current_dir() {
        assert_eq!(watch_dir(Path::new("notes.md")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("a/notes.md")), PathBuf::from("a"));
    }

    #[tokio::test]
    async fn image_updates_are_forwarded() {
        let (updates_tx, updates_rx) = broadcast::channel(4);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = Box::new(ImageUpdateSource::new(updates_rx)).spawn(tx);

        updates_tx
            .send(CacheUpdated {
                base_uri: "doc.md".into(),
                uri: "a.png".into(),
            })
            .unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            got,
            Some(Event::ImageReady {
                base_uri: "doc.md".into(),
                uri: "a.png".into(),
            })
        );

        drop(updates_tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
