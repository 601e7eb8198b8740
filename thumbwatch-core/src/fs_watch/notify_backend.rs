use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Notice, Subscription, WatchBackend, WatchHandle, WatchMessage};
use crate::error::{Result, WatchError};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// [`WatchBackend`] over the platform's recommended `notify` watcher.
///
/// Every root gets its own watcher; subdirectories are added to it
/// non-recursively so the engine decides exactly which directories are
/// observed.
#[derive(Clone, Debug)]
pub struct NotifyBackend {
    channel_capacity: usize,
}

impl Default for NotifyBackend {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl NotifyBackend {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl WatchBackend for NotifyBackend {
    fn subscribe(&self, root: &Path) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel::<WatchMessage>(self.channel_capacity);
        let root_label = root.to_path_buf();

        // Runs on notify's own thread, so blocking sends are fine here.
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for notice in notices_from(event) {
                        if let Err(err) = tx.blocking_send(WatchMessage::Notice(notice)) {
                            debug!(
                                target: "thumbwatch::fs_watch",
                                root = %root_label.display(),
                                "dispatcher gone, dropping {:?}",
                                err.0
                            );
                            return;
                        }
                    }
                }
                Err(err) => {
                    let msg = err.to_string();
                    if tx.blocking_send(WatchMessage::Error(msg)).is_err() {
                        warn!(
                            target: "thumbwatch::fs_watch",
                            root = %root_label.display(),
                            error = %err,
                            "dispatcher gone, dropping watcher error"
                        );
                    }
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|err| WatchError::subscribe(root, format!("failed to create watcher: {err}")))?;

        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .map_err(|err| WatchError::subscribe(root, err))?;

        Ok(Subscription {
            handle: Box::new(NotifyHandle {
                root: root.to_path_buf(),
                watcher: Some(watcher),
            }),
            messages: rx,
        })
    }
}

struct NotifyHandle {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl fmt::Debug for NotifyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyHandle")
            .field("root", &self.root)
            .field("closed", &self.watcher.is_none())
            .finish()
    }
}

impl NotifyHandle {
    fn watcher(&mut self, path: &Path) -> Result<&mut RecommendedWatcher> {
        self.watcher
            .as_mut()
            .ok_or_else(|| WatchError::subscribe(path, "subscription closed"))
    }
}

impl WatchHandle for NotifyHandle {
    fn add(&mut self, path: &Path) -> Result<()> {
        self.watcher(path)?
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|err| WatchError::subscribe(path, err))
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.watcher(path)?
            .unwatch(path)
            .map_err(|err| WatchError::subscribe(path, format!("failed to unwatch: {err}")))
    }

    fn close(&mut self) {
        // Dropping the watcher stops the notify thread and its sender.
        if self.watcher.take().is_some() {
            debug!(target: "thumbwatch::fs_watch", root = %self.root.display(), "closed notify watcher");
        }
    }
}

/// Flatten a notify event into per-path notices.
///
/// Creation and the destination of a rename both count as *created*; access
/// events are noise and dropped; everything else is *other*.
pub(crate) fn notices_from(event: Event) -> Vec<Notice> {
    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(Notice::created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut notices = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                notices.push(Notice::other(from));
            }
            notices.extend(paths.map(Notice::created));
            notices
        }
        _ => event.paths.into_iter().map(Notice::other).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn create_maps_to_created() {
        let notices = notices_from(event(EventKind::Create(CreateKind::File), &["/g/a.png"]));
        assert_eq!(notices, vec![Notice::created("/g/a.png")]);
    }

    #[test]
    fn rename_destination_counts_as_created() {
        let to = notices_from(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/g/b.png"],
        ));
        assert_eq!(to, vec![Notice::created("/g/b.png")]);

        let both = notices_from(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/g/a.png", "/g/b.png"],
        ));
        assert_eq!(
            both,
            vec![Notice::other("/g/a.png"), Notice::created("/g/b.png")]
        );
    }

    #[test]
    fn removals_and_modifications_are_other() {
        let removed = notices_from(event(EventKind::Remove(RemoveKind::File), &["/g/a.png"]));
        assert_eq!(removed, vec![Notice::other("/g/a.png")]);

        let from = notices_from(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/g/a.png"],
        ));
        assert_eq!(from, vec![Notice::other("/g/a.png")]);
    }

    #[test]
    fn access_events_are_ignored() {
        let notices = notices_from(event(EventKind::Access(AccessKind::Any), &["/g/a.png"]));
        assert!(notices.is_empty());
    }

    #[tokio::test]
    async fn subscribing_a_missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        let err = NotifyBackend::default().subscribe(&missing).unwrap_err();
        assert!(matches!(err, WatchError::Subscribe { .. }));
    }
}
