#[path = "support/mod.rs"]
mod support;

use std::collections::BTreeSet;
use std::fs;

use thumbwatch_core::{
    EventKind, MirrorPolicy, ReconcileReport, ThumbWatcher, ThumbnailPrefs, WatchError,
};
use tokio::sync::mpsc;

use support::{ManualBackend, drain, gallery, image_size, write_png};

fn populated_gallery(root: &std::path::Path) {
    let album = root.join("album");
    let nested = album.join("2024");
    fs::create_dir_all(&nested).unwrap();
    fs::create_dir(root.join(".private")).unwrap();

    write_png(&root.join("cover.png"), 40, 40);
    write_png(&album.join("a.png"), 40, 30);
    write_png(&album.join("b.png"), 30, 40);
    write_png(&nested.join("deep.png"), 10, 10);
    write_png(&root.join(".private").join("secret.png"), 10, 10);
    fs::write(album.join("readme.txt"), b"not an image").unwrap();
}

#[tokio::test]
async fn reconcile_catches_up_and_is_idempotent() {
    let backend = ManualBackend::new();
    let watcher = ThumbWatcher::builder()
        .prefs(ThumbnailPrefs::new(8, 8))
        .policy(MirrorPolicy::default())
        .backend(backend.clone())
        .build();
    let (_tmp, root) = gallery();
    populated_gallery(&root);

    let (tx, mut rx) = mpsc::channel(64);
    watcher.add_root(&root, tx).await.unwrap();

    let first = watcher.reconcile(&root).await.unwrap();
    assert_eq!(
        first,
        ReconcileReport {
            subdirs_watched: 1,
            thumbnails_scheduled: 3,
            thumbnails_present: 0,
        }
    );
    watcher.wait_for_jobs().await;

    let events = drain(&mut rx);
    let created: BTreeSet<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::ThumbnailCreated)
        .map(|e| e.path.clone())
        .collect();
    assert_eq!(
        created,
        BTreeSet::from([
            root.join(".thumbs").join("cover.png"),
            root.join("album").join(".thumbs").join("a.png"),
            root.join("album").join(".thumbs").join("b.png"),
        ])
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::SubdirWatched)
            .count(),
        1
    );
    assert!(events.iter().all(|e| !e.is_error()), "{events:?}");
    assert_eq!(image_size(&root.join("album/.thumbs/a.png")), (8, 8));

    // Depth 0 only: the nested year folder is neither watched nor thumbnailed.
    assert_eq!(
        watcher.subdirs(&root).await.unwrap(),
        BTreeSet::from([root.join("album")])
    );
    assert!(!root.join("album/2024/.thumbs").exists());
    assert!(!root.join(".private/.thumbs").exists());

    let second = watcher.reconcile(&root).await.unwrap();
    assert_eq!(second.subdirs_watched, 0);
    assert_eq!(second.thumbnails_scheduled, 0);
    assert_eq!(second.thumbnails_present, 3);
    assert!(second.is_noop());
    watcher.wait_for_jobs().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn reconcile_follows_the_depth_limit() {
    let backend = ManualBackend::new();
    let watcher = ThumbWatcher::builder()
        .prefs(ThumbnailPrefs::new(4, 4))
        .policy(MirrorPolicy::default().with_max_depth(1))
        .backend(backend.clone())
        .build();
    let (_tmp, root) = gallery();
    populated_gallery(&root);

    let (tx, _rx) = mpsc::channel(64);
    watcher.add_root(&root, tx).await.unwrap();

    let report = watcher.reconcile(&root).await.unwrap();
    assert_eq!(report.subdirs_watched, 2);
    assert_eq!(report.thumbnails_scheduled, 4);
    watcher.wait_for_jobs().await;

    assert!(root.join("album/2024/.thumbs/deep.png").exists());
    assert!(backend.watched(&root).contains(&root.join("album/2024")));
}

#[tokio::test]
async fn reconcile_requires_a_watched_root() {
    let watcher = ThumbWatcher::builder()
        .backend(ManualBackend::new())
        .build();
    let (_tmp, root) = gallery();
    assert!(matches!(
        watcher.reconcile(&root).await,
        Err(WatchError::RootNotWatched(_))
    ));
}

#[tokio::test]
async fn reconcile_skips_existing_thumbnails() {
    let backend = ManualBackend::new();
    let watcher = ThumbWatcher::builder()
        .policy(MirrorPolicy::default())
        .backend(backend.clone())
        .build();
    let (_tmp, root) = gallery();
    write_png(&root.join("kept.png"), 20, 20);
    fs::create_dir(root.join(".thumbs")).unwrap();
    fs::write(root.join(".thumbs/kept.png"), b"stale but present").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    watcher.add_root(&root, tx).await.unwrap();
    let report = watcher.reconcile(&root).await.unwrap();

    assert_eq!(report.thumbnails_present, 1);
    assert_eq!(report.thumbnails_scheduled, 0);
    watcher.wait_for_jobs().await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(
        fs::read(root.join(".thumbs/kept.png")).unwrap(),
        b"stale but present"
    );
}
