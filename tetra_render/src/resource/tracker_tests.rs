//! Unit tests for tracker.rs

use crate::resource::{AliveFlag, GpuResource, ResourceTracker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Tracked {
    alive: AliveFlag,
    releases: Arc<AtomicUsize>,
}

impl GpuResource for Tracked {
    fn label(&self) -> &str {
        "tracked"
    }
    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }
    fn cleanup(&self) {
        if self.alive.retire() {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn tracked(releases: &Arc<AtomicUsize>) -> Arc<Tracked> {
    Arc::new(Tracked { alive: AliveFlag::new(), releases: Arc::clone(releases) })
}

#[test]
fn test_tracker_counts_live_resources() {
    let releases = Arc::new(AtomicUsize::new(0));
    let tracker = ResourceTracker::new();
    let a = tracked(&releases);
    let b = tracked(&releases);
    tracker.track(&a);
    tracker.track(&b);
    assert_eq!(tracker.live_count(), 2);

    drop(b);
    assert_eq!(tracker.live_count(), 1);

    a.cleanup();
    assert_eq!(tracker.live_count(), 0);
}

#[test]
fn test_tracker_cleanup_all_releases_once() {
    let releases = Arc::new(AtomicUsize::new(0));
    let tracker = ResourceTracker::new();
    let a = tracked(&releases);
    let b = tracked(&releases);
    tracker.track(&a);
    tracker.track(&b);
    b.cleanup();

    assert_eq!(tracker.cleanup_all(), 1);
    assert_eq!(releases.load(Ordering::SeqCst), 2);
    assert!(!a.is_alive());

    // Second pass finds nothing
    assert_eq!(tracker.cleanup_all(), 0);
    a.cleanup();
    assert_eq!(releases.load(Ordering::SeqCst), 2);
}
