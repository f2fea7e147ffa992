use std::sync::Arc;
use std::thread;
use std::time::Duration;

use posture_bus::{FieldSet, PostureState, SharedStateStore, StatKey, StateField};

#[test]
fn readers_never_observe_partial_updates() {
    let store = Arc::new(SharedStateStore::new(Duration::from_secs(1), Duration::from_secs(60)));

    // Writers always move these fields together.
    let writers: Vec<_> = (0..2)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..100 {
                    store
                        .update(|s| {
                            s.alerts_today += 1;
                            s.bad_posture_secs = u64::from(s.alerts_today) * 60;
                            s.posture_state = if s.alerts_today % 2 == 0 {
                                PostureState::Good
                            } else {
                                PostureState::Bad
                            };
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..10)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let s = store.get_snapshot().unwrap();
                    assert_eq!(s.bad_posture_secs, u64::from(s.alerts_today) * 60);
                    let expected = match s.alerts_today {
                        0 => PostureState::Unknown,
                        n if n % 2 == 0 => PostureState::Good,
                        _ => PostureState::Bad,
                    };
                    assert_eq!(s.posture_state, expected);
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(store.get_snapshot().unwrap().alerts_today, 200);
}

#[test]
fn cached_stat_tracks_concurrent_updates() {
    let store = Arc::new(SharedStateStore::new(Duration::from_secs(1), Duration::from_secs(60)));
    let key = StatKey::new("alerts_x2", FieldSet::of(&[StateField::AlertsToday]));

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..200 {
                store.update(|s| s.alerts_today += 1).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let cached: u32 = store
            .get_cached_stat(&key, Duration::from_secs(60), |s| s.alerts_today * 2)
            .unwrap();
        assert_eq!(cached % 2, 0);
    }
    writer.join().unwrap();

    // After the last update the entry must have been invalidated.
    let cached: u32 = store
        .get_cached_stat(&key, Duration::from_secs(60), |s| s.alerts_today * 2)
        .unwrap();
    assert_eq!(cached, 400);
}
